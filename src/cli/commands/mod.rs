//! CLI command implementations

pub mod config;
pub mod fetch;
pub mod lookup;

pub use config::execute as config;
pub use fetch::execute as fetch;
pub use lookup::execute as lookup;
