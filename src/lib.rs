//! depcache - cache-aware access to remote build dependencies
//!
//! Resolves resource locations to local files through a persistent,
//! content-addressed cache. Fresh entries are served without contacting
//! the remote, stale ones are revalidated by metadata, and identical local
//! files are reused instead of downloading.

pub mod accessor;
pub mod cache;
pub mod candidates;
pub mod checksum;
pub mod cli;
pub mod config;
pub mod error;
pub mod resource;
pub mod transport;

pub use accessor::CacheAwareResourceAccessor;
pub use error::{CacheError, CacheResult};
