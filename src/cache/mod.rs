//! Building blocks of the artifact cache
//!
//! # Layout
//!
//! | Path | Contents |
//! |------|----------|
//! | `files-1/<sha256>/<name>` | Promoted files, immutable once written |
//! | `index/<sha256(location)>.json` | One cache record per location |
//! | `tmp/` | Scratch files of in-flight fetches |
//! | `cache.lock` | Cross-process lock for promotion and index updates |
//!
//! A record is only written after its file has been renamed into
//! `files-1`, so an interrupted fetch never leaves a record pointing at a
//! partial file.

pub mod guard;
pub mod index;
pub mod lock;
pub mod policy;
pub mod store;

pub use guard::ProducerGuard;
pub use index::{CacheIndex, CacheRecord, FileCacheIndex, InMemoryCacheIndex};
pub use lock::{CacheLockGuard, CacheLockingManager};
pub use policy::{CachePolicy, Clock, FixedClock, SystemClock};
pub use store::{ResourceFileStore, StoredResource, TemporaryDownload, TemporaryFileProvider};

/// Directory of the persistent index under a cache root
pub const INDEX_DIR: &str = "index";
