//! Cross-process exclusive lock over the whole cache
//!
//! In-process callers are already serialised per key by the producer guard.
//! This lock covers the final "promote into store + update index" step
//! against other processes sharing the same cache directory.

use crate::error::{CacheError, CacheResult};
use fs4::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

const LOCK_FILE: &str = "cache.lock";

/// Holds the cache lock until dropped
#[derive(Debug)]
pub struct CacheLockGuard {
    file: File,
    path: PathBuf,
}

impl Drop for CacheLockGuard {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!("Failed to release cache lock {}: {}", self.path.display(), e);
        } else {
            debug!("Released cache lock {}", self.path.display());
        }
    }
}

/// Hands out the exclusive cache lock
#[derive(Debug, Clone)]
pub struct CacheLockingManager {
    path: PathBuf,
}

impl CacheLockingManager {
    pub fn new(cache_root: &Path) -> Self {
        Self {
            path: cache_root.join(LOCK_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Block (on a worker thread) until the lock is ours
    pub async fn acquire(&self) -> CacheResult<CacheLockGuard> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || lock_exclusive(path))
            .await
            .map_err(|e| CacheError::Internal(format!("cache lock task failed: {}", e)))?
    }
}

fn lock_exclusive(path: PathBuf) -> CacheResult<CacheLockGuard> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| CacheError::io(format!("creating cache directory {}", parent.display()), e))?;
    }

    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(&path)
        .map_err(|e| CacheError::CacheLock {
            path: path.clone(),
            source: Arc::new(e),
        })?;

    FileExt::lock_exclusive(&file).map_err(|e| CacheError::CacheLock {
        path: path.clone(),
        source: Arc::new(e),
    })?;

    debug!("Acquired cache lock {}", path.display());
    Ok(CacheLockGuard { file, path })
}
