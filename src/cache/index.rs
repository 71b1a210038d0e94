//! Persistent mapping from resource location to cache record
//!
//! A record only ever points at a complete file that was verified when it
//! was stored. Replacing a record is whole-record: readers see either the
//! old record or the new one.

use crate::error::{CacheError, CacheResult};
use crate::resource::{ResourceLocation, ResourceMetadata};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::fs;
use tracing::{debug, warn};

use super::policy::Clock;

/// What the index knows about one location
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRecord {
    /// Stored copy in the file store
    pub cached_file: PathBuf,
    /// Metadata observed when the file was fetched or last revalidated
    pub metadata: ResourceMetadata,
    /// When the record was last stored
    pub cached_at: DateTime<Utc>,
}

/// Location -> record mapping used by the accessor
#[async_trait]
pub trait CacheIndex: Send + Sync {
    /// Look up the record for a location
    async fn lookup(&self, location: &ResourceLocation) -> CacheResult<Option<CacheRecord>>;

    /// Replace the record for `location`, stamping it with the current time
    ///
    /// Used both when a new file was stored and when an existing record was
    /// confirmed still valid.
    async fn store(
        &self,
        location: &ResourceLocation,
        cached_file: &Path,
        metadata: &ResourceMetadata,
    ) -> CacheResult<()>;

    /// Remove the record for a location, if any
    async fn clear(&self, location: &ResourceLocation) -> CacheResult<()>;
}

/// Index kept in process memory
pub struct InMemoryCacheIndex {
    records: Mutex<HashMap<ResourceLocation, CacheRecord>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryCacheIndex {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            clock,
        }
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheIndex for InMemoryCacheIndex {
    async fn lookup(&self, location: &ResourceLocation) -> CacheResult<Option<CacheRecord>> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        match records.get(location) {
            Some(record) if !record.cached_file.exists() => {
                debug!("Dropping record for {}: cached file is gone", location);
                records.remove(location);
                Ok(None)
            }
            other => Ok(other.cloned()),
        }
    }

    async fn store(
        &self,
        location: &ResourceLocation,
        cached_file: &Path,
        metadata: &ResourceMetadata,
    ) -> CacheResult<()> {
        let record = CacheRecord {
            cached_file: cached_file.to_path_buf(),
            metadata: metadata.clone(),
            cached_at: self.clock.now(),
        };
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(location.clone(), record);
        Ok(())
    }

    async fn clear(&self, location: &ResourceLocation) -> CacheResult<()> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(location);
        Ok(())
    }
}

/// On-disk record, which also carries its key so hash collisions are caught
#[derive(Debug, Serialize, Deserialize)]
struct IndexEntry {
    location: ResourceLocation,
    #[serde(flatten)]
    record: CacheRecord,
}

/// Index persisted as one JSON file per location
///
/// Each entry is written to a scratch file and renamed over the final name,
/// so a crash leaves either the previous entry or the new one.
pub struct FileCacheIndex {
    dir: PathBuf,
    clock: Arc<dyn Clock>,
}

impl FileCacheIndex {
    /// Open (creating if needed) an index directory
    pub async fn open(dir: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> CacheResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| CacheError::io(format!("creating index directory {}", dir.display()), e))?;
        debug!("Opened cache index at {}", dir.display());
        Ok(Self { dir, clock })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, location: &ResourceLocation) -> PathBuf {
        let digest = Sha256::digest(location.as_str().as_bytes());
        self.dir.join(format!("{}.json", hex::encode(digest)))
    }

    async fn read_entry(&self, path: &Path) -> CacheResult<Option<IndexEntry>> {
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(CacheError::io(
                    format!("reading index entry {}", path.display()),
                    e,
                ))
            }
        };

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| CacheError::IndexCorrupt {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
    }

    async fn remove_entry(&self, path: &Path) -> CacheResult<()> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::io(
                format!("removing index entry {}", path.display()),
                e,
            )),
        }
    }
}

#[async_trait]
impl CacheIndex for FileCacheIndex {
    async fn lookup(&self, location: &ResourceLocation) -> CacheResult<Option<CacheRecord>> {
        let path = self.entry_path(location);

        let entry = match self.read_entry(&path).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return Ok(None),
            Err(CacheError::IndexCorrupt { path, reason }) => {
                warn!("Discarding corrupt index entry {}: {}", path.display(), reason);
                self.remove_entry(&path).await?;
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        if entry.location != *location {
            warn!(
                "Index entry {} belongs to {}, not {}",
                path.display(),
                entry.location,
                location
            );
            return Ok(None);
        }

        if !entry.record.cached_file.exists() {
            debug!(
                "Dropping record for {}: {} is gone",
                location,
                entry.record.cached_file.display()
            );
            self.remove_entry(&path).await?;
            return Ok(None);
        }

        Ok(Some(entry.record))
    }

    async fn store(
        &self,
        location: &ResourceLocation,
        cached_file: &Path,
        metadata: &ResourceMetadata,
    ) -> CacheResult<()> {
        let entry = IndexEntry {
            location: location.clone(),
            record: CacheRecord {
                cached_file: cached_file.to_path_buf(),
                metadata: metadata.clone(),
                cached_at: self.clock.now(),
            },
        };
        let content = serde_json::to_string_pretty(&entry)?;

        let path = self.entry_path(location);
        let scratch = self
            .dir
            .join(format!(".{}.tmp", uuid::Uuid::new_v4().simple()));

        if let Err(e) = fs::write(&scratch, content).await {
            let _ = fs::remove_file(&scratch).await;
            return Err(CacheError::io(
                format!("writing index entry {}", scratch.display()),
                e,
            ));
        }

        if let Err(e) = fs::rename(&scratch, &path).await {
            let _ = fs::remove_file(&scratch).await;
            return Err(CacheError::io(
                format!("publishing index entry {}", path.display()),
                e,
            ));
        }

        debug!("Indexed {} -> {}", location, cached_file.display());
        Ok(())
    }

    async fn clear(&self, location: &ResourceLocation) -> CacheResult<()> {
        self.remove_entry(&self.entry_path(location)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::policy::FixedClock;
    use tempfile::TempDir;

    fn clock() -> Arc<FixedClock> {
        Arc::new(FixedClock::new(Utc::now()))
    }

    fn location() -> ResourceLocation {
        ResourceLocation::new("https://repo/g/a/1.0/a-1.0.jar")
    }

    async fn file_index(temp: &TempDir, clock: Arc<FixedClock>) -> FileCacheIndex {
        FileCacheIndex::open(temp.path().join("index"), clock)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn store_then_lookup() {
        let temp = TempDir::new().unwrap();
        let clock = clock();
        let index = file_index(&temp, clock.clone()).await;
        let cached = temp.path().join("a-1.0.jar");
        std::fs::write(&cached, b"jar").unwrap();

        let metadata = ResourceMetadata::new(location()).with_content_length(3);
        index.store(&location(), &cached, &metadata).await.unwrap();

        let record = index.lookup(&location()).await.unwrap().unwrap();
        assert_eq!(record.cached_file, cached);
        assert_eq!(record.metadata, metadata);
        assert_eq!(record.cached_at, clock.now());
    }

    #[tokio::test]
    async fn store_resets_cached_at() {
        let temp = TempDir::new().unwrap();
        let clock = clock();
        let index = file_index(&temp, clock.clone()).await;
        let cached = temp.path().join("a.jar");
        std::fs::write(&cached, b"jar").unwrap();
        let metadata = ResourceMetadata::new(location());

        index.store(&location(), &cached, &metadata).await.unwrap();
        let first = index.lookup(&location()).await.unwrap().unwrap();

        clock.advance(chrono::Duration::hours(3));
        index.store(&location(), &cached, &metadata).await.unwrap();
        let second = index.lookup(&location()).await.unwrap().unwrap();

        assert_eq!(second.cached_at - first.cached_at, chrono::Duration::hours(3));
    }

    #[tokio::test]
    async fn missing_cached_file_reads_as_absent() {
        let temp = TempDir::new().unwrap();
        let index = file_index(&temp, clock()).await;
        let cached = temp.path().join("gone.jar");
        std::fs::write(&cached, b"jar").unwrap();

        index
            .store(&location(), &cached, &ResourceMetadata::new(location()))
            .await
            .unwrap();
        std::fs::remove_file(&cached).unwrap();

        assert!(index.lookup(&location()).await.unwrap().is_none());
        assert!(!index.entry_path(&location()).exists());
    }

    #[tokio::test]
    async fn corrupt_entry_reads_as_absent() {
        let temp = TempDir::new().unwrap();
        let index = file_index(&temp, clock()).await;
        std::fs::write(index.entry_path(&location()), b"{ truncated").unwrap();

        assert!(index.lookup(&location()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reopened_index_keeps_records() {
        let temp = TempDir::new().unwrap();
        let cached = temp.path().join("a.jar");
        std::fs::write(&cached, b"jar").unwrap();

        {
            let index = file_index(&temp, clock()).await;
            index
                .store(&location(), &cached, &ResourceMetadata::new(location()))
                .await
                .unwrap();
        }

        let reopened = file_index(&temp, clock()).await;
        assert!(reopened.lookup(&location()).await.unwrap().is_some());

        let leftovers: Vec<_> = std::fs::read_dir(reopened.dir())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn clear_removes_record() {
        let temp = TempDir::new().unwrap();
        let index = file_index(&temp, clock()).await;
        let cached = temp.path().join("a.jar");
        std::fs::write(&cached, b"jar").unwrap();

        index
            .store(&location(), &cached, &ResourceMetadata::new(location()))
            .await
            .unwrap();
        index.clear(&location()).await.unwrap();
        assert!(index.lookup(&location()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn in_memory_index_round_trip() {
        let temp = TempDir::new().unwrap();
        let index = InMemoryCacheIndex::new(clock());
        let cached = temp.path().join("a.jar");
        std::fs::write(&cached, b"jar").unwrap();

        assert!(index.lookup(&location()).await.unwrap().is_none());
        index
            .store(&location(), &cached, &ResourceMetadata::new(location()))
            .await
            .unwrap();
        assert_eq!(index.len(), 1);

        std::fs::remove_file(&cached).unwrap();
        assert!(index.lookup(&location()).await.unwrap().is_none());
        assert!(index.is_empty());
    }
}
