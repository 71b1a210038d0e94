//! Content-addressed file store and scratch files
//!
//! Downloads are staged in `<root>/tmp` and promoted into
//! `<root>/files-1/<sha256>/<name>` by rename. Both directories live under
//! the same root so the rename is atomic: a stored path is either absent or
//! complete.

use crate::checksum::{Checksum, ChecksumService};
use crate::error::{CacheError, CacheResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

const FILES_DIR: &str = "files-1";
const TMP_DIR: &str = "tmp";

/// A scratch file owned by a single in-flight operation
///
/// The file is deleted when this value is dropped, whichever way the
/// operation ends. After a successful promotion the path no longer exists
/// and the drop is a no-op.
#[derive(Debug)]
pub struct TemporaryDownload {
    path: PathBuf,
}

impl TemporaryDownload {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TemporaryDownload {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed scratch file {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove scratch file {}: {}", self.path.display(), e),
        }
    }
}

/// Hands out uniquely named scratch files
#[derive(Debug, Clone)]
pub struct TemporaryFileProvider {
    dir: PathBuf,
}

impl TemporaryFileProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Reserve a new scratch path; the file itself is created by the writer
    pub async fn create_temporary_file(
        &self,
        prefix: &str,
        suffix: &str,
    ) -> CacheResult<TemporaryDownload> {
        fs::create_dir_all(&self.dir).await.map_err(|e| {
            CacheError::io(format!("creating scratch directory {}", self.dir.display()), e)
        })?;

        let name = format!("{}-{}.{}", prefix, uuid::Uuid::new_v4().simple(), suffix);
        Ok(TemporaryDownload {
            path: self.dir.join(name),
        })
    }
}

/// A file that has been promoted into the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredResource {
    pub file: PathBuf,
    pub sha256: Checksum,
}

/// Append-only, content-addressed store of downloaded files
#[derive(Debug, Clone)]
pub struct ResourceFileStore {
    root: PathBuf,
    checksums: ChecksumService,
}

impl ResourceFileStore {
    pub fn new(root: impl Into<PathBuf>, checksums: ChecksumService) -> Self {
        Self {
            root: root.into(),
            checksums,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn checksums(&self) -> &ChecksumService {
        &self.checksums
    }

    /// Scratch files for this store, on the same filesystem as its files
    pub fn temporary_files(&self) -> TemporaryFileProvider {
        TemporaryFileProvider::new(self.root.join(TMP_DIR))
    }

    /// Promote a staged file into the store under `base_name`
    ///
    /// If identical content is already stored under that name the staged
    /// file is left for its owner to discard.
    pub async fn move_into_cache(
        &self,
        staged: &TemporaryDownload,
        base_name: &str,
    ) -> CacheResult<StoredResource> {
        let sha256 = self.checksums.sha256_fresh(staged.path()).await?;
        let dir = self.root.join(FILES_DIR).join(sha256.to_hex());
        let file = dir.join(sanitize_base_name(base_name));

        if fs::try_exists(&file).await.unwrap_or(false) {
            debug!("{} already stored", file.display());
            return Ok(StoredResource { file, sha256 });
        }

        fs::create_dir_all(&dir)
            .await
            .map_err(|e| CacheError::io(format!("creating store directory {}", dir.display()), e))?;

        fs::rename(staged.path(), &file).await.map_err(|e| {
            CacheError::io(
                format!(
                    "moving {} into cache at {}",
                    staged.path().display(),
                    file.display()
                ),
                e,
            )
        })?;

        debug!("Stored {} ({})", file.display(), sha256);
        Ok(StoredResource { file, sha256 })
    }
}

/// Keep only the final path component so a hint cannot escape the store
fn sanitize_base_name(base_name: &str) -> String {
    let name = base_name
        .rsplit(['/', '\\'])
        .find(|segment| !segment.is_empty() && *segment != "." && *segment != "..")
        .unwrap_or("resource");
    name.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(temp: &TempDir) -> ResourceFileStore {
        ResourceFileStore::new(temp.path(), ChecksumService::new())
    }

    #[tokio::test]
    async fn scratch_file_removed_on_drop() {
        let temp = TempDir::new().unwrap();
        let scratch = store(&temp)
            .temporary_files()
            .create_temporary_file("download", "bin")
            .await
            .unwrap();
        std::fs::write(scratch.path(), b"partial").unwrap();
        let path = scratch.path().to_path_buf();

        drop(scratch);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn move_into_cache_is_content_addressed() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        let scratch = store
            .temporary_files()
            .create_temporary_file("download", "bin")
            .await
            .unwrap();
        std::fs::write(scratch.path(), b"jar bytes").unwrap();

        let stored = store.move_into_cache(&scratch, "a-1.0.jar").await.unwrap();

        assert_eq!(stored.sha256, Checksum::of_bytes(b"jar bytes"));
        assert!(stored.file.ends_with(format!("{}/a-1.0.jar", stored.sha256)));
        assert_eq!(std::fs::read(&stored.file).unwrap(), b"jar bytes");
        assert!(!scratch.path().exists());
    }

    #[tokio::test]
    async fn identical_content_reuses_stored_file() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        let files = store.temporary_files();

        let first = files.create_temporary_file("download", "bin").await.unwrap();
        std::fs::write(first.path(), b"same").unwrap();
        let stored_first = store.move_into_cache(&first, "a.jar").await.unwrap();

        let second = files.create_temporary_file("download", "bin").await.unwrap();
        std::fs::write(second.path(), b"same").unwrap();
        let stored_second = store.move_into_cache(&second, "a.jar").await.unwrap();

        assert_eq!(stored_first, stored_second);
        let second_path = second.path().to_path_buf();
        drop(second);
        assert!(!second_path.exists());
    }

    #[tokio::test]
    async fn interrupted_promotion_leaves_nothing_in_store() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        let scratch = store
            .temporary_files()
            .create_temporary_file("download", "bin")
            .await
            .unwrap();
        std::fs::write(scratch.path(), b"half a ja").unwrap();

        // The operation is abandoned before promotion
        drop(scratch);

        let files_dir = temp.path().join(FILES_DIR);
        assert!(!files_dir.exists() || std::fs::read_dir(&files_dir).unwrap().next().is_none());
        assert_eq!(std::fs::read_dir(temp.path().join(TMP_DIR)).unwrap().count(), 0);
    }

    #[test]
    fn base_name_is_sanitized() {
        assert_eq!(sanitize_base_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_base_name("lib.jar"), "lib.jar");
        assert_eq!(sanitize_base_name(".."), "resource");
        assert_eq!(sanitize_base_name(""), "resource");
    }
}
