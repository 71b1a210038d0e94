//! Local files that may already hold a remote artifact's bytes
//!
//! A candidate is only ever trusted through its checksum; ownership stays
//! with whoever put the file there, and the accessor only copies from it.

use crate::checksum::{Checksum, ChecksumService};
use crate::error::CacheResult;
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::debug;

/// A local file whose checksum matched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalCandidate {
    pub file: PathBuf,
    pub sha256: Checksum,
}

/// Source of local candidates, searched by checksum
#[async_trait]
pub trait LocalCandidates: Send + Sync {
    /// True when there is nothing to search
    fn is_empty(&self) -> bool;

    /// First candidate whose content hashes to `checksum`
    async fn find_by_checksum(&self, checksum: &Checksum) -> CacheResult<Option<LocalCandidate>>;
}

/// Candidates given as a list of paths, hashed lazily on first search
pub struct FileCandidates {
    files: Vec<PathBuf>,
    checksums: ChecksumService,
}

impl FileCandidates {
    pub fn new(files: Vec<PathBuf>, checksums: ChecksumService) -> Self {
        Self { files, checksums }
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }
}

#[async_trait]
impl LocalCandidates for FileCandidates {
    fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    async fn find_by_checksum(&self, checksum: &Checksum) -> CacheResult<Option<LocalCandidate>> {
        for file in &self.files {
            match self.checksums.sha256(file).await {
                Ok(found) if found == *checksum => {
                    return Ok(Some(LocalCandidate {
                        file: file.clone(),
                        sha256: found,
                    }));
                }
                Ok(_) => {}
                Err(e) => debug!("Skipping candidate {}: {}", file.display(), e),
            }
        }
        Ok(None)
    }
}
