//! Content checksums for cached and candidate files
//!
//! Every checksum in depcache is SHA-256: remote-declared values, sidecar
//! files and locally recomputed hashes are all compared byte for byte.

use crate::error::{CacheError, CacheResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;
use tracing::debug;

/// Length of a SHA-256 digest in hex characters
pub const SHA256_HEX_LEN: usize = 64;

/// A SHA-256 content hash
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Checksum([u8; 32]);

impl Checksum {
    /// Hash an in-memory buffer
    pub fn of_bytes(bytes: &[u8]) -> Self {
        Self(Sha256::digest(bytes).into())
    }

    /// Parse a hex checksum
    ///
    /// Some servers strip leading zeros, so shorter values are left-padded.
    pub fn from_hex(value: &str) -> CacheResult<Self> {
        let trimmed = value.trim();
        if trimmed.is_empty() || trimmed.len() > SHA256_HEX_LEN {
            return Err(CacheError::ChecksumInvalid {
                value: value.to_string(),
                reason: format!("expected 1 to {} hex characters", SHA256_HEX_LEN),
            });
        }

        let padded = format!("{:0>width$}", trimmed, width = SHA256_HEX_LEN);
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(&padded, &mut bytes).map_err(|e| CacheError::ChecksumInvalid {
            value: value.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self(bytes))
    }

    /// Lowercase hex rendering
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Checksum({})", self.to_hex())
    }
}

impl TryFrom<String> for Checksum {
    type Error = CacheError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<Checksum> for String {
    fn from(value: Checksum) -> Self {
        value.to_hex()
    }
}

/// File identity used to decide whether a memoised hash is still valid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    len: u64,
    modified: Option<SystemTime>,
}

/// Computes file checksums, memoising by path, length and mtime
#[derive(Debug, Clone, Default)]
pub struct ChecksumService {
    known: Arc<Mutex<HashMap<PathBuf, (FileStamp, Checksum)>>>,
}

impl ChecksumService {
    pub fn new() -> Self {
        Self::default()
    }

    /// SHA-256 of a file's full contents, reusing a previous result when
    /// the file's length and mtime are unchanged
    pub async fn sha256(&self, path: &Path) -> CacheResult<Checksum> {
        let stamp = file_stamp(path).await?;

        if let Some(checksum) = self.remembered(path, stamp) {
            debug!("Checksum cache hit for {}", path.display());
            return Ok(checksum);
        }

        let checksum = self.sha256_fresh(path).await?;
        self.known
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.to_path_buf(), (stamp, checksum));
        Ok(checksum)
    }

    /// SHA-256 of a file, always read from disk and never memoised
    ///
    /// Used for scratch files whose bytes must be verified as written.
    pub async fn sha256_fresh(&self, path: &Path) -> CacheResult<Checksum> {
        let owned = path.to_path_buf();
        tokio::task::spawn_blocking(move || hash_file(&owned))
            .await
            .map_err(|e| CacheError::Internal(format!("checksum task failed: {}", e)))?
    }

    fn remembered(&self, path: &Path, stamp: FileStamp) -> Option<Checksum> {
        let known = self.known.lock().unwrap_or_else(PoisonError::into_inner);
        match known.get(path) {
            Some((seen, checksum)) if *seen == stamp && stamp.modified.is_some() => Some(*checksum),
            _ => None,
        }
    }
}

async fn file_stamp(path: &Path) -> CacheResult<FileStamp> {
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|e| CacheError::io(format!("reading metadata of {}", path.display()), e))?;
    Ok(FileStamp {
        len: meta.len(),
        modified: meta.modified().ok(),
    })
}

fn hash_file(path: &Path) -> CacheResult<Checksum> {
    let mut file = File::open(path)
        .map_err(|e| CacheError::io(format!("opening {} for hashing", path.display()), e))?;

    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file
            .read(&mut buf)
            .map_err(|e| CacheError::io(format!("reading {} for hashing", path.display()), e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(Checksum(hasher.finalize().into()))
}
