//! Remote-observed resource metadata and the "definitely unchanged" rule

use crate::checksum::Checksum;
use crate::resource::ResourceLocation;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Facts about a remote resource observed at a point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceMetadata {
    /// Location the metadata describes
    pub location: ResourceLocation,

    /// Last-Modified reported by the remote
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,

    /// Content length in bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_length: Option<u64>,

    /// Content checksum declared by the remote
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<Checksum>,

    /// Entity tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
}

impl ResourceMetadata {
    /// Metadata that only records the location
    pub fn new(location: ResourceLocation) -> Self {
        Self {
            location,
            last_modified: None,
            content_length: None,
            sha256: None,
            etag: None,
        }
    }

    pub fn with_last_modified(mut self, last_modified: DateTime<Utc>) -> Self {
        self.last_modified = Some(last_modified);
        self
    }

    pub fn with_content_length(mut self, length: u64) -> Self {
        self.content_length = Some(length);
        self
    }

    pub fn with_sha256(mut self, checksum: Checksum) -> Self {
        self.sha256 = Some(checksum);
        self
    }

    pub fn with_etag(mut self, etag: impl Into<String>) -> Self {
        self.etag = Some(etag.into());
        self
    }
}

/// Decide whether `remote` proves the content behind `cached` is unchanged
///
/// Only ever a proof of *no* change. Checksums are authoritative when both
/// sides carry one; otherwise a matching entity tag, then matching
/// last-modified and non-zero length, are accepted. Anything less is
/// treated as possibly changed.
pub fn is_definitely_unchanged(cached: &ResourceMetadata, remote: &ResourceMetadata) -> bool {
    if let (Some(local), Some(remote)) = (&cached.sha256, &remote.sha256) {
        return local == remote;
    }

    if let (Some(local), Some(remote)) = (&cached.etag, &remote.etag) {
        if local == remote {
            return true;
        }
    }

    match (
        cached.last_modified,
        cached.content_length,
        remote.last_modified,
        remote.content_length,
    ) {
        (Some(local_modified), Some(local_len), Some(remote_modified), Some(remote_len)) => {
            local_len > 0 && local_len == remote_len && local_modified == remote_modified
        }
        _ => false,
    }
}
