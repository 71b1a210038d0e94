//! Transport for resources on the local filesystem

use crate::error::{CacheError, CacheResult};
use crate::resource::{ResourceLocation, ResourceMetadata};
use crate::transport::{ContentAction, ExternalResource, ResourceTransport};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fs::File;
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::fs;
use tracing::debug;

/// Serves `file://` locations and plain paths
#[derive(Debug, Clone, Copy, Default)]
pub struct FileTransport;

impl FileTransport {
    pub fn new() -> Self {
        Self
    }

    /// Filesystem path named by a location
    pub fn path_of(location: &ResourceLocation) -> PathBuf {
        let raw = location.as_str();
        PathBuf::from(raw.strip_prefix("file://").unwrap_or(raw))
    }
}

impl ResourceTransport for FileTransport {
    fn resource(
        &self,
        location: &ResourceLocation,
        _revalidate: bool,
    ) -> CacheResult<Box<dyn ExternalResource>> {
        Ok(Box::new(FileResource {
            path: Self::path_of(location),
            location: location.clone(),
        }))
    }
}

struct FileResource {
    location: ResourceLocation,
    path: PathBuf,
}

impl FileResource {
    fn metadata_from(&self, meta: &std::fs::Metadata) -> ResourceMetadata {
        let mut metadata =
            ResourceMetadata::new(self.location.clone()).with_content_length(meta.len());
        if let Ok(modified) = meta.modified() {
            metadata = metadata.with_last_modified(DateTime::<Utc>::from(modified));
        }
        metadata
    }
}

#[async_trait]
impl ExternalResource for FileResource {
    fn location(&self) -> &ResourceLocation {
        &self.location
    }

    async fn metadata(&self) -> CacheResult<Option<ResourceMetadata>> {
        match fs::metadata(&self.path).await {
            Ok(meta) if meta.is_file() => Ok(Some(self.metadata_from(&meta))),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CacheError::io(
                format!("reading metadata of {}", self.path.display()),
                e,
            )),
        }
    }

    async fn with_content_if_present(
        &self,
        action: ContentAction,
    ) -> CacheResult<Option<ResourceMetadata>> {
        let Some(metadata) = self.metadata().await? else {
            return Ok(None);
        };

        let path = self.path.clone();
        let found = tokio::task::spawn_blocking(move || match File::open(&path) {
            Ok(mut file) => {
                debug!("Reading {}", path.display());
                action(&mut file).map(|()| true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CacheError::io(format!("opening {}", path.display()), e)),
        })
        .await
        .map_err(|e| CacheError::Internal(format!("file read task failed: {}", e)))??;

        Ok(found.then_some(metadata))
    }
}
