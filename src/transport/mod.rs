//! Remote resource transports
//!
//! The accessor only sees these two traits. Concrete transports exist for
//! local files and HTTP(S); `create_transport` picks by location scheme.

pub mod factory;
pub mod file;
pub mod http;

pub use factory::{create_transport, RoutingTransport};
pub use file::FileTransport;
pub use http::HttpTransport;

use crate::error::{CacheError, CacheResult};
use crate::resource::{ResourceLocation, ResourceMetadata};
use async_trait::async_trait;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Consumer of a resource's content stream
///
/// Runs on a blocking thread; an error aborts the transfer and is returned
/// to the caller as is.
pub type ContentAction = Box<dyn FnOnce(&mut dyn Read) -> CacheResult<()> + Send>;

/// One remote resource, as seen through a transport
#[async_trait]
pub trait ExternalResource: Send + Sync {
    /// The location this handle refers to
    fn location(&self) -> &ResourceLocation;

    /// Fetch metadata only; `None` if the resource does not exist
    async fn metadata(&self) -> CacheResult<Option<ResourceMetadata>>;

    /// Hand the content to `action` and return the metadata observed with
    /// it; `None` (and `action` never called) if it does not exist
    async fn with_content_if_present(
        &self,
        action: ContentAction,
    ) -> CacheResult<Option<ResourceMetadata>>;

    /// Write the full content to `destination`
    async fn download_if_present(
        &self,
        destination: &Path,
    ) -> CacheResult<Option<ResourceMetadata>> {
        let destination = destination.to_path_buf();
        self.with_content_if_present(Box::new(move |content| {
            let mut file = File::create(&destination)
                .map_err(|e| CacheError::io(format!("creating {}", destination.display()), e))?;
            std::io::copy(content, &mut file)
                .map_err(|e| CacheError::io(format!("writing {}", destination.display()), e))?;
            file.sync_all()
                .map_err(|e| CacheError::io(format!("flushing {}", destination.display()), e))
        }))
        .await
    }
}

/// Creates resource handles for locations
pub trait ResourceTransport: Send + Sync {
    /// Handle for `location`; with `revalidate` set, upstream caches must
    /// not answer from stale state
    fn resource(
        &self,
        location: &ResourceLocation,
        revalidate: bool,
    ) -> CacheResult<Box<dyn ExternalResource>>;
}
