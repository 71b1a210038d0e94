//! Transport selection by location scheme

use crate::config::Config;
use crate::error::{CacheError, CacheResult};
use crate::resource::ResourceLocation;
use crate::transport::{ExternalResource, FileTransport, HttpTransport, ResourceTransport};
use std::sync::Arc;

/// Dispatches each location to the file or HTTP transport
#[derive(Clone)]
pub struct RoutingTransport {
    file: FileTransport,
    http: HttpTransport,
}

impl RoutingTransport {
    pub fn new(file: FileTransport, http: HttpTransport) -> Self {
        Self { file, http }
    }
}

impl ResourceTransport for RoutingTransport {
    fn resource(
        &self,
        location: &ResourceLocation,
        revalidate: bool,
    ) -> CacheResult<Box<dyn ExternalResource>> {
        match location.scheme() {
            None | Some("file") => self.file.resource(location, revalidate),
            Some("http") | Some("https") => self.http.resource(location, revalidate),
            Some(_) => Err(CacheError::UnsupportedLocation(location.to_string())),
        }
    }
}

/// Create the transport used by the CLI
pub fn create_transport(config: &Config) -> Arc<dyn ResourceTransport> {
    Arc::new(RoutingTransport::new(
        FileTransport::new(),
        HttpTransport::new(&config.http),
    ))
}
