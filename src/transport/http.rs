//! HTTP(S) transport backed by a blocking `ureq` agent
//!
//! Requests run on tokio's blocking pool. 404 and 410 mean "does not
//! exist"; every other failure is a transport error.

use crate::checksum::Checksum;
use crate::config::schema::HttpConfig;
use crate::error::{CacheError, CacheResult};
use crate::resource::{ResourceLocation, ResourceMetadata};
use crate::transport::{ContentAction, ExternalResource, ResourceTransport};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::debug;
use ureq::http::HeaderMap;
use ureq::Agent;

/// Header some repository managers use to publish the content SHA-256
const CHECKSUM_HEADER: &str = "x-checksum-sha256";

/// Serves `http://` and `https://` locations
#[derive(Clone)]
pub struct HttpTransport {
    agent: Agent,
    user_agent: String,
}

impl HttpTransport {
    pub fn new(config: &HttpConfig) -> Self {
        let agent_config = Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_secs)))
            .build();
        Self {
            agent: Agent::new_with_config(agent_config),
            user_agent: config.user_agent.clone(),
        }
    }
}

impl ResourceTransport for HttpTransport {
    fn resource(
        &self,
        location: &ResourceLocation,
        revalidate: bool,
    ) -> CacheResult<Box<dyn ExternalResource>> {
        Ok(Box::new(HttpResource {
            agent: self.agent.clone(),
            user_agent: self.user_agent.clone(),
            location: location.clone(),
            revalidate,
        }))
    }
}

#[derive(Clone)]
struct HttpResource {
    agent: Agent,
    user_agent: String,
    location: ResourceLocation,
    revalidate: bool,
}

impl HttpResource {
    fn head(&self) -> CacheResult<Option<ResourceMetadata>> {
        let mut request = self
            .agent
            .head(self.location.as_str())
            .header("User-Agent", &self.user_agent);
        if self.revalidate {
            request = request.header("Cache-Control", "max-age=0");
        }

        match request.call() {
            Ok(response) => Ok(Some(metadata_from_headers(
                &self.location,
                response.headers(),
            ))),
            Err(ureq::Error::StatusCode(404 | 410)) => Ok(None),
            Err(e) => Err(CacheError::transport(self.location.as_str(), e.to_string())),
        }
    }

    fn get_with(&self, action: ContentAction) -> CacheResult<Option<ResourceMetadata>> {
        let mut request = self
            .agent
            .get(self.location.as_str())
            .header("User-Agent", &self.user_agent);
        if self.revalidate {
            request = request.header("Cache-Control", "max-age=0");
        }

        let response = match request.call() {
            Ok(response) => response,
            Err(ureq::Error::StatusCode(404 | 410)) => return Ok(None),
            Err(e) => return Err(CacheError::transport(self.location.as_str(), e.to_string())),
        };

        let metadata = metadata_from_headers(&self.location, response.headers());
        let mut reader = response.into_body().into_reader();
        action(&mut reader)?;

        debug!("Read content of {}", self.location);
        Ok(Some(metadata))
    }
}

#[async_trait]
impl ExternalResource for HttpResource {
    fn location(&self) -> &ResourceLocation {
        &self.location
    }

    async fn metadata(&self) -> CacheResult<Option<ResourceMetadata>> {
        let resource = self.clone();
        tokio::task::spawn_blocking(move || resource.head())
            .await
            .map_err(|e| CacheError::Internal(format!("HTTP task failed: {}", e)))?
    }

    async fn with_content_if_present(
        &self,
        action: ContentAction,
    ) -> CacheResult<Option<ResourceMetadata>> {
        let resource = self.clone();
        tokio::task::spawn_blocking(move || resource.get_with(action))
            .await
            .map_err(|e| CacheError::Internal(format!("HTTP task failed: {}", e)))?
    }
}

/// Build metadata from response headers, ignoring values that do not parse
pub fn metadata_from_headers(location: &ResourceLocation, headers: &HeaderMap) -> ResourceMetadata {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    let mut metadata = ResourceMetadata::new(location.clone());
    if let Some(modified) = header("last-modified")
        .and_then(|v| DateTime::parse_from_rfc2822(v).ok())
    {
        metadata = metadata.with_last_modified(modified.with_timezone(&Utc));
    }
    if let Some(length) = header("content-length").and_then(|v| v.trim().parse::<u64>().ok()) {
        metadata = metadata.with_content_length(length);
    }
    if let Some(etag) = header("etag") {
        metadata = metadata.with_etag(etag);
    }
    if let Some(checksum) = header(CHECKSUM_HEADER).and_then(|v| Checksum::from_hex(v).ok()) {
        metadata = metadata.with_sha256(checksum);
    }
    metadata
}
