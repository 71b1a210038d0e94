//! Cache-aware access to external resources
//!
//! `get_resource` decides, per location, whether to serve the cached copy,
//! confirm it against the remote, reuse a byte-identical local file, or
//! download afresh. The whole decision runs under the producer guard, so
//! concurrent callers for one location share a single run.

use crate::cache::policy::age_since;
use crate::cache::{
    CacheIndex, CacheLockingManager, CachePolicy, Clock, FileCacheIndex, ProducerGuard,
    ResourceFileStore, SystemClock, TemporaryDownload, TemporaryFileProvider, INDEX_DIR,
};
use crate::candidates::{LocalCandidate, LocalCandidates};
use crate::checksum::{Checksum, ChecksumService};
use crate::config::Config;
use crate::error::{CacheError, CacheResult};
use crate::resource::{is_definitely_unchanged, LocalResource, ResourceLocation, ResourceMetadata};
use crate::transport::{ExternalResource, ResourceTransport};
use std::io::Read;
use std::sync::Arc;
use tokio::fs;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

type Outcome = CacheResult<Option<LocalResource>>;

/// Upper bound on what is read from a checksum sidecar
const MAX_SIDECAR_LEN: u64 = 4096;

/// Entry point of the cache: fetches resources through the cache
#[derive(Clone)]
pub struct CacheAwareResourceAccessor {
    transport: Arc<dyn ResourceTransport>,
    index: Arc<dyn CacheIndex>,
    store: ResourceFileStore,
    temp_files: TemporaryFileProvider,
    locking: CacheLockingManager,
    checksums: ChecksumService,
    policy: CachePolicy,
    clock: Arc<dyn Clock>,
    sidecar_suffix: Arc<str>,
    guard: Arc<ProducerGuard<ResourceLocation, Outcome>>,
}

impl CacheAwareResourceAccessor {
    pub fn new(
        transport: Arc<dyn ResourceTransport>,
        index: Arc<dyn CacheIndex>,
        store: ResourceFileStore,
        policy: CachePolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            transport,
            index,
            temp_files: store.temporary_files(),
            locking: CacheLockingManager::new(store.root()),
            checksums: store.checksums().clone(),
            store,
            policy,
            clock,
            sidecar_suffix: Arc::from(".sha256"),
            guard: Arc::new(ProducerGuard::new()),
        }
    }

    /// Open the persistent cache described by `config`
    pub async fn open(config: &Config, transport: Arc<dyn ResourceTransport>) -> CacheResult<Self> {
        let root = config.cache_dir();
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let index = FileCacheIndex::open(root.join(INDEX_DIR), Arc::clone(&clock)).await?;
        let store = ResourceFileStore::new(&root, ChecksumService::new());

        debug!("Opened cache at {}", root.display());
        Ok(Self::new(transport, Arc::new(index), store, config.cache_policy(), clock)
            .with_sidecar_suffix(&config.cache.checksum_sidecar_suffix))
    }

    /// Suffix appended to a location to find its checksum sidecar
    pub fn with_sidecar_suffix(mut self, suffix: &str) -> Self {
        self.sidecar_suffix = Arc::from(suffix);
        self
    }

    /// The index this accessor reads and writes
    pub fn index(&self) -> &Arc<dyn CacheIndex> {
        &self.index
    }

    /// Get `location` as a local file, going to the network only if needed
    ///
    /// `base_name` names the stored file (defaults to the location's last
    /// segment). `candidates` are local files that may hold the same bytes.
    /// Returns `None` when the resource does not exist remotely.
    pub async fn get_resource(
        &self,
        location: &ResourceLocation,
        base_name: Option<&str>,
        candidates: Option<Arc<dyn LocalCandidates>>,
    ) -> CacheResult<Option<LocalResource>> {
        let base_name = base_name
            .or_else(|| location.base_name())
            .unwrap_or("resource")
            .to_string();
        let this = self.clone();
        let key = location.clone();

        self.guard
            .guard_by_key(location.clone(), move || async move {
                this.resolve(key, base_name, candidates).await
            })
            .await?
    }

    async fn resolve(
        &self,
        location: ResourceLocation,
        base_name: String,
        candidates: Option<Arc<dyn LocalCandidates>>,
    ) -> Outcome {
        debug!("Constructing external resource: {}", location);
        let cached = self.index.lookup(&location).await?;
        let candidates = candidates.filter(|c| !c.is_empty());

        // No cached copy and nothing local to try: plain download
        if cached.is_none() && candidates.is_none() {
            let resource = self.transport.resource(&location, false)?;
            return self.copy_to_cache(&location, &base_name, resource.as_ref()).await;
        }

        if let Some(record) = &cached {
            let age = age_since(self.clock.as_ref(), record.cached_at);
            if !self.policy.must_refresh(age) {
                debug!("Cached resource {} is fresh (age {:?})", location, age);
                return Ok(Some(LocalResource::new(
                    location,
                    record.cached_file.clone(),
                    record.metadata.clone(),
                )));
            }
        }

        let revalidate = true;
        let Some(remote) = self.transport.resource(&location, revalidate)?.metadata().await? else {
            info!("Resource {} no longer exists remotely", location);
            return Ok(None);
        };

        if let Some(record) = cached {
            if is_definitely_unchanged(&record.metadata, &remote) {
                info!(
                    "Cached resource {} is up-to-date (lastModified: {:?})",
                    location, record.metadata.last_modified
                );
                // Re-storing the same record resets its age
                self.index
                    .store(&location, &record.cached_file, &record.metadata)
                    .await?;
                return Ok(Some(LocalResource::new(
                    location,
                    record.cached_file,
                    record.metadata,
                )));
            }
        }

        if let Some(candidates) = candidates {
            let remote_checksum = match remote.sha256 {
                Some(checksum) => Some(checksum),
                None => self.remote_sha256(&location, revalidate).await,
            };

            if let Some(checksum) = remote_checksum {
                if let Some(local) = candidates.find_by_checksum(&checksum).await? {
                    info!(
                        "Found locally available resource with matching checksum: [{}, {}]",
                        location,
                        local.file.display()
                    );
                    if let Some(resource) = self
                        .copy_candidate_to_cache(&location, &base_name, &remote, &checksum, &local)
                        .await?
                    {
                        return Ok(Some(resource));
                    }
                }
            }
        }

        let resource = self.transport.resource(&location, revalidate)?;
        self.copy_to_cache(&location, &base_name, resource.as_ref())
            .await
    }

    /// Checksum published next to the resource; any failure means "unknown"
    async fn remote_sha256(&self, location: &ResourceLocation, revalidate: bool) -> Option<Checksum> {
        match self.fetch_sidecar(location, revalidate).await {
            Ok(checksum) => checksum,
            Err(e) => {
                debug!("Failed to download checksum for resource '{}': {}", location, e);
                None
            }
        }
    }

    async fn fetch_sidecar(
        &self,
        location: &ResourceLocation,
        revalidate: bool,
    ) -> CacheResult<Option<Checksum>> {
        let sidecar = location.append(&self.sidecar_suffix);
        let resource = self.transport.resource(&sidecar, revalidate)?;

        let (tx, rx) = oneshot::channel();
        let read = resource
            .with_content_if_present(Box::new(move |content| {
                let mut text = String::new();
                content
                    .take(MAX_SIDECAR_LEN)
                    .read_to_string(&mut text)
                    .map_err(|e| CacheError::io("reading checksum", e))?;
                let _ = tx.send(text);
                Ok(())
            }))
            .await?;
        if read.is_none() {
            return Ok(None);
        }

        let content = rx
            .await
            .map_err(|_| CacheError::Internal(format!("checksum for {} was not read", location)))?;
        // Sidecars may carry "<hex>  <file name>"
        let token = content.split_whitespace().next().unwrap_or_default();
        Checksum::from_hex(token).map(Some)
    }

    async fn copy_candidate_to_cache(
        &self,
        location: &ResourceLocation,
        base_name: &str,
        remote: &ResourceMetadata,
        expected: &Checksum,
        local: &LocalCandidate,
    ) -> Outcome {
        let scratch = self.temp_files.create_temporary_file("candidate", "bin").await?;
        fs::copy(&local.file, scratch.path()).await.map_err(|e| {
            CacheError::io(
                format!(
                    "copying candidate {} to {}",
                    local.file.display(),
                    scratch.path().display()
                ),
                e,
            )
        })?;

        let copied = self.checksums.sha256_fresh(scratch.path()).await?;
        if copied != *expected {
            warn!(
                "Candidate {} for {} failed verification (expected {}, got {})",
                local.file.display(),
                location,
                expected,
                copied
            );
            return Ok(None);
        }

        self.move_into_cache(location, base_name, &scratch, remote.clone())
            .await
            .map(Some)
    }

    async fn copy_to_cache(
        &self,
        location: &ResourceLocation,
        base_name: &str,
        resource: &dyn ExternalResource,
    ) -> Outcome {
        let scratch = self.temp_files.create_temporary_file("download", "bin").await?;
        info!("Downloading {} to {}", location, scratch.path().display());

        let Some(metadata) = resource.download_if_present(scratch.path()).await? else {
            info!("Resource {} not found", location);
            return Ok(None);
        };

        self.move_into_cache(location, base_name, &scratch, metadata)
            .await
            .map(Some)
    }

    /// Promote a verified scratch file and record it, under the cache lock
    async fn move_into_cache(
        &self,
        location: &ResourceLocation,
        base_name: &str,
        scratch: &TemporaryDownload,
        metadata: ResourceMetadata,
    ) -> CacheResult<LocalResource> {
        let _lock = self.locking.acquire().await?;
        let stored = self.store.move_into_cache(scratch, base_name).await?;
        self.index.store(location, &stored.file, &metadata).await?;
        Ok(LocalResource::new(location.clone(), stored.file, metadata))
    }
}
