//! Fetch command - get a resource through the cache

use crate::accessor::CacheAwareResourceAccessor;
use crate::candidates::{FileCandidates, LocalCandidates};
use crate::checksum::ChecksumService;
use crate::cli::args::{FetchArgs, OutputFormat};
use crate::config::Config;
use crate::error::{CacheError, CacheResult};
use crate::resource::{LocalResource, ResourceLocation};
use crate::transport::create_transport;
use console::style;
use std::sync::Arc;
use tracing::debug;

/// Execute the fetch command
pub async fn execute(args: FetchArgs, config: &Config) -> CacheResult<()> {
    let mut config = config.clone();
    if args.offline {
        config.cache.offline = true;
    }
    if args.refresh {
        config.cache.refresh = true;
    }
    debug!("Fetching with policy {:?}", config.cache_policy());

    let accessor = CacheAwareResourceAccessor::open(&config, create_transport(&config)).await?;
    let location = ResourceLocation::new(args.location);

    let candidates: Option<Arc<dyn LocalCandidates>> = if args.candidates.is_empty() {
        None
    } else {
        Some(Arc::new(FileCandidates::new(
            args.candidates,
            ChecksumService::new(),
        )))
    };

    let resource = accessor
        .get_resource(&location, args.base_name.as_deref(), candidates)
        .await?
        .ok_or_else(|| CacheError::User(format!("Resource not found: {}", location)))?;

    match args.format {
        OutputFormat::Plain => println!("{}", resource.file.display()),
        OutputFormat::Json => print_json(&resource)?,
        OutputFormat::Table => print_table(&resource),
    }

    Ok(())
}

fn print_table(resource: &LocalResource) {
    println!("{} {}", style("✓").green(), resource.location);
    println!("  {:<15} {}", "file", resource.file.display());
    if let Some(length) = resource.metadata.content_length {
        println!("  {:<15} {}", "length", length);
    }
    if let Some(modified) = resource.metadata.last_modified {
        println!("  {:<15} {}", "last-modified", modified.to_rfc3339());
    }
    if let Some(checksum) = &resource.metadata.sha256 {
        println!("  {:<15} {}", "sha256", checksum);
    }
}

fn print_json(resource: &LocalResource) -> CacheResult<()> {
    #[derive(serde::Serialize)]
    struct ResourceJson<'a> {
        location: &'a str,
        file: String,
        metadata: &'a crate::resource::ResourceMetadata,
    }

    let json = ResourceJson {
        location: resource.location.as_str(),
        file: resource.file.display().to_string(),
        metadata: &resource.metadata,
    };
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
