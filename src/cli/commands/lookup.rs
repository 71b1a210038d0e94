//! Lookup command - show what the index holds for a location

use crate::cache::{CacheIndex, CacheRecord, FileCacheIndex, SystemClock, INDEX_DIR};
use crate::cli::args::{LookupArgs, OutputFormat};
use crate::config::Config;
use crate::error::CacheResult;
use crate::resource::ResourceLocation;
use chrono::Utc;
use console::style;
use std::sync::Arc;

/// Execute the lookup command
pub async fn execute(args: LookupArgs, config: &Config) -> CacheResult<()> {
    let index = FileCacheIndex::open(config.cache_dir().join(INDEX_DIR), Arc::new(SystemClock)).await?;
    let location = ResourceLocation::new(args.location);

    let Some(record) = index.lookup(&location).await? else {
        println!("No cache entry for {}", location);
        return Ok(());
    };

    match args.format {
        OutputFormat::Plain => println!("{}", record.cached_file.display()),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&record)?),
        OutputFormat::Table => print_record(&location, &record, config),
    }

    Ok(())
}

fn print_record(location: &ResourceLocation, record: &CacheRecord, config: &Config) {
    let age = (Utc::now() - record.cached_at).to_std().unwrap_or_default();
    let state = if config.cache_policy().must_refresh(age) {
        style("stale").yellow()
    } else {
        style("fresh").green()
    };

    println!("{} [{}]", location, state);
    println!("  {:<15} {}", "file", record.cached_file.display());
    println!("  {:<15} {}", "cached-at", record.cached_at.to_rfc3339());
    println!("  {:<15} {}s", "age", age.as_secs());
    if let Some(etag) = &record.metadata.etag {
        println!("  {:<15} {}", "etag", etag);
    }
    if let Some(checksum) = &record.metadata.sha256 {
        println!("  {:<15} {}", "sha256", checksum);
    }
}
