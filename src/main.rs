//! depcache - cache-aware artifact fetcher
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use depcache::cli::{Cli, Commands};
use depcache::config::ConfigManager;
use depcache::error::CacheResult;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> CacheResult<()> {
    let cli = Cli::parse();

    let config_manager = if let Some(ref path) = cli.config {
        ConfigManager::with_path(path.clone())
    } else {
        ConfigManager::new()
    };
    let config = config_manager.load().await?;

    // 0 = warn, 1 = info, 2+ = debug
    let filter = match cli.verbose {
        0 => EnvFilter::new("depcache=warn"),
        1 => EnvFilter::new("depcache=info"),
        _ => EnvFilter::new("depcache=debug"),
    };

    if config.general.log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .without_time()
            .init();
    }

    debug!("Loaded config from {}", config_manager.path().display());

    match cli.command {
        Commands::Fetch(args) => depcache::cli::commands::fetch(args, &config).await,
        Commands::Lookup(args) => depcache::cli::commands::lookup(args, &config).await,
        Commands::Config(args) => {
            depcache::cli::commands::config(args, &config, &config_manager).await
        }
    }
}
