//! Loading and saving the depcache configuration file
//!
//! A missing file is not an error: every setting has a default, so a
//! fresh machine runs with `Config::default()` until `config init` writes
//! one out.

pub mod schema;

pub use schema::Config;

use crate::error::{CacheError, CacheResult};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info};

const CONFIG_FILE: &str = "config.toml";

/// Owns the location of the config file
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Manager for `<platform config dir>/depcache/config.toml`
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Manager for an explicit file, as given by `--config`
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("depcache")
            .join(CONFIG_FILE)
    }

    /// Read the config file, or the defaults if there is none
    pub async fn load(&self) -> CacheResult<Config> {
        match fs::read_to_string(&self.config_path).await {
            Ok(content) => parse(&self.config_path, &content),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(
                    "No config at {}, using defaults",
                    self.config_path.display()
                );
                Ok(Config::default())
            }
            Err(e) => Err(CacheError::io(
                format!("reading config from {}", self.config_path.display()),
                e,
            )),
        }
    }

    /// Write `config` out, replacing any existing file in one rename
    pub async fn save(&self, config: &Config) -> CacheResult<()> {
        let dir = self
            .config_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)
            .await
            .map_err(|e| CacheError::ConfigDirCreate {
                path: dir.to_path_buf(),
                source: Arc::new(e),
            })?;

        let content = toml::to_string_pretty(config)?;
        let staged = self.config_path.with_extension("toml.tmp");
        fs::write(&staged, content)
            .await
            .map_err(|e| CacheError::io(format!("writing {}", staged.display()), e))?;
        fs::rename(&staged, &self.config_path).await.map_err(|e| {
            CacheError::io(format!("replacing {}", self.config_path.display()), e)
        })?;

        info!("Wrote config to {}", self.config_path.display());
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

fn parse(path: &Path, content: &str) -> CacheResult<Config> {
    toml::from_str(content).map_err(|e| CacheError::ConfigInvalid {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}
