//! Configuration schema for depcache
//!
//! Configuration is stored at `~/.config/depcache/config.toml`

use crate::cache::policy::CachePolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Cache settings
    pub cache: CacheConfig,

    /// HTTP transport settings
    pub http: HttpConfig,
}

impl Config {
    /// Derive the freshness policy from the cache settings
    ///
    /// `offline` wins over `refresh` when both are set.
    pub fn cache_policy(&self) -> CachePolicy {
        if self.cache.offline {
            CachePolicy::Never
        } else if self.cache.refresh {
            CachePolicy::Always
        } else {
            CachePolicy::MaxAge(Duration::from_secs(self.cache.max_age_secs))
        }
    }

    /// Resolved cache root directory
    pub fn cache_dir(&self) -> PathBuf {
        self.cache.dir.clone().unwrap_or_else(default_cache_dir)
    }
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache root directory (defaults to the platform cache dir)
    pub dir: Option<PathBuf>,

    /// Revalidate entries older than this many seconds
    pub max_age_secs: u64,

    /// Never contact the remote for cached entries
    pub offline: bool,

    /// Always revalidate cached entries
    pub refresh: bool,

    /// Suffix appended to a location to find its checksum sidecar
    pub checksum_sidecar_suffix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: None,
            max_age_secs: 24 * 60 * 60,
            offline: false,
            refresh: false,
            checksum_sidecar_suffix: ".sha256".to_string(),
        }
    }
}

/// HTTP transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Overall request timeout in seconds
    pub timeout_secs: u64,

    /// User-Agent header sent with every request
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: format!("depcache/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("depcache")
}
