//! Error types for depcache
//!
//! All modules use `CacheResult<T>` as their return type.

use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Result type alias for depcache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// All errors that can occur in depcache
///
/// Errors are `Clone` so that a single failed fetch can be handed to
/// every caller waiting on the same resource.
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: Arc<std::io::Error>,
    },

    // Transport errors
    #[error("Transport error for {location}: {reason}")]
    Transport { location: String, reason: String },

    #[error("Unsupported resource location: {0}")]
    UnsupportedLocation(String),

    #[error("Invalid checksum {value:?}: {reason}")]
    ChecksumInvalid { value: String, reason: String },

    // Index errors
    #[error("Cache index entry {path} is corrupt: {reason}")]
    IndexCorrupt { path: PathBuf, reason: String },

    #[error("Failed to acquire cache lock {path}: {source}")]
    CacheLock {
        path: PathBuf,
        #[source]
        source: Arc<std::io::Error>,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: Arc<std::io::Error>,
    },

    // Serialization errors
    #[error("TOML serialize error: {0}")]
    TomlSerialize(String),

    #[error("JSON error: {0}")]
    Json(String),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl CacheError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source: Arc::new(source),
        }
    }

    /// Create a transport error for a location
    pub fn transport(location: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Transport {
            location: location.into(),
            reason: reason.into(),
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::Io { .. } | Self::CacheLock { .. }
        )
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::Transport { .. } => Some("Check network access, or run with --offline"),
            Self::UnsupportedLocation(_) => {
                Some("Use an http://, https:// or file:// location, or a plain path")
            }
            Self::CacheLock { .. } => Some("Another build may be holding the cache lock"),
            Self::ConfigInvalid { .. } => Some("Run: depcache config init --force"),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e.to_string())
    }
}

impl From<toml::ser::Error> for CacheError {
    fn from(e: toml::ser::Error) -> Self {
        Self::TomlSerialize(e.to_string())
    }
}
