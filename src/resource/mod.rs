//! Resource locations, remote metadata and locally available resources

pub mod metadata;

pub use metadata::{is_definitely_unchanged, ResourceMetadata};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Opaque, stable identifier of an externally hosted artifact
///
/// Used both as the cache index key and the in-flight de-duplication key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceLocation(String);

impl ResourceLocation {
    pub fn new(uri: impl Into<String>) -> Self {
        Self(uri.into())
    }

    /// The location as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// URI scheme, if the location has one (`https`, `file`, ...)
    pub fn scheme(&self) -> Option<&str> {
        let (scheme, _) = self.0.split_once("://")?;
        let valid = !scheme.is_empty()
            && scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
        valid.then_some(scheme)
    }

    /// A sibling location with `suffix` appended, e.g. `lib.jar` -> `lib.jar.sha256`
    pub fn append(&self, suffix: &str) -> Self {
        Self(format!("{}{}", self.0, suffix))
    }

    /// Last path segment, ignoring any query or fragment
    pub fn base_name(&self) -> Option<&str> {
        let without_query = self.0.split(['?', '#']).next().unwrap_or("");
        // Skip the authority so a bare host is never taken for a file name
        let path = match without_query.split_once("://") {
            Some((_, rest)) => rest.split_once('/').map(|(_, path)| path)?,
            None => without_query,
        };
        path.rsplit('/').find(|segment| !segment.is_empty())
    }
}

impl fmt::Display for ResourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceLocation {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ResourceLocation {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A resource available as a complete, verified local file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalResource {
    /// Where the resource came from
    pub location: ResourceLocation,
    /// The cached copy
    pub file: PathBuf,
    /// Metadata observed when the file was fetched
    pub metadata: ResourceMetadata,
}

impl LocalResource {
    pub fn new(location: ResourceLocation, file: PathBuf, metadata: ResourceMetadata) -> Self {
        Self {
            location,
            file,
            metadata,
        }
    }

    pub fn path(&self) -> &Path {
        &self.file
    }
}
