//! The version-state record shared by local and remote sides.

use semver::Version;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::version::parse_version;

/// Version assumed for a variant that has never been published.
pub const INITIAL_VERSION: &str = "1.0.0";

/// What version is current, and where to fetch it.
///
/// Serialized as `{"current_version": "...", "last_version_url": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionMarker {
    /// Semantic version string.
    #[serde(rename = "current_version")]
    pub version: String,

    /// Location of the archive for `version`; empty if nothing was ever published.
    #[serde(rename = "last_version_url", default)]
    pub artifact_url: String,
}

impl VersionMarker {
    /// Create a marker.
    pub fn new(version: impl Into<String>, artifact_url: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            artifact_url: artifact_url.into(),
        }
    }

    /// The marker synthesized on first contact with an empty store.
    #[must_use]
    pub fn initial() -> Self {
        Self::new(INITIAL_VERSION, "")
    }

    /// Parse `version` as a semantic version.
    pub fn parsed_version(&self) -> Result<Version> {
        parse_version(&self.version)
    }

    /// Whether an archive location is recorded.
    #[must_use]
    pub fn has_artifact(&self) -> bool {
        !self.artifact_url.trim().is_empty()
    }

    /// Decode the remote JSON form.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Encode the remote JSON form.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}
