//! Configuration for the updater and the publisher.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, UpdateError};
use crate::state::STALE_LOCK_AGE;
use crate::version::parse_version;

/// Public object-storage endpoint.
pub const DEFAULT_BASE_URL: &str = "https://storage.googleapis.com";

/// Local state file name, relative to the install directory.
pub const DEFAULT_STATE_FILE: &str = ".meta";

/// Updater config shipped inside release archives, next to the updater.
pub const DEFAULT_CONFIG_FILE: &str = "updraft.json";

/// Metadata fetch/write bound (seconds).
pub const DEFAULT_METADATA_TIMEOUT_SECS: u64 = 10;

/// Archive download/upload bound (seconds).
pub const DEFAULT_TRANSFER_TIMEOUT_SECS: u64 = 600;

/// Object name of a variant's metadata document.
#[must_use]
pub fn metadata_object_name(variant: &str) -> String {
    format!("{variant}/meta.json")
}

/// Object name of a published archive.
#[must_use]
pub fn artifact_object_name(variant: &str, version: &str) -> String {
    format!("{variant}/app_v{version}.zip")
}

/// Settings the updater is constructed with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdaterConfig {
    /// Channel / application name within the storage area.
    pub variant: String,

    /// Storage bucket identifier.
    pub storage: String,

    /// Path launched after resolution, relative to `install_dir` unless absolute.
    #[serde(default)]
    pub app_entry_point: PathBuf,

    /// Directory the archive is unpacked into.
    #[serde(default = "default_install_dir")]
    pub install_dir: PathBuf,

    /// Local state file name inside `install_dir`.
    #[serde(default = "default_state_file")]
    pub state_file: String,

    /// Object-storage base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bound on metadata requests.
    #[serde(default = "default_metadata_timeout")]
    pub metadata_timeout_secs: u64,

    /// Bound on archive downloads.
    #[serde(default = "default_transfer_timeout")]
    pub transfer_timeout_secs: u64,
}

fn default_install_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_state_file() -> String {
    DEFAULT_STATE_FILE.to_string()
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_metadata_timeout() -> u64 {
    DEFAULT_METADATA_TIMEOUT_SECS
}

fn default_transfer_timeout() -> u64 {
    DEFAULT_TRANSFER_TIMEOUT_SECS
}

impl UpdaterConfig {
    /// Create a config with defaults for everything but the identifiers.
    pub fn new(
        variant: impl Into<String>,
        storage: impl Into<String>,
        app_entry_point: impl Into<PathBuf>,
    ) -> Self {
        Self {
            variant: variant.into(),
            storage: storage.into(),
            app_entry_point: app_entry_point.into(),
            install_dir: default_install_dir(),
            state_file: default_state_file(),
            base_url: default_base_url(),
            metadata_timeout_secs: DEFAULT_METADATA_TIMEOUT_SECS,
            transfer_timeout_secs: DEFAULT_TRANSFER_TIMEOUT_SECS,
        }
    }

    /// Load a config from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read(path).map_err(|e| UpdateError::io("read", path, e))?;
        serde_json::from_slice(&raw)
            .map_err(|e| UpdateError::Config(format!("{}: {e}", path.display())))
    }

    /// Set the install directory.
    #[must_use]
    pub fn with_install_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.install_dir = dir.into();
        self
    }

    /// Set the object-storage base URL.
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Check identifiers before any I/O happens.
    pub fn validate(&self) -> Result<()> {
        validate_identifier("variant", &self.variant)?;
        validate_identifier("storage", &self.storage)?;
        if self.state_file.is_empty() || self.state_file.contains(['/', '\\']) {
            return Err(UpdateError::Config(format!(
                "state_file must be a bare file name, got '{}'",
                self.state_file
            )));
        }
        Ok(())
    }

    /// Full path of the local state file.
    #[must_use]
    pub fn state_path(&self) -> PathBuf {
        self.install_dir.join(&self.state_file)
    }

    /// Entry point resolved against the install directory.
    #[must_use]
    pub fn resolved_entry_point(&self) -> PathBuf {
        if self.app_entry_point.is_absolute() {
            self.app_entry_point.clone()
        } else {
            self.install_dir.join(&self.app_entry_point)
        }
    }

    /// Metadata timeout as a [`Duration`].
    #[must_use]
    pub fn metadata_timeout(&self) -> Duration {
        Duration::from_secs(self.metadata_timeout_secs)
    }

    /// Transfer timeout as a [`Duration`].
    #[must_use]
    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_secs(self.transfer_timeout_secs)
    }

    /// Age after which another updater may reclaim the lock: the longest
    /// a cycle can spend on the network (read, bootstrap write, transfer)
    /// plus [`STALE_LOCK_AGE`] for extraction.
    #[must_use]
    pub fn stale_lock_age(&self) -> Duration {
        self.metadata_timeout() * 2 + self.transfer_timeout() + STALE_LOCK_AGE
    }
}

/// Settings the publisher is constructed with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublisherConfig {
    /// Version being released.
    pub version: String,

    /// Storage bucket identifier.
    pub storage: String,

    /// Channel / application name.
    pub variant: String,

    /// Scratch directory where build outputs and the archive are assembled.
    pub output_dir: PathBuf,

    /// Entry point the updater will launch (recorded for the build steps).
    #[serde(default)]
    pub app_entry_point: PathBuf,

    /// Bearer token for storage writes, passed through as-is.
    #[serde(default, skip_serializing)]
    pub access_token: Option<String>,
}

impl PublisherConfig {
    /// Check identifiers and the version string.
    pub fn validate(&self) -> Result<()> {
        validate_identifier("variant", &self.variant)?;
        validate_identifier("storage", &self.storage)?;
        parse_version(&self.version)?;
        if self.output_dir.as_os_str().is_empty() {
            return Err(UpdateError::Config("output_dir must not be empty".to_string()));
        }
        Ok(())
    }

    /// Path of the assembled archive.
    #[must_use]
    pub fn archive_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}.zip", self.variant))
    }
}

fn validate_identifier(field: &str, value: &str) -> Result<()> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(UpdateError::Config(format!("{field} must not be empty")));
    }
    if trimmed != value || value.contains(['/', '\\']) || value == "." || value.contains("..") {
        return Err(UpdateError::Config(format!(
            "{field} must be a single path segment, got '{value}'"
        )));
    }
    Ok(())
}
