//! Error types for the self-update system.

use std::path::PathBuf;

use thiserror::Error;

/// Broad failure classes used to decide how a failure is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Remote unreachable or answered with a non-success status.
    Transport,
    /// Malformed metadata document or version string.
    Decode,
    /// Local files could not be created, written or extracted.
    Filesystem,
    /// Local state problems. Never fatal during resolution.
    LocalState,
    /// Configuration, locking, launching or publishing problems.
    Other,
}

/// Errors that can occur while resolving, applying or publishing an update.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum UpdateError {
    /// Failed to parse a version string.
    #[error("invalid version format: {0}")]
    InvalidVersion(String),

    /// Network request failed before a response was received.
    #[error("network error: {0}")]
    Network(String),

    /// Remote answered with a status we cannot treat as success.
    #[error("request to {url} failed with status {status}")]
    HttpStatus {
        /// Requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// Remote metadata document could not be decoded.
    #[error("metadata decode error: {0}")]
    MetadataDecode(String),

    /// File I/O error.
    #[error("failed to {operation} {path}")]
    Io {
        /// What we were doing.
        operation: &'static str,
        /// File or directory involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Temp file could not be renamed over its target.
    #[error("atomic write failed: {temp_path} -> {target_path}")]
    AtomicWriteFailed {
        /// Temporary file that was written.
        temp_path: PathBuf,
        /// Destination that was not replaced.
        target_path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Archive extraction failed.
    #[error("archive extraction error: {0}")]
    ArchiveExtraction(String),

    /// Local state file exists but cannot be decoded.
    #[error("local state at {path} is unreadable: {reason}")]
    StateCorrupt {
        /// State file path.
        path: PathBuf,
        /// Why decoding failed.
        reason: String,
    },

    /// Another updater holds the lock for this install directory.
    #[error("another updater is already running (lock: {lock_path}, pid {pid})")]
    AlreadyRunning {
        /// Lock file path.
        lock_path: PathBuf,
        /// Process id recorded in the lock, 0 if unknown.
        pid: u32,
    },

    /// Application entry point could not be started.
    #[error("failed to launch {path}: {reason}")]
    Launch {
        /// Entry point.
        path: PathBuf,
        /// Why it failed.
        reason: String,
    },

    /// Publishing step failed.
    #[error("publish error: {0}")]
    Publish(String),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl UpdateError {
    /// Shorthand for building an [`UpdateError::Io`].
    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Returns the failure class of this error.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Network(_) | Self::HttpStatus { .. } => ErrorCategory::Transport,
            Self::InvalidVersion(_) | Self::MetadataDecode(_) => ErrorCategory::Decode,
            Self::Io { .. } | Self::AtomicWriteFailed { .. } | Self::ArchiveExtraction(_) => {
                ErrorCategory::Filesystem
            }
            Self::StateCorrupt { .. } => ErrorCategory::LocalState,
            Self::AlreadyRunning { .. }
            | Self::Launch { .. }
            | Self::Publish(_)
            | Self::Config(_) => ErrorCategory::Other,
        }
    }

    /// Returns a short message suitable for an operator console.
    #[must_use]
    pub fn user_message(&self) -> &str {
        match self {
            Self::Network(_) => "Could not reach the update server.",
            Self::HttpStatus { .. } => "The update server rejected the request.",
            Self::InvalidVersion(_) | Self::MetadataDecode(_) => {
                "The update server returned malformed version information."
            }
            Self::ArchiveExtraction(_) => "Could not extract the update package.",
            Self::Io { .. } | Self::AtomicWriteFailed { .. } => {
                "Could not write the update to disk."
            }
            Self::StateCorrupt { .. } => "Local update state is unreadable.",
            Self::AlreadyRunning { .. } => "Another update is already in progress.",
            Self::Launch { .. } => "Could not start the application.",
            Self::Publish(_) => "Publishing the release failed.",
            Self::Config(_) => "The updater is misconfigured.",
        }
    }

    /// Returns whether the caller must not relaunch the application after this error.
    ///
    /// Filesystem failures can leave the install directory half-written.
    #[must_use]
    pub fn blocks_relaunch(&self) -> bool {
        self.category() == ErrorCategory::Filesystem
    }
}

impl From<reqwest::Error> for UpdateError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::HttpStatus {
                url: err.url().map(ToString::to_string).unwrap_or_default(),
                status: status.as_u16(),
            };
        }
        Self::Network(err.to_string())
    }
}

impl From<serde_json::Error> for UpdateError {
    fn from(err: serde_json::Error) -> Self {
        Self::MetadataDecode(err.to_string())
    }
}

impl From<zip::result::ZipError> for UpdateError {
    fn from(err: zip::result::ZipError) -> Self {
        Self::ArchiveExtraction(err.to_string())
    }
}

/// Result type alias for update operations.
pub type Result<T> = std::result::Result<T, UpdateError>;
