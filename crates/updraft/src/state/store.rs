//! Binary local state file.
//!
//! Format:
//! - 4 bytes: magic (`UPD\x01`)
//! - 4 bytes: schema version (u32 little-endian)
//! - 32 bytes: SHA-256 of the payload
//! - N bytes: rkyv payload ([`StateRecord`])

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rkyv::rancor;
use rkyv::util::AlignedVec;
use sha2::{Digest, Sha256};

use crate::config::UpdaterConfig;
use crate::error::{Result, UpdateError};
use crate::marker::VersionMarker;
use crate::state::StateStore;

/// Current schema version of the state file.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Magic bytes at the start of the state file.
pub const MAGIC_BYTES: [u8; 4] = [b'U', b'P', b'D', 0x01];

const HEADER_LEN: usize = 4 + 4 + 32;

/// What gets persisted: the last-applied marker plus when it was applied.
#[derive(Debug, Clone, PartialEq, Eq, rkyv::Archive, rkyv::Serialize, rkyv::Deserialize)]
pub struct StateRecord {
    /// Applied version.
    pub version: String,
    /// Archive the version came from.
    pub artifact_url: String,
    /// RFC 3339 timestamp of the save.
    pub applied_at: String,
}

impl StateRecord {
    fn from_marker(marker: &VersionMarker) -> Self {
        Self {
            version: marker.version.clone(),
            artifact_url: marker.artifact_url.clone(),
            applied_at: Utc::now().to_rfc3339(),
        }
    }

    /// The marker portion of the record.
    #[must_use]
    pub fn marker(&self) -> VersionMarker {
        VersionMarker::new(self.version.clone(), self.artifact_url.clone())
    }

    /// Parsed `applied_at`, if well-formed.
    #[must_use]
    pub fn applied_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.applied_at)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

/// Durable record of the last-applied [`VersionMarker`].
#[derive(Debug, Clone)]
pub struct LocalStateStore {
    path: PathBuf,
}

impl LocalStateStore {
    /// Store backed by the given file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the configured state path.
    #[must_use]
    pub fn from_config(config: &UpdaterConfig) -> Self {
        Self::new(config.state_path())
    }

    /// State file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the full record.
    ///
    /// `Ok(None)` when the file does not exist; [`UpdateError::StateCorrupt`]
    /// when it exists but cannot be decoded.
    pub fn load_record(&self) -> Result<Option<StateRecord>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(UpdateError::io("read", &self.path, e)),
        };
        parse_state_bytes(&bytes, &self.path).map(Some)
    }

    /// Persist `marker` atomically (temp file + rename).
    pub fn save_marker(&self, marker: &VersionMarker) -> Result<()> {
        let bytes = serialize_record(&StateRecord::from_marker(marker), &self.path)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| UpdateError::io("create directory", parent, e))?;
        }

        let temp_path = temp_path_for(&self.path);
        let mut file =
            File::create(&temp_path).map_err(|e| UpdateError::io("create", &temp_path, e))?;
        file.write_all(&bytes)
            .map_err(|e| UpdateError::io("write", &temp_path, e))?;
        file.sync_all().map_err(|e| UpdateError::io("sync", &temp_path, e))?;
        drop(file);

        set_hidden(&self.path, false);
        if let Err(source) = fs::rename(&temp_path, &self.path) {
            let _ = fs::remove_file(&temp_path);
            return Err(UpdateError::AtomicWriteFailed {
                temp_path,
                target_path: self.path.clone(),
                source,
            });
        }
        set_hidden(&self.path, true);

        tracing::debug!(
            "Saved local state {} to {}",
            marker.version,
            self.path.display()
        );
        Ok(())
    }

    /// Remove the state file. Returns whether one existed.
    pub fn clear(&self) -> Result<bool> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(UpdateError::io("remove", &self.path, e)),
        }
    }
}

impl StateStore for LocalStateStore {
    fn load(&self) -> Option<VersionMarker> {
        match self.load_record() {
            Ok(record) => record.map(|r| r.marker()),
            Err(err) => {
                tracing::warn!("Ignoring local state: {err}");
                None
            }
        }
    }

    fn save(&self, marker: &VersionMarker) -> Result<()> {
        self.save_marker(marker)
    }

    fn discard(&self) -> Result<()> {
        self.clear().map(|_| ())
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn serialize_record(record: &StateRecord, path: &Path) -> Result<Vec<u8>> {
    let payload =
        rkyv::to_bytes::<rancor::Error>(record).map_err(|e| UpdateError::StateCorrupt {
            path: path.to_path_buf(),
            reason: format!("rkyv serialization failed: {e}"),
        })?;

    let mut output = Vec::with_capacity(HEADER_LEN + payload.len());
    output.extend_from_slice(&MAGIC_BYTES);
    output.extend_from_slice(&CURRENT_SCHEMA_VERSION.to_le_bytes());
    output.extend_from_slice(&Sha256::digest(payload.as_slice()));
    output.extend_from_slice(payload.as_slice());
    Ok(output)
}

fn parse_state_bytes(bytes: &[u8], path: &Path) -> Result<StateRecord> {
    let corrupt = |reason: &str| UpdateError::StateCorrupt {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };

    if bytes.len() <= HEADER_LEN {
        return Err(corrupt("file too small"));
    }
    if bytes[0..4] != MAGIC_BYTES {
        return Err(corrupt("invalid magic bytes"));
    }

    let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    if version > CURRENT_SCHEMA_VERSION {
        return Err(corrupt(&format!(
            "schema version {version} is newer than supported {CURRENT_SCHEMA_VERSION}"
        )));
    }

    let digest = &bytes[8..HEADER_LEN];
    let payload = &bytes[HEADER_LEN..];
    if Sha256::digest(payload).as_slice() != digest {
        return Err(corrupt("payload digest mismatch"));
    }

    // rkyv needs an aligned buffer; the slice offset into the file gives no guarantee.
    let mut aligned = AlignedVec::<16>::with_capacity(payload.len());
    aligned.extend_from_slice(payload);

    rkyv::from_bytes::<StateRecord, rancor::Error>(&aligned)
        .map_err(|e| corrupt(&format!("rkyv deserialization failed: {e}")))
}

#[cfg(windows)]
fn set_hidden(path: &Path, hidden: bool) {
    if !path.exists() {
        return;
    }
    let flag = if hidden { "+h" } else { "-h" };
    if let Err(e) = std::process::Command::new("attrib")
        .arg(flag)
        .arg(path)
        .output()
    {
        tracing::debug!("attrib {flag} {} failed: {e}", path.display());
    }
}

#[cfg(not(windows))]
fn set_hidden(_path: &Path, _hidden: bool) {}
