//! Single-updater guard for an install directory.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::Utc;

use crate::error::{Result, UpdateError};

/// Default age after which a lock is assumed to belong to a crashed updater.
/// Also the headroom added on top of the network bounds by
/// [`UpdaterConfig::stale_lock_age`](crate::UpdaterConfig::stale_lock_age).
pub const STALE_LOCK_AGE: Duration = Duration::from_secs(15 * 60);

/// Held while a resolution cycle runs. Removes the lock file on drop.
#[derive(Debug)]
pub struct UpdateLock {
    path: PathBuf,
}

impl UpdateLock {
    /// Lock file path for a given state file (`.meta` -> `.meta.lock`).
    #[must_use]
    pub fn path_for(state_path: &Path) -> PathBuf {
        let mut name = state_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        state_path.with_file_name(name)
    }

    /// Claim the lock, replacing it once if older than [`STALE_LOCK_AGE`].
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self> {
        Self::acquire_with(path, STALE_LOCK_AGE)
    }

    /// Claim the lock, replacing it once if it is older than `stale_after`.
    ///
    /// `stale_after` must exceed the longest cycle a live holder can run,
    /// since the lock file is not refreshed while held.
    pub fn acquire_with(path: impl Into<PathBuf>, stale_after: Duration) -> Result<Self> {
        let path = path.into();
        match try_create(&path) {
            Ok(lock) => Ok(lock),
            Err(UpdateError::AlreadyRunning { pid, .. }) if is_stale(&path, stale_after) => {
                tracing::warn!(
                    "Replacing stale update lock {} (pid {pid})",
                    path.display()
                );
                fs::remove_file(&path).map_err(|e| UpdateError::io("remove", &path, e))?;
                try_create(&path)
            }
            Err(err) => Err(err),
        }
    }

    /// Lock file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for UpdateLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != ErrorKind::NotFound {
                tracing::warn!("Failed to release update lock {}: {e}", self.path.display());
            }
        }
    }
}

fn try_create(path: &Path) -> Result<UpdateLock> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| UpdateError::io("create directory", parent, e))?;
    }

    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            return Err(UpdateError::AlreadyRunning {
                lock_path: path.to_path_buf(),
                pid: read_owner_pid(path).unwrap_or(0),
            });
        }
        Err(e) => return Err(UpdateError::io("create", path, e)),
    };

    let body = format!("pid={}\ncreated_at={}\n", std::process::id(), Utc::now().to_rfc3339());
    file.write_all(body.as_bytes())
        .and_then(|()| file.flush())
        .map_err(|e| UpdateError::io("write", path, e))?;

    Ok(UpdateLock {
        path: path.to_path_buf(),
    })
}

fn read_owner_pid(path: &Path) -> Option<u32> {
    let raw = fs::read_to_string(path).ok()?;
    raw.lines()
        .find_map(|line| line.strip_prefix("pid="))
        .and_then(|pid| pid.trim().parse().ok())
}

fn is_stale(path: &Path, stale_after: Duration) -> bool {
    fs::metadata(path)
        .and_then(|meta| meta.modified())
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .is_some_and(|age| age > stale_after)
}
