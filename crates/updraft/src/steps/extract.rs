//! Archive extraction through a staging directory.
//!
//! Entries are unpacked into `{install_dir}/.updraft-staging-{pid}` first.
//! Only once every entry is on disk are the staged files renamed over the
//! install directory, so an unreadable archive never touches live files.

use std::fs::{self, File};
use std::io::{self, BufReader, ErrorKind};
use std::path::{Path, PathBuf};

use crate::error::{Result, UpdateError};

/// Counts from one extraction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    /// File entries written.
    pub files: usize,
    /// Directory entries created.
    pub directories: usize,
    /// Uncompressed bytes written.
    pub bytes: u64,
}

/// Extract the zip at `archive` over `install_dir`.
pub fn extract_archive(archive: &Path, install_dir: &Path) -> Result<ExtractSummary> {
    let staging = StagingDir::create(install_dir)?;
    let summary = unpack(archive, staging.path())?;
    promote(staging.path(), install_dir)?;
    tracing::debug!(
        "Promoted {} files from {}",
        summary.files,
        staging.path().display()
    );
    Ok(summary)
}

fn unpack(archive: &Path, dest: &Path) -> Result<ExtractSummary> {
    let file = File::open(archive).map_err(|e| UpdateError::io("open", archive, e))?;
    let mut zip = zip::ZipArchive::new(BufReader::new(file))?;
    let mut summary = ExtractSummary::default();

    for index in 0..zip.len() {
        let mut entry = zip.by_index(index)?;
        let name = entry.name().to_string();
        let Some(relative) = entry.enclosed_name() else {
            return Err(UpdateError::ArchiveExtraction(format!(
                "entry '{name}' escapes the install directory"
            )));
        };
        let target = dest.join(&relative);

        if entry.is_dir() {
            fs::create_dir_all(&target)
                .map_err(|e| UpdateError::io("create directory", &target, e))?;
            summary.directories += 1;
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| UpdateError::io("create directory", parent, e))?;
        }
        let mut out = File::create(&target).map_err(|e| UpdateError::io("create", &target, e))?;
        let written = io::copy(&mut entry, &mut out)
            .map_err(|e| {
                UpdateError::ArchiveExtraction(format!("failed to extract '{name}': {e}"))
            })?;

        if let Some(mode) = entry.unix_mode() {
            set_mode(&target, mode)?;
        }

        summary.files += 1;
        summary.bytes += written;
        tracing::debug!("Extracted {} ({written} bytes)", relative.display());
    }

    Ok(summary)
}

/// Move everything under `staging` into `install_dir`, replacing files.
fn promote(staging: &Path, install_dir: &Path) -> Result<()> {
    let mut pending = vec![PathBuf::new()];

    while let Some(relative) = pending.pop() {
        let source_dir = staging.join(&relative);
        let entries =
            fs::read_dir(&source_dir).map_err(|e| UpdateError::io("read", &source_dir, e))?;

        for entry in entries {
            let entry = entry.map_err(|e| UpdateError::io("read", &source_dir, e))?;
            let child = relative.join(entry.file_name());
            let source = staging.join(&child);
            let target = install_dir.join(&child);
            let file_type = entry
                .file_type()
                .map_err(|e| UpdateError::io("inspect", &source, e))?;

            if file_type.is_dir() {
                fs::create_dir_all(&target)
                    .map_err(|e| UpdateError::io("create directory", &target, e))?;
                pending.push(child);
            } else {
                if target.is_dir() {
                    return Err(UpdateError::ArchiveExtraction(format!(
                        "cannot replace directory {} with a file",
                        target.display()
                    )));
                }
                fs::rename(&source, &target).map_err(|e| UpdateError::io("replace", &target, e))?;
            }
        }
    }

    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o7777))
        .map_err(|e| UpdateError::io("set permissions on", path, e))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

/// Scratch directory removed on drop.
struct StagingDir {
    path: PathBuf,
}

impl StagingDir {
    fn create(install_dir: &Path) -> Result<Self> {
        let path = install_dir.join(format!(".updraft-staging-{}", std::process::id()));
        remove_tree(&path);
        fs::create_dir_all(&path).map_err(|e| UpdateError::io("create directory", &path, e))?;
        Ok(Self { path })
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        remove_tree(&self.path);
    }
}

fn remove_tree(path: &Path) {
    if let Err(e) = fs::remove_dir_all(path) {
        if e.kind() != ErrorKind::NotFound {
            tracing::warn!("Failed to remove {}: {e}", path.display());
        }
    }
}
