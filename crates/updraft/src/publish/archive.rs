//! Zip assembly for published releases.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Component, Path, PathBuf};

use sha2::{Digest, Sha256};
use zip::CompressionMethod;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::error::{Result, UpdateError};
use crate::steps::format_bytes;

/// Finished archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSummary {
    /// Archive location.
    pub path: PathBuf,
    /// File entries written.
    pub files: usize,
    /// Archive size on disk.
    pub size: u64,
    /// Hex SHA-256 of the archive.
    pub sha256: String,
}

/// Appends build outputs to a zip under their path relative to a root.
pub struct ArchiveBuilder {
    path: PathBuf,
    root: PathBuf,
    writer: ZipWriter<File>,
    directories: BTreeSet<String>,
    files: usize,
}

impl ArchiveBuilder {
    /// Start a new archive at `path`; entry names are relative to `root`.
    pub fn create(path: impl Into<PathBuf>, root: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = File::create(&path).map_err(|e| UpdateError::io("create", &path, e))?;
        tracing::info!("Creating {}", path.display());

        Ok(Self {
            path,
            root: root.into(),
            writer: ZipWriter::new(file),
            directories: BTreeSet::new(),
            files: 0,
        })
    }

    /// Add `produced` (a file under the root). Returns the entry name.
    pub fn append(&mut self, produced: &Path) -> Result<String> {
        let name = entry_name(&self.root, produced)?;
        let source = File::open(produced).map_err(|e| UpdateError::io("open", produced, e))?;
        let metadata = source
            .metadata()
            .map_err(|e| UpdateError::io("inspect", produced, e))?;
        if !metadata.is_file() {
            return Err(UpdateError::Publish(format!(
                "{} is not a regular file",
                produced.display()
            )));
        }

        self.add_parents(&name)?;

        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .unix_permissions(file_mode(&metadata));
        self.writer.start_file(name.as_str(), options)?;
        io::copy(&mut BufReader::new(source), &mut self.writer)
            .map_err(|e| UpdateError::io("compress", produced, e))?;

        self.files += 1;
        tracing::info!("Added {name} ({})", format_bytes(metadata.len()));
        Ok(name)
    }

    /// Write the central directory and hash the result.
    pub fn finish(self) -> Result<ArchiveSummary> {
        let Self {
            path,
            writer,
            files,
            ..
        } = self;
        writer.finish()?;

        let mut hasher = Sha256::new();
        let mut file = File::open(&path).map_err(|e| UpdateError::io("open", &path, e))?;
        let size = io::copy(&mut file, &mut hasher).map_err(|e| UpdateError::io("read", &path, e))?;
        let sha256 = hex::encode(hasher.finalize());

        tracing::info!(
            "Finished {} ({files} files, {}, sha256 {sha256})",
            path.display(),
            format_bytes(size)
        );
        Ok(ArchiveSummary {
            path,
            files,
            size,
            sha256,
        })
    }

    fn add_parents(&mut self, name: &str) -> Result<()> {
        let mut prefix = String::new();
        let parents: Vec<&str> = name.split('/').collect();
        for segment in &parents[..parents.len().saturating_sub(1)] {
            prefix.push_str(segment);
            prefix.push('/');
            if self.directories.insert(prefix.clone()) {
                let options = SimpleFileOptions::default().unix_permissions(0o755);
                self.writer.add_directory(prefix.as_str(), options)?;
            }
        }
        Ok(())
    }
}

/// Entry name for `produced` relative to `root`, `/`-separated.
///
/// Fails if `produced` lies outside `root`.
pub fn entry_name(root: &Path, produced: &Path) -> Result<String> {
    let outside = || {
        UpdateError::Publish(format!(
            "{} is outside the output directory {}",
            produced.display(),
            root.display()
        ))
    };

    let relative = produced.strip_prefix(root).map_err(|_| outside())?;
    let mut segments = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => segments.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            _ => return Err(outside()),
        }
    }

    if segments.is_empty() {
        return Err(outside());
    }
    Ok(segments.join("/"))
}

#[cfg(unix)]
fn file_mode(metadata: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn file_mode(metadata: &fs::Metadata) -> u32 {
    if metadata.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}
