//! Filesystem-rooted mirror with the same object layout as the HTTP backend.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use reqwest::Url;
use tracing::{debug, info};

use crate::config::{artifact_object_name, metadata_object_name};
use crate::error::{Result, UpdateError};
use crate::marker::VersionMarker;
use crate::remote::{ArtifactStore, MetadataStore};

/// Store rooted at a local (or mounted) directory.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    /// Store rooted at `root`. The directory is created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, object: &str) -> PathBuf {
        self.root.join(object)
    }
}

impl MetadataStore for DirectoryStore {
    fn get(&self, variant: &str) -> Result<VersionMarker> {
        let path = self.object_path(&metadata_object_name(variant));
        match fs::read(&path) {
            Ok(bytes) => VersionMarker::from_json(&bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No marker at {}, bootstrapping the initial marker", path.display());
                let marker = VersionMarker::initial();
                self.put(variant, &marker)?;
                Ok(marker)
            }
            Err(e) => Err(UpdateError::io("read", path, e)),
        }
    }

    fn put(&self, variant: &str, marker: &VersionMarker) -> Result<()> {
        let path = self.object_path(&metadata_object_name(variant));
        let parent = path.parent().unwrap_or(&self.root);
        fs::create_dir_all(parent)
            .map_err(|e| UpdateError::io("create directory", parent, e))?;

        let mut temp = tempfile::NamedTempFile::new_in(parent)
            .map_err(|e| UpdateError::io("create temp file in", parent, e))?;
        temp.write_all(&marker.to_json()?)
            .map_err(|e| UpdateError::io("write", temp.path().to_path_buf(), e))?;
        temp.persist(&path).map_err(|e| UpdateError::AtomicWriteFailed {
            temp_path: e.file.path().to_path_buf(),
            target_path: path.clone(),
            source: e.error,
        })?;

        debug!("Wrote marker {} to {}", marker.version, path.display());
        Ok(())
    }
}

impl ArtifactStore for DirectoryStore {
    fn upload_archive(&self, variant: &str, version: &str, archive: &Path) -> Result<String> {
        let target = self.object_path(&artifact_object_name(variant, version));
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| UpdateError::io("create directory", parent, e))?;
        }
        fs::copy(archive, &target).map_err(|e| UpdateError::io("copy", archive, e))?;

        let absolute =
            fs::canonicalize(&target).map_err(|e| UpdateError::io("resolve", &target, e))?;
        let url = Url::from_file_path(&absolute).map_err(|()| {
            UpdateError::Publish(format!("cannot express {} as a file url", absolute.display()))
        })?;

        info!("Copied {} to {url}", archive.display());
        Ok(url.to_string())
    }
}
