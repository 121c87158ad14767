//! Download-then-extract transfer for zip archives.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use reqwest::blocking::Client;

use crate::config::UpdaterConfig;
use crate::error::{Result, UpdateError};
use crate::steps::{
    ArtifactTransfer, NoopProgress, ProgressSink, download_to, extract_archive, format_bytes,
};

/// Applies zip archives to an install directory.
pub struct ZipTransfer {
    client: Client,
    install_dir: PathBuf,
    progress: Arc<dyn ProgressSink>,
}

impl ZipTransfer {
    /// Transfer into `install_dir` with the given download bound.
    pub fn new(install_dir: impl Into<PathBuf>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            install_dir: install_dir.into(),
            progress: Arc::new(NoopProgress),
        })
    }

    /// Transfer described by an updater config.
    pub fn from_config(config: &UpdaterConfig) -> Result<Self> {
        Self::new(&config.install_dir, config.transfer_timeout())
    }

    /// Report download progress to `progress`.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Install directory.
    #[must_use]
    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }
}

impl std::fmt::Debug for ZipTransfer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZipTransfer")
            .field("install_dir", &self.install_dir)
            .finish_non_exhaustive()
    }
}

impl ArtifactTransfer for ZipTransfer {
    fn apply(&self, url: &str) -> Result<()> {
        if url.trim().is_empty() {
            return Err(UpdateError::Network(
                "remote marker has no artifact url".to_string(),
            ));
        }

        fs::create_dir_all(&self.install_dir)
            .map_err(|e| UpdateError::io("create directory", &self.install_dir, e))?;

        let archive = download_to(&self.client, url, &self.install_dir, self.progress.as_ref())?;
        let extracted = extract_archive(archive.path(), &self.install_dir);

        if let Err(e) = archive.close() {
            tracing::warn!("Failed to delete downloaded archive: {e}");
        }

        let summary = extracted?;
        tracing::info!(
            "Applied {} files ({}) to {}",
            summary.files,
            format_bytes(summary.bytes),
            self.install_dir.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Url;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;
    use zip::write::SimpleFileOptions;

    fn build_app_zip(path: &Path) {
        let mut writer = zip::ZipWriter::new(File::create(path).unwrap());
        let exec = SimpleFileOptions::default().unix_permissions(0o755);
        writer.add_directory("bin/", exec).unwrap();
        writer.start_file("bin/app.exe", exec).unwrap();
        writer.write_all(&[0x7f; 4096]).unwrap();
        writer.finish().unwrap();
    }

    fn file_url(path: &Path) -> String {
        Url::from_file_path(path).unwrap().to_string()
    }

    fn leftovers(dir: &Path) -> Vec<String> {
        fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with(".updraft-"))
            .collect()
    }

    #[test]
    fn test_apply_extracts_and_cleans_up() {
        let source = tempdir().unwrap();
        let install = tempdir().unwrap();
        let archive = source.path().join("app_v2.0.0.zip");
        build_app_zip(&archive);

        let transfer = ZipTransfer::new(install.path(), Duration::from_secs(5)).unwrap();
        transfer.apply(&file_url(&archive)).unwrap();

        let app = install.path().join("bin/app.exe");
        assert_eq!(fs::metadata(&app).unwrap().len(), 4096);
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            assert_eq!(fs::metadata(&app).unwrap().permissions().mode() & 0o777, 0o755);
        }
        assert!(leftovers(install.path()).is_empty());
    }

    #[test]
    fn test_corrupt_archive_fails_and_cleans_up() {
        let source = tempdir().unwrap();
        let install = tempdir().unwrap();
        let archive = source.path().join("broken.zip");
        fs::write(&archive, b"not a zip").unwrap();

        let transfer = ZipTransfer::new(install.path(), Duration::from_secs(5)).unwrap();
        let err = transfer.apply(&file_url(&archive)).unwrap_err();

        assert!(err.blocks_relaunch());
        assert!(leftovers(install.path()).is_empty());
    }

    #[test]
    fn test_empty_url_is_rejected() {
        let install = tempdir().unwrap();
        let transfer = ZipTransfer::new(install.path(), Duration::from_secs(5)).unwrap();
        assert!(matches!(transfer.apply("  "), Err(UpdateError::Network(_))));
    }
}
