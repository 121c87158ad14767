//! Release publishing: build, archive, upload, announce.

mod archive;

use std::ffi::OsString;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{info, warn};

pub use archive::{ArchiveBuilder, ArchiveSummary, entry_name};

use crate::config::{PublisherConfig, UpdaterConfig};
use crate::error::{Result, UpdateError};
use crate::marker::VersionMarker;
use crate::remote::{ArtifactStore, MetadataStore};
use crate::version::{is_newer, parse_version};

/// Produces one file inside the output directory.
pub trait BuildStep {
    /// Short label for logs.
    fn describe(&self) -> String;

    /// Run the step; returns the produced file, which must lie in `output_dir`.
    fn build(&self, output_dir: &Path) -> Result<PathBuf>;
}

/// Runs an external program that writes `output` (relative to the output directory).
///
/// The program sees `UPDRAFT_OUTPUT_DIR` in its environment.
#[derive(Debug, Clone)]
pub struct CommandStep {
    program: OsString,
    args: Vec<OsString>,
    envs: Vec<(OsString, OsString)>,
    output: PathBuf,
}

impl CommandStep {
    /// Step running `program` and collecting `output`.
    pub fn new(program: impl Into<OsString>, output: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            output: output.into(),
        }
    }

    /// Append arguments.
    #[must_use]
    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable for the program.
    #[must_use]
    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }
}

impl BuildStep for CommandStep {
    fn describe(&self) -> String {
        format!("exec {}", self.program.to_string_lossy())
    }

    fn build(&self, output_dir: &Path) -> Result<PathBuf> {
        let produced = output_dir.join(&self.output);
        if let Some(parent) = produced.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| UpdateError::io("create directory", parent, e))?;
        }

        let output = Command::new(&self.program)
            .args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k, v)))
            .env("UPDRAFT_OUTPUT_DIR", output_dir)
            .output()
            .map_err(|e| {
                UpdateError::Publish(format!(
                    "failed to start {}: {e}",
                    self.program.to_string_lossy()
                ))
            })?;

        if !output.status.success() {
            return Err(UpdateError::Publish(format!(
                "{} exited with {}: {}",
                self.program.to_string_lossy(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        if !produced.is_file() {
            return Err(UpdateError::Publish(format!(
                "{} did not produce {}",
                self.program.to_string_lossy(),
                produced.display()
            )));
        }
        Ok(produced)
    }
}

/// Copies a prebuilt file to `dest` (relative to the output directory).
#[derive(Debug, Clone)]
pub struct CopyStep {
    source: PathBuf,
    dest: PathBuf,
}

impl CopyStep {
    /// Copy `source` into the output tree at `dest`.
    pub fn new(source: impl Into<PathBuf>, dest: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            dest: dest.into(),
        }
    }
}

impl BuildStep for CopyStep {
    fn describe(&self) -> String {
        format!("copy {} -> {}", self.source.display(), self.dest.display())
    }

    fn build(&self, output_dir: &Path) -> Result<PathBuf> {
        let target = output_dir.join(&self.dest);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| UpdateError::io("create directory", parent, e))?;
        }
        fs::copy(&self.source, &target).map_err(|e| UpdateError::io("copy", &self.source, e))?;
        Ok(target)
    }
}

/// Writes the updater's config as JSON at `dest` so a shipped updater can
/// find its variant and storage without flags.
#[derive(Debug, Clone)]
pub struct UpdaterConfigStep {
    config: UpdaterConfig,
    dest: PathBuf,
}

impl UpdaterConfigStep {
    /// Step writing `config` to `dest` (relative to the output directory).
    pub fn new(config: UpdaterConfig, dest: impl Into<PathBuf>) -> Self {
        Self {
            config,
            dest: dest.into(),
        }
    }
}

impl BuildStep for UpdaterConfigStep {
    fn describe(&self) -> String {
        format!("write updater config {}", self.dest.display())
    }

    fn build(&self, output_dir: &Path) -> Result<PathBuf> {
        self.config.validate()?;
        let target = output_dir.join(&self.dest);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| UpdateError::io("create directory", parent, e))?;
        }
        let json = serde_json::to_vec_pretty(&self.config)?;
        fs::write(&target, json).map_err(|e| UpdateError::io("write", &target, e))?;
        Ok(target)
    }
}

/// Builds, archives and publishes one release.
pub struct Publisher<S> {
    config: PublisherConfig,
    store: S,
    steps: Vec<Box<dyn BuildStep>>,
}

impl<S> Publisher<S>
where
    S: MetadataStore + ArtifactStore,
{
    /// Publisher writing to `store`.
    pub fn new(config: PublisherConfig, store: S) -> Self {
        Self {
            config,
            store,
            steps: Vec::new(),
        }
    }

    /// Add a build step.
    #[must_use]
    pub fn with_step(mut self, step: impl BuildStep + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    /// Add a boxed build step.
    pub fn add_step(&mut self, step: Box<dyn BuildStep>) {
        self.steps.push(step);
    }

    /// Build, archive, upload, then publish the new marker.
    pub fn run(&self) -> Result<VersionMarker> {
        self.config.validate()?;
        if self.steps.is_empty() {
            return Err(UpdateError::Publish("no build steps configured".to_string()));
        }
        let config = &self.config;
        let version = parse_version(&config.version)?;

        let current = self.store.get(&config.variant)?;
        match current.parsed_version() {
            Ok(published) if !is_newer(&version, &published) && current.has_artifact() => {
                warn!(
                    "Publishing {} over {} which is not older; installed updaters will not pick it up",
                    config.version, current.version
                );
            }
            Ok(_) => {}
            Err(err) => warn!("Current marker for '{}' is unreadable: {err}", config.variant),
        }

        prepare_output_dir(&config.output_dir)?;

        let mut archive = ArchiveBuilder::create(config.archive_path(), &config.output_dir)?;
        for step in &self.steps {
            info!("Running build step: {}", step.describe());
            let produced = step.build(&config.output_dir)?;
            archive.append(&produced)?;
        }
        let summary = archive.finish()?;

        let url = self
            .store
            .upload_archive(&config.variant, &config.version, &summary.path)?;
        let marker = VersionMarker::new(config.version.clone(), url);
        self.store.put(&config.variant, &marker)?;

        info!(
            "Published '{}' {} ({})",
            config.variant, marker.version, marker.artifact_url
        );
        Ok(marker)
    }
}

fn prepare_output_dir(output_dir: &Path) -> Result<()> {
    if output_dir.file_name().is_none() {
        return Err(UpdateError::Config(format!(
            "refusing to recreate output directory {}",
            output_dir.display()
        )));
    }

    info!("Recreating {}", output_dir.display());
    match fs::remove_dir_all(output_dir) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(UpdateError::io("remove", output_dir, e)),
    }
    let bin = output_dir.join("bin");
    fs::create_dir_all(&bin).map_err(|e| UpdateError::io("create directory", &bin, e))
}
