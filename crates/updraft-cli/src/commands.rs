//! Subcommand implementations.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tracing::info;
use updraft::config::DEFAULT_CONFIG_FILE;
use updraft::remote::RemoteStore;
use updraft::{
    CommandStep, CopyStep, DetachedLauncher, DirectoryStore, GcsStore, Launcher, LocalStateStore,
    Publisher, PublisherConfig, Resolution, UpdateLock, UpdateResolver, UpdaterConfig,
    UpdaterConfigStep, ZipTransfer,
};

use crate::cli::{PublishArgs, RunArgs, StatusArgs, TargetArgs};
use updraft_cli::progress::TerminalProgress;

/// Values baked into the binary at build time.
const BAKED_VARIANT: Option<&str> = option_env!("UPDRAFT_VARIANT");
const BAKED_STORAGE: Option<&str> = option_env!("UPDRAFT_STORAGE");
const BAKED_APP_ENTRY_POINT: Option<&str> = option_env!("UPDRAFT_APP_ENTRY_POINT");

/// Build the updater config: baked defaults, then config file, then flags.
pub fn updater_config(target: &TargetArgs) -> Result<UpdaterConfig> {
    let shipped = match &target.config {
        Some(_) => None,
        None => std::env::current_exe()
            .ok()
            .map(|exe| config_beside(&exe))
            .transpose()?
            .flatten(),
    };
    let mut config = match (&target.config, shipped) {
        (Some(path), _) => UpdaterConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        (None, Some(config)) => config,
        (None, None) => UpdaterConfig::new(
            BAKED_VARIANT.unwrap_or_default(),
            BAKED_STORAGE.unwrap_or_default(),
            BAKED_APP_ENTRY_POINT.unwrap_or_default(),
        ),
    };

    if let Some(variant) = &target.variant {
        config.variant.clone_from(variant);
    }
    if let Some(storage) = &target.storage {
        config.storage.clone_from(storage);
    }
    if let Some(entry) = &target.app_entry_point {
        config.app_entry_point.clone_from(entry);
    }
    if let Some(dir) = &target.install_dir {
        config.install_dir.clone_from(dir);
    }
    if let Some(url) = &target.base_url {
        config.base_url.clone_from(url);
    }

    config.validate()?;
    Ok(config)
}

/// Config shipped next to the updater executable, with a relative install
/// directory taken relative to the executable.
fn config_beside(exe: &Path) -> Result<Option<UpdaterConfig>> {
    let Some(dir) = exe.parent() else {
        return Ok(None);
    };
    let path = dir.join(DEFAULT_CONFIG_FILE);
    if !path.is_file() {
        return Ok(None);
    }
    let mut config = UpdaterConfig::from_file(&path)
        .with_context(|| format!("loading config {}", path.display()))?;
    if config.install_dir.is_relative() {
        config.install_dir = dir.join(&config.install_dir);
    }
    info!("Using config {}", path.display());
    Ok(Some(config))
}

fn remote_store(
    config: &UpdaterConfig,
    mirror: Option<&Path>,
    access_token: Option<String>,
) -> Result<Box<dyn RemoteStore>> {
    Ok(match mirror {
        Some(dir) => Box::new(DirectoryStore::new(dir)),
        None => Box::new(GcsStore::from_config(config)?.with_access_token(access_token)),
    })
}

fn resolve(config: &UpdaterConfig, mirror: Option<&Path>) -> Result<Resolution> {
    let remote = remote_store(config, mirror, None)?;
    let transfer = ZipTransfer::from_config(config)?
        .with_progress(Arc::new(TerminalProgress::new("downloading")));
    let resolver = UpdateResolver::new(
        &config.variant,
        remote,
        LocalStateStore::from_config(config),
        transfer,
    );

    let lock = UpdateLock::acquire_with(
        UpdateLock::path_for(&config.state_path()),
        config.stale_lock_age(),
    )?;
    let resolution = resolver.resolve();
    drop(lock);

    let resolution = resolution?;
    print_resolution(&config.variant, &resolution);
    Ok(resolution)
}

fn print_resolution(variant: &str, resolution: &Resolution) {
    match resolution {
        Resolution::Bootstrapped { marker } => {
            println!("{variant}: installed {}", marker.version);
        }
        Resolution::Updated { from, to } => {
            println!("{variant}: updated {} -> {}", from.version, to.version);
        }
        Resolution::UpToDate { marker } => {
            println!("{variant}: up to date at {}", marker.version);
        }
    }
}

/// `updraft run`
pub fn run(target: &TargetArgs, args: &RunArgs) -> Result<()> {
    let config = updater_config(target)?;
    resolve(&config, target.mirror.as_deref())?;

    if args.no_launch {
        return Ok(());
    }
    if config.app_entry_point.as_os_str().is_empty() {
        bail!("no application entry point configured");
    }
    DetachedLauncher::new()
        .in_dir(&config.install_dir)
        .launch(&config.resolved_entry_point())?;
    Ok(())
}

/// `updraft check`
pub fn check(target: &TargetArgs) -> Result<()> {
    let config = updater_config(target)?;
    resolve(&config, target.mirror.as_deref())?;
    Ok(())
}

/// `updraft status`
pub fn status(target: &TargetArgs, args: &StatusArgs) -> Result<()> {
    let config = updater_config(target)?;
    let store = LocalStateStore::from_config(&config);

    match store.load_record()? {
        Some(record) => {
            let applied = record
                .applied_at()
                .map_or_else(|| "unknown".to_string(), |at| at.to_rfc3339());
            println!("variant:  {}", config.variant);
            println!("version:  {}", record.version);
            println!("artifact: {}", record.artifact_url);
            println!("applied:  {applied}");
        }
        None => println!("{}: nothing applied yet", config.variant),
    }

    if args.reset && store.clear()? {
        println!("local state cleared");
    }
    Ok(())
}

/// `updraft publish`
pub fn publish(target: &TargetArgs, args: &PublishArgs) -> Result<()> {
    let updater = updater_config(target)?;
    let config = PublisherConfig {
        version: args.release_version.clone(),
        storage: updater.storage.clone(),
        variant: updater.variant.clone(),
        output_dir: args.output_dir.clone(),
        app_entry_point: updater.app_entry_point.clone(),
        access_token: args.access_token.clone(),
    };

    let store = remote_store(&updater, target.mirror.as_deref(), config.access_token.clone())?;
    let mut publisher = Publisher::new(config.clone(), store);

    if !args.no_updater {
        let exe = std::env::current_exe().context("locating the updater executable")?;
        let dest = format!("updater_{}{}", config.variant, std::env::consts::EXE_SUFFIX);
        publisher.add_step(Box::new(CopyStep::new(exe, dest)));
        let shipped = updater.clone().with_install_dir(".");
        publisher.add_step(Box::new(UpdaterConfigStep::new(shipped, DEFAULT_CONFIG_FILE)));
    }
    for spec in &args.files {
        let (source, dest) = parse_file_spec(spec)?;
        publisher.add_step(Box::new(CopyStep::new(source, dest)));
    }
    for spec in &args.execs {
        let step = parse_exec_spec(spec)?
            .env("UPDRAFT_VERSION", &config.version)
            .env("UPDRAFT_VARIANT", &config.variant)
            .env("UPDRAFT_STORAGE", &config.storage)
            .env("UPDRAFT_APP_ENTRY_POINT", &config.app_entry_point);
        publisher.add_step(Box::new(step));
    }

    let marker = publisher.run()?;
    info!("Marker now points at {}", marker.artifact_url);
    println!("{}: published {} ({})", config.variant, marker.version, marker.artifact_url);
    Ok(())
}

/// `SRC` or `SRC:DEST`. Without DEST the file lands in `bin/`.
fn parse_file_spec(spec: &str) -> Result<(PathBuf, PathBuf)> {
    let split = spec
        .rsplit_once(':')
        .filter(|(source, dest)| {
            source.len() > 1 && !dest.is_empty() && !dest.starts_with(['\\', '/'])
        });

    let (source, dest) = match split {
        Some((source, dest)) => (PathBuf::from(source), PathBuf::from(dest)),
        None => {
            let source = PathBuf::from(spec);
            let name = source
                .file_name()
                .with_context(|| format!("--file {spec} has no file name"))?;
            let dest = Path::new("bin").join(name);
            (source, dest)
        }
    };
    Ok((source, dest))
}

/// `DEST=PROGRAM ARG...`, split on whitespace.
fn parse_exec_spec(spec: &str) -> Result<CommandStep> {
    let Some((dest, command)) = spec.split_once('=') else {
        bail!("--exec expects DEST=COMMAND, got '{spec}'");
    };
    let mut words = command.split_whitespace();
    let Some(program) = words.next() else {
        bail!("--exec {dest}= has no command");
    };
    if dest.trim().is_empty() {
        bail!("--exec expects DEST=COMMAND, got '{spec}'");
    }
    Ok(CommandStep::new(program, dest.trim()).args(words))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_file_spec() {
        let (source, dest) = parse_file_spec("target/release/app:bin/app").unwrap();
        assert_eq!(source, PathBuf::from("target/release/app"));
        assert_eq!(dest, PathBuf::from("bin/app"));

        let (source, dest) = parse_file_spec("target/release/app").unwrap();
        assert_eq!(source, PathBuf::from("target/release/app"));
        assert_eq!(dest, PathBuf::from("bin/app"));

        let (source, dest) = parse_file_spec(r"C:\build\app.exe").unwrap();
        assert_eq!(source, PathBuf::from(r"C:\build\app.exe"));
        assert!(dest.starts_with("bin"));
    }

    #[test]
    fn test_parse_exec_spec() {
        let step = parse_exec_spec("bin/app=cargo build --release").unwrap();
        assert!(format!("{step:?}").contains("cargo"));

        assert!(parse_exec_spec("cargo build").is_err());
        assert!(parse_exec_spec("bin/app=").is_err());
        assert!(parse_exec_spec("=cargo build").is_err());
    }

    #[test]
    fn test_flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("updraft.json");
        std::fs::write(
            &path,
            r#"{"variant":"stable","storage":"bucket","app_entry_point":"bin/app"}"#,
        )
        .unwrap();

        let target = TargetArgs {
            config: Some(path),
            variant: Some("beta".to_string()),
            install_dir: Some(dir.path().to_path_buf()),
            ..TargetArgs::default()
        };
        let config = updater_config(&target).unwrap();

        assert_eq!(config.variant, "beta");
        assert_eq!(config.storage, "bucket");
        assert_eq!(config.state_path(), dir.path().join(".meta"));
    }

    #[test]
    fn test_config_beside_executable() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("updater_beta");
        assert!(config_beside(&exe).unwrap().is_none());

        std::fs::write(
            dir.path().join(DEFAULT_CONFIG_FILE),
            r#"{"variant":"beta","storage":"bucket","app_entry_point":"bin/app","install_dir":"."}"#,
        )
        .unwrap();
        let config = config_beside(&exe).unwrap().unwrap();

        assert_eq!(config.variant, "beta");
        assert_eq!(config.install_dir, dir.path().join("."));
        assert_eq!(config.state_path(), dir.path().join("./.meta"));
    }

    #[test]
    fn test_missing_identifiers_are_rejected() {
        let target = TargetArgs {
            variant: Some(String::new()),
            storage: Some("bucket".to_string()),
            ..TargetArgs::default()
        };
        assert!(updater_config(&target).is_err());
    }
}
