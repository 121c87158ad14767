//! CLI argument definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use colorchoice_clap::Color;

#[derive(Parser)]
#[command(
    name = "updraft",
    version,
    about = "Keep a deployed application on the latest published build",
    long_about = "Compare the locally applied version with the one published for a variant,\n\
                  install newer archives over the install directory and relaunch the application.\n\
                  The publish subcommand packages build outputs and announces a new version."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[command(flatten)]
    pub target: TargetArgs,

    /// Adjust log verbosity (-v for info, -vv for debug, -q for errors only).
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// Control ANSI color output (auto, always, never).
    #[command(flatten)]
    pub color: Color,

    /// Explicit log level (overrides -v/-q flags).
    #[arg(long = "log-level", value_enum, global = true)]
    pub log_level: Option<LogLevelArg>,

    /// Log output format (pretty for human, json for machine parsing).
    #[arg(
        long = "log-format",
        value_enum,
        default_value = "pretty",
        global = true
    )]
    pub log_format: LogFormatArg,

    /// Write logs to a file instead of stderr.
    #[arg(long = "log-file", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,
}

/// Which application and where it lives. Flags override the config file,
/// which overrides values baked in at build time.
#[derive(Args, Debug, Clone, Default)]
pub struct TargetArgs {
    /// JSON config file.
    #[arg(long, env = "UPDRAFT_CONFIG", value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Variant (channel / application name).
    #[arg(long, env = "UPDRAFT_VARIANT", global = true)]
    pub variant: Option<String>,

    /// Storage bucket.
    #[arg(long, env = "UPDRAFT_STORAGE", global = true)]
    pub storage: Option<String>,

    /// Application to launch after resolution.
    #[arg(long, env = "UPDRAFT_APP_ENTRY_POINT", value_name = "PATH", global = true)]
    pub app_entry_point: Option<PathBuf>,

    /// Directory the application is installed in.
    #[arg(long, env = "UPDRAFT_INSTALL_DIR", value_name = "DIR", global = true)]
    pub install_dir: Option<PathBuf>,

    /// Object-storage base URL.
    #[arg(long, env = "UPDRAFT_BASE_URL", value_name = "URL", global = true)]
    pub base_url: Option<String>,

    /// Use a directory mirror instead of object storage.
    #[arg(long, env = "UPDRAFT_MIRROR", value_name = "DIR", global = true)]
    pub mirror: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Update if a newer version is published, then launch the application.
    Run(RunArgs),

    /// Update if a newer version is published, without launching.
    Check,

    /// Show the locally applied version.
    Status(StatusArgs),

    /// Build, archive and publish a new version.
    Publish(PublishArgs),
}

#[derive(Args)]
pub struct RunArgs {
    /// Skip launching the application after resolution.
    #[arg(long = "no-launch")]
    pub no_launch: bool,
}

#[derive(Args)]
pub struct StatusArgs {
    /// Forget the applied version so the next run reinstalls.
    #[arg(long)]
    pub reset: bool,
}

#[derive(Args)]
pub struct PublishArgs {
    /// Version being released.
    #[arg(long = "version", value_name = "VERSION")]
    pub release_version: String,

    /// Scratch directory for build outputs (recreated on every publish).
    #[arg(long = "output-dir", value_name = "DIR", default_value = "dist")]
    pub output_dir: PathBuf,

    /// Prebuilt file to include, as SRC or SRC:DEST (DEST relative to the archive root).
    #[arg(long = "file", value_name = "SRC[:DEST]")]
    pub files: Vec<String>,

    /// Command producing DEST, as DEST=PROGRAM ARGS... (sees UPDRAFT_OUTPUT_DIR).
    #[arg(long = "exec", value_name = "DEST=COMMAND")]
    pub execs: Vec<String>,

    /// Do not ship this updater and its config in the archive.
    #[arg(long = "no-updater")]
    pub no_updater: bool,

    /// Bearer token for storage writes.
    #[arg(long, env = "UPDRAFT_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,
}

/// CLI log level choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// CLI log format choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}
