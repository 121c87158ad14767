//! Detached relaunch of the managed application.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::{Result, UpdateError};

/// Starts the application once resolution is over.
pub trait Launcher {
    /// Start `entry_point` and return without waiting for it.
    fn launch(&self, entry_point: &Path) -> Result<()>;
}

/// Fire-and-forget launcher: null stdio, no supervision.
#[derive(Debug, Clone, Default)]
pub struct DetachedLauncher {
    working_dir: Option<PathBuf>,
}

impl DetachedLauncher {
    /// Launcher that inherits the current working directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the application from `dir`.
    #[must_use]
    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

impl Launcher for DetachedLauncher {
    fn launch(&self, entry_point: &Path) -> Result<()> {
        if !entry_point.is_file() {
            return Err(UpdateError::Launch {
                path: entry_point.to_path_buf(),
                reason: "entry point does not exist".to_string(),
            });
        }

        // Relative paths would otherwise resolve after the child changes directory.
        let program = absolute(entry_point)?;
        let mut command = platform_command(&program);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        if let Some(dir) = &self.working_dir {
            command.current_dir(absolute(dir)?);
        }

        let child = command.spawn().map_err(|e| UpdateError::Launch {
            path: entry_point.to_path_buf(),
            reason: e.to_string(),
        })?;

        tracing::info!("Launched {} (pid {})", entry_point.display(), child.id());
        Ok(())
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).map_err(|e| UpdateError::Launch {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// `start` detaches the program from the updater's console.
#[cfg(windows)]
fn platform_command(entry_point: &Path) -> Command {
    let mut command = Command::new("cmd");
    command.args(["/C", "start", ""]).arg(entry_point);
    command
}

#[cfg(unix)]
fn platform_command(entry_point: &Path) -> Command {
    use std::os::unix::process::CommandExt;
    let mut command = Command::new(entry_point);
    command.process_group(0);
    command
}

#[cfg(not(any(unix, windows)))]
fn platform_command(entry_point: &Path) -> Command {
    Command::new(entry_point)
}
