//! Self-update core for deployed applications.
//!
//! A remote store holds, per variant, a version marker and the archive it
//! points at. The updater compares the marker with the one it last applied,
//! downloads and unpacks newer archives over the install directory, records
//! the result, then relaunches the application. The publisher packages build
//! outputs and pushes the archive and a new marker.
//!
//! # Architecture
//!
//! - [`UpdateResolver`] compares local and remote markers and drives the rest
//! - [`MetadataStore`] / [`ArtifactStore`]: remote side ([`GcsStore`], [`DirectoryStore`])
//! - [`StateStore`]: last-applied marker on disk ([`LocalStateStore`])
//! - [`ArtifactTransfer`]: download and staged extraction ([`ZipTransfer`])
//! - [`Launcher`]: detached relaunch ([`DetachedLauncher`])
//! - [`Publisher`]: build steps, archive, upload
//!
//! # Example
//!
//! ```no_run
//! use updraft::{GcsStore, LocalStateStore, UpdateResolver, UpdaterConfig, ZipTransfer};
//!
//! fn update() -> updraft::Result<()> {
//!     let config = UpdaterConfig::new("beta", "releases", "bin/app");
//!     config.validate()?;
//!
//!     let resolver = UpdateResolver::new(
//!         &config.variant,
//!         GcsStore::from_config(&config)?,
//!         LocalStateStore::from_config(&config),
//!         ZipTransfer::from_config(&config)?,
//!     );
//!     let resolution = resolver.resolve()?;
//!     println!("now at {}", resolution.marker().version);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod launch;
pub mod marker;
pub mod publish;
pub mod remote;
pub mod resolver;
pub mod state;
pub mod steps;
pub mod version;

#[cfg(test)]
mod test_support;

pub use config::{PublisherConfig, UpdaterConfig};
pub use error::{ErrorCategory, Result, UpdateError};
pub use launch::{DetachedLauncher, Launcher};
pub use marker::VersionMarker;
pub use publish::{BuildStep, CommandStep, CopyStep, Publisher, UpdaterConfigStep};
pub use remote::{ArtifactStore, DirectoryStore, GcsStore, MetadataStore, RemoteStore};
pub use resolver::{Phase, Resolution, UpdateResolver};
pub use state::{LocalStateStore, StateStore, UpdateLock};
pub use steps::{ArtifactTransfer, NoopProgress, ProgressSink, ZipTransfer};
pub use version::{is_newer, parse_version};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
