//! Artifact transfer: download, extract, apply.
//!
//! - [`download`]: stream the archive into a temp file in the install directory
//! - [`extract`]: unpack into a staging directory, then move over the install
//! - [`apply`]: the two composed behind [`ArtifactTransfer`]

pub mod apply;
pub mod download;
pub mod extract;

pub use apply::ZipTransfer;
pub use download::{download_to, format_bytes};
pub use extract::{ExtractSummary, extract_archive};

use crate::error::Result;

/// User agent sent with every request.
pub const USER_AGENT_VALUE: &str = concat!("updraft/", env!("CARGO_PKG_VERSION"));

/// Retrieves one archive and materializes it into the install directory.
pub trait ArtifactTransfer {
    /// Download the archive at `url` and extract it over the install directory.
    fn apply(&self, url: &str) -> Result<()>;
}

impl<T: ArtifactTransfer + ?Sized> ArtifactTransfer for &T {
    fn apply(&self, url: &str) -> Result<()> {
        (**self).apply(url)
    }
}

impl<T: ArtifactTransfer + ?Sized> ArtifactTransfer for Box<T> {
    fn apply(&self, url: &str) -> Result<()> {
        (**self).apply(url)
    }
}

/// Observer for download progress. Never affects the outcome of a transfer.
pub trait ProgressSink: Send + Sync {
    /// A transfer began; `total` is the size if known.
    fn start(&self, total: Option<u64>);

    /// `bytes` more were received.
    fn advance(&self, bytes: u64);

    /// The transfer ended.
    fn finish(&self);
}

/// Discards progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn start(&self, _total: Option<u64>) {}

    fn advance(&self, _bytes: u64) {}

    fn finish(&self) {}
}
