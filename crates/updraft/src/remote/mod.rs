//! Remote metadata and artifact storage.
//!
//! Objects are laid out per variant:
//! - `{variant}/meta.json` holds the current [`VersionMarker`]
//! - `{variant}/app_v{version}.zip` holds a published archive

mod directory;
mod gcs;

use std::path::Path;

pub use directory::DirectoryStore;
pub use gcs::GcsStore;

use crate::error::Result;
use crate::marker::VersionMarker;

/// Read/write access to a variant's current marker.
pub trait MetadataStore {
    /// Current marker for `variant`.
    ///
    /// A variant with no marker yet is bootstrapped with
    /// [`VersionMarker::initial`] instead of failing.
    fn get(&self, variant: &str) -> Result<VersionMarker>;

    /// Replace the marker for `variant`. The stored object is publicly readable.
    fn put(&self, variant: &str, marker: &VersionMarker) -> Result<()>;
}

/// Publisher-side archive upload.
pub trait ArtifactStore {
    /// Upload `archive` as the artifact for `version`, returning its public URL.
    fn upload_archive(&self, variant: &str, version: &str, archive: &Path) -> Result<String>;
}

impl<T: MetadataStore + ?Sized> MetadataStore for &T {
    fn get(&self, variant: &str) -> Result<VersionMarker> {
        (**self).get(variant)
    }

    fn put(&self, variant: &str, marker: &VersionMarker) -> Result<()> {
        (**self).put(variant, marker)
    }
}

impl<T: MetadataStore + ?Sized> MetadataStore for Box<T> {
    fn get(&self, variant: &str) -> Result<VersionMarker> {
        (**self).get(variant)
    }

    fn put(&self, variant: &str, marker: &VersionMarker) -> Result<()> {
        (**self).put(variant, marker)
    }
}

impl<T: ArtifactStore + ?Sized> ArtifactStore for &T {
    fn upload_archive(&self, variant: &str, version: &str, archive: &Path) -> Result<String> {
        (**self).upload_archive(variant, version, archive)
    }
}

impl<T: ArtifactStore + ?Sized> ArtifactStore for Box<T> {
    fn upload_archive(&self, variant: &str, version: &str, archive: &Path) -> Result<String> {
        (**self).upload_archive(variant, version, archive)
    }
}

/// Both halves of a storage backend, for callers that pick one at runtime.
pub trait RemoteStore: MetadataStore + ArtifactStore {}

impl<T: MetadataStore + ArtifactStore + ?Sized> RemoteStore for T {}
