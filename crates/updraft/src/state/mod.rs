//! Local persistence of the last-applied version.

mod lock;
mod store;

pub use lock::{STALE_LOCK_AGE, UpdateLock};
pub use store::{CURRENT_SCHEMA_VERSION, LocalStateStore, MAGIC_BYTES, StateRecord};

use crate::error::Result;
use crate::marker::VersionMarker;

/// Where the resolver records what it last applied.
pub trait StateStore {
    /// Last-applied marker; `None` if never saved or unreadable.
    fn load(&self) -> Option<VersionMarker>;

    /// Record `marker` as applied.
    fn save(&self, marker: &VersionMarker) -> Result<()>;

    /// Forget the recorded marker so the next cycle starts from scratch.
    fn discard(&self) -> Result<()>;
}

impl<T: StateStore + ?Sized> StateStore for &T {
    fn load(&self) -> Option<VersionMarker> {
        (**self).load()
    }

    fn save(&self, marker: &VersionMarker) -> Result<()> {
        (**self).save(marker)
    }

    fn discard(&self) -> Result<()> {
        (**self).discard()
    }
}
