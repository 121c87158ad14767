//! Update resolution: compare local and remote markers, apply if newer.
//!
//! One cycle moves through
//! `Start -> FetchedRemote -> {NoLocal | HasLocal} -> {UpToDate | UpdateRequired}
//! -> [Applying -> Applied] -> Done`. Cycles are independent; running twice
//! against an unchanged remote is a no-op the second time.

use std::fmt;

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::marker::VersionMarker;
use crate::remote::MetadataStore;
use crate::state::StateStore;
use crate::steps::ArtifactTransfer;
use crate::version::is_newer;

/// Stage of a resolution cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Cycle began.
    Start,
    /// Remote marker read.
    FetchedRemote,
    /// No usable local state.
    NoLocal,
    /// Local state read.
    HasLocal,
    /// Remote is not newer.
    UpToDate,
    /// Remote is newer, or there is no local state.
    UpdateRequired,
    /// Transfer running.
    Applying,
    /// Transfer finished.
    Applied,
    /// Cycle finished.
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Start => "start",
            Self::FetchedRemote => "fetched-remote",
            Self::NoLocal => "no-local",
            Self::HasLocal => "has-local",
            Self::UpToDate => "up-to-date",
            Self::UpdateRequired => "update-required",
            Self::Applying => "applying",
            Self::Applied => "applied",
            Self::Done => "done",
        };
        f.write_str(label)
    }
}

/// Outcome of a successful cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// No local state existed; the remote version was applied.
    Bootstrapped {
        /// Applied marker.
        marker: VersionMarker,
    },
    /// A newer remote version was applied.
    Updated {
        /// Previously recorded marker.
        from: VersionMarker,
        /// Applied marker.
        to: VersionMarker,
    },
    /// Nothing to apply.
    UpToDate {
        /// Recorded marker after the cycle.
        marker: VersionMarker,
    },
}

impl Resolution {
    /// Marker recorded locally after the cycle.
    #[must_use]
    pub fn marker(&self) -> &VersionMarker {
        match self {
            Self::Bootstrapped { marker } | Self::UpToDate { marker } => marker,
            Self::Updated { to, .. } => to,
        }
    }

    /// Whether an artifact was transferred.
    #[must_use]
    pub fn applied(&self) -> bool {
        !matches!(self, Self::UpToDate { .. })
    }
}

/// Drives one resolution cycle over its collaborators.
#[derive(Debug)]
pub struct UpdateResolver<M, S, T> {
    variant: String,
    remote: M,
    local: S,
    transfer: T,
}

impl<M, S, T> UpdateResolver<M, S, T>
where
    M: MetadataStore,
    S: StateStore,
    T: ArtifactTransfer,
{
    /// Resolver for `variant`.
    pub fn new(variant: impl Into<String>, remote: M, local: S, transfer: T) -> Self {
        Self {
            variant: variant.into(),
            remote,
            local,
            transfer,
        }
    }

    /// Variant being resolved.
    #[must_use]
    pub fn variant(&self) -> &str {
        &self.variant
    }

    /// Run one cycle.
    ///
    /// Remote transport and decode failures, unparseable versions and
    /// transfer failures are returned as errors; the caller must not relaunch
    /// the application after a transfer failure.
    pub fn resolve(&self) -> Result<Resolution> {
        self.enter(Phase::Start);
        let remote = self.remote.get(&self.variant)?;
        let remote_version = remote.parsed_version()?;
        self.enter(Phase::FetchedRemote);
        info!("Remote '{}' is at {}", self.variant, remote.version);

        let Some(local) = self.local.load() else {
            self.enter(Phase::NoLocal);
            return self.bootstrap(remote);
        };
        self.enter(Phase::HasLocal);
        let local_version = local.parsed_version()?;

        if !is_newer(&remote_version, &local_version) {
            self.enter(Phase::UpToDate);
            if local != remote {
                self.local.save(&remote)?;
            }
            info!("Already up to date at {}", local.version);
            self.enter(Phase::Done);
            return Ok(Resolution::UpToDate { marker: remote });
        }

        self.enter(Phase::UpdateRequired);
        info!("Updating {} -> {}", local.version, remote.version);
        self.apply(&remote)?;
        self.local.save(&remote)?;
        self.enter(Phase::Done);

        Ok(Resolution::Updated {
            from: local,
            to: remote,
        })
    }

    fn bootstrap(&self, remote: VersionMarker) -> Result<Resolution> {
        info!("No local state, installing {}", remote.version);
        self.local.save(&remote)?;
        self.enter(Phase::UpdateRequired);

        if let Err(err) = self.apply(&remote) {
            if let Err(discard_err) = self.local.discard() {
                warn!("Could not roll back local state: {discard_err}");
            }
            return Err(err);
        }

        self.enter(Phase::Done);
        Ok(Resolution::Bootstrapped { marker: remote })
    }

    fn apply(&self, remote: &VersionMarker) -> Result<()> {
        self.enter(Phase::Applying);
        self.transfer.apply(&remote.artifact_url)?;
        self.enter(Phase::Applied);
        Ok(())
    }

    fn enter(&self, phase: Phase) {
        debug!(variant = %self.variant, %phase, "resolution phase");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UpdateError;
    use proptest::prelude::*;
    use std::cell::{Cell, RefCell};

    struct FakeRemote {
        marker: Option<VersionMarker>,
    }

    impl FakeRemote {
        fn at(version: &str) -> Self {
            Self {
                marker: Some(VersionMarker::new(
                    version,
                    format!("https://cdn.test/beta/app_v{version}.zip"),
                )),
            }
        }

        fn unreachable() -> Self {
            Self { marker: None }
        }
    }

    impl MetadataStore for FakeRemote {
        fn get(&self, _variant: &str) -> Result<VersionMarker> {
            self.marker
                .clone()
                .ok_or_else(|| UpdateError::Network("connection refused".to_string()))
        }

        fn put(&self, _variant: &str, _marker: &VersionMarker) -> Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct MemoryState {
        marker: RefCell<Option<VersionMarker>>,
        saves: Cell<usize>,
    }

    impl MemoryState {
        fn with(version: &str) -> Self {
            let state = Self::default();
            *state.marker.borrow_mut() = Some(VersionMarker::new(
                version,
                format!("https://cdn.test/beta/app_v{version}.zip"),
            ));
            state
        }

        fn current(&self) -> Option<VersionMarker> {
            self.marker.borrow().clone()
        }
    }

    impl StateStore for MemoryState {
        fn load(&self) -> Option<VersionMarker> {
            self.current()
        }

        fn save(&self, marker: &VersionMarker) -> Result<()> {
            self.saves.set(self.saves.get() + 1);
            *self.marker.borrow_mut() = Some(marker.clone());
            Ok(())
        }

        fn discard(&self) -> Result<()> {
            *self.marker.borrow_mut() = None;
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingTransfer {
        calls: RefCell<Vec<String>>,
        fail: bool,
    }

    impl RecordingTransfer {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        fn count(&self) -> usize {
            self.calls.borrow().len()
        }
    }

    impl ArtifactTransfer for RecordingTransfer {
        fn apply(&self, url: &str) -> Result<()> {
            self.calls.borrow_mut().push(url.to_string());
            if self.fail {
                return Err(UpdateError::ArchiveExtraction("truncated".to_string()));
            }
            Ok(())
        }
    }

    #[test]
    fn test_bootstrap_applies_remote_and_records_it() {
        let remote = FakeRemote::at("2.0.0");
        let state = MemoryState::default();
        let transfer = RecordingTransfer::default();

        let resolution = UpdateResolver::new("beta", &remote, &state, &transfer)
            .resolve()
            .unwrap();

        let expected = remote.marker.clone().unwrap();
        assert_eq!(
            resolution,
            Resolution::Bootstrapped {
                marker: expected.clone()
            }
        );
        assert_eq!(*transfer.calls.borrow(), vec![expected.artifact_url.clone()]);
        assert_eq!(state.current(), Some(expected));
    }

    #[test]
    fn test_bootstrap_applies_even_older_remote() {
        let remote = FakeRemote::at("0.1.0");
        let state = MemoryState::default();
        let transfer = RecordingTransfer::default();

        UpdateResolver::new("beta", &remote, &state, &transfer)
            .resolve()
            .unwrap();
        assert_eq!(transfer.count(), 1);
    }

    #[test]
    fn test_newer_remote_is_applied_then_recorded() {
        let remote = FakeRemote::at("1.3.0");
        let state = MemoryState::with("1.2.9");
        let transfer = RecordingTransfer::default();

        let resolution = UpdateResolver::new("beta", &remote, &state, &transfer)
            .resolve()
            .unwrap();

        assert!(matches!(resolution, Resolution::Updated { .. }));
        assert!(resolution.applied());
        assert_eq!(transfer.count(), 1);
        assert_eq!(state.current().unwrap().version, "1.3.0");
    }

    #[test]
    fn test_equal_versions_make_no_transfer() {
        let remote = FakeRemote::at("1.0.0");
        let state = MemoryState::with("1.0.0");
        let transfer = RecordingTransfer::default();

        let resolution = UpdateResolver::new("beta", &remote, &state, &transfer)
            .resolve()
            .unwrap();

        assert!(!resolution.applied());
        assert_eq!(transfer.count(), 0);
        assert_eq!(state.saves.get(), 0);
    }

    #[test]
    fn test_older_remote_refreshes_cache_without_transfer() {
        let remote = FakeRemote::at("1.0.0");
        let state = MemoryState::with("1.5.0");
        let transfer = RecordingTransfer::default();

        UpdateResolver::new("beta", &remote, &state, &transfer)
            .resolve()
            .unwrap();

        assert_eq!(transfer.count(), 0);
        assert_eq!(state.current().unwrap().version, "1.0.0");
    }

    #[test]
    fn test_second_cycle_is_a_no_op() {
        let remote = FakeRemote::at("2.1.0");
        let state = MemoryState::with("2.0.0");
        let transfer = RecordingTransfer::default();
        let resolver = UpdateResolver::new("beta", &remote, &state, &transfer);

        resolver.resolve().unwrap();
        let after_first = state.current();
        let saves = state.saves.get();

        let second = resolver.resolve().unwrap();

        assert!(matches!(second, Resolution::UpToDate { .. }));
        assert_eq!(transfer.count(), 1);
        assert_eq!(state.current(), after_first);
        assert_eq!(state.saves.get(), saves);
    }

    #[test]
    fn test_unreachable_remote_is_fatal() {
        let remote = FakeRemote::unreachable();
        let state = MemoryState::with("1.0.0");
        let transfer = RecordingTransfer::default();

        let err = UpdateResolver::new("beta", &remote, &state, &transfer)
            .resolve()
            .unwrap_err();
        assert!(matches!(err, UpdateError::Network(_)));
        assert_eq!(transfer.count(), 0);
    }

    #[test]
    fn test_unparseable_local_version_is_fatal() {
        let remote = FakeRemote::at("2.0.0");
        let state = MemoryState::default();
        *state.marker.borrow_mut() = Some(VersionMarker::new("banana", ""));
        let transfer = RecordingTransfer::default();

        let err = UpdateResolver::new("beta", &remote, &state, &transfer)
            .resolve()
            .unwrap_err();
        assert!(matches!(err, UpdateError::InvalidVersion(_)));
        assert_eq!(transfer.count(), 0);
    }

    #[test]
    fn test_unparseable_remote_version_is_fatal() {
        let remote = FakeRemote {
            marker: Some(VersionMarker::new("latest", "https://cdn.test/x.zip")),
        };
        let state = MemoryState::default();
        let transfer = RecordingTransfer::default();

        let err = UpdateResolver::new("beta", &remote, &state, &transfer)
            .resolve()
            .unwrap_err();
        assert!(matches!(err, UpdateError::InvalidVersion(_)));
        assert_eq!(state.current(), None);
    }

    #[test]
    fn test_failed_update_keeps_old_state() {
        let remote = FakeRemote::at("3.0.0");
        let state = MemoryState::with("2.0.0");
        let transfer = RecordingTransfer::failing();

        let err = UpdateResolver::new("beta", &remote, &state, &transfer)
            .resolve()
            .unwrap_err();

        assert!(err.blocks_relaunch());
        assert_eq!(state.current().unwrap().version, "2.0.0");
    }

    #[test]
    fn test_failed_bootstrap_rolls_back_state() {
        let remote = FakeRemote::at("3.0.0");
        let state = MemoryState::default();
        let transfer = RecordingTransfer::failing();

        assert!(
            UpdateResolver::new("beta", &remote, &state, &transfer)
                .resolve()
                .is_err()
        );
        assert_eq!(state.current(), None);
        assert_eq!(state.saves.get(), 1);
    }

    proptest! {
        #[test]
        fn transfers_iff_remote_is_newer(
            local in (0u64..6, 0u64..6, 0u64..6),
            remote in (0u64..6, 0u64..6, 0u64..6),
        ) {
            let local_version = format!("{}.{}.{}", local.0, local.1, local.2);
            let remote_version = format!("{}.{}.{}", remote.0, remote.1, remote.2);
            let remote_store = FakeRemote::at(&remote_version);
            let state = MemoryState::with(&local_version);
            let transfer = RecordingTransfer::default();

            UpdateResolver::new("beta", &remote_store, &state, &transfer)
                .resolve()
                .unwrap();

            prop_assert_eq!(transfer.count() == 1, remote > local);
        }
    }
}
