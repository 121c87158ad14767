//! Publish to a directory mirror, then resolve an install against it.

use std::fs;
use std::path::Path;
use std::time::Duration;

use tempfile::TempDir;
use updraft::{
    CopyStep, DirectoryStore, LocalStateStore, MetadataStore, PublisherConfig, Publisher,
    Resolution, StateStore, UpdateLock, UpdateResolver, VersionMarker, ZipTransfer,
};

struct World {
    root: TempDir,
}

impl World {
    fn new() -> Self {
        Self {
            root: tempfile::tempdir().unwrap(),
        }
    }

    fn path(&self, rel: &str) -> std::path::PathBuf {
        self.root.path().join(rel)
    }

    fn mirror(&self) -> DirectoryStore {
        DirectoryStore::new(self.path("mirror"))
    }

    fn install_dir(&self) -> std::path::PathBuf {
        self.path("install")
    }

    fn state(&self) -> LocalStateStore {
        LocalStateStore::new(self.install_dir().join(".meta"))
    }

    fn publish(&self, version: &str, payload: &str) -> VersionMarker {
        let build = self.path(&format!("build-{version}"));
        fs::write(&build, payload).unwrap();

        let config = PublisherConfig {
            version: version.to_string(),
            storage: "bucket".to_string(),
            variant: "beta".to_string(),
            output_dir: self.path("dist"),
            app_entry_point: "bin/app".into(),
            access_token: None,
        };
        Publisher::new(config, self.mirror())
            .with_step(CopyStep::new(&build, "bin/app"))
            .run()
            .unwrap()
    }

    fn resolve(&self) -> updraft::Result<Resolution> {
        fs::create_dir_all(self.install_dir()).unwrap();
        let transfer = ZipTransfer::new(self.install_dir(), Duration::from_secs(10)).unwrap();
        UpdateResolver::new("beta", self.mirror(), self.state(), transfer).resolve()
    }

    fn installed_app(&self) -> String {
        fs::read_to_string(self.install_dir().join("bin/app")).unwrap()
    }
}

fn assert_no_scratch(dir: &Path) {
    let scratch: Vec<_> = fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with(".updraft-"))
        .collect();
    assert!(scratch.is_empty(), "left behind: {scratch:?}");
}

#[test]
fn first_run_bootstraps_from_remote() {
    let world = World::new();
    let published = world.publish("2.0.0", "build two");

    let resolution = world.resolve().unwrap();

    assert_eq!(
        resolution,
        Resolution::Bootstrapped {
            marker: published.clone()
        }
    );
    assert_eq!(world.installed_app(), "build two");
    assert_eq!(world.state().load(), Some(published));
    assert_no_scratch(&world.install_dir());
}

#[test]
fn newer_release_is_applied_and_rerun_is_a_no_op() {
    let world = World::new();
    world.publish("1.1.0", "old");
    world.resolve().unwrap();

    let newer = world.publish("1.2.0", "new");
    let resolution = world.resolve().unwrap();
    assert!(matches!(resolution, Resolution::Updated { ref to, .. } if *to == newer));
    assert_eq!(world.installed_app(), "new");

    let record_before = world.state().load_record().unwrap();
    let again = world.resolve().unwrap();
    assert_eq!(again, Resolution::UpToDate { marker: newer });
    assert_eq!(world.state().load_record().unwrap(), record_before);
}

#[test]
fn equal_versions_skip_transfer() {
    let world = World::new();
    let published = world.publish("1.0.0", "payload");
    world.state().save(&published).unwrap();

    let resolution = world.resolve().unwrap();

    assert_eq!(resolution, Resolution::UpToDate { marker: published });
    assert!(!world.install_dir().join("bin/app").exists());
}

#[test]
fn corrupt_local_state_re_bootstraps() {
    let world = World::new();
    let published = world.publish("3.0.0", "three");
    fs::create_dir_all(world.install_dir()).unwrap();
    fs::write(world.install_dir().join(".meta"), b"\x00garbage\xff").unwrap();

    let resolution = world.resolve().unwrap();

    assert!(matches!(resolution, Resolution::Bootstrapped { .. }));
    assert_eq!(world.state().load(), Some(published));
}

#[test]
fn unpublished_variant_fails_without_recording_state() {
    let world = World::new();

    let err = world.resolve().unwrap_err();

    assert!(err.to_string().contains("no artifact url"));
    assert_eq!(world.state().load(), None);
    assert_eq!(
        world.mirror().get("beta").unwrap(),
        VersionMarker::initial()
    );
}

#[test]
fn lock_blocks_a_second_updater() {
    let world = World::new();
    fs::create_dir_all(world.install_dir()).unwrap();
    let lock_path = UpdateLock::path_for(world.state().path());

    let held = UpdateLock::acquire(&lock_path).unwrap();
    assert!(UpdateLock::acquire(&lock_path).is_err());
    drop(held);
    assert!(UpdateLock::acquire(&lock_path).is_ok());
}
