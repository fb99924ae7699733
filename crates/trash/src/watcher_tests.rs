// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

use crate::fsmon::{FakeMonitorBackend, FsEvent};
use crate::root::{TrashCallbacks, TrashItem, TrashRoot};
use std::sync::mpsc;
use yare::parameterized;

struct NullCallbacks;

impl TrashCallbacks for NullCallbacks {
    fn item_created(&self, _item: &Arc<TrashItem>) {}
    fn item_deleted(&self, _item: &Arc<TrashItem>) {}
    fn size_changed(&self) {}
}

struct Fixture {
    root: Arc<TrashRoot>,
    backend: Arc<FakeMonitorBackend>,
    sink: Sender<TaggedEvent>,
    events: mpsc::Receiver<TaggedEvent>,
    data_dir: tempfile::TempDir,
    volume: tempfile::TempDir,
}

impl Fixture {
    fn new() -> Self {
        let (sink, events) = mpsc::channel();
        Self {
            root: TrashRoot::new(Box::new(NullCallbacks)),
            backend: FakeMonitorBackend::new(),
            sink,
            events,
            data_dir: tempfile::tempdir().unwrap(),
            volume: tempfile::tempdir().unwrap(),
        }
    }

    fn paths(&self) -> WatcherPaths {
        WatcherPaths { data_dir: self.data_dir.path().to_path_buf(), uid: 1000 }
    }

    fn volume_entry(&self, fs_type: &str, options: &str) -> MountEntry {
        MountEntry {
            device: "/dev/test".to_string(),
            mount_path: self.volume.path().to_path_buf(),
            fs_type: fs_type.to_string(),
            options: options.to_string(),
        }
    }

    fn watcher(&self, table: &[MountEntry]) -> TrashWatcher {
        TrashWatcher::new(
            Arc::clone(&self.root),
            self.backend.clone(),
            self.sink.clone(),
            table,
            self.paths(),
        )
    }

    fn drain(&self, watcher: &mut TrashWatcher) {
        while let Ok((tag, event)) = self.events.try_recv() {
            watcher.handle_event(tag, &event);
        }
    }
}

#[test]
fn aggregates_home_and_volume_trashes() {
    let fx = Fixture::new();
    let home_files = fx.data_dir.path().join("Trash/files");
    std::fs::create_dir_all(&home_files).unwrap();
    std::fs::write(home_files.join("note.txt"), b"").unwrap();

    let vol_files = fx.volume.path().join(".Trash-1000/files");
    std::fs::create_dir_all(&vol_files).unwrap();
    std::fs::write(vol_files.join("photo.jpg"), b"").unwrap();

    let table = [fx.volume_entry("ext4", "rw")];
    let mut watcher = fx.watcher(&table);
    assert!(fx.root.is_empty(), "nothing reported before watch()");

    watcher.watch();

    let names: Vec<String> =
        fx.root.items().iter().map(|i| i.escaped_name().to_string()).collect();
    assert_eq!(names.len(), 2);
    assert!(names.contains(&"note.txt".to_string()));
    assert!(names.iter().any(|n| n.starts_with('\\') && n.ends_with("photo.jpg")));
}

#[test]
fn both_trash_flavors_are_watched() {
    let fx = Fixture::new();
    let dot_trash = fx.volume.path().join(".Trash/1000/files");
    let dash_trash = fx.volume.path().join(".Trash-1000/files");
    std::fs::create_dir_all(&dot_trash).unwrap();
    std::fs::create_dir_all(&dash_trash).unwrap();
    std::fs::write(dot_trash.join("a"), b"").unwrap();
    std::fs::write(dash_trash.join("b"), b"").unwrap();

    let table = [fx.volume_entry("ext4", "rw")];
    let mut watcher = fx.watcher(&table);
    watcher.watch();

    assert_eq!(fx.root.len(), 2);
}

#[parameterized(
    opt_out = { "rw,x-fsbus-notrash", 0 },
    plain = { "rw", 1 },
)]
fn mount_options_control_aggregation(options: &str, expected: usize) {
    let fx = Fixture::new();
    let vol_files = fx.volume.path().join(".Trash-1000/files");
    std::fs::create_dir_all(&vol_files).unwrap();
    std::fs::write(vol_files.join("f"), b"").unwrap();

    let table = [fx.volume_entry("ext4", options)];
    let mut watcher = fx.watcher(&table);
    watcher.watch();

    assert_eq!(fx.root.len(), expected);
}

#[test]
fn remount_drops_vanished_mounts() {
    let fx = Fixture::new();
    let vol_files = fx.volume.path().join(".Trash-1000/files");
    std::fs::create_dir_all(&vol_files).unwrap();
    std::fs::write(vol_files.join("f"), b"").unwrap();

    let table = [fx.volume_entry("ext4", "rw")];
    let mut watcher = fx.watcher(&table);
    watcher.watch();
    assert_eq!(fx.root.len(), 1);

    watcher.remount(&[]);
    assert!(fx.root.is_empty(), "unmounted volume takes its items along");

    // And back again.
    watcher.remount(&table);
    assert_eq!(fx.root.len(), 1);
}

#[test]
fn events_flow_into_the_aggregate() {
    let fx = Fixture::new();
    let vol_files = fx.volume.path().join(".Trash-1000/files");
    std::fs::create_dir_all(&vol_files).unwrap();

    let table = [fx.volume_entry("ext4", "rw")];
    let mut watcher = fx.watcher(&table);
    watcher.watch();
    fx.drain(&mut watcher);
    assert!(fx.root.is_empty());

    let newcomer = vol_files.join("dropped.txt");
    std::fs::write(&newcomer, b"").unwrap();
    fx.backend.emit(&vol_files, FsEvent::Created(newcomer));
    fx.drain(&mut watcher);

    assert_eq!(fx.root.len(), 1);
}

#[test]
fn rescan_skips_trusted_dirs_while_watching() {
    let fx = Fixture::new();
    let vol_files = fx.volume.path().join(".Trash-1000/files");
    std::fs::create_dir_all(&vol_files).unwrap();

    let table = [fx.volume_entry("ext4", "rw")];
    let mut watcher = fx.watcher(&table);
    watcher.watch();

    // Sneak a file in without an event. Trusted + watching means the
    // rescan must not pick it up.
    std::fs::write(vol_files.join("sneaky"), b"").unwrap();
    watcher.rescan();
    assert!(fx.root.is_empty());

    // Once unwatched, a rescan hits every directory.
    watcher.unwatch();
    watcher.rescan();
    assert_eq!(fx.root.len(), 1);
}

#[parameterized(
    ext4_is_trusted = { "ext4", WatchType::Trusted },
    nfs_is_polled = { "nfs", WatchType::Watch },
    nfs4_is_polled = { "nfs4", WatchType::Watch },
    cifs_is_polled = { "cifs", WatchType::Watch },
)]
fn watch_policy_by_fs_type(fs_type: &str, expected: WatchType) {
    let fx = Fixture::new();
    let entry = fx.volume_entry(fs_type, "rw");
    assert_eq!(decide_watch_type(Some(&entry)), expected);
}

#[test]
fn missing_mount_entry_is_trusted() {
    assert_eq!(decide_watch_type(None), WatchType::Trusted);
}

#[test]
fn unreadable_mount_point_is_never_watched() {
    use std::os::unix::fs::PermissionsExt;

    if nix::unistd::getuid().is_root() {
        // Root passes every access check; the policy is untestable here.
        return;
    }
    let fx = Fixture::new();
    let entry = fx.volume_entry("ext4", "rw");
    std::fs::set_permissions(fx.volume.path(), std::fs::Permissions::from_mode(0o000)).unwrap();
    let decided = decide_watch_type(Some(&entry));
    std::fs::set_permissions(fx.volume.path(), std::fs::Permissions::from_mode(0o700)).unwrap();
    assert_eq!(decided, WatchType::NoWatch);
}
