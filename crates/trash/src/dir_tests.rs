// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

use crate::fsmon::FakeMonitorBackend;
use crate::root::TrashCallbacks;
use crate::root::TrashItem;
use std::sync::mpsc;

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
    topdir: tempfile::TempDir,
}

impl Fixture {
    fn new() -> Self {
        let (sink, events) = mpsc::channel();
        Self {
            root: TrashRoot::new(Box::new(NullCallbacks)),
            backend: FakeMonitorBackend::new(),
            sink,
            events,
            topdir: tempfile::tempdir().unwrap(),
        }
    }

    fn dir(&self, watching: bool) -> TrashDir {
        TrashDir::new(
            Arc::clone(&self.root),
            self.backend.clone(),
            self.sink.clone(),
            watching,
            false,
            self.topdir.path(),
            ".Trash-1000/files",
        )
    }

    fn files_dir(&self) -> PathBuf {
        self.topdir.path().join(".Trash-1000/files")
    }

    fn deliver(&self, dir: &mut TrashDir, watched_dir: &Path, event: FsEvent) {
        self.backend.emit(watched_dir, event);
        while let Ok((tag, ev)) = self.events.try_recv() {
            dir.handle_event(tag, &ev);
        }
    }

    fn names(&self) -> Vec<String> {
        self.root.items().iter().map(|i| i.escaped_name().to_string()).collect()
    }
}

#[test]
fn existing_contents_are_reported_on_watch() {
    let fx = Fixture::new();
    std::fs::create_dir_all(fx.files_dir()).unwrap();
    std::fs::write(fx.files_dir().join("b"), b"").unwrap();
    std::fs::write(fx.files_dir().join("a"), b"").unwrap();

    let dir = fx.dir(true);
    assert!(dir.is_watching());
    assert_eq!(fx.root.len(), 2);
    drop(dir);
}

#[test]
fn absent_directory_reports_nothing() {
    let fx = Fixture::new();
    let _dir = fx.dir(true);
    assert!(fx.root.is_empty());
}

#[test]
fn rescan_diffs_against_previous_children() {
    let fx = Fixture::new();
    std::fs::create_dir_all(fx.files_dir()).unwrap();
    std::fs::write(fx.files_dir().join("keep"), b"").unwrap();
    std::fs::write(fx.files_dir().join("stale"), b"").unwrap();

    let mut dir = fx.dir(false);
    dir.rescan();
    assert_eq!(fx.root.len(), 2);

    std::fs::remove_file(fx.files_dir().join("stale")).unwrap();
    std::fs::write(fx.files_dir().join("fresh"), b"").unwrap();
    dir.rescan();

    let names = fx.names();
    assert!(names.iter().any(|n| n.ends_with("keep")));
    assert!(names.iter().any(|n| n.ends_with("fresh")));
    assert!(!names.iter().any(|n| n.ends_with("stale")));
    assert_eq!(fx.root.len(), 2);

    // A rescan with no change must not double-report.
    dir.rescan();
    assert_eq!(fx.root.len(), 2);
}

#[test]
fn monitor_events_apply_directly() {
    let fx = Fixture::new();
    std::fs::create_dir_all(fx.files_dir()).unwrap();
    let mut dir = fx.dir(true);

    let file = fx.files_dir().join("incoming");
    std::fs::write(&file, b"").unwrap();
    fx.deliver(&mut dir, &fx.files_dir(), FsEvent::Created(file.clone()));
    assert_eq!(fx.root.len(), 1);

    std::fs::remove_file(&file).unwrap();
    fx.deliver(&mut dir, &fx.files_dir(), FsEvent::Deleted(file));
    assert!(fx.root.is_empty());
}

#[test]
fn unexpected_events_only_warn() {
    let fx = Fixture::new();
    std::fs::create_dir_all(fx.files_dir()).unwrap();
    let mut dir = fx.dir(true);

    let file = fx.files_dir().join("f");
    fx.deliver(&mut dir, &fx.files_dir(), FsEvent::Other(file.clone()));
    fx.deliver(&mut dir, &fx.files_dir(), FsEvent::Other(file));
    assert!(fx.root.is_empty());
}

#[test]
fn chain_destruction_empties_the_aggregate() {
    let fx = Fixture::new();
    std::fs::create_dir_all(fx.files_dir()).unwrap();
    std::fs::write(fx.files_dir().join("doomed"), b"").unwrap();

    let mut dir = fx.dir(true);
    assert_eq!(fx.root.len(), 1);

    let trash = fx.topdir.path().join(".Trash-1000");
    std::fs::remove_dir_all(&trash).unwrap();
    fx.deliver(&mut dir, fx.topdir.path(), FsEvent::Deleted(trash));
    assert!(fx.root.is_empty());
}

#[test]
fn watch_after_unwatch_rescans() {
    let fx = Fixture::new();
    std::fs::create_dir_all(fx.files_dir()).unwrap();
    std::fs::write(fx.files_dir().join("early"), b"").unwrap();

    let mut dir = fx.dir(true);
    assert_eq!(fx.root.len(), 1);

    dir.unwatch();
    // Changes while unwatched go unnoticed...
    std::fs::write(fx.files_dir().join("late"), b"").unwrap();
    assert_eq!(fx.root.len(), 1);

    // ...until watching resumes.
    dir.watch();
    assert_eq!(fx.root.len(), 2);
}

#[test]
fn unwatched_missing_dir_clears_stale_items() {
    let fx = Fixture::new();
    std::fs::create_dir_all(fx.files_dir()).unwrap();
    std::fs::write(fx.files_dir().join("gone-soon"), b"").unwrap();

    let mut dir = fx.dir(true);
    assert_eq!(fx.root.len(), 1);

    dir.unwatch();
    std::fs::remove_dir_all(fx.topdir.path().join(".Trash-1000")).unwrap();
    dir.watch();
    assert!(fx.root.is_empty(), "stale items from the unmonitored period must go");
}

#[test]
fn dropping_the_dir_withdraws_its_items() {
    let fx = Fixture::new();
    std::fs::create_dir_all(fx.files_dir()).unwrap();
    std::fs::write(fx.files_dir().join("x"), b"").unwrap();

    let dir = fx.dir(true);
    assert_eq!(fx.root.len(), 1);
    drop(dir);
    assert!(fx.root.is_empty());
}
