// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Trash aggregation exercised through its public surface: watcher,
//! root, delete and the background expunge.

use std::sync::mpsc;
use std::sync::Arc;

use parking_lot::Mutex;

use fsbus_core::mounts::MountEntry;
use fsbus_trash::{
    FakeMonitorBackend, FsEvent, TrashCallbacks, TrashItem, TrashRoot, TrashWatcher, WatcherPaths,
};

#[derive(Clone, Default)]
struct CountingCallbacks {
    size_changes: Arc<Mutex<usize>>,
}

impl TrashCallbacks for CountingCallbacks {
    fn item_created(&self, _item: &Arc<TrashItem>) {}
    fn item_deleted(&self, _item: &Arc<TrashItem>) {}
    fn size_changed(&self) {
        *self.size_changes.lock() += 1;
    }
}

#[test]
fn aggregate_delete_and_expunge_end_to_end() {
    let data_dir = tempfile::tempdir().unwrap();
    let volume = tempfile::tempdir().unwrap();

    // A file in the home trash and one on the volume, sidecars included.
    let home_files = data_dir.path().join("Trash/files");
    std::fs::create_dir_all(&home_files).unwrap();
    std::fs::create_dir_all(data_dir.path().join("Trash/info")).unwrap();
    std::fs::write(home_files.join("letter.txt"), b"dear").unwrap();

    let vol_trash = volume.path().join(".Trash-1000");
    std::fs::create_dir_all(vol_trash.join("files")).unwrap();
    std::fs::create_dir_all(vol_trash.join("info")).unwrap();
    std::fs::write(vol_trash.join("files/photo.jpg"), b"jpeg").unwrap();
    std::fs::write(
        vol_trash.join("info/photo.jpg.trashinfo"),
        "[Trash Info]\nPath=photos/photo.jpg\nDeletionDate=2026-07-04T10:00:00\n",
    )
    .unwrap();

    let callbacks = CountingCallbacks::default();
    let root = TrashRoot::new(Box::new(callbacks.clone()));
    let backend = FakeMonitorBackend::new();
    let (sink, events) = mpsc::channel();

    let table = vec![MountEntry {
        device: "/dev/volume".to_string(),
        mount_path: volume.path().to_path_buf(),
        fs_type: "ext4".to_string(),
        options: "rw".to_string(),
    }];

    let mut watcher = TrashWatcher::new(
        Arc::clone(&root),
        backend.clone(),
        sink,
        &table,
        WatcherPaths { data_dir: data_dir.path().to_path_buf(), uid: 1000 },
    );
    watcher.watch();

    assert_eq!(root.len(), 2);
    assert!(*callbacks.size_changes.lock() >= 1);

    // The volume item knows its origin from the sidecar.
    let volume_item = root
        .items()
        .into_iter()
        .find(|item| item.escaped_name().starts_with('\\'))
        .expect("volume item");
    assert_eq!(
        volume_item.original(),
        Some(volume.path().join("photos/photo.jpg").as_path())
    );

    // Empty it from the trash.
    root.delete_item(&volume_item).unwrap();
    assert!(!vol_trash.join("files/photo.jpg").exists());
    assert!(!vol_trash.join("info/photo.jpg.trashinfo").exists());
    assert_eq!(root.len(), 1);

    // The monitor notices the unlink too; a duplicate remove must not
    // corrupt the aggregate.
    backend.emit(
        &vol_trash.join("files"),
        FsEvent::Deleted(vol_trash.join("files/photo.jpg")),
    );
    while let Ok((tag, event)) = events.try_recv() {
        watcher.handle_event(tag, &event);
    }
    assert_eq!(root.len(), 1);

    // Background expunge eventually clears the staging directory.
    let expunged = vol_trash.join("expunged");
    for _ in 0..200 {
        let empty =
            std::fs::read_dir(&expunged).map(|e| e.count() == 0).unwrap_or(false);
        if empty {
            return;
        }
        std::thread::sleep(std::time::Duration::from_millis(25));
    }
    panic!("expunged/ was not emptied");
}

#[test]
fn restore_returns_the_file_to_its_origin() {
    let volume = tempfile::tempdir().unwrap();
    let vol_trash = volume.path().join(".Trash-1000");
    std::fs::create_dir_all(vol_trash.join("files")).unwrap();
    std::fs::create_dir_all(vol_trash.join("info")).unwrap();
    std::fs::create_dir_all(volume.path().join("docs")).unwrap();
    std::fs::write(vol_trash.join("files/cv.pdf"), b"pdf").unwrap();
    std::fs::write(
        vol_trash.join("info/cv.pdf.trashinfo"),
        "[Trash Info]\nPath=docs/cv.pdf\n",
    )
    .unwrap();

    let root = TrashRoot::new(Box::new(CountingCallbacks::default()));
    root.add_item(&vol_trash.join("files/cv.pdf"), false);
    root.thaw();

    let item = root.items().pop().unwrap();
    let original = item.original().expect("sidecar had a path").to_path_buf();
    root.restore_item(&item, &original).unwrap();

    assert!(volume.path().join("docs/cv.pdf").exists());
    assert!(!vol_trash.join("files/cv.pdf").exists());
    assert!(root.is_empty());
}
