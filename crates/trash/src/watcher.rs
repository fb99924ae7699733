// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cross-volume trash watching.
//!
//! The watcher owns the home trash directory plus a `.Trash/$uid/files`
//! and `.Trash-$uid/files` pair for every eligible mount, and applies
//! the per-filesystem watch policy: trust notification, watch with
//! periodic rescans, or never monitor at all.

use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::sync::Arc;

use nix::unistd::{access, AccessFlags};
use tracing::{debug, warn};

use fsbus_core::mounts::{entry_for_path, MountEntry};

use crate::dir::TrashDir;
use crate::fsmon::{MonitorBackend, TaggedEvent};
use crate::root::TrashRoot;

/// How much to trust change notification on one filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchType {
    /// Notification is reliable; scan once, then believe the events.
    Trusted,
    /// Notification only covers local changes; rescan periodically.
    Watch,
    /// Never monitor; rescan only on explicit request.
    NoWatch,
}

/// Mount options that force a mount in or out of trash aggregation.
const OPTION_FORCE_TRASH: &str = "x-fsbus-trash";
const OPTION_NO_TRASH: &str = "x-fsbus-notrash";

/// Filesystems whose notification only sees local changes.
const UNRELIABLE_FS_TYPES: &[&str] = &["nfs", "nfs4", "cifs"];

/// Pick the watch policy for a mount. A missing entry (bind mounts,
/// subvolumes, the home trash on an unlisted fs) is trusted; unreadable
/// mount points are never polled.
pub fn decide_watch_type(entry: Option<&MountEntry>) -> WatchType {
    let Some(entry) = entry else {
        return WatchType::Trusted;
    };

    if access(&entry.mount_path, AccessFlags::R_OK).is_err() {
        return WatchType::NoWatch;
    }

    if UNRELIABLE_FS_TYPES.contains(&entry.fs_type.as_str()) {
        WatchType::Watch
    } else {
        WatchType::Trusted
    }
}

fn ignore_trash_mount(entry: &MountEntry) -> bool {
    if entry.has_option(OPTION_FORCE_TRASH) {
        return false;
    }
    if entry.has_option(OPTION_NO_TRASH) {
        return true;
    }
    entry.is_system_internal()
}

/// Locations the watcher derives its directories from; split out so
/// tests can point it at a scratch tree.
#[derive(Debug, Clone)]
pub struct WatcherPaths {
    /// Parent of the home `Trash/` directory (the XDG data dir).
    pub data_dir: PathBuf,
    pub uid: u32,
}

impl WatcherPaths {
    pub fn from_system() -> Self {
        Self {
            data_dir: dirs::data_dir().unwrap_or_else(std::env::temp_dir),
            uid: nix::unistd::getuid().as_raw(),
        }
    }
}

struct TrashMount {
    entry: MountEntry,
    watch_type: WatchType,
    dirs: [TrashDir; 2],
}

/// The aggregate watcher.
pub struct TrashWatcher {
    root: Arc<TrashRoot>,
    backend: Arc<dyn MonitorBackend>,
    sink: Sender<TaggedEvent>,
    paths: WatcherPaths,
    homedir_trashdir: TrashDir,
    homedir_type: WatchType,
    mounts: Vec<TrashMount>,
    watching: bool,
}

impl TrashWatcher {
    /// Build the watcher over a snapshot of the mount table. Watching
    /// starts disabled; call [`TrashWatcher::watch`] once the consumer
    /// is ready for change callbacks.
    pub fn new(
        root: Arc<TrashRoot>,
        backend: Arc<dyn MonitorBackend>,
        sink: Sender<TaggedEvent>,
        mount_table: &[MountEntry],
        paths: WatcherPaths,
    ) -> Self {
        let home_files = paths.data_dir.join("Trash/files");
        let homedir_type = decide_watch_type(entry_for_path(mount_table, &home_files));
        debug!(?homedir_type, "home trash policy");

        let homedir_trashdir = TrashDir::new(
            Arc::clone(&root),
            Arc::clone(&backend),
            sink.clone(),
            false,
            true,
            &paths.data_dir,
            "Trash/files",
        );

        let mut watcher = Self {
            root,
            backend,
            sink,
            paths,
            homedir_trashdir,
            homedir_type,
            mounts: Vec::new(),
            watching: false,
        };
        watcher.remount(mount_table);
        watcher
    }

    pub fn root(&self) -> &Arc<TrashRoot> {
        &self.root
    }

    /// Reconcile the per-mount trash dirs against a fresh mount table.
    /// Call whenever the table may have changed; unchanged mounts keep
    /// their directories and state.
    pub fn remount(&mut self, mount_table: &[MountEntry]) {
        let mut fresh: Vec<&MountEntry> =
            mount_table.iter().filter(|entry| !ignore_trash_mount(entry)).collect();
        fresh.sort_by(|a, b| mount_sort_key(a).cmp(&mount_sort_key(b)));

        let old = std::mem::take(&mut self.mounts);
        let mut old_iter = old.into_iter().peekable();
        let mut new_iter = fresh.into_iter().peekable();

        loop {
            let order = match (old_iter.peek(), new_iter.peek()) {
                (None, None) => break,
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (Some(old), Some(new)) => {
                    mount_sort_key(&old.entry).cmp(&mount_sort_key(new))
                }
            };
            match order {
                std::cmp::Ordering::Less => {
                    // Old entry gone; dropping the dirs empties their
                    // items out of the aggregate.
                    let _ = old_iter.next();
                }
                std::cmp::Ordering::Greater => {
                    if let Some(entry) = new_iter.next() {
                        self.mounts.push(self.make_mount(entry.clone()));
                    }
                }
                std::cmp::Ordering::Equal => {
                    if let Some(kept) = old_iter.next() {
                        self.mounts.push(kept);
                    }
                    let _ = new_iter.next();
                }
            }
        }
    }

    fn make_mount(&self, entry: MountEntry) -> TrashMount {
        let watch_type = decide_watch_type(Some(&entry));
        let watching = self.watching && watch_type != WatchType::NoWatch;
        let uid = self.paths.uid;

        // Both trash-spec flavors are aggregated at the same time.
        let dirs = [
            self.make_dir(&entry.mount_path, &format!(".Trash/{uid}/files"), watching),
            self.make_dir(&entry.mount_path, &format!(".Trash-{uid}/files"), watching),
        ];

        TrashMount { entry, watch_type, dirs }
    }

    fn make_dir(&self, topdir: &Path, rel: &str, watching: bool) -> TrashDir {
        TrashDir::new(
            Arc::clone(&self.root),
            Arc::clone(&self.backend),
            self.sink.clone(),
            watching,
            false,
            topdir,
            rel,
        )
    }

    /// Start monitoring everything the policy allows.
    pub fn watch(&mut self) {
        if self.watching {
            warn!("trash watcher is already watching");
            return;
        }

        if self.homedir_type != WatchType::NoWatch {
            self.homedir_trashdir.watch();
        }
        for mount in &mut self.mounts {
            if mount.watch_type != WatchType::NoWatch {
                for dir in &mut mount.dirs {
                    dir.watch();
                }
            }
        }
        self.watching = true;
    }

    /// Stop all monitoring.
    pub fn unwatch(&mut self) {
        if !self.watching {
            warn!("trash watcher is not watching");
            return;
        }

        if self.homedir_type != WatchType::NoWatch {
            self.homedir_trashdir.unwatch();
        }
        for mount in &mut self.mounts {
            if mount.watch_type != WatchType::NoWatch {
                for dir in &mut mount.dirs {
                    dir.unwatch();
                }
            }
        }
        self.watching = false;
    }

    /// Rescan every directory whose notifications cannot be trusted
    /// outright (all of them when not watching).
    pub fn rescan(&mut self) {
        if !self.watching || self.homedir_type != WatchType::Trusted {
            self.homedir_trashdir.rescan();
        }
        for mount in &mut self.mounts {
            if !self.watching || mount.watch_type != WatchType::Trusted {
                for dir in &mut mount.dirs {
                    dir.rescan();
                }
            }
        }
    }

    /// Route one monitor event to whichever directory owns the tag.
    pub fn handle_event(&mut self, tag: u64, event: &crate::fsmon::FsEvent) -> bool {
        if self.homedir_trashdir.handle_event(tag, event) {
            return true;
        }
        for mount in &mut self.mounts {
            for dir in &mut mount.dirs {
                if dir.handle_event(tag, event) {
                    return true;
                }
            }
        }
        false
    }

    /// Drain a channel of tagged events into the watcher until every
    /// sender is gone. Intended for a dedicated pump thread.
    pub fn pump(watcher: &parking_lot::Mutex<TrashWatcher>, rx: std::sync::mpsc::Receiver<TaggedEvent>) {
        for (tag, event) in rx {
            watcher.lock().handle_event(tag, &event);
        }
    }
}

fn mount_sort_key(entry: &MountEntry) -> (&Path, &str, &str) {
    (entry.mount_path.as_path(), entry.fs_type.as_str(), entry.device.as_str())
}

#[cfg(test)]
#[path = "watcher_tests.rs"]
mod tests;
