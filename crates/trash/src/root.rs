// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The aggregated trash store.
//!
//! One map of escaped name → item for every watched volume, plus the
//! pending-notification queue. Mutations queue notifications under the
//! writer lock; `thaw` drains them outside it and reports a size change
//! exactly when the item count moved.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use fsbus_core::{ErrorKind, VfsError, VfsResult};

use crate::escape::escape_name;
use crate::expunge::schedule_expunge;
use crate::info::{read_trashinfo_for, trashinfo_path_for, TrashInfo};

/// One trashed file in the aggregated view.
#[derive(Debug)]
pub struct TrashItem {
    escaped_name: String,
    /// Location inside its `files/` directory.
    file: PathBuf,
    info: TrashInfo,
}

impl TrashItem {
    fn new(file: PathBuf, is_homedir: bool) -> Self {
        Self {
            escaped_name: escape_name(&file, is_homedir),
            info: read_trashinfo_for(&file),
            file,
        }
    }

    pub fn escaped_name(&self) -> &str {
        &self.escaped_name
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    /// Where the file lived before it was trashed, if recorded.
    pub fn original(&self) -> Option<&Path> {
        self.info.original.as_deref()
    }

    pub fn deletion_date(&self) -> Option<&str> {
        self.info.deletion_date.as_deref()
    }
}

/// Notifications the aggregate owner receives from `thaw`.
pub trait TrashCallbacks: Send + Sync {
    fn item_created(&self, item: &Arc<TrashItem>);
    fn item_deleted(&self, item: &Arc<TrashItem>);
    fn size_changed(&self);
}

enum Notification {
    Create(Arc<TrashItem>),
    Delete(Arc<TrashItem>),
}

struct RootState {
    items: HashMap<String, Arc<TrashItem>>,
    notifications: VecDeque<Notification>,
    old_size: usize,
}

/// The aggregate. Reader-writer locked: lookups take the reader side,
/// mutation and queue draining the writer side.
pub struct TrashRoot {
    state: RwLock<RootState>,
    callbacks: Box<dyn TrashCallbacks>,
}

impl TrashRoot {
    pub fn new(callbacks: Box<dyn TrashCallbacks>) -> Arc<Self> {
        Arc::new(Self {
            state: RwLock::new(RootState {
                items: HashMap::new(),
                notifications: VecDeque::new(),
                old_size: 0,
            }),
            callbacks,
        })
    }

    /// Register a discovered file. Colliding names are silently dropped
    /// (the first sighting wins).
    pub fn add_item(&self, file: &Path, is_homedir: bool) {
        let item = Arc::new(TrashItem::new(file.to_path_buf(), is_homedir));
        let mut state = self.state.write();
        if state.items.contains_key(item.escaped_name()) {
            return;
        }
        state.items.insert(item.escaped_name().to_string(), Arc::clone(&item));
        state.notifications.push_back(Notification::Create(item));
    }

    /// Remove a file that disappeared. Unknown names are ignored.
    pub fn remove_item(&self, file: &Path, is_homedir: bool) {
        let escaped = escape_name(file, is_homedir);
        let mut state = self.state.write();
        if let Some(item) = state.items.remove(&escaped) {
            state.notifications.push_back(Notification::Delete(item));
        }
    }

    /// Drain queued notifications (outside the lock) and emit the size
    /// change callback iff the count moved since the last thaw.
    pub fn thaw(&self) {
        loop {
            let notification = {
                let mut state = self.state.write();
                match state.notifications.pop_front() {
                    Some(notification) => notification,
                    None => {
                        let size = state.items.len();
                        let changed = state.old_size != size;
                        state.old_size = size;
                        drop(state);
                        if changed {
                            self.callbacks.size_changed();
                        }
                        return;
                    }
                }
            };
            match notification {
                Notification::Create(item) => self.callbacks.item_created(&item),
                Notification::Delete(item) => self.callbacks.item_deleted(&item),
            }
        }
    }

    pub fn lookup(&self, escaped: &str) -> Option<Arc<TrashItem>> {
        self.state.read().items.get(escaped).cloned()
    }

    pub fn items(&self) -> Vec<Arc<TrashItem>> {
        let mut items: Vec<Arc<TrashItem>> = self.state.read().items.values().cloned().collect();
        items.sort_by(|a, b| a.escaped_name.cmp(&b.escaped_name));
        items
    }

    pub fn len(&self) -> usize {
        self.state.read().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Permanently delete a trashed item.
    ///
    /// The item is renamed into the sibling `expunged/` directory under a
    /// random numeric name (retrying on collisions), its sidecar is
    /// removed, and the actual recursive deletion happens on the
    /// background expunge worker.
    pub fn delete_item(&self, item: &Arc<TrashItem>) -> VfsResult<()> {
        let trash_dir = item
            .file
            .parent()
            .and_then(Path::parent)
            .ok_or_else(|| VfsError::new(ErrorKind::Failed, "item has no trash directory"))?;
        let expunged = trash_dir.join("expunged");
        if let Err(e) = std::fs::create_dir_all(&expunged) {
            debug!("cannot create {}: {e}", expunged.display());
        }

        let unique: u32 = rand::random();
        let mut moved = false;
        for attempt in 0..1000u32 {
            let dest = expunged.join(unique.wrapping_add(attempt).to_string());
            if std::fs::rename(&item.file, &dest).is_ok() {
                moved = true;
                break;
            }
        }
        if !moved {
            return Err(VfsError::new(
                ErrorKind::Failed,
                "Failed to delete the item from the trash",
            ));
        }

        self.forget(item);
        schedule_expunge(expunged);
        self.thaw();
        Ok(())
    }

    /// Move a trashed item back out to `dest` (no copy fallback) and
    /// drop it from the aggregate.
    pub fn restore_item(&self, item: &Arc<TrashItem>, dest: &Path) -> VfsResult<()> {
        std::fs::rename(&item.file, dest).map_err(VfsError::from)?;
        self.forget(item);
        self.thaw();
        Ok(())
    }

    /// Post-move bookkeeping shared by delete and restore: drop the
    /// sidecar and the map entry (queueing the delete notification).
    fn forget(&self, item: &Arc<TrashItem>) {
        if let Some(sidecar) = trashinfo_path_for(&item.file) {
            let _ = std::fs::remove_file(sidecar);
        }
        let mut state = self.state.write();
        if let Some(known) = state.items.remove(&item.escaped_name) {
            state.notifications.push_back(Notification::Delete(known));
        }
    }
}

#[cfg(test)]
#[path = "root_tests.rs"]
mod tests;
