// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One watched `files/` directory.
//!
//! Keeps the sorted list of children it has reported to the root and
//! reconciles it against rescans; monitor-delivered link/unlink events
//! apply directly. A trash files directory should only ever see links
//! and unlinks, so anything else draws a one-shot warning.

use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::sync::{Arc, OnceLock};

use tracing::{debug, warn};

use crate::dirwatch::{DirWatch, WatchOutcome};
use crate::fsmon::{next_tag, FsEvent, MonitorBackend, TaggedEvent, WatchHandle};
use crate::root::TrashRoot;

type DirHook = Box<dyn Fn(&Path) + Send + Sync>;

static DIR_HOOK: OnceLock<DirHook> = OnceLock::new();

/// Install a hook invoked with every trash directory the watcher starts
/// tracking. Used by embedders that surface per-volume trash locations;
/// may be set at most once.
pub fn set_trash_dir_hook(hook: impl Fn(&Path) + Send + Sync + 'static) {
    let _ = DIR_HOOK.set(Box::new(hook));
}

/// One `.../files/` directory feeding the aggregate.
pub struct TrashDir {
    root: Arc<TrashRoot>,
    backend: Arc<dyn MonitorBackend>,
    sink: Sender<TaggedEvent>,
    directory: PathBuf,
    topdir: PathBuf,
    is_homedir: bool,
    watch: Option<DirWatch>,
    monitor: Option<Box<dyn WatchHandle>>,
    monitor_tag: Option<u64>,
    /// Children currently reported to the root, sorted by basename.
    items: Vec<PathBuf>,
    warned_unexpected: bool,
}

impl TrashDir {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        root: Arc<TrashRoot>,
        backend: Arc<dyn MonitorBackend>,
        sink: Sender<TaggedEvent>,
        watching: bool,
        is_homedir: bool,
        topdir: &Path,
        rel: &str,
    ) -> Self {
        let mut dir = Self {
            root,
            backend,
            sink,
            directory: topdir.join(rel),
            topdir: topdir.to_path_buf(),
            is_homedir,
            watch: None,
            monitor: None,
            monitor_tag: None,
            items: Vec::new(),
            warned_unexpected: false,
        };

        if let Some(hook) = DIR_HOOK.get() {
            hook(&dir.directory);
        }

        if watching {
            dir.watch();
        }
        dir
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Start monitoring after a period of not monitoring.
    ///
    /// If the chain already exists the initial `Created` installs the
    /// directory monitor and enumerates; otherwise any stale items from
    /// the unmonitored period have to go.
    pub fn watch(&mut self) {
        debug_assert!(self.watch.is_none());
        debug_assert!(self.monitor.is_none());

        let (watch, initial) = DirWatch::new(
            Arc::clone(&self.backend),
            self.sink.clone(),
            &self.topdir,
            &self.directory,
        );
        self.watch = Some(watch);

        match initial {
            Some(outcome) => self.handle_outcome(outcome),
            None => self.set_files(Vec::new()),
        }
    }

    /// Stop monitoring; in all cases, just fall silent.
    pub fn unwatch(&mut self) {
        debug_assert!(self.watch.is_some());
        self.monitor = None;
        self.monitor_tag = None;
        self.watch = None;
    }

    pub fn is_watching(&self) -> bool {
        self.watch.is_some()
    }

    /// Bring the root in line with the directory's current contents.
    pub fn rescan(&mut self) {
        if let Some(mut watch) = self.watch.take() {
            let outcome = watch.check();
            self.watch = Some(watch);
            if let Some(outcome) = outcome {
                self.handle_outcome(outcome);
            }
            return;
        }

        if self.chain_exists() {
            let files = self.enumerate();
            self.set_files(files);
        } else {
            self.set_files(Vec::new());
        }
    }

    /// Route one monitor event. Returns false when the tag is not ours.
    pub fn handle_event(&mut self, tag: u64, event: &FsEvent) -> bool {
        if self.monitor_tag == Some(tag) {
            self.apply_directory_event(event);
            return true;
        }

        let owns = self.watch.as_ref().map_or(false, |w| w.owns_tag(tag));
        if owns {
            let outcome = self
                .watch
                .as_mut()
                .and_then(|watch| watch.handle_event(tag, event));
            if let Some(outcome) = outcome {
                self.handle_outcome(outcome);
            }
            return true;
        }

        false
    }

    fn apply_directory_event(&mut self, event: &FsEvent) {
        match event {
            FsEvent::Created(path) => {
                self.track(path.clone());
                self.root.add_item(path, self.is_homedir);
            }
            FsEvent::Deleted(path) => {
                self.untrack(path);
                self.root.remove_item(path, self.is_homedir);
            }
            FsEvent::Other(path) => {
                if !self.warned_unexpected {
                    warn!(
                        "unsupported operation detected on trash directory {}: a files/ \
                         directory should only have entries linked or unlinked ({})",
                        self.directory.display(),
                        path.display()
                    );
                    self.warned_unexpected = true;
                }
            }
        }
        self.root.thaw();
    }

    fn handle_outcome(&mut self, outcome: WatchOutcome) {
        match outcome {
            WatchOutcome::Created => {
                debug_assert!(self.monitor.is_none());
                let tag = next_tag();
                match self.backend.watch(&self.directory, tag, self.sink.clone()) {
                    Ok(handle) => {
                        self.monitor = Some(handle);
                        self.monitor_tag = Some(tag);
                    }
                    Err(e) => {
                        debug!("cannot monitor {}: {e}", self.directory.display());
                    }
                }
                let files = self.enumerate();
                self.set_files(files);
            }
            WatchOutcome::Checked => {
                let files = self.enumerate();
                self.set_files(files);
            }
            WatchOutcome::Destroyed => {
                self.monitor = None;
                self.monitor_tag = None;
                self.set_files(Vec::new());
            }
        }
    }

    fn enumerate(&self) -> Vec<PathBuf> {
        let Ok(entries) = std::fs::read_dir(&self.directory) else {
            return Vec::new();
        };
        entries.flatten().map(|entry| entry.path()).collect()
    }

    /// Sorted-list reconciliation: additions and removals against the
    /// previously reported children, then one thaw.
    fn set_files(&mut self, mut new_items: Vec<PathBuf>) {
        new_items.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        new_items.dedup();

        let mut old_iter = std::mem::take(&mut self.items).into_iter().peekable();
        let mut new_iter = new_items.iter().peekable();

        loop {
            match (old_iter.peek(), new_iter.peek()) {
                (None, None) => break,
                (Some(_), None) => {
                    let old = old_iter.next().unwrap_or_default();
                    self.root.remove_item(&old, self.is_homedir);
                }
                (None, Some(_)) => {
                    if let Some(new) = new_iter.next() {
                        self.root.add_item(new, self.is_homedir);
                    }
                }
                (Some(old), Some(new)) => match old.file_name().cmp(&new.file_name()) {
                    std::cmp::Ordering::Less => {
                        let old = old_iter.next().unwrap_or_default();
                        self.root.remove_item(&old, self.is_homedir);
                    }
                    std::cmp::Ordering::Greater => {
                        if let Some(new) = new_iter.next() {
                            self.root.add_item(new, self.is_homedir);
                        }
                    }
                    std::cmp::Ordering::Equal => {
                        let _ = old_iter.next();
                        let _ = new_iter.next();
                    }
                },
            }
        }

        self.items = new_items;
        self.root.thaw();
    }

    fn track(&mut self, path: PathBuf) {
        if let Err(index) =
            self.items.binary_search_by(|p| p.file_name().cmp(&path.file_name()))
        {
            self.items.insert(index, path);
        }
    }

    fn untrack(&mut self, path: &Path) {
        if let Ok(index) =
            self.items.binary_search_by(|p| p.file_name().cmp(&path.file_name()))
        {
            self.items.remove(index);
        }
    }

    fn chain_exists(&self) -> bool {
        let Ok(rel) = self.directory.strip_prefix(&self.topdir) else {
            return false;
        };
        let mut dir = self.topdir.clone();
        for component in rel.components() {
            dir.push(component);
            let is_dir = std::fs::symlink_metadata(&dir)
                .map(|m| m.file_type().is_dir())
                .unwrap_or(false);
            if !is_dir {
                return false;
            }
        }
        true
    }
}

impl Drop for TrashDir {
    fn drop(&mut self) {
        // Items this directory contributed leave the aggregate with it.
        self.set_files(Vec::new());
    }
}

#[cfg(test)]
#[path = "dir_tests.rs"]
mod tests;
