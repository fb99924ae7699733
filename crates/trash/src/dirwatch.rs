// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Existence-chain watching for one directory under a topdir.
//!
//! A DirWatch reports whether its target directory exists, where
//! "exists" means every component between the topdir (assumed to exist)
//! and the target is a real directory, not a symlink. Each chain level
//! monitors its parent directory, never itself, so removal of the level
//! is observable. Outcomes are edge-triggered: one `Created` per actual
//! appearance, one `Destroyed` per disappearance, never two of the same
//! in a row, and `Created` always precedes `Checked`.

use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::fsmon::{next_tag, FsEvent, MonitorBackend, TaggedEvent, WatchHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchOutcome {
    /// The target directory came into existence.
    Created,
    /// The target directory (or an ancestor) went away.
    Destroyed,
    /// An explicit check found the target still present; the contents
    /// may have changed behind our back.
    Checked,
}

struct Level {
    /// Absolute path of the directory this level stands for.
    dir: PathBuf,
    tag: u64,
    present: bool,
    /// Monitor on this level's parent directory.
    watch: Option<Box<dyn WatchHandle>>,
}

/// One watched directory chain, topdir → target.
pub struct DirWatch {
    backend: Arc<dyn MonitorBackend>,
    sink: Sender<TaggedEvent>,
    topdir: PathBuf,
    levels: Vec<Level>,
}

/// A directory, not following symlinks. Transient stat errors count as
/// "does not exist".
fn dir_exists(path: &Path) -> bool {
    std::fs::symlink_metadata(path).map(|m| m.file_type().is_dir()).unwrap_or(false)
}

impl DirWatch {
    /// Watch `target` relative to `topdir`. The initial outcome is
    /// `Some(Created)` when the whole chain already exists; a target
    /// equal to the topdir is always present.
    pub fn new(
        backend: Arc<dyn MonitorBackend>,
        sink: Sender<TaggedEvent>,
        topdir: &Path,
        target: &Path,
    ) -> (Self, Option<WatchOutcome>) {
        let mut levels = Vec::new();
        let mut dir = topdir.to_path_buf();
        if let Ok(rel) = target.strip_prefix(topdir) {
            for component in rel.components() {
                dir.push(component);
                levels.push(Level { dir: dir.clone(), tag: next_tag(), present: false, watch: None });
            }
        } else {
            debug!(
                "watch target {} is outside topdir {}",
                target.display(),
                topdir.display()
            );
        }

        let mut watch = Self { backend, sink, topdir: topdir.to_path_buf(), levels };
        let present = watch.reconcile();
        let initial = present.then_some(WatchOutcome::Created);
        (watch, initial)
    }

    /// Whether the target currently counts as existing.
    pub fn target_present(&self) -> bool {
        self.levels.last().map_or(true, |level| level.present)
    }

    /// True if `tag` addresses one of this chain's monitors.
    pub fn owns_tag(&self, tag: u64) -> bool {
        self.levels.iter().any(|level| level.tag == tag)
    }

    fn level_for_tag(&self, tag: u64) -> Option<usize> {
        self.levels.iter().position(|level| level.tag == tag)
    }

    fn install_watch(&mut self, index: usize) {
        let parent =
            if index == 0 { self.topdir.clone() } else { self.levels[index - 1].dir.clone() };
        let level = &mut self.levels[index];
        match self.backend.watch(&parent, level.tag, self.sink.clone()) {
            Ok(handle) => level.watch = Some(handle),
            Err(e) => {
                trace!("cannot monitor {}: {e}", parent.display());
                level.watch = None;
            }
        }
    }

    /// Re-derive presence and monitors for the whole chain from the
    /// filesystem. Returns whether the target is present afterwards.
    fn reconcile(&mut self) -> bool {
        let mut parent_ok = true;
        for i in 0..self.levels.len() {
            if parent_ok {
                if self.levels[i].watch.is_none() {
                    self.install_watch(i);
                }
                self.levels[i].present = dir_exists(&self.levels[i].dir);
            } else {
                // Parent gone: this level cannot exist or be monitored.
                self.levels[i].watch = None;
                self.levels[i].present = false;
            }
            parent_ok = self.levels[i].present;
        }
        self.target_present()
    }

    fn edge(was: bool, now: bool) -> Option<WatchOutcome> {
        match (was, now) {
            (false, true) => Some(WatchOutcome::Created),
            (true, false) => Some(WatchOutcome::Destroyed),
            _ => None,
        }
    }

    /// Feed one monitor event into the chain.
    pub fn handle_event(&mut self, tag: u64, event: &FsEvent) -> Option<WatchOutcome> {
        let index = self.level_for_tag(tag)?;
        let dir = &self.levels[index].dir;
        match event {
            FsEvent::Created(path) if path == dir => {
                if self.levels[index].present {
                    return None;
                }
            }
            FsEvent::Deleted(path) if path == dir => {
                if !self.levels[index].present {
                    return None;
                }
            }
            _ => return None,
        }

        let was = self.target_present();
        let now = self.reconcile();
        Self::edge(was, now)
    }

    /// Emit missed transitions. Called for chains whose notification is
    /// unreliable (network filesystems) or disabled.
    pub fn check(&mut self) -> Option<WatchOutcome> {
        let was = self.target_present();
        let now = self.reconcile();
        match Self::edge(was, now) {
            Some(outcome) => Some(outcome),
            None if now => Some(WatchOutcome::Checked),
            None => None,
        }
    }
}

impl Drop for DirWatch {
    fn drop(&mut self) {
        // Tear monitors down target-first, mirroring construction order.
        while self.levels.pop().is_some() {}
    }
}

#[cfg(test)]
#[path = "dirwatch_tests.rs"]
mod tests;
