// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Filesystem change notification adapter.
//!
//! The trash machinery never talks to inotify directly; it watches
//! directories through [`MonitorBackend`] and receives tag-addressed
//! events on a plain channel. Production uses the `notify` crate; tests
//! inject a fake.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::Sender;

use notify::{RecursiveMode, Watcher};
use tracing::{debug, warn};

/// What happened inside a watched directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsEvent {
    Created(PathBuf),
    Deleted(PathBuf),
    /// Anything that is not a link/unlink (content change etc.).
    Other(PathBuf),
}

/// A watch tag plus its event; tags route events back to their watch.
pub type TaggedEvent = (u64, FsEvent);

/// Allocate a process-unique watch tag.
pub fn next_tag() -> u64 {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    NEXT.fetch_add(1, Ordering::Relaxed)
}

/// A live watch; dropping it stops delivery.
pub trait WatchHandle: Send {}

/// Source of directory change events.
pub trait MonitorBackend: Send + Sync {
    /// Watch `dir` (non-recursively); events arrive on `sink` tagged
    /// with `tag`.
    fn watch(
        &self,
        dir: &Path,
        tag: u64,
        sink: Sender<TaggedEvent>,
    ) -> std::io::Result<Box<dyn WatchHandle>>;
}

/// `notify`-based production backend.
pub struct NotifyBackend;

struct NotifyHandle {
    _watcher: notify::RecommendedWatcher,
}

impl WatchHandle for NotifyHandle {}

impl MonitorBackend for NotifyBackend {
    fn watch(
        &self,
        dir: &Path,
        tag: u64,
        sink: Sender<TaggedEvent>,
    ) -> std::io::Result<Box<dyn WatchHandle>> {
        let mut watcher = notify::recommended_watcher(move |result: notify::Result<notify::Event>| {
            let event = match result {
                Ok(event) => event,
                Err(e) => {
                    debug!("watch error: {e}");
                    return;
                }
            };
            for fs_event in translate(&event) {
                if sink.send((tag, fs_event)).is_err() {
                    return;
                }
            }
        })
        .map_err(to_io_error)?;

        watcher.watch(dir, RecursiveMode::NonRecursive).map_err(to_io_error)?;
        Ok(Box::new(NotifyHandle { _watcher: watcher }))
    }
}

/// Collapse notify's event taxonomy into link/unlink/other.
fn translate(event: &notify::Event) -> Vec<FsEvent> {
    use notify::event::{EventKind, ModifyKind, RenameMode};

    match &event.kind {
        EventKind::Create(_) => {
            event.paths.iter().map(|p| FsEvent::Created(p.clone())).collect()
        }
        EventKind::Remove(_) => {
            event.paths.iter().map(|p| FsEvent::Deleted(p.clone())).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            event.paths.iter().map(|p| FsEvent::Deleted(p.clone())).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            event.paths.iter().map(|p| FsEvent::Created(p.clone())).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut out = Vec::new();
            if let Some(from) = event.paths.first() {
                out.push(FsEvent::Deleted(from.clone()));
            }
            if let Some(to) = event.paths.get(1) {
                out.push(FsEvent::Created(to.clone()));
            }
            out
        }
        EventKind::Modify(_) => {
            event.paths.iter().map(|p| FsEvent::Other(p.clone())).collect()
        }
        EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
    }
}

fn to_io_error(err: notify::Error) -> std::io::Error {
    match err.kind {
        notify::ErrorKind::Io(io) => io,
        other => {
            warn!("notify error: {other:?}");
            std::io::Error::other(format!("{other:?}"))
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeMonitorBackend;

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;

    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::Arc;

    struct FakeWatch {
        tag: u64,
        sink: Sender<TaggedEvent>,
        alive: Arc<()>,
    }

    #[derive(Default)]
    struct FakeState {
        watches: HashMap<PathBuf, Vec<FakeWatch>>,
    }

    /// Test backend: watches are recorded, events are injected by hand.
    #[derive(Default)]
    pub struct FakeMonitorBackend {
        state: Mutex<FakeState>,
    }

    pub struct FakeHandle {
        _alive: Arc<()>,
    }

    impl WatchHandle for FakeHandle {}

    impl FakeMonitorBackend {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Deliver an event to every live watch on `dir`.
        pub fn emit(&self, dir: &Path, event: FsEvent) {
            let mut state = self.state.lock();
            if let Some(watches) = state.watches.get_mut(dir) {
                watches.retain(|w| Arc::strong_count(&w.alive) > 1);
                for watch in watches.iter() {
                    let _ = watch.sink.send((watch.tag, event.clone()));
                }
            }
        }

        /// Directories currently under observation.
        pub fn watched_dirs(&self) -> Vec<PathBuf> {
            let mut state = self.state.lock();
            state.watches.retain(|_, watches| {
                watches.retain(|w| Arc::strong_count(&w.alive) > 1);
                !watches.is_empty()
            });
            let mut dirs: Vec<PathBuf> = state.watches.keys().cloned().collect();
            dirs.sort();
            dirs
        }
    }

    impl MonitorBackend for FakeMonitorBackend {
        fn watch(
            &self,
            dir: &Path,
            tag: u64,
            sink: Sender<TaggedEvent>,
        ) -> std::io::Result<Box<dyn WatchHandle>> {
            let alive = Arc::new(());
            self.state.lock().watches.entry(dir.to_path_buf()).or_default().push(FakeWatch {
                tag,
                sink,
                alive: Arc::clone(&alive),
            });
            Ok(Box::new(FakeHandle { _alive: alive }))
        }
    }
}
