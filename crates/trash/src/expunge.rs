// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background expunging of deleted trash items.
//!
//! Scheduling is O(1) and never blocks the caller. At most one worker
//! thread exists; it is spawned lazily, drains the pending set, and
//! exits after an idle minute so a quiet process sheds the thread.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

struct ExpungeState {
    pending: Mutex<Pending>,
    wake: Condvar,
}

struct Pending {
    dirs: HashSet<PathBuf>,
    worker_alive: bool,
}

fn state() -> &'static Arc<ExpungeState> {
    static STATE: OnceLock<Arc<ExpungeState>> = OnceLock::new();
    STATE.get_or_init(|| {
        Arc::new(ExpungeState {
            pending: Mutex::new(Pending { dirs: HashSet::new(), worker_alive: false }),
            wake: Condvar::new(),
        })
    })
}

fn idle_timeout() -> Duration {
    std::env::var("FSBUS_TRASH_EXPUNGE_IDLE_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(60))
}

/// Queue `dir` for recursive emptying. The directory itself survives,
/// so callers may reuse it for the next expunge.
pub fn schedule_expunge(dir: PathBuf) {
    let state = state();
    let mut pending = state.pending.lock();
    pending.dirs.insert(dir);

    if pending.worker_alive {
        state.wake.notify_one();
        return;
    }

    pending.worker_alive = true;
    let spawned = std::thread::Builder::new()
        .name("fsbus-trash-expunge".to_string())
        .spawn(move || worker(&state));
    if let Err(e) = spawned {
        warn!("cannot spawn expunge worker: {e}");
        pending.worker_alive = false;
    }
}

fn worker(state: &ExpungeState) {
    let mut pending = state.pending.lock();
    loop {
        while let Some(dir) = pending.dirs.iter().next().cloned() {
            pending.dirs.remove(&dir);
            // Filesystem work happens outside the lock.
            drop(pending);
            delete_everything_under(&dir);
            pending = state.pending.lock();
        }

        let timed_out = state.wake.wait_for(&mut pending, idle_timeout()).timed_out();
        if timed_out && pending.dirs.is_empty() {
            pending.worker_alive = false;
            debug!("expunge worker idling out");
            return;
        }
    }
}

/// Recursively delete the contents of `directory` (not the directory
/// itself), forcing each level owner-writable first.
fn delete_everything_under(directory: &Path) {
    use std::os::unix::fs::PermissionsExt;

    let _ = std::fs::set_permissions(directory, std::fs::Permissions::from_mode(0o700));

    let Ok(entries) = std::fs::read_dir(directory) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let is_dir = std::fs::symlink_metadata(&path)
            .map(|m| m.file_type().is_dir())
            .unwrap_or(false);
        if is_dir {
            delete_everything_under(&path);
            if let Err(e) = std::fs::remove_dir(&path) {
                debug!("expunge: cannot remove {}: {e}", path.display());
            }
        } else if let Err(e) = std::fs::remove_file(&path) {
            debug!("expunge: cannot remove {}: {e}", path.display());
        }
    }
}

#[cfg(test)]
#[path = "expunge_tests.rs"]
mod tests;
