// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! fsbus-trash: the aggregated trash core.
//!
//! Implements the cross-volume trash view: one [`TrashRoot`] holds every
//! discovered item under a unique escaped name, a [`TrashWatcher`] keeps
//! per-volume `files/` directories under observation through existence
//! chains ([`DirWatch`]), and a background worker expunges deleted items.
//!
//! The crate is runtime-agnostic: it uses plain threads and channels, and
//! all filesystem change notification goes through the [`MonitorBackend`]
//! adapter (the `notify` crate in production, a fake in tests).

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod dir;
mod dirwatch;
mod escape;
mod expunge;
mod fsmon;
mod info;
mod root;
mod watcher;

pub use dir::{set_trash_dir_hook, TrashDir};
pub use dirwatch::{DirWatch, WatchOutcome};
pub use escape::escape_name;
pub use expunge::schedule_expunge;
pub use fsmon::{FsEvent, MonitorBackend, NotifyBackend, TaggedEvent, WatchHandle};
pub use info::{read_trashinfo_for, write_trashinfo, TrashInfo};
pub use root::{TrashCallbacks, TrashItem, TrashRoot};
pub use watcher::{decide_watch_type, TrashWatcher, WatchType, WatcherPaths};

#[cfg(any(test, feature = "test-support"))]
pub use fsmon::FakeMonitorBackend;
