// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! fsbus-client: the client half of the fabric.
//!
//! A [`VfsClient`] resolves mount specs through the tracker, bootstraps
//! peer connections to backend daemons (with their fd side channels) and
//! issues cancellable calls over them, asynchronously or from plain
//! threads via the per-thread sync engine.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod cache;
mod client;
mod conn;
mod fdrecv;
mod manager;
mod monitor;
mod sync;
mod volume;

pub use cache::MountInfoCache;
pub use client::{default_bus_address, VfsClient};
pub use conn::PeerConnection;
pub use fdrecv::FdTable;
pub use manager::ConnectionManager;
pub use monitor::{MonitorEvent, RemoteMonitor};
pub use volume::{
    DriveRecord, MountRecord, UnionVolumeMonitor, VolumeEvent, VolumeMonitor, VolumeRecord,
};
