// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.

use std::path::PathBuf;
use std::time::Duration;

/// Protocol version (from Cargo.toml)
pub const PROTOCOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Runtime directory for sockets: FSBUS_RUNTIME_DIR > XDG_RUNTIME_DIR/fsbus
/// > ~/.cache/fsbus
pub fn runtime_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("FSBUS_RUNTIME_DIR") {
        return PathBuf::from(dir);
    }
    if let Ok(xdg) = std::env::var("XDG_RUNTIME_DIR") {
        return PathBuf::from(xdg).join("fsbus");
    }
    dirs::cache_dir().unwrap_or_else(std::env::temp_dir).join("fsbus")
}

/// The session bus socket the tracker listens on.
pub fn bus_socket() -> PathBuf {
    if let Ok(path) = std::env::var("FSBUS_SOCKET") {
        return PathBuf::from(path);
    }
    runtime_dir().join("bus.sock")
}

/// Directory holding mountable declaration files (`*.toml`).
pub fn mountable_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("FSBUS_MOUNTABLE_DIR") {
        return PathBuf::from(dir);
    }
    dirs::data_dir().unwrap_or_else(std::env::temp_dir).join("fsbus/mountable")
}

/// Default IPC timeout for daemon-side writes.
pub fn ipc_timeout() -> Duration {
    std::env::var("FSBUS_IPC_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(5))
}
