// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Receiving half of the fd side channel.
//!
//! The sender assigns each fd a monotonically increasing 32-bit id and
//! ships the fds in id order over the side socket. Replies reference fds
//! by id only, so the receiver pairs arrivals with waiters: whichever
//! shows up first parks in the outstanding map.

use std::collections::HashMap;
use std::os::fd::{AsFd, OwnedFd};
use std::os::unix::net::UnixStream;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use fsbus_core::sys::recv_fd;
use fsbus_core::{ErrorKind, VfsError, VfsResult};

enum FdEntry {
    /// Arrived before anyone asked.
    Stored(OwnedFd),
    /// Asked for before it arrived.
    Waiting(oneshot::Sender<OwnedFd>),
}

struct FdTableInner {
    next_fd_id: u32,
    entries: HashMap<u32, FdEntry>,
    closed: bool,
}

/// Outstanding-fd bookkeeping for one peer connection.
///
/// Each received fd is owned by exactly one holder: first the table,
/// then the waiter it is handed to. Closing the table closes whatever
/// it still holds and fails all waiters.
#[derive(Clone)]
pub struct FdTable {
    inner: Arc<Mutex<FdTableInner>>,
}

impl FdTable {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(FdTableInner {
                next_fd_id: 0,
                entries: HashMap::new(),
                closed: false,
            })),
        }
    }

    /// Spawn the receiver thread draining `side` until EOF or teardown.
    pub fn start_receiver(&self, side: UnixStream) {
        let table = self.clone();
        std::thread::Builder::new()
            .name("fsbus-fd-recv".to_string())
            .spawn(move || table.receive_loop(side))
            .map(|_| ())
            .unwrap_or_else(|e| warn!("failed to spawn fd receiver: {e}"));
    }

    fn receive_loop(&self, side: UnixStream) {
        loop {
            match recv_fd(side.as_fd()) {
                Ok(Some(fd)) => self.push(fd),
                Ok(None) => {
                    debug!("fd side channel closed by peer");
                    break;
                }
                Err(e) => {
                    warn!("fd side channel error: {e}");
                    break;
                }
            }
        }
        self.close();
    }

    /// Associate an incoming fd with the next id.
    fn push(&self, fd: OwnedFd) {
        let mut inner = self.inner.lock();
        if inner.closed {
            return;
        }
        let fd_id = inner.next_fd_id;
        inner.next_fd_id += 1;
        match inner.entries.remove(&fd_id) {
            Some(FdEntry::Waiting(waiter)) => {
                // Receiver dropped mid-wait: the fd closes here.
                let _ = waiter.send(fd);
            }
            Some(FdEntry::Stored(_)) | None => {
                inner.entries.insert(fd_id, FdEntry::Stored(fd));
            }
        }
    }

    /// Take the fd with the given id, waiting for it if it has not
    /// arrived yet.
    pub async fn get_fd(&self, fd_id: u32) -> VfsResult<OwnedFd> {
        let rx = {
            let mut inner = self.inner.lock();
            if inner.closed {
                return Err(disconnected());
            }
            match inner.entries.remove(&fd_id) {
                Some(FdEntry::Stored(fd)) => return Ok(fd),
                Some(FdEntry::Waiting(_)) => {
                    return Err(VfsError::new(
                        ErrorKind::Pending,
                        format!("fd {fd_id} already has a waiter"),
                    ));
                }
                None => {
                    let (tx, rx) = oneshot::channel();
                    inner.entries.insert(fd_id, FdEntry::Waiting(tx));
                    rx
                }
            }
        };
        rx.await.map_err(|_| disconnected())
    }

    /// Drop every stored fd and fail every waiter.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        inner.entries.clear();
    }
}

impl Default for FdTable {
    fn default() -> Self {
        Self::new()
    }
}

fn disconnected() -> VfsError {
    VfsError::new(ErrorKind::Failed, "fd side channel disconnected")
}

#[cfg(test)]
#[path = "fdrecv_tests.rs"]
mod tests;
