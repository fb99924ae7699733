// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cross-thread cancellation tokens.
//!
//! A token pairs an idempotent `cancel()` with a pollable notification fd,
//! so the sync call engine can multiplex cancellation into its `poll(2)`
//! loop and the async engine can await readability of the same fd.

use std::os::fd::{AsFd, BorrowedFd, OwnedFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use nix::fcntl::OFlag;
use nix::unistd::pipe2;

use crate::error::VfsError;

struct CancelInner {
    cancelled: AtomicBool,
    // Read end stays readable forever once the write end has fired.
    read_fd: OwnedFd,
    write_fd: OwnedFd,
}

/// Shared cancellation flag with a pollable wake-up fd.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

impl CancelToken {
    pub fn new() -> Result<Self, VfsError> {
        let (read_fd, write_fd) = pipe2(OFlag::O_CLOEXEC | OFlag::O_NONBLOCK)
            .map_err(|e| VfsError::from(std::io::Error::from(e)))?;
        Ok(Self {
            inner: Arc::new(CancelInner {
                cancelled: AtomicBool::new(false),
                read_fd,
                write_fd,
            }),
        })
    }

    /// Fire the token. Only the first call writes the wake-up byte.
    pub fn cancel(&self) {
        if !self.inner.cancelled.swap(true, Ordering::SeqCst) {
            // One byte is enough; the read end is never drained.
            let _ = nix::unistd::write(self.inner.write_fd.as_fd(), &[0u8]);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Fd that becomes readable once the token has been cancelled.
    pub fn wait_fd(&self) -> BorrowedFd<'_> {
        self.inner.read_fd.as_fd()
    }

    /// Shortcut for the error every cancelled operation reports.
    pub fn check(&self) -> Result<(), VfsError> {
        if self.is_cancelled() {
            Err(VfsError::cancelled())
        } else {
            Ok(())
        }
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken").field("cancelled", &self.is_cancelled()).finish()
    }
}

#[cfg(test)]
#[path = "cancel_tests.rs"]
mod tests;
