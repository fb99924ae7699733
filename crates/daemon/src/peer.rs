// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon-side connection plumbing: outgoing frames and fd sending.

use std::os::fd::{AsFd, OwnedFd};
use std::os::unix::net::UnixStream as StdUnixStream;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::AsyncWrite;
use tracing::debug;

use fsbus_core::sys::send_fd;
use fsbus_core::{ErrorKind, VfsError, VfsResult};
use fsbus_wire::{encode, write_message, Envelope, Message};

/// Serialized writer for one connection: replies and signals share the
/// same serial sequence.
pub struct PeerSink<W> {
    writer: tokio::sync::Mutex<W>,
    serial: AtomicU32,
}

impl<W: AsyncWrite + Unpin + Send> PeerSink<W> {
    pub fn new(writer: W) -> Arc<Self> {
        Arc::new(Self { writer: tokio::sync::Mutex::new(writer), serial: AtomicU32::new(1) })
    }

    /// Send one message with a fresh serial. Errors are reported but the
    /// caller usually cannot do more than drop the connection.
    pub async fn send(&self, body: Message) -> VfsResult<()> {
        let envelope = Envelope { serial: self.serial.fetch_add(1, Ordering::Relaxed), body };
        let bytes = encode(&envelope)
            .map_err(|e| VfsError::new(ErrorKind::Failed, format!("encode failed: {e}")))?;
        let mut writer = self.writer.lock().await;
        write_message(&mut *writer, &bytes)
            .await
            .map_err(|e| VfsError::new(ErrorKind::Failed, format!("send failed: {e}")))
    }
}

struct FdSenderInner {
    sock: StdUnixStream,
    next_fd_id: u32,
}

/// Sending half of an fd side channel.
///
/// The id a caller gets back is assigned under the same lock that ships
/// the fd, so ids and socket order can never diverge.
#[derive(Clone)]
pub struct FdSender {
    inner: Arc<Mutex<FdSenderInner>>,
}

impl FdSender {
    pub fn new(sock: StdUnixStream) -> Self {
        Self { inner: Arc::new(Mutex::new(FdSenderInner { sock, next_fd_id: 0 })) }
    }

    /// Ship `fd` and return the id the receiver will know it by. The fd
    /// is consumed; the kernel keeps it alive for the receiver.
    pub fn send(&self, fd: OwnedFd) -> std::io::Result<u32> {
        let mut inner = self.inner.lock();
        send_fd(inner.sock.as_fd(), fd.as_fd())?;
        let fd_id = inner.next_fd_id;
        inner.next_fd_id += 1;
        debug!(fd_id, "sent fd on side channel");
        Ok(fd_id)
    }
}

#[cfg(test)]
#[path = "peer_tests.rs"]
mod tests;
