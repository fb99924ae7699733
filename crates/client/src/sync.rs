// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The per-thread synchronous call engine.
//!
//! Mirrors the async engine but keeps one peer connection per (thread,
//! endpoint) so the hot path takes no cross-thread locks. Cancellation is
//! multiplexed into a `poll(2)` loop over the connection socket and the
//! token's wait fd; an invalidation-disconnect surfaces as the internal
//! `Retry` sentinel and the engine re-resolves once.

use std::cell::RefCell;
use std::collections::HashMap;
use std::os::fd::{AsFd, OwnedFd};
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::PathBuf;
use std::sync::Arc;

use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use tracing::debug;

use fsbus_core::spec::MountSpec;
use fsbus_core::sys::recv_fd;
use fsbus_core::{CancelToken, ErrorKind, MountInfo, VfsError, VfsResult};
use fsbus_wire::{
    decode, encode, error_from_wire, read_message_sync, write_message_sync, Envelope, Message,
    Method, ProtocolError, Reply, WireMountSpec, WirePath, TRACKER_OBJECT_PATH,
};

use crate::client::{unexpected_reply, VfsClient};
use crate::conn::call_timeout;
use crate::manager::DAEMON_OBJECT_PATH;

/// One synchronous connection: message stream, optional fd side channel,
/// serial counter and the in-order fd bookkeeping.
struct SyncConn {
    stream: StdUnixStream,
    side: Option<StdUnixStream>,
    serial: u32,
    next_fd_id: u32,
    stored_fds: HashMap<u32, OwnedFd>,
}

#[derive(Default)]
struct SyncTables {
    /// Session-bus connections, keyed by socket path.
    bus: HashMap<PathBuf, SyncConn>,
    /// Peer connections, keyed by endpoint id.
    peers: HashMap<String, SyncConn>,
}

thread_local! {
    // Connections are dropped (and thereby closed) on thread exit.
    static TABLES: RefCell<SyncTables> = RefCell::new(SyncTables::default());
}

impl SyncConn {
    fn connect_bus(addr: &PathBuf) -> VfsResult<Self> {
        let stream = StdUnixStream::connect(addr).map_err(|e| {
            VfsError::new(ErrorKind::Failed, format!("cannot reach session bus: {e}"))
        })?;
        Ok(Self { stream, side: None, serial: 0, next_fd_id: 0, stored_fds: HashMap::new() })
    }

    /// Bootstrap a peer connection: `GetConnection` on the public socket,
    /// then connect to the returned message and side addresses.
    fn connect_peer(endpoint: &str) -> VfsResult<Self> {
        let mut public = Self {
            stream: StdUnixStream::connect(endpoint).map_err(|e| {
                VfsError::new(ErrorKind::NotMounted, format!("cannot reach {endpoint}: {e}"))
            })?,
            side: None,
            serial: 0,
            next_fd_id: 0,
            stored_fds: HashMap::new(),
        };

        let reply = public.call(DAEMON_OBJECT_PATH, Method::GetConnection, None)?;
        let (peer_addr, side_addr) = match reply {
            Reply::Connection { peer_addr, side_addr } => (peer_addr, side_addr),
            other => return Err(unexpected_reply("GetConnection", &other)),
        };

        let stream = StdUnixStream::connect(&peer_addr)
            .map_err(|e| VfsError::new(ErrorKind::Failed, format!("peer connect: {e}")))?;
        let side = StdUnixStream::connect(&side_addr)
            .map_err(|e| VfsError::new(ErrorKind::Failed, format!("side connect: {e}")))?;

        Ok(Self {
            stream,
            side: Some(side),
            serial: 0,
            next_fd_id: 0,
            stored_fds: HashMap::new(),
        })
    }

    fn next_serial(&mut self) -> u32 {
        self.serial += 1;
        self.serial
    }

    fn send(&mut self, envelope: &Envelope) -> Result<(), ProtocolError> {
        let bytes = encode(envelope)?;
        write_message_sync(&mut self.stream, &bytes)
    }

    /// Send a call and wait for the matching reply.
    ///
    /// With a cancel token the wait polls the socket against the token's
    /// fd without a deadline (the fd is the way out); without one, the
    /// global call timeout bounds the wait.
    fn call(
        &mut self,
        object_path: &str,
        method: Method,
        cancel: Option<&CancelToken>,
    ) -> VfsResult<Reply> {
        if let Some(token) = cancel {
            token.check()?;
        }

        let serial = self.next_serial();
        let envelope = Envelope {
            serial,
            body: Message::Call { object_path: object_path.to_string(), method },
        };
        self.send(&envelope).map_err(map_protocol_error)?;

        let mut cancel_sent = false;
        loop {
            let stream_ready = self.wait_readable(cancel, cancel_sent)?;

            if !stream_ready {
                // The cancel fd fired; emit the Cancel exactly once and
                // keep waiting for the (now probably Cancelled) reply.
                let cancel_serial = self.next_serial();
                let cancel_env = Envelope {
                    serial: cancel_serial,
                    body: Message::Call {
                        object_path: DAEMON_OBJECT_PATH.to_string(),
                        method: Method::Cancel { serial },
                    },
                };
                self.send(&cancel_env).map_err(map_protocol_error)?;
                cancel_sent = true;
                continue;
            }

            let frame = read_message_sync(&mut self.stream).map_err(map_protocol_error)?;
            let reply: Envelope = decode(&frame).map_err(map_protocol_error)?;
            match reply.body {
                Message::Reply { reply_serial, payload } if reply_serial == serial => {
                    return Ok(payload);
                }
                Message::Error { reply_serial, name, message } if reply_serial == serial => {
                    return Err(error_from_wire(&name, &message));
                }
                Message::Signal { object_path, .. } => {
                    // Sync connections carry no subscriptions.
                    debug!("ignoring signal on sync connection for {object_path}");
                }
                other => debug!("ignoring frame on sync connection: {other:?}"),
            }
        }
    }

    /// Poll until the stream is readable (`Ok(true)`) or the cancel fd
    /// fires (`Ok(false)`).
    fn wait_readable(
        &self,
        cancel: Option<&CancelToken>,
        cancel_sent: bool,
    ) -> VfsResult<bool> {
        match cancel {
            None => {
                let timeout = PollTimeout::try_from(call_timeout().as_millis() as i32)
                    .unwrap_or(PollTimeout::MAX);
                let mut fds = [PollFd::new(self.stream.as_fd(), PollFlags::POLLIN)];
                let n = poll(&mut fds, timeout)
                    .map_err(|e| VfsError::new(ErrorKind::Failed, format!("poll: {e}")))?;
                if n == 0 {
                    return Err(VfsError::new(ErrorKind::TimedOut, "call timed out"));
                }
                // HUP/ERR also count: the read surfaces the condition.
                Ok(true)
            }
            Some(token) => {
                // After the cancel was sent there is nothing more to
                // learn from the token; block on the stream alone.
                if cancel_sent {
                    let mut fds = [PollFd::new(self.stream.as_fd(), PollFlags::POLLIN)];
                    poll(&mut fds, PollTimeout::NONE)
                        .map_err(|e| VfsError::new(ErrorKind::Failed, format!("poll: {e}")))?;
                    return Ok(true);
                }
                let readable = PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR;
                loop {
                    let wait_fd = token.wait_fd();
                    let mut fds = [
                        PollFd::new(self.stream.as_fd(), PollFlags::POLLIN),
                        PollFd::new(wait_fd, PollFlags::POLLIN),
                    ];
                    poll(&mut fds, PollTimeout::NONE)
                        .map_err(|e| VfsError::new(ErrorKind::Failed, format!("poll: {e}")))?;
                    let stream_ready =
                        fds[0].revents().map_or(false, |r| r.intersects(readable));
                    let cancel_ready =
                        fds[1].revents().map_or(false, |r| r.intersects(readable));
                    if stream_ready {
                        return Ok(true);
                    }
                    if cancel_ready {
                        return Ok(false);
                    }
                }
            }
        }
    }

    /// Deliver the fd with the given id from the side socket. Arrivals
    /// are strictly in id order; earlier-arriving fds for later ids are
    /// parked in the stored map.
    fn get_fd(&mut self, fd_id: u32) -> VfsResult<OwnedFd> {
        if let Some(fd) = self.stored_fds.remove(&fd_id) {
            return Ok(fd);
        }
        let side = self.side.as_ref().ok_or_else(|| {
            VfsError::new(ErrorKind::Failed, "connection has no fd side channel")
        })?;
        loop {
            let fd = recv_fd(side.as_fd())
                .map_err(|e| VfsError::new(ErrorKind::Failed, format!("side recv: {e}")))?
                .ok_or_else(|| {
                    VfsError::new(ErrorKind::Failed, "fd side channel disconnected")
                })?;
            let arrived_id = self.next_fd_id;
            self.next_fd_id += 1;
            if arrived_id == fd_id {
                return Ok(fd);
            }
            self.stored_fds.insert(arrived_id, fd);
        }
    }
}

fn map_protocol_error(err: ProtocolError) -> VfsError {
    match err {
        // A dead connection means the cached route is stale. Surface the
        // retry sentinel; the engine loop re-resolves once.
        ProtocolError::ConnectionClosed => VfsError::retry(),
        ProtocolError::Timeout => VfsError::new(ErrorKind::TimedOut, "call timed out"),
        other => VfsError::new(ErrorKind::Failed, other.to_string()),
    }
}

/// Run `f` with the thread's connection for `key`, creating it with
/// `make` on first use. The connection is taken out of the table for the
/// duration of the call; it only goes back if the call left it healthy.
fn with_conn<K, T>(
    pick: impl Fn(&mut SyncTables) -> &mut HashMap<K, SyncConn>,
    key: K,
    make: impl FnOnce() -> VfsResult<SyncConn>,
    f: impl FnOnce(&mut SyncConn) -> VfsResult<T>,
) -> VfsResult<T>
where
    K: std::hash::Hash + Eq + Clone,
{
    let existing = TABLES.with(|tables| pick(&mut tables.borrow_mut()).remove(&key));
    let mut conn = match existing {
        Some(conn) => conn,
        None => make()?,
    };

    let result = f(&mut conn);

    let keep = !matches!(&result, Err(e) if e.is_retry() || e.kind == ErrorKind::Failed);
    if keep {
        TABLES.with(|tables| {
            pick(&mut tables.borrow_mut()).insert(key, conn);
        });
    }
    result
}

impl VfsClient {
    /// Synchronous mirror of [`VfsClient::lookup_mount`], using this
    /// thread's session-bus connection.
    pub fn lookup_mount_sync(&self, spec: &MountSpec, path: &str) -> VfsResult<Arc<MountInfo>> {
        if let Some(info) = self.cache().lookup(spec, path) {
            return Ok(info);
        }

        let addr = self.bus_addr().to_path_buf();
        let reply = with_conn(
            |t| &mut t.bus,
            addr.clone(),
            || SyncConn::connect_bus(&addr),
            |conn| {
                conn.call(
                    TRACKER_OBJECT_PATH,
                    Method::LookupMount {
                        spec: WireMountSpec::from(spec),
                        path: WirePath::from(path),
                    },
                    None,
                )
            },
        )
        // Losing the tracker is not a stale-route condition; the retry
        // sentinel stays between the engine and the backends.
        .map_err(|e| {
            if e.is_retry() {
                VfsError::new(ErrorKind::Failed, "session bus connection lost")
            } else {
                e
            }
        })?;
        match reply {
            Reply::Mount { info } => Ok(self.cache().insert(info)),
            other => Err(unexpected_reply("LookupMount", &other)),
        }
    }

    /// Synchronous mirror of [`VfsClient::call_mount`]. Same retry
    /// policy; suspends the calling thread until reply or cancellation.
    pub fn call_mount_sync(
        &self,
        spec: &MountSpec,
        path: &str,
        method: Method,
        cancel: Option<&CancelToken>,
    ) -> VfsResult<Reply> {
        let mut retried = false;
        loop {
            let info = self.lookup_mount_sync(spec, path)?;
            let endpoint = info.endpoint.clone();
            let result = with_conn(
                |t| &mut t.peers,
                endpoint.clone(),
                || SyncConn::connect_peer(&endpoint),
                |conn| conn.call(&info.object_path, method.clone(), cancel),
            );
            match result {
                Err(e) if e.is_retry() => {
                    self.cache().invalidate(&endpoint);
                    if retried {
                        return Err(VfsError::new(
                            ErrorKind::Failed,
                            "mount kept demanding a retry",
                        ));
                    }
                    retried = true;
                }
                other => return other,
            }
        }
    }

    /// Take an fd announced by a reply from this thread's side channel
    /// for `endpoint`. Suspends on the side-socket recv if the fd has
    /// not arrived yet.
    pub fn get_fd_sync(&self, endpoint: &str, fd_id: u32) -> VfsResult<OwnedFd> {
        with_conn(
            |t| &mut t.peers,
            endpoint.to_string(),
            || SyncConn::connect_peer(endpoint),
            |conn| conn.get_fd(fd_id),
        )
    }
}

#[cfg(test)]
#[path = "sync_tests.rs"]
mod tests;
