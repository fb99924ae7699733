// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One peer connection to a backend daemon.
//!
//! Owns the framed message stream, the serial counter, the pending-reply
//! map and the fd side channel. A reader task matches replies to calls
//! by serial and routes signals by object path; disconnect fails every
//! in-flight call and tears the fd table down.

use std::collections::HashMap;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::unix::AsyncFd;
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::UnixStream;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use fsbus_core::{CancelToken, ErrorKind, VfsError, VfsResult};
use fsbus_wire::{
    encode, error_from_wire, read_message, write_message, Envelope, Message, Method, Reply,
    SignalEvent,
};

use crate::fdrecv::FdTable;

/// Default RPC timeout, overridable via `FSBUS_CALL_TIMEOUT_MS`.
pub(crate) fn call_timeout() -> Duration {
    std::env::var("FSBUS_CALL_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(25))
}

type PendingSender = oneshot::Sender<VfsResult<Reply>>;

struct Pending {
    map: HashMap<u32, PendingSender>,
    /// Set once the connection is dead; later calls fail immediately.
    dead: Option<VfsError>,
}

impl std::fmt::Debug for PeerConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerConnection").field("endpoint", &self.endpoint).finish_non_exhaustive()
    }
}

/// Client side of a private backend connection plus its fd channel.
pub struct PeerConnection {
    endpoint: String,
    writer: tokio::sync::Mutex<OwnedWriteHalf>,
    serial: AtomicU32,
    pending: Mutex<Pending>,
    signals: Mutex<HashMap<String, mpsc::UnboundedSender<SignalEvent>>>,
    fds: FdTable,
    /// Wakes the reader task for an orderly local shutdown.
    shutdown: tokio::sync::Notify,
}

impl PeerConnection {
    /// Wrap an established socket (plus the fd side socket for full peer
    /// connections) and start the reader task and fd receiver thread.
    /// `on_disconnect` runs once when the message stream dies.
    pub(crate) fn start(
        endpoint: String,
        stream: UnixStream,
        side: Option<StdUnixStream>,
        on_disconnect: Box<dyn Fn(&str) + Send + Sync>,
    ) -> Arc<Self> {
        let (mut reader, writer) = stream.into_split();

        let fds = FdTable::new();
        if let Some(side) = side {
            fds.start_receiver(side);
        }

        let conn = Arc::new(Self {
            endpoint,
            writer: tokio::sync::Mutex::new(writer),
            serial: AtomicU32::new(1),
            pending: Mutex::new(Pending { map: HashMap::new(), dead: None }),
            signals: Mutex::new(HashMap::new()),
            fds,
            shutdown: tokio::sync::Notify::new(),
        });

        let reader_conn = Arc::clone(&conn);
        tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    frame = read_message(&mut reader) => frame,
                    _ = reader_conn.shutdown.notified() => {
                        debug!(endpoint = %reader_conn.endpoint, "peer connection closed locally");
                        break;
                    }
                };
                let frame = match frame {
                    Ok(frame) => frame,
                    Err(e) => {
                        debug!(endpoint = %reader_conn.endpoint, "peer connection closed: {e}");
                        break;
                    }
                };
                let envelope: Envelope = match fsbus_wire::decode(&frame) {
                    Ok(env) => env,
                    Err(e) => {
                        warn!(endpoint = %reader_conn.endpoint, "bad frame on peer connection: {e}");
                        break;
                    }
                };
                reader_conn.dispatch(envelope);
            }
            reader_conn.fail_all(VfsError::new(
                ErrorKind::Failed,
                format!("connection to {} was disconnected", reader_conn.endpoint),
            ));
            on_disconnect(&reader_conn.endpoint);
        });

        conn
    }

    /// Ask the reader task to wind the connection down. The socket fully
    /// closes once the last handle drops; in-flight calls fail with a
    /// disconnect error.
    pub fn close(&self) {
        self.shutdown.notify_one();
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn fds(&self) -> &FdTable {
        &self.fds
    }

    fn dispatch(&self, envelope: Envelope) {
        match envelope.body {
            Message::Reply { reply_serial, payload } => {
                if let Some(tx) = self.pending.lock().map.remove(&reply_serial) {
                    let _ = tx.send(Ok(payload));
                } else {
                    debug!("reply for unknown serial {reply_serial}");
                }
            }
            Message::Error { reply_serial, name, message } => {
                if let Some(tx) = self.pending.lock().map.remove(&reply_serial) {
                    let _ = tx.send(Err(error_from_wire(&name, &message)));
                } else {
                    debug!("error reply for unknown serial {reply_serial}");
                }
            }
            Message::Signal { object_path, event } => {
                let mut signals = self.signals.lock();
                let delivered = match signals.get(&object_path) {
                    Some(tx) => tx.send(event).is_ok(),
                    None => false,
                };
                if !delivered {
                    // Stale subscription: the receiver is gone.
                    signals.remove(&object_path);
                }
            }
            Message::Call { object_path, method } => {
                debug!("unexpected incoming call {} on {object_path}", method.name());
            }
        }
    }

    /// Fail every in-flight call and poison the connection.
    fn fail_all(&self, err: VfsError) {
        let mut pending = self.pending.lock();
        pending.dead = Some(err.clone());
        for (_, tx) in pending.map.drain() {
            let _ = tx.send(Err(err.clone()));
        }
        drop(pending);
        self.signals.lock().clear();
        self.fds.close();
    }

    async fn send_envelope(&self, envelope: &Envelope) -> VfsResult<()> {
        let bytes = encode(envelope)
            .map_err(|e| VfsError::new(ErrorKind::Failed, format!("encode failed: {e}")))?;
        let mut writer = self.writer.lock().await;
        write_message(&mut *writer, &bytes)
            .await
            .map_err(|e| VfsError::new(ErrorKind::Failed, format!("send failed: {e}")))
    }

    /// Issue a call and wait for the matching reply.
    ///
    /// With a cancel token, firing the token emits a single
    /// fire-and-forget `Cancel(serial)` to the peer; the call still
    /// completes with whatever the backend replies (normally an error of
    /// kind `Cancelled`). A token fired before the send wins outright.
    pub async fn call(
        &self,
        object_path: &str,
        method: Method,
        cancel: Option<&CancelToken>,
    ) -> VfsResult<Reply> {
        if let Some(token) = cancel {
            token.check()?;
        }

        let serial = self.serial.fetch_add(1, Ordering::Relaxed);
        let fire_and_forget = method.is_fire_and_forget();

        let rx = if fire_and_forget {
            None
        } else {
            let (tx, rx) = oneshot::channel();
            let mut pending = self.pending.lock();
            if let Some(dead) = &pending.dead {
                return Err(dead.clone());
            }
            pending.map.insert(serial, tx);
            Some(rx)
        };

        let envelope = Envelope {
            serial,
            body: Message::Call { object_path: object_path.to_string(), method },
        };
        if let Err(e) = self.send_envelope(&envelope).await {
            self.pending.lock().map.remove(&serial);
            return Err(e);
        }

        let Some(rx) = rx else {
            return Ok(Reply::Unit);
        };

        let result = tokio::time::timeout(call_timeout(), self.await_reply(serial, rx, cancel));
        match result.await {
            Ok(reply) => reply,
            Err(_) => {
                self.pending.lock().map.remove(&serial);
                Err(VfsError::new(ErrorKind::TimedOut, "call timed out"))
            }
        }
    }

    async fn await_reply(
        &self,
        serial: u32,
        mut rx: oneshot::Receiver<VfsResult<Reply>>,
        cancel: Option<&CancelToken>,
    ) -> VfsResult<Reply> {
        let Some(token) = cancel else {
            return flatten_reply(rx.await);
        };

        let wait_fd = token.wait_fd();
        let cancel_fd = AsyncFd::with_interest(wait_fd, tokio::io::Interest::READABLE)
            .map_err(|e| VfsError::new(ErrorKind::Failed, format!("cancel fd: {e}")))?;

        let mut cancel_sent = false;
        loop {
            tokio::select! {
                reply = &mut rx => return flatten_reply(reply),
                ready = cancel_fd.readable(), if !cancel_sent => {
                    let _ = ready;
                    cancel_sent = true;
                    let cancel_serial = self.serial.fetch_add(1, Ordering::Relaxed);
                    let envelope = Envelope {
                        serial: cancel_serial,
                        body: Message::Call {
                            object_path: crate::manager::DAEMON_OBJECT_PATH.to_string(),
                            method: Method::Cancel { serial },
                        },
                    };
                    if let Err(e) = self.send_envelope(&envelope).await {
                        debug!("cancel send failed: {e}");
                    }
                }
            }
        }
    }
}

fn flatten_reply(reply: Result<VfsResult<Reply>, oneshot::error::RecvError>) -> VfsResult<Reply> {
    match reply {
        Ok(result) => result,
        Err(_) => Err(VfsError::new(ErrorKind::Failed, "connection was disconnected")),
    }
}

/// Local signal subscription: frames addressed to `object_path` flow into
/// the returned receiver until [`PeerConnection::unsubscribe`] or
/// disconnect.
impl PeerConnection {
    pub fn subscribe(&self, object_path: &str) -> mpsc::UnboundedReceiver<SignalEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.signals.lock().insert(object_path.to_string(), tx);
        rx
    }

    pub fn unsubscribe(&self, object_path: &str) {
        self.signals.lock().remove(object_path);
    }
}

#[cfg(test)]
#[path = "conn_tests.rs"]
mod tests;
