// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Method routing and the backend daemon serve loop.
//!
//! `BackendDaemon` owns the public socket a backend daemon answers on.
//! `GetConnection` upgrades a caller to a private peer connection with
//! an fd side channel; every other method is decoded into a job and run
//! through the backend vtable.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, info, warn};

use fsbus_core::{CancelToken, ErrorKind, VfsError, VfsResult};
use fsbus_wire::{read_message, Envelope, Message, Method, Reply};

use crate::backend::{Backend, JobContext, JobOutcome};
use crate::job::{BackendJob, JobHandle};
use crate::monitor::MonitorRegistry;
use crate::peer::{FdSender, PeerSink};

/// Fast-path half of the dispatch table: `(object, method)` → `try_*`.
pub(crate) fn dispatch_try(
    backend: &dyn Backend,
    method: &Method,
    ctx: &JobContext,
) -> Option<JobOutcome> {
    match method {
        Method::Unmount { flags } => backend.try_unmount(*flags, ctx),
        Method::OpenForRead { path } => backend.try_open_for_read(path, ctx),
        Method::OpenForWrite { path, mode, etag, make_backup, flags } => {
            backend.try_open_for_write(path, *mode, etag.as_deref(), *make_backup, *flags, ctx)
        }
        Method::Read { handle, count } => backend.try_read(*handle, *count, ctx),
        Method::Write { handle, data } => backend.try_write(*handle, data, ctx),
        Method::Seek { handle, offset, whence } => {
            backend.try_seek(*handle, *offset, *whence, ctx)
        }
        Method::Close { handle } => backend.try_close(*handle, ctx),
        Method::QueryInfo { path, attributes, flags } => {
            backend.try_query_info(path, attributes, *flags, ctx)
        }
        Method::QueryFsInfo { path, attributes } => {
            backend.try_query_fs_info(path, attributes, ctx)
        }
        Method::Enumerate { path, attributes, flags } => {
            backend.try_enumerate(path, attributes, *flags, ctx)
        }
        Method::SetDisplayName { path, display_name } => {
            backend.try_set_display_name(path, display_name, ctx)
        }
        Method::Delete { path } => backend.try_delete(path, ctx),
        Method::Trash { path } => backend.try_trash(path, ctx),
        Method::MakeDirectory { path } => backend.try_make_directory(path, ctx),
        Method::MakeSymlink { path, target } => backend.try_make_symlink(path, target, ctx),
        Method::Copy { src, dst, flags } => backend.try_copy(src, dst, *flags, ctx),
        Method::Move { src, dst, flags } => backend.try_move_file(src, dst, *flags, ctx),
        Method::Push { dst, local_path, flags, remove_source } => {
            backend.try_push(dst, local_path, *flags, *remove_source, ctx)
        }
        Method::Pull { src, local_path, flags, remove_source } => {
            backend.try_pull(src, local_path, *flags, *remove_source, ctx)
        }
        Method::SetAttribute { path, name, value, flags } => {
            backend.try_set_attribute(path, name, value, *flags, ctx)
        }
        Method::QuerySettableAttributes { path } => {
            backend.try_query_settable_attributes(path, ctx)
        }
        Method::QueryWritableNamespaces { path } => {
            backend.try_query_writable_namespaces(path, ctx)
        }
        Method::CreateDirMonitor { path, flags } => {
            backend.try_create_dir_monitor(path, *flags, ctx)
        }
        Method::CreateFileMonitor { path, flags } => {
            backend.try_create_file_monitor(path, *flags, ctx)
        }
        Method::MountMountable { path } => backend.try_mount_mountable(path, ctx),
        Method::UnmountMountable { path, flags } => {
            backend.try_unmount_mountable(path, *flags, ctx)
        }
        Method::StartMountable { path } => backend.try_start_mountable(path, ctx),
        Method::StopMountable { path, flags } => backend.try_stop_mountable(path, *flags, ctx),
        Method::PollMountable { path } => backend.try_poll_mountable(path, ctx),
        Method::OpenIconForRead { icon_id } => backend.try_open_icon_for_read(icon_id, ctx),
        // Connection-level methods never reach the job path.
        _ => Some(Err(VfsError::new(
            ErrorKind::InvalidArgument,
            format!("{} is not a backend method", method.name()),
        ))),
    }
}

/// Blocking half of the dispatch table.
pub(crate) fn dispatch_run(
    backend: &dyn Backend,
    method: &Method,
    ctx: &JobContext,
) -> JobOutcome {
    match method {
        Method::Unmount { flags } => backend.unmount(*flags, ctx),
        Method::OpenForRead { path } => backend.open_for_read(path, ctx),
        Method::OpenForWrite { path, mode, etag, make_backup, flags } => {
            backend.open_for_write(path, *mode, etag.as_deref(), *make_backup, *flags, ctx)
        }
        Method::Read { handle, count } => backend.read(*handle, *count, ctx),
        Method::Write { handle, data } => backend.write(*handle, data, ctx),
        Method::Seek { handle, offset, whence } => backend.seek(*handle, *offset, *whence, ctx),
        Method::Close { handle } => backend.close(*handle, ctx),
        Method::QueryInfo { path, attributes, flags } => {
            backend.query_info(path, attributes, *flags, ctx)
        }
        Method::QueryFsInfo { path, attributes } => backend.query_fs_info(path, attributes, ctx),
        Method::Enumerate { path, attributes, flags } => {
            backend.enumerate(path, attributes, *flags, ctx)
        }
        Method::SetDisplayName { path, display_name } => {
            backend.set_display_name(path, display_name, ctx)
        }
        Method::Delete { path } => backend.delete(path, ctx),
        Method::Trash { path } => backend.trash(path, ctx),
        Method::MakeDirectory { path } => backend.make_directory(path, ctx),
        Method::MakeSymlink { path, target } => backend.make_symlink(path, target, ctx),
        Method::Copy { src, dst, flags } => backend.copy(src, dst, *flags, ctx),
        Method::Move { src, dst, flags } => backend.move_file(src, dst, *flags, ctx),
        Method::Push { dst, local_path, flags, remove_source } => {
            backend.push(dst, local_path, *flags, *remove_source, ctx)
        }
        Method::Pull { src, local_path, flags, remove_source } => {
            backend.pull(src, local_path, *flags, *remove_source, ctx)
        }
        Method::SetAttribute { path, name, value, flags } => {
            backend.set_attribute(path, name, value, *flags, ctx)
        }
        Method::QuerySettableAttributes { path } => backend.query_settable_attributes(path, ctx),
        Method::QueryWritableNamespaces { path } => backend.query_writable_namespaces(path, ctx),
        Method::CreateDirMonitor { path, flags } => backend.create_dir_monitor(path, *flags, ctx),
        Method::CreateFileMonitor { path, flags } => {
            backend.create_file_monitor(path, *flags, ctx)
        }
        Method::MountMountable { path } => backend.mount_mountable(path, ctx),
        Method::UnmountMountable { path, flags } => backend.unmount_mountable(path, *flags, ctx),
        Method::StartMountable { path } => backend.start_mountable(path, ctx),
        Method::StopMountable { path, flags } => backend.stop_mountable(path, *flags, ctx),
        Method::PollMountable { path } => backend.poll_mountable(path, ctx),
        Method::OpenIconForRead { icon_id } => backend.open_icon_for_read(icon_id, ctx),
        _ => Err(VfsError::new(
            ErrorKind::InvalidArgument,
            format!("{} is not a backend method", method.name()),
        )),
    }
}

struct DaemonInner {
    public_addr: PathBuf,
    private_dir: PathBuf,
    objects: Mutex<HashMap<String, Arc<dyn Backend>>>,
    monitors: Arc<MonitorRegistry>,
    next_conn_id: AtomicU64,
    next_private_id: AtomicU64,
}

/// A backend daemon: answers on a public socket and upgrades callers to
/// private peer connections.
#[derive(Clone)]
pub struct BackendDaemon {
    inner: Arc<DaemonInner>,
}

impl BackendDaemon {
    /// `public_addr` is this daemon's endpoint id on the bus; private
    /// peer/side sockets are created next to it. Must be called within
    /// a tokio runtime (the monitor registry captures its handle).
    pub fn new(public_addr: impl Into<PathBuf>) -> Self {
        let public_addr = public_addr.into();
        let private_dir = public_addr
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(std::env::temp_dir);
        Self {
            inner: Arc::new(DaemonInner {
                public_addr,
                private_dir,
                objects: Mutex::new(HashMap::new()),
                monitors: MonitorRegistry::new(),
                next_conn_id: AtomicU64::new(1),
                next_private_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn public_addr(&self) -> &PathBuf {
        &self.inner.public_addr
    }

    pub fn monitors(&self) -> &Arc<MonitorRegistry> {
        &self.inner.monitors
    }

    /// Expose a mounted instance at `object_path`.
    pub fn register_object(&self, object_path: &str, backend: Arc<dyn Backend>) {
        self.inner.objects.lock().insert(object_path.to_string(), backend);
    }

    pub fn unregister_object(&self, object_path: &str) {
        self.inner.objects.lock().remove(object_path);
    }

    /// Bind the public socket and serve forever.
    pub async fn serve(&self) -> VfsResult<()> {
        if let Some(parent) = self.inner.public_addr.parent() {
            std::fs::create_dir_all(parent).map_err(VfsError::from)?;
        }
        let _ = std::fs::remove_file(&self.inner.public_addr);
        let listener = UnixListener::bind(&self.inner.public_addr).map_err(VfsError::from)?;
        info!(addr = %self.inner.public_addr.display(), "backend daemon listening");

        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let daemon = self.clone();
                    tokio::spawn(async move {
                        daemon.serve_connection(stream, None).await;
                    });
                }
                Err(e) => warn!("accept error: {e}"),
            }
        }
    }

    /// Drive one connection (public, or private after `GetConnection`).
    async fn serve_connection(&self, stream: UnixStream, fd_sender: Option<FdSender>) {
        let conn_id = self.inner.next_conn_id.fetch_add(1, Ordering::Relaxed);
        let (mut reader, writer) = stream.into_split();
        let sink = PeerSink::new(writer);
        let cancels: Arc<Mutex<HashMap<u32, JobHandle>>> = Arc::new(Mutex::new(HashMap::new()));

        loop {
            let frame = match read_message(&mut reader).await {
                Ok(frame) => frame,
                Err(e) => {
                    debug!(conn_id, "connection closed: {e}");
                    break;
                }
            };
            let envelope: Envelope = match fsbus_wire::decode(&frame) {
                Ok(env) => env,
                Err(e) => {
                    warn!(conn_id, "bad frame: {e}");
                    break;
                }
            };
            let Message::Call { object_path, method } = envelope.body else {
                debug!(conn_id, "ignoring non-call frame");
                continue;
            };

            match method {
                Method::GetConnection => {
                    let reply = self.handle_get_connection().await;
                    let message = match reply {
                        Ok(payload) => {
                            Message::Reply { reply_serial: envelope.serial, payload }
                        }
                        Err(ref err) => Message::error_for(envelope.serial, err),
                    };
                    if sink.send(message).await.is_err() {
                        break;
                    }
                }
                Method::Cancel { serial } => {
                    if let Some(handle) = cancels.lock().get(&serial) {
                        debug!(conn_id, serial, "cancelling job");
                        // Flips the job's token and moves a running job
                        // into the cancelling state.
                        handle.cancel();
                    }
                    // Fire-and-forget: no reply, even for unknown serials.
                }
                Method::MonitorSubscribe { object_path: monitor_path } => {
                    let ok = self.inner.monitors.subscribe(
                        &monitor_path,
                        conn_id,
                        Arc::clone(&sink),
                    );
                    let message = if ok {
                        Message::Reply { reply_serial: envelope.serial, payload: Reply::Unit }
                    } else {
                        Message::error_for(
                            envelope.serial,
                            &VfsError::new(ErrorKind::NotFound, "no such monitor"),
                        )
                    };
                    if sink.send(message).await.is_err() {
                        break;
                    }
                }
                Method::MonitorUnsubscribe { object_path: monitor_path } => {
                    self.inner.monitors.unsubscribe(&monitor_path, conn_id);
                    let message =
                        Message::Reply { reply_serial: envelope.serial, payload: Reply::Unit };
                    if sink.send(message).await.is_err() {
                        break;
                    }
                }
                method => {
                    self.spawn_job(
                        envelope.serial,
                        object_path,
                        method,
                        Arc::clone(&sink),
                        fd_sender.clone(),
                        Arc::clone(&cancels),
                    );
                }
            }
        }

        self.inner.monitors.drop_connection(conn_id);
    }

    /// `GetConnection`: create the private socket pair and hand both
    /// addresses back. The sockets are single-use; the acceptor below
    /// unlinks them as soon as the caller has connected.
    fn handle_get_connection(
        &self,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = JobOutcome> + Send + '_>> {
        Box::pin(self.handle_get_connection_inner())
    }

    async fn handle_get_connection_inner(&self) -> JobOutcome {
        let id = self.inner.next_private_id.fetch_add(1, Ordering::Relaxed);
        let pid = std::process::id();
        let peer_path = self.inner.private_dir.join(format!("peer-{pid}-{id}.sock"));
        let side_path = self.inner.private_dir.join(format!("side-{pid}-{id}.sock"));
        let _ = std::fs::remove_file(&peer_path);
        let _ = std::fs::remove_file(&side_path);

        let peer_listener = UnixListener::bind(&peer_path).map_err(VfsError::from)?;
        let side_listener = UnixListener::bind(&side_path).map_err(VfsError::from)?;

        let daemon = self.clone();
        let peer_addr = peer_path.display().to_string();
        let side_addr = side_path.display().to_string();
        tokio::spawn(async move {
            let accept_both = async {
                // Connects land in the listener backlogs, so the order
                // the client dials in does not matter here.
                let (side, _) = side_listener.accept().await?;
                let (peer, _) = peer_listener.accept().await?;
                std::io::Result::Ok((peer, side))
            };
            let accepted =
                tokio::time::timeout(Duration::from_secs(30), accept_both).await;
            let _ = std::fs::remove_file(&peer_path);
            let _ = std::fs::remove_file(&side_path);

            match accepted {
                Ok(Ok((peer, side))) => {
                    let side = match side.into_std().and_then(|s| {
                        s.set_nonblocking(false)?;
                        Ok(s)
                    }) {
                        Ok(side) => side,
                        Err(e) => {
                            warn!("side socket setup failed: {e}");
                            return;
                        }
                    };
                    daemon.serve_connection(peer, Some(FdSender::new(side))).await;
                }
                Ok(Err(e)) => warn!("private socket accept failed: {e}"),
                Err(_) => debug!("caller never connected to private sockets"),
            }
        });

        Ok(Reply::Connection { peer_addr, side_addr })
    }

    fn spawn_job(
        &self,
        serial: u32,
        object_path: String,
        method: Method,
        sink: Arc<PeerSink<tokio::net::unix::OwnedWriteHalf>>,
        fd_sender: Option<FdSender>,
        cancels: Arc<Mutex<HashMap<u32, JobHandle>>>,
    ) {
        let backend = self.inner.objects.lock().get(&object_path).cloned();
        let monitors = Arc::clone(&self.inner.monitors);

        tokio::spawn(async move {
            let Some(backend) = backend else {
                let err =
                    VfsError::new(ErrorKind::NotFound, format!("no object at {object_path}"));
                let _ = sink.send(Message::error_for(serial, &err)).await;
                return;
            };

            let cancel = match CancelToken::new() {
                Ok(token) => token,
                Err(err) => {
                    let _ = sink.send(Message::error_for(serial, &err)).await;
                    return;
                }
            };

            let ctx = JobContext::new(serial, object_path, cancel, fd_sender, monitors);
            let mut job = BackendJob::new(backend, method, ctx);
            cancels.lock().insert(serial, job.handle());

            let outcome = match job.try_fast() {
                Some(outcome) => outcome,
                None => {
                    let handle = tokio::task::spawn_blocking(move || {
                        let outcome = job.run_blocking();
                        (job, outcome)
                    });
                    match handle.await {
                        Ok((finished, outcome)) => {
                            job = finished;
                            outcome
                        }
                        Err(e) => {
                            cancels.lock().remove(&serial);
                            let err = VfsError::new(
                                ErrorKind::Failed,
                                format!("job execution failed: {e}"),
                            );
                            let _ = sink.send(Message::error_for(serial, &err)).await;
                            return;
                        }
                    }
                }
            };

            cancels.lock().remove(&serial);
            if let Some(message) = job.create_reply(&outcome) {
                if let Err(e) = sink.send(message).await {
                    debug!("reply dropped: {e}");
                }
            }
            job.finalize();
        });
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
