// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The mount tracker service.
//!
//! Process-wide registry of live mounts, served on the session socket.
//! Backends register over a connection they keep open; when it closes,
//! every mount registered over it is swept and `Unmounted` is emitted,
//! which is how backend death propagates to clients.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, info, warn};

use fsbus_core::{ErrorKind, MountInfo, VfsError, VfsResult};
use fsbus_wire::{
    read_message, Envelope, Message, Method, MountableInfo, Reply, SignalEvent,
    TRACKER_OBJECT_PATH,
};

use crate::peer::PeerSink;

type Sink = Arc<PeerSink<tokio::net::unix::OwnedWriteHalf>>;

struct Registration {
    owner: u64,
    info: MountInfo,
}

struct TrackerState {
    mounts: Vec<Registration>,
    subscribers: HashMap<u64, Sink>,
    /// Root directory advertised by the FUSE bridge via `RegisterFuse`.
    fuse_root: Option<String>,
}

/// The tracker service plus its static mountable table.
pub struct MountTracker {
    state: Mutex<TrackerState>,
    mountables: Vec<MountableInfo>,
    next_conn_id: AtomicU64,
}

impl MountTracker {
    pub fn new(mountables: Vec<MountableInfo>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(TrackerState {
                mounts: Vec::new(),
                subscribers: HashMap::new(),
                fuse_root: None,
            }),
            mountables,
            next_conn_id: AtomicU64::new(1),
        })
    }

    /// Serve the session socket forever.
    pub async fn serve(self: Arc<Self>, listener: UnixListener) -> VfsResult<()> {
        info!("mount tracker serving");
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let tracker = Arc::clone(&self);
                    tokio::spawn(async move {
                        tracker.serve_connection(stream).await;
                    });
                }
                Err(e) => warn!("tracker accept error: {e}"),
            }
        }
    }

    async fn serve_connection(self: Arc<Self>, stream: UnixStream) {
        let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        let (mut reader, writer) = stream.into_split();
        let sink = PeerSink::new(writer);

        self.state.lock().subscribers.insert(conn_id, Arc::clone(&sink));

        loop {
            let frame = match read_message(&mut reader).await {
                Ok(frame) => frame,
                Err(e) => {
                    debug!(conn_id, "tracker connection closed: {e}");
                    break;
                }
            };
            let envelope: Envelope = match fsbus_wire::decode(&frame) {
                Ok(env) => env,
                Err(e) => {
                    warn!(conn_id, "bad tracker frame: {e}");
                    break;
                }
            };
            let Message::Call { object_path, method } = envelope.body else {
                continue;
            };
            if object_path != TRACKER_OBJECT_PATH {
                let err = VfsError::new(
                    ErrorKind::NotFound,
                    format!("tracker serves no object at {object_path}"),
                );
                if sink.send(Message::error_for(envelope.serial, &err)).await.is_err() {
                    break;
                }
                continue;
            }

            let result = self.handle_method(conn_id, method);
            let message = match result {
                Ok(payload) => Message::Reply { reply_serial: envelope.serial, payload },
                Err(ref err) => Message::error_for(envelope.serial, err),
            };
            if sink.send(message).await.is_err() {
                break;
            }
        }

        // The NameOwnerChanged analogue: the owner vanished, its mounts
        // go with it.
        self.sweep_connection(conn_id);
    }

    fn handle_method(&self, conn_id: u64, method: Method) -> VfsResult<Reply> {
        match method {
            Method::LookupMount { spec, path } => {
                let spec = spec.into_mount_spec();
                let path = String::from_utf8_lossy(path.as_bytes()).into_owned();
                self.lookup(&spec, &path)
                    .map(|info| Reply::Mount { info })
                    .ok_or_else(|| VfsError::new(ErrorKind::NotMounted, "location is not mounted"))
            }
            Method::LookupMountByFusePath { path } => {
                let path = String::from_utf8_lossy(path.as_bytes()).into_owned();
                self.lookup_by_fuse_path(&path)
                    .map(|info| Reply::Mount { info })
                    .ok_or_else(|| VfsError::new(ErrorKind::NotMounted, "location is not mounted"))
            }
            Method::ListMounts => {
                let state = self.state.lock();
                Ok(Reply::Mounts {
                    mounts: state.mounts.iter().map(|r| r.info.clone()).collect(),
                })
            }
            Method::ListMountableInfo => {
                Ok(Reply::Mountables { mountables: self.mountables.clone() })
            }
            Method::RegisterMount { info } => {
                self.register_mount(conn_id, info);
                Ok(Reply::Unit)
            }
            Method::UnregisterMount { object_path } => {
                self.unregister_mount(conn_id, &object_path);
                Ok(Reply::Unit)
            }
            Method::RegisterFuse { fuse_mountpoint } => {
                self.state.lock().fuse_root = Some(fuse_mountpoint);
                Ok(Reply::Unit)
            }
            other => Err(VfsError::new(
                ErrorKind::NotSupported,
                format!("tracker does not implement {}", other.name()),
            )),
        }
    }

    /// Best match: equal item sets, then the longest mount prefix.
    fn lookup(&self, spec: &fsbus_core::spec::MountSpec, path: &str) -> Option<MountInfo> {
        let state = self.state.lock();
        state
            .mounts
            .iter()
            .filter(|r| r.info.spec.matches(spec, path))
            .max_by_key(|r| r.info.spec.mount_prefix().len())
            .map(|r| r.info.clone())
    }

    fn lookup_by_fuse_path(&self, path: &str) -> Option<MountInfo> {
        let state = self.state.lock();
        state
            .mounts
            .iter()
            .filter_map(|r| {
                let mountpoint = r.info.fuse_mountpoint.as_deref()?;
                fsbus_core::spec::path_has_prefix(path, mountpoint)
                    .then_some((mountpoint.len(), &r.info))
            })
            .max_by_key(|(len, _)| *len)
            .map(|(_, info)| info.clone())
    }

    fn register_mount(&self, conn_id: u64, mut info: MountInfo) {
        let mut state = self.state.lock();

        if info.fuse_mountpoint.is_none() {
            if let Some(root) = &state.fuse_root {
                info.fuse_mountpoint = Some(format!("{root}/{}", info.stable_name));
            }
        }

        // Re-registration of the same instance replaces the record.
        state.mounts.retain(|r| !r.info.same_mount(&info));
        state.mounts.push(Registration { owner: conn_id, info: info.clone() });
        state
            .mounts
            .sort_by(|a, b| {
                (&a.info.stable_name, &a.info.endpoint, &a.info.object_path).cmp(&(
                    &b.info.stable_name,
                    &b.info.endpoint,
                    &b.info.object_path,
                ))
            });

        info!(mount = %info.display_name, endpoint = %info.endpoint, "mount registered");
        self.broadcast(&state, SignalEvent::Mounted { info });
    }

    fn unregister_mount(&self, conn_id: u64, object_path: &str) {
        let mut state = self.state.lock();
        let mut removed = Vec::new();
        state.mounts.retain(|r| {
            if r.owner == conn_id && r.info.object_path == object_path {
                removed.push(r.info.clone());
                false
            } else {
                true
            }
        });
        for info in removed {
            info!(mount = %info.display_name, "mount unregistered");
            self.broadcast(&state, SignalEvent::Unmounted { info });
        }
    }

    fn sweep_connection(&self, conn_id: u64) {
        let mut state = self.state.lock();
        state.subscribers.remove(&conn_id);
        let mut dead = Vec::new();
        state.mounts.retain(|r| {
            if r.owner == conn_id {
                dead.push(r.info.clone());
                false
            } else {
                true
            }
        });
        for info in dead {
            info!(mount = %info.display_name, "owner died, unmounting");
            self.broadcast(&state, SignalEvent::Unmounted { info });
        }
    }

    fn broadcast(&self, state: &TrackerState, event: SignalEvent) {
        for sink in state.subscribers.values() {
            let sink = Arc::clone(sink);
            let message = Message::Signal {
                object_path: TRACKER_OBJECT_PATH.to_string(),
                event: event.clone(),
            };
            tokio::spawn(async move {
                if let Err(e) = sink.send(message).await {
                    debug!("tracker signal dropped: {e}");
                }
            });
        }
    }

    /// Snapshot for tests and diagnostics.
    pub fn mounts(&self) -> Vec<MountInfo> {
        self.state.lock().mounts.iter().map(|r| r.info.clone()).collect()
    }
}

#[cfg(test)]
#[path = "tracker_tests.rs"]
mod tests;
