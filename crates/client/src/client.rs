// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The process-scoped client service.
//!
//! One `VfsClient` per process is the intended shape: it owns the mount
//! info cache, the async connection table and the lazy tracker
//! connection, and it implements the retry-on-invalidation policy for
//! both engines.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tracing::debug;

use fsbus_core::spec::{MountSpec, Spec};
use fsbus_core::{CancelToken, ErrorKind, MountInfo, VfsError, VfsResult};
use fsbus_wire::{Method, Reply, SignalEvent, WireMountSpec, WirePath, TRACKER_OBJECT_PATH};

use crate::cache::MountInfoCache;
use crate::conn::PeerConnection;
use crate::manager::ConnectionManager;

/// Session socket resolution: `FSBUS_SOCKET`, then the runtime dir.
pub fn default_bus_address() -> PathBuf {
    if let Ok(path) = std::env::var("FSBUS_SOCKET") {
        return PathBuf::from(path);
    }
    if let Ok(runtime) = std::env::var("XDG_RUNTIME_DIR") {
        return Path::new(&runtime).join("fsbus/bus.sock");
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    Path::new(&home).join(".cache/fsbus/bus.sock")
}

/// Interned spec handles make the racing-lookup key cheap to hash and
/// compare.
type LookupKey = (Spec, String);
type SharedLookup = Shared<BoxFuture<'static, Result<Arc<MountInfo>, VfsError>>>;

struct ClientInner {
    bus_addr: PathBuf,
    cache: MountInfoCache,
    conns: ConnectionManager,
    bus: Mutex<Option<Arc<PeerConnection>>>,
    /// In-flight tracker lookups, for racing-caller dedup.
    pending_lookups: Mutex<HashMap<LookupKey, SharedLookup>>,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        // Tear the bus connection down so the tracker observes our
        // death; managed peer connections close via their own table.
        if let Some(bus) = self.bus.lock().take() {
            bus.close();
        }
    }
}

/// Client handle; cheap to clone, shared across tasks.
#[derive(Clone)]
pub struct VfsClient {
    inner: Arc<ClientInner>,
}

impl VfsClient {
    pub fn new(bus_addr: impl Into<PathBuf>) -> Self {
        let cache = MountInfoCache::new();
        Self {
            inner: Arc::new(ClientInner {
                bus_addr: bus_addr.into(),
                conns: ConnectionManager::new(cache.clone()),
                cache,
                bus: Mutex::new(None),
                pending_lookups: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn from_env() -> Self {
        Self::new(default_bus_address())
    }

    pub fn cache(&self) -> &MountInfoCache {
        &self.inner.cache
    }

    pub fn bus_addr(&self) -> &Path {
        &self.inner.bus_addr
    }

    /// The lazy tracker connection. Unlike peer connections it has no fd
    /// side channel and no `GetConnection` handshake: the tracker is the
    /// session bus.
    pub async fn bus(&self) -> VfsResult<Arc<PeerConnection>> {
        if let Some(conn) = self.inner.bus.lock().as_ref() {
            return Ok(Arc::clone(conn));
        }

        let stream = UnixStream::connect(&self.inner.bus_addr).await.map_err(|e| {
            VfsError::new(
                ErrorKind::Failed,
                format!("cannot reach session bus at {}: {e}", self.inner.bus_addr.display()),
            )
        })?;

        // Weak: the reader task must not keep the client alive.
        let inner = Arc::downgrade(&self.inner);
        let conn = PeerConnection::start(
            self.inner.bus_addr.display().to_string(),
            stream,
            None,
            Box::new(move |_| {
                if let Some(inner) = inner.upgrade() {
                    *inner.bus.lock() = None;
                }
            }),
        );

        let mut slot = self.inner.bus.lock();
        match slot.as_ref() {
            // Lost a connect race; the winner's connection stays and the
            // loser is closed.
            Some(existing) => {
                conn.close();
                Ok(Arc::clone(existing))
            }
            None => {
                *slot = Some(Arc::clone(&conn));
                Ok(conn)
            }
        }
    }

    /// Resolve `(spec, path)` to a mount, consulting the cache first.
    ///
    /// Racing lookups for the same key share one tracker RPC; the losers
    /// adopt the winner's entry. Failures are not cached.
    pub async fn lookup_mount(&self, spec: &MountSpec, path: &str) -> VfsResult<Arc<MountInfo>> {
        if let Some(info) = self.inner.cache.lookup(spec, path) {
            return Ok(info);
        }

        let key: LookupKey = (Spec::intern(spec), path.to_string());
        let fut = {
            let mut pending = self.inner.pending_lookups.lock();
            if let Some(fut) = pending.get(&key) {
                fut.clone()
            } else {
                let client = self.clone();
                let spec = spec.clone();
                let path = path.to_string();
                let key_for_removal = key.clone();
                let fut: SharedLookup = async move {
                    let result = client.fetch_mount_info(&spec, &path).await;
                    client.inner.pending_lookups.lock().remove(&key_for_removal);
                    result
                }
                .boxed()
                .shared();
                pending.insert(key, fut.clone());
                fut
            }
        };
        fut.await
    }

    async fn fetch_mount_info(&self, spec: &MountSpec, path: &str) -> VfsResult<Arc<MountInfo>> {
        let bus = self.bus().await?;
        let reply = bus
            .call(
                TRACKER_OBJECT_PATH,
                Method::LookupMount {
                    spec: WireMountSpec::from(spec),
                    path: WirePath::from(path),
                },
                None,
            )
            .await?;
        match reply {
            Reply::Mount { info } => Ok(self.inner.cache.insert(info)),
            other => Err(unexpected_reply("LookupMount", &other)),
        }
    }

    /// Find the mount exposing `path` through the FUSE bridge and the
    /// in-mount remainder of the path.
    pub async fn lookup_by_fuse_path(&self, path: &str) -> VfsResult<(Arc<MountInfo>, String)> {
        if let Some(found) = self.inner.cache.lookup_by_fuse_path(path) {
            return Ok(found);
        }

        let bus = self.bus().await?;
        let reply = bus
            .call(
                TRACKER_OBJECT_PATH,
                Method::LookupMountByFusePath { path: WirePath::from(path) },
                None,
            )
            .await?;
        let info = match reply {
            Reply::Mount { info } => self.inner.cache.insert(info),
            other => return Err(unexpected_reply("LookupMountByFusePath", &other)),
        };

        let mountpoint = info.fuse_mountpoint.as_deref().ok_or_else(|| {
            VfsError::new(ErrorKind::NotFound, "mount has no fuse mountpoint")
        })?;
        if !fsbus_core::spec::path_has_prefix(path, mountpoint) {
            // Raced with a fuse re-mount; the record no longer covers us.
            return Err(VfsError::new(ErrorKind::NotFound, "fuse path no longer matches"));
        }
        let remainder = &path[mountpoint.len()..];
        let remainder = if remainder.is_empty() { "/" } else { remainder };
        Ok((info, remainder.to_string()))
    }

    /// Call a method on the mount resolved from `(spec, path)`.
    ///
    /// A single internal `Retry` failure invalidates the endpoint's cache
    /// entries and re-enters once; a second `Retry` becomes `Failed`. The
    /// connection the reply arrived on is returned alongside it so
    /// callers can fetch side-channel fds or subscribe to signals.
    pub async fn call_mount(
        &self,
        spec: &MountSpec,
        path: &str,
        method: Method,
        cancel: Option<&CancelToken>,
    ) -> VfsResult<(Reply, Arc<PeerConnection>)> {
        let mut retried = false;
        loop {
            let info = self.lookup_mount(spec, path).await?;
            let conn = self.inner.conns.get(&info.endpoint).await?;
            match conn.call(&info.object_path, method.clone(), cancel).await {
                Err(e) if e.is_retry() => {
                    if retried {
                        return Err(VfsError::new(
                            ErrorKind::Failed,
                            "mount kept demanding a retry",
                        ));
                    }
                    debug!(endpoint = %info.endpoint, "retrying after cache invalidation");
                    self.inner.cache.invalidate(&info.endpoint);
                    retried = true;
                }
                Err(e) => return Err(e),
                Ok(reply) => return Ok((reply, conn)),
            }
        }
    }

    /// Call a method on a known endpoint, without mount resolution.
    pub async fn call_endpoint(
        &self,
        endpoint: &str,
        object_path: &str,
        method: Method,
        cancel: Option<&CancelToken>,
    ) -> VfsResult<Reply> {
        let conn = self.inner.conns.get(endpoint).await?;
        conn.call(object_path, method, cancel).await
    }

    /// Tracker snapshot of the live mounts.
    pub async fn list_mounts(&self) -> VfsResult<Vec<MountInfo>> {
        let bus = self.bus().await?;
        match bus.call(TRACKER_OBJECT_PATH, Method::ListMounts, None).await? {
            Reply::Mounts { mounts } => Ok(mounts),
            other => Err(unexpected_reply("ListMounts", &other)),
        }
    }

    /// The static mountable declarations table.
    pub async fn list_mountable_info(&self) -> VfsResult<Vec<fsbus_wire::MountableInfo>> {
        let bus = self.bus().await?;
        match bus.call(TRACKER_OBJECT_PATH, Method::ListMountableInfo, None).await? {
            Reply::Mountables { mountables } => Ok(mountables),
            other => Err(unexpected_reply("ListMountableInfo", &other)),
        }
    }

    /// Register a mount with the tracker. The registration lives as long
    /// as this client's bus connection: daemons keep theirs open so the
    /// tracker can sweep their mounts when they die.
    pub async fn register_mount(&self, info: MountInfo) -> VfsResult<()> {
        let bus = self.bus().await?;
        match bus.call(TRACKER_OBJECT_PATH, Method::RegisterMount { info }, None).await? {
            Reply::Unit => Ok(()),
            other => Err(unexpected_reply("RegisterMount", &other)),
        }
    }

    pub async fn unregister_mount(&self, object_path: &str) -> VfsResult<()> {
        let bus = self.bus().await?;
        let method = Method::UnregisterMount { object_path: object_path.to_string() };
        match bus.call(TRACKER_OBJECT_PATH, method, None).await? {
            Reply::Unit => Ok(()),
            other => Err(unexpected_reply("UnregisterMount", &other)),
        }
    }

    pub async fn register_fuse(&self, fuse_mountpoint: &str) -> VfsResult<()> {
        let bus = self.bus().await?;
        let method = Method::RegisterFuse { fuse_mountpoint: fuse_mountpoint.to_string() };
        match bus.call(TRACKER_OBJECT_PATH, method, None).await? {
            Reply::Unit => Ok(()),
            other => Err(unexpected_reply("RegisterFuse", &other)),
        }
    }

    /// Mounted/Unmounted signals from the tracker.
    pub async fn subscribe_mount_events(&self) -> VfsResult<mpsc::UnboundedReceiver<SignalEvent>> {
        let bus = self.bus().await?;
        Ok(bus.subscribe(TRACKER_OBJECT_PATH))
    }
}

pub(crate) fn unexpected_reply(method: &str, reply: &Reply) -> VfsError {
    VfsError::new(ErrorKind::Failed, format!("unexpected {method} reply: {reply:?}"))
}
