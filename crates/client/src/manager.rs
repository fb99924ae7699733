// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bootstrapping and caching of async peer connections.
//!
//! The bootstrap per endpoint: call `GetConnection` on the endpoint's
//! public socket, then connect to the two returned addresses (message
//! stream and fd side channel). Concurrent calls to the same endpoint
//! share the single in-flight bootstrap.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::future::{FutureExt, Shared};
use parking_lot::Mutex;
use tokio::net::UnixStream;
use tracing::debug;

use fsbus_core::{ErrorKind, VfsError, VfsResult};
use fsbus_wire::{
    decode, encode, read_message, write_message, Envelope, Message, Method, Reply,
};

use crate::cache::MountInfoCache;
use crate::conn::PeerConnection;

/// Object path every daemon serves bootstrap/cancel methods on.
pub(crate) const DAEMON_OBJECT_PATH: &str = "/org/fsbus/daemon";

type BootstrapResult = Result<Arc<PeerConnection>, VfsError>;
type BootstrapFuture = Shared<Pin<Box<dyn Future<Output = BootstrapResult> + Send>>>;

enum ConnSlot {
    Ready(Arc<PeerConnection>),
    Pending(BootstrapFuture),
}

struct ManagerInner {
    cache: MountInfoCache,
    conns: Mutex<HashMap<String, ConnSlot>>,
}

impl Drop for ManagerInner {
    fn drop(&mut self) {
        for slot in self.conns.lock().values() {
            if let ConnSlot::Ready(conn) = slot {
                conn.close();
            }
        }
    }
}

/// The async connection table: endpoint id → live peer connection.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<ManagerInner>,
}

impl ConnectionManager {
    pub fn new(cache: MountInfoCache) -> Self {
        Self { inner: Arc::new(ManagerInner { cache, conns: Mutex::new(HashMap::new()) }) }
    }

    /// Cached connection for `endpoint`, bootstrapping one if needed.
    pub async fn get(&self, endpoint: &str) -> VfsResult<Arc<PeerConnection>> {
        let fut = {
            let mut conns = self.inner.conns.lock();
            match conns.get(endpoint) {
                Some(ConnSlot::Ready(conn)) => return Ok(Arc::clone(conn)),
                Some(ConnSlot::Pending(fut)) => fut.clone(),
                None => {
                    let fut = self.bootstrap_future(endpoint.to_string());
                    conns.insert(endpoint.to_string(), ConnSlot::Pending(fut.clone()));
                    fut
                }
            }
        };
        fut.await
    }

    /// Forget a connection without failing its calls (used when the
    /// reader already observed the disconnect).
    pub fn remove(&self, endpoint: &str) {
        self.inner.conns.lock().remove(endpoint);
    }

    fn bootstrap_future(&self, endpoint: String) -> BootstrapFuture {
        let inner = Arc::clone(&self.inner);
        let fut = async move {
            let result = match tokio::time::timeout(
                crate::conn::call_timeout(),
                bootstrap(&endpoint, &inner),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(VfsError::new(ErrorKind::TimedOut, "bootstrap timed out")),
            };
            let mut conns = inner.conns.lock();
            match &result {
                Ok(conn) => {
                    conns.insert(endpoint.clone(), ConnSlot::Ready(Arc::clone(conn)));
                }
                Err(_) => {
                    conns.remove(&endpoint);
                }
            }
            result
        };
        fut.boxed().shared()
    }
}

/// One-frame exchange on a fresh socket, before a `PeerConnection`
/// exists to do serial bookkeeping for us.
async fn single_call(stream: &mut UnixStream, method: Method) -> VfsResult<Reply> {
    let envelope =
        Envelope { serial: 1, body: Message::Call { object_path: DAEMON_OBJECT_PATH.to_string(), method } };
    let bytes = encode(&envelope)
        .map_err(|e| VfsError::new(ErrorKind::Failed, format!("encode failed: {e}")))?;
    write_message(stream, &bytes)
        .await
        .map_err(|e| VfsError::new(ErrorKind::Failed, format!("bootstrap send failed: {e}")))?;

    let frame = read_message(stream)
        .await
        .map_err(|e| VfsError::new(ErrorKind::Failed, format!("bootstrap read failed: {e}")))?;
    let reply: Envelope = decode(&frame)
        .map_err(|e| VfsError::new(ErrorKind::Failed, format!("bootstrap decode failed: {e}")))?;
    match reply.body {
        Message::Reply { payload, .. } => Ok(payload),
        Message::Error { name, message, .. } => Err(fsbus_wire::error_from_wire(&name, &message)),
        other => Err(VfsError::new(
            ErrorKind::Failed,
            format!("unexpected bootstrap frame: {other:?}"),
        )),
    }
}

async fn bootstrap(endpoint: &str, inner: &Arc<ManagerInner>) -> BootstrapResult {
    debug!(endpoint, "bootstrapping peer connection");

    let mut public = UnixStream::connect(endpoint).await.map_err(|e| {
        VfsError::new(ErrorKind::NotMounted, format!("cannot reach {endpoint}: {e}"))
    })?;

    let (peer_addr, side_addr) = match single_call(&mut public, Method::GetConnection).await? {
        Reply::Connection { peer_addr, side_addr } => (peer_addr, side_addr),
        other => {
            return Err(VfsError::new(
                ErrorKind::Failed,
                format!("unexpected GetConnection reply: {other:?}"),
            ));
        }
    };
    drop(public);

    let side = UnixStream::connect(&side_addr)
        .await
        .map_err(|e| VfsError::new(ErrorKind::Failed, format!("side socket connect: {e}")))?
        .into_std()
        .map_err(|e| VfsError::new(ErrorKind::Failed, format!("side socket: {e}")))?;
    side.set_nonblocking(false)
        .map_err(|e| VfsError::new(ErrorKind::Failed, format!("side socket: {e}")))?;

    let peer = UnixStream::connect(&peer_addr)
        .await
        .map_err(|e| VfsError::new(ErrorKind::Failed, format!("peer connect: {e}")))?;

    // Weak: the reader task must not keep the manager (and through it
    // every connection) alive.
    let manager = Arc::downgrade(inner);
    let conn = PeerConnection::start(
        endpoint.to_string(),
        peer,
        Some(side),
        Box::new(move |dead_endpoint| {
            // Disconnect: purge the cache and the connection table so the
            // next call can locate a freshly spawned daemon.
            if let Some(manager) = manager.upgrade() {
                manager.cache.invalidate(dead_endpoint);
                manager.conns.lock().remove(dead_endpoint);
            }
        }),
    );

    Ok(conn)
}
