// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Server side of file and directory monitors.
//!
//! Backends allocate monitor objects here; each gets a unique object
//! path from a monotonic counter. Client peer connections subscribe to a
//! path, and `Changed` signals fan out to every subscriber.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::net::unix::OwnedWriteHalf;
use tracing::debug;

use fsbus_core::spec::MountSpec;
use fsbus_core::EventType;
use fsbus_wire::{Message, SignalEvent, WireMountSpec, WirePath};

use crate::peer::PeerSink;

type Sink = Arc<PeerSink<OwnedWriteHalf>>;

struct Subscriber {
    conn_id: u64,
    sink: Sink,
}

struct RegistryInner {
    monitors: HashMap<String, Vec<Subscriber>>,
}

/// Allocates monitor object paths and fans change signals out to
/// subscribed connections.
pub struct MonitorRegistry {
    counter: AtomicU64,
    inner: Mutex<RegistryInner>,
    rt: tokio::runtime::Handle,
}

impl MonitorRegistry {
    /// Must be created within a tokio runtime; signal writes are spawned
    /// onto it so blocking job threads can emit.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            counter: AtomicU64::new(1),
            inner: Mutex::new(RegistryInner { monitors: HashMap::new() }),
            rt: tokio::runtime::Handle::current(),
        })
    }

    /// Allocate a monitor object; the handle is the backend's emitter.
    pub fn create(self: &Arc<Self>) -> MonitorHandle {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        let object_path = format!("/org/fsbus/monitor/{n}");
        self.inner.lock().monitors.insert(object_path.clone(), Vec::new());
        MonitorHandle { registry: Arc::clone(self), object_path }
    }

    /// Attach a connection to a monitor object. False if the path does
    /// not name a live monitor.
    pub fn subscribe(&self, object_path: &str, conn_id: u64, sink: Sink) -> bool {
        let mut inner = self.inner.lock();
        match inner.monitors.get_mut(object_path) {
            Some(subscribers) => {
                subscribers.retain(|s| s.conn_id != conn_id);
                subscribers.push(Subscriber { conn_id, sink });
                true
            }
            None => false,
        }
    }

    pub fn unsubscribe(&self, object_path: &str, conn_id: u64) {
        if let Some(subscribers) = self.inner.lock().monitors.get_mut(object_path) {
            subscribers.retain(|s| s.conn_id != conn_id);
        }
    }

    /// Sweep every subscription of a dead connection.
    pub fn drop_connection(&self, conn_id: u64) {
        for subscribers in self.inner.lock().monitors.values_mut() {
            subscribers.retain(|s| s.conn_id != conn_id);
        }
    }

    fn remove(&self, object_path: &str) {
        self.inner.lock().monitors.remove(object_path);
    }

    fn emit(&self, object_path: &str, event: SignalEvent) {
        let sinks: Vec<Sink> = {
            let inner = self.inner.lock();
            match inner.monitors.get(object_path) {
                Some(subscribers) => subscribers.iter().map(|s| Arc::clone(&s.sink)).collect(),
                None => return,
            }
        };
        let object_path = object_path.to_string();
        for sink in sinks {
            let message = Message::Signal { object_path: object_path.clone(), event: event.clone() };
            self.rt.spawn(async move {
                if let Err(e) = sink.send(message).await {
                    debug!("monitor signal dropped: {e}");
                }
            });
        }
    }
}

/// A live monitor object; dropping it retires the object path.
pub struct MonitorHandle {
    registry: Arc<MonitorRegistry>,
    object_path: String,
}

impl MonitorHandle {
    pub fn object_path(&self) -> &str {
        &self.object_path
    }

    /// Emit a change signal to every subscriber.
    pub fn emit(
        &self,
        event_type: EventType,
        spec: &MountSpec,
        path: &[u8],
        other: Option<(&MountSpec, &[u8])>,
    ) {
        let event = SignalEvent::Changed {
            event_type,
            spec: WireMountSpec::from(spec),
            path: WirePath::new(path),
            other_spec: other.map(|(s, _)| WireMountSpec::from(s)),
            other_path: other.map(|(_, p)| WirePath::new(p)),
        };
        self.registry.emit(&self.object_path, event);
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.registry.remove(&self.object_path);
    }
}

#[cfg(test)]
#[path = "monitor_tests.rs"]
mod tests;
