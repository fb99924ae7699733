// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client-side file and directory monitors.
//!
//! The backend allocates a monitor object path; change signals addressed
//! to that path on the peer connection are turned back into typed
//! events here.

use std::sync::Arc;

use tokio::sync::mpsc;

use fsbus_core::spec::MountSpec;
use fsbus_core::{CancelToken, EventType, VfsResult};
use fsbus_wire::{Method, Reply, SignalEvent};

use crate::client::{unexpected_reply, VfsClient};
use crate::conn::PeerConnection;

/// A change event delivered to a monitor.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorEvent {
    pub event_type: EventType,
    pub spec: MountSpec,
    pub path: Vec<u8>,
    pub other_spec: Option<MountSpec>,
    pub other_path: Option<Vec<u8>>,
}

/// A live monitor subscription on one peer connection.
pub struct RemoteMonitor {
    conn: Arc<PeerConnection>,
    object_path: String,
    rx: mpsc::UnboundedReceiver<SignalEvent>,
}

impl RemoteMonitor {
    /// Ask the backend behind `(spec, path)` for a monitor and subscribe
    /// to its change signals.
    pub async fn create(
        client: &VfsClient,
        spec: &MountSpec,
        path: &str,
        directory: bool,
        flags: u32,
        cancel: Option<&CancelToken>,
    ) -> VfsResult<RemoteMonitor> {
        let method = if directory {
            Method::CreateDirMonitor { path: path.into(), flags }
        } else {
            Method::CreateFileMonitor { path: path.into(), flags }
        };
        let (reply, conn) = client.call_mount(spec, path, method, cancel).await?;
        let object_path = match reply {
            Reply::Monitor { object_path } => object_path,
            other => return Err(unexpected_reply("CreateMonitor", &other)),
        };

        let rx = conn.subscribe(&object_path);
        conn.call(
            &object_path,
            Method::MonitorSubscribe { object_path: object_path.clone() },
            cancel,
        )
        .await?;

        Ok(RemoteMonitor { conn, object_path, rx })
    }

    pub fn object_path(&self) -> &str {
        &self.object_path
    }

    /// Next change event; `None` once the connection or monitor is gone.
    pub async fn recv(&mut self) -> Option<MonitorEvent> {
        loop {
            match self.rx.recv().await? {
                SignalEvent::Changed { event_type, spec, path, other_spec, other_path } => {
                    return Some(MonitorEvent {
                        event_type,
                        spec: spec.into_mount_spec(),
                        path: path.0,
                        other_spec: other_spec.map(|s| s.into_mount_spec()),
                        other_path: other_path.map(|p| p.0),
                    });
                }
                // Tracker-shaped signals never target a monitor path.
                _ => continue,
            }
        }
    }

    /// Tell the backend to stop and drop the local subscription.
    pub async fn close(mut self) -> VfsResult<()> {
        self.rx.close();
        self.conn.unsubscribe(&self.object_path);
        let result = self
            .conn
            .call(
                &self.object_path,
                Method::MonitorUnsubscribe { object_path: self.object_path.clone() },
                None,
            )
            .await;
        match result {
            Ok(_) => Ok(()),
            // The connection dying unsubscribes implicitly.
            Err(e) if e.kind == fsbus_core::ErrorKind::Failed => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl Drop for RemoteMonitor {
    fn drop(&mut self) {
        self.conn.unsubscribe(&self.object_path);
    }
}
