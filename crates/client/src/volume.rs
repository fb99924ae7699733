// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Volume and drive aggregation.
//!
//! Per-filesystem monitors (unix mounts, protocol backends, device
//! daemons) live behind the [`VolumeMonitor`] trait; the union monitor
//! composes them into one client-visible set and forwards child events
//! tagged with their origin.

use std::sync::Arc;

use tokio::sync::mpsc;

/// A candidate for mounting (an unmounted volume or declared mountable).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeRecord {
    pub id: String,
    pub name: String,
    pub icon: Option<String>,
    pub can_mount: bool,
}

/// A physical or virtual drive that can hold volumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriveRecord {
    pub id: String,
    pub name: String,
    pub can_eject: bool,
    pub volume_ids: Vec<String>,
}

/// A realized, accessible mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountRecord {
    pub id: String,
    pub name: String,
    pub root_path: String,
    pub volume_id: Option<String>,
}

/// Change notifications a monitor emits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VolumeEvent {
    VolumeAdded(VolumeRecord),
    VolumeRemoved(String),
    DriveConnected(DriveRecord),
    DriveDisconnected(String),
    MountAdded(MountRecord),
    MountRemoved(String),
}

/// One source of volumes/drives/mounts.
pub trait VolumeMonitor: Send + Sync {
    /// Stable name identifying this child in tagged events.
    fn name(&self) -> &str;
    fn volumes(&self) -> Vec<VolumeRecord>;
    fn drives(&self) -> Vec<DriveRecord>;
    fn mounts(&self) -> Vec<MountRecord>;
    /// A stream of change events; each subscription is independent.
    fn subscribe(&self) -> mpsc::UnboundedReceiver<VolumeEvent>;
}

/// Composite monitor that unions its children.
pub struct UnionVolumeMonitor {
    children: Vec<Arc<dyn VolumeMonitor>>,
}

impl UnionVolumeMonitor {
    pub fn new(children: Vec<Arc<dyn VolumeMonitor>>) -> Self {
        Self { children }
    }

    pub fn children(&self) -> &[Arc<dyn VolumeMonitor>] {
        &self.children
    }

    pub fn volumes(&self) -> Vec<VolumeRecord> {
        self.children.iter().flat_map(|child| child.volumes()).collect()
    }

    pub fn drives(&self) -> Vec<DriveRecord> {
        self.children.iter().flat_map(|child| child.drives()).collect()
    }

    pub fn mounts(&self) -> Vec<MountRecord> {
        self.children.iter().flat_map(|child| child.mounts()).collect()
    }

    /// Merge the children's event streams, tagging each event with the
    /// originating child's name.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<(String, VolumeEvent)> {
        let (tx, rx) = mpsc::unbounded_channel();
        for child in &self.children {
            let name = child.name().to_string();
            let mut child_rx = child.subscribe();
            let tx = tx.clone();
            tokio::spawn(async move {
                while let Some(event) = child_rx.recv().await {
                    if tx.send((name.clone(), event)).is_err() {
                        break;
                    }
                }
            });
        }
        rx
    }

    /// Extension seam for adopting a mount no child claims (a "foreign"
    /// mount). The adoption policy is deliberately unimplemented; see
    /// DESIGN.md.
    pub fn adopt_orphan_mount(&self, _mount: &MountRecord) -> Option<VolumeRecord> {
        None
    }
}

#[cfg(test)]
#[path = "volume_tests.rs"]
mod tests;
