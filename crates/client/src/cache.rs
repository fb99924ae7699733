// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide cache of mount info records.
//!
//! Entries come from tracker lookups and go away when their endpoint
//! dies. Lookups match the way the tracker does: equal item sets, then
//! the longest mount prefix that covers the path.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use fsbus_core::spec::MountSpec;
use fsbus_core::MountInfo;

struct CacheInner {
    entries: Vec<Arc<MountInfo>>,
    /// Reverse index for bulk invalidation, rebuilt on insert/remove.
    by_endpoint: HashMap<String, Vec<Arc<MountInfo>>>,
}

/// Shared (clonable) cache handle. Single global lock, short critical
/// sections only.
#[derive(Clone)]
pub struct MountInfoCache {
    inner: Arc<Mutex<CacheInner>>,
}

impl MountInfoCache {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(CacheInner {
                entries: Vec::new(),
                by_endpoint: HashMap::new(),
            })),
        }
    }

    /// Best cached match for `(spec, path)`: equal items, longest prefix.
    pub fn lookup(&self, spec: &MountSpec, path: &str) -> Option<Arc<MountInfo>> {
        let inner = self.inner.lock();
        inner
            .entries
            .iter()
            .filter(|info| info.spec.matches(spec, path))
            .max_by_key(|info| info.spec.mount_prefix().len())
            .cloned()
    }

    /// Longest fuse mountpoint that is a component prefix of `path`;
    /// returns the matched info and the remainder below the mountpoint.
    pub fn lookup_by_fuse_path(&self, path: &str) -> Option<(Arc<MountInfo>, String)> {
        let inner = self.inner.lock();
        let mut best: Option<(&Arc<MountInfo>, &str)> = None;
        for info in &inner.entries {
            let Some(mountpoint) = info.fuse_mountpoint.as_deref() else { continue };
            if !fsbus_core::spec::path_has_prefix(path, mountpoint) {
                continue;
            }
            if best.map_or(true, |(_, m)| mountpoint.len() > m.len()) {
                best = Some((info, mountpoint));
            }
        }
        best.map(|(info, mountpoint)| {
            let remainder = path[mountpoint.len()..].to_string();
            let remainder = if remainder.is_empty() { "/".to_string() } else { remainder };
            (Arc::clone(info), remainder)
        })
    }

    /// Install a record; a record for the same mounted instance is
    /// replaced, not duplicated.
    pub fn insert(&self, info: MountInfo) -> Arc<MountInfo> {
        let info = Arc::new(info);
        let mut inner = self.inner.lock();
        inner.entries.retain(|existing| !existing.same_mount(&info));
        inner.entries.push(Arc::clone(&info));
        rebuild_endpoint_index(&mut inner);
        info
    }

    /// Drop every record owned by `endpoint`.
    pub fn invalidate(&self, endpoint: &str) {
        let mut inner = self.inner.lock();
        if inner.by_endpoint.remove(endpoint).is_none() {
            return;
        }
        inner.entries.retain(|info| info.endpoint != endpoint);
        rebuild_endpoint_index(&mut inner);
    }

    /// Records owned by `endpoint` (mainly for tests and diagnostics).
    pub fn entries_for_endpoint(&self, endpoint: &str) -> Vec<Arc<MountInfo>> {
        self.inner.lock().by_endpoint.get(endpoint).cloned().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MountInfoCache {
    fn default() -> Self {
        Self::new()
    }
}

fn rebuild_endpoint_index(inner: &mut CacheInner) {
    inner.by_endpoint.clear();
    for info in &inner.entries {
        inner.by_endpoint.entry(info.endpoint.clone()).or_default().push(Arc::clone(info));
    }
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
