// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime records for live mounts.

use serde::{Deserialize, Serialize};

use crate::spec::MountSpec;

/// What the mount tracker knows about one live mount.
///
/// Identity is `(endpoint, object_path)`; everything else is descriptive.
/// The wire layout is extensible by appending: every trailing field is
/// optional on read and omitted when absent on write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountInfo {
    /// Bus identity of the owning backend daemon (its public socket path).
    pub endpoint: String,
    /// Object path of the mounted instance within that daemon.
    pub object_path: String,
    /// Canonical spec this mount answers for.
    #[serde(with = "mount_spec_serde")]
    pub spec: MountSpec,
    pub display_name: String,
    /// Path-safe name, stable across re-mounts.
    pub stable_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_filename_encoding: Option<String>,
    #[serde(default)]
    pub user_visible: bool,
    /// Where the FUSE bridge exposes this mount, if it does.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fuse_mountpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_location: Option<String>,
    /// Space-separated x-content types advertised by the backend.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub x_content_types: String,
}

impl MountInfo {
    /// True iff both records describe the same mounted instance.
    pub fn same_mount(&self, other: &MountInfo) -> bool {
        self.endpoint == other.endpoint && self.object_path == other.object_path
    }
}

impl PartialEq for MountInfo {
    fn eq(&self, other: &Self) -> bool {
        self.same_mount(other)
    }
}

impl Eq for MountInfo {}

/// Serialize a spec through its canonical string form. Keeps the JSON
/// compact and guarantees the sorted-items invariant on the way back in.
mod mount_spec_serde {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::spec::MountSpec;

    pub fn serialize<S: Serializer>(spec: &MountSpec, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&spec.to_spec_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<MountSpec, D::Error> {
        let s = String::deserialize(de)?;
        MountSpec::parse(&s).map_err(D::Error::custom)
    }
}

#[cfg(test)]
#[path = "info_tests.rs"]
mod tests;
