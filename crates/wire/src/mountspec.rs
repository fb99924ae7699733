// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire encoding of mount specs.
//!
//! The transport form is `(prefix: bytes, items: map<string, bytes>)`.
//! Unrecognized items pass through verbatim and unknown trailing fields
//! are ignored on read, so peers can extend the layout by appending.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use fsbus_core::spec::{MountSpec, SpecItem};

use crate::frame::{decode, encode, ProtocolError};
use crate::method::WirePath;

/// A mount spec as it travels on the wire. Values are byte strings; the
/// map keeps them key-sorted, matching the spec's canonical order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct WireMountSpec {
    pub prefix: WirePath,
    pub items: BTreeMap<String, Vec<u8>>,
}

impl From<&MountSpec> for WireMountSpec {
    fn from(spec: &MountSpec) -> Self {
        Self {
            prefix: WirePath::from(spec.mount_prefix()),
            items: spec
                .items()
                .iter()
                .map(|item| (item.key.clone(), item.value.as_bytes().to_vec()))
                .collect(),
        }
    }
}

impl WireMountSpec {
    /// Back to the core type. Item values must be UTF-8; byte values a
    /// newer peer sends for keys we know nothing about are preserved
    /// lossily rather than dropped.
    pub fn into_mount_spec(self) -> MountSpec {
        let items = self
            .items
            .into_iter()
            .map(|(key, value)| SpecItem {
                key,
                value: String::from_utf8_lossy(&value).into_owned(),
            })
            .collect();
        let prefix = self.prefix.display().into_owned();
        MountSpec::from_items(items, Some(&prefix))
    }
}

/// Envelope for the standalone `(spec, path)` wire form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct SpecWithPath {
    #[serde(flatten)]
    spec: WireMountSpec,
    path: WirePath,
}

/// Serialize a spec plus a path within it.
pub fn to_wire(spec: &MountSpec, path: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    encode(&SpecWithPath { spec: WireMountSpec::from(spec), path: WirePath::new(path) })
}

/// Parse the output of [`to_wire`], tolerating unknown trailing fields.
pub fn from_wire(bytes: &[u8]) -> Result<(MountSpec, Vec<u8>), ProtocolError> {
    let parsed: SpecWithPath = decode(bytes)?;
    Ok((parsed.spec.into_mount_spec(), parsed.path.0))
}

#[cfg(test)]
#[path = "mountspec_tests.rs"]
mod tests;
