// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Mountable declarations.
//!
//! Static descriptions of what can be mounted, served by the tracker's
//! `ListMountableInfo`. Each declaration is one TOML file in the
//! mountable directory:
//!
//! ```toml
//! type = "sftp"
//! scheme = "sftp"
//! allows_user = true
//! default_port = 22
//! ```

use std::path::Path;

use serde::Deserialize;
use tracing::warn;

use fsbus_wire::MountableInfo;

#[derive(Debug, Deserialize)]
struct MountableDecl {
    #[serde(rename = "type")]
    mount_type: String,
    scheme: String,
    #[serde(default)]
    host_is_inet: bool,
    #[serde(default)]
    allows_user: bool,
    #[serde(default)]
    default_port: Option<u16>,
}

impl From<MountableDecl> for MountableInfo {
    fn from(decl: MountableDecl) -> Self {
        MountableInfo {
            mount_type: decl.mount_type,
            scheme: decl.scheme,
            host_is_inet: decl.host_is_inet,
            allows_user: decl.allows_user,
            default_port: decl.default_port,
        }
    }
}

/// Load every `*.toml` declaration in `dir`, sorted by type. Malformed
/// files are logged and skipped; a missing directory yields an empty
/// table.
pub fn load_mountables(dir: &Path) -> Vec<MountableInfo> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut mountables: Vec<MountableInfo> = entries
        .filter_map(|entry| {
            let path = entry.ok()?.path();
            if path.extension().map_or(true, |ext| ext != "toml") {
                return None;
            }
            let text = match std::fs::read_to_string(&path) {
                Ok(text) => text,
                Err(e) => {
                    warn!(path = %path.display(), "unreadable mountable file: {e}");
                    return None;
                }
            };
            match toml::from_str::<MountableDecl>(&text) {
                Ok(decl) => Some(MountableInfo::from(decl)),
                Err(e) => {
                    warn!(path = %path.display(), "malformed mountable file: {e}");
                    None
                }
            }
        })
        .collect();

    mountables.sort_by(|a, b| a.mount_type.cmp(&b.mount_type));
    mountables
}

#[cfg(test)]
#[path = "mountable_tests.rs"]
mod tests;
