// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The method table: every call a client can issue against the tracker or
//! against a mounted backend, and the typed reply payloads.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use fsbus_core::MountInfo;

use crate::mountspec::WireMountSpec;

/// Object path of the mount tracker service on the session socket.
pub const TRACKER_OBJECT_PATH: &str = "/org/fsbus/mounttracker";

/// A byte-string path. Paths cross the wire unvalidated; only display
/// code is allowed to assume UTF-8.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct WirePath(pub Vec<u8>);

impl WirePath {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Lossy UTF-8 view for logging and display.
    pub fn display(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.0)
    }

    pub fn to_path_buf(&self) -> std::path::PathBuf {
        use std::os::unix::ffi::OsStringExt;
        std::ffi::OsString::from_vec(self.0.clone()).into()
    }
}

impl From<&str> for WirePath {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl From<&std::path::Path> for WirePath {
    fn from(p: &std::path::Path) -> Self {
        use std::os::unix::ffi::OsStrExt;
        Self(p.as_os_str().as_bytes().to_vec())
    }
}

impl fmt::Debug for WirePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WirePath({:?})", self.display())
    }
}

/// Flags for `OpenForWrite`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenMode {
    Create,
    Append,
    Replace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeekWhence {
    Start,
    Current,
    End,
}

/// File kinds reported by `QueryInfo`/`Enumerate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    Unknown,
    Regular,
    Directory,
    Symlink,
    Special,
}

/// The subset of file metadata the fabric carries end to end. Backends
/// put protocol-specific attributes in the string map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub name: WirePath,
    pub file_type: FileType,
    #[serde(default)]
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtime: Option<i64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsInfo {
    pub fs_type: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub free: u64,
    #[serde(default)]
    pub read_only: bool,
}

/// A mountable declaration, served by `ListMountableInfo`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountableInfo {
    /// Mount spec `type` this declaration answers for.
    pub mount_type: String,
    /// URI scheme mapped onto the type (e.g. `sftp`).
    pub scheme: String,
    #[serde(default)]
    pub host_is_inet: bool,
    #[serde(default)]
    pub allows_user: bool,
    #[serde(default)]
    pub default_port: Option<u16>,
}

/// Typed attribute value for `SetAttribute`; the variant tag carries the
/// attribute type across the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttrValue {
    String(String),
    Bytes(Vec<u8>),
    U64(u64),
    I64(i64),
    Bool(bool),
}

/// Every method a peer can invoke. Routed by `(object path, method)`; the
/// dispatcher turns backend-directed variants into jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method")]
pub enum Method {
    // Bootstrap and cancellation, served by every daemon.
    GetConnection,
    /// Fire-and-forget; `serial` is the bus serial of the in-flight call.
    /// Renamed on the wire so it cannot shadow the envelope serial when
    /// the method body is flattened into the frame.
    Cancel {
        #[serde(rename = "cancel_serial")]
        serial: u32,
    },

    // Tracker service methods.
    LookupMount { spec: WireMountSpec, path: WirePath },
    LookupMountByFusePath { path: WirePath },
    ListMounts,
    ListMountableInfo,
    RegisterMount { info: MountInfo },
    UnregisterMount { object_path: String },
    RegisterFuse { fuse_mountpoint: String },

    // Per-mount backend methods.
    Unmount { flags: u32 },
    OpenForRead { path: WirePath },
    OpenForWrite {
        path: WirePath,
        mode: OpenMode,
        #[serde(default)]
        etag: Option<String>,
        #[serde(default)]
        make_backup: bool,
        #[serde(default)]
        flags: u32,
    },
    Read { handle: u32, count: u32 },
    Write { handle: u32, data: Vec<u8> },
    Seek { handle: u32, offset: i64, whence: SeekWhence },
    Close { handle: u32 },
    QueryInfo { path: WirePath, attributes: String, flags: u32 },
    QueryFsInfo { path: WirePath, attributes: String },
    Enumerate { path: WirePath, attributes: String, flags: u32 },
    SetDisplayName { path: WirePath, display_name: String },
    Delete { path: WirePath },
    Trash { path: WirePath },
    MakeDirectory { path: WirePath },
    MakeSymlink { path: WirePath, target: WirePath },
    Copy { src: WirePath, dst: WirePath, flags: u32 },
    Move { src: WirePath, dst: WirePath, flags: u32 },
    Push { dst: WirePath, local_path: WirePath, flags: u32, remove_source: bool },
    Pull { src: WirePath, local_path: WirePath, flags: u32, remove_source: bool },
    SetAttribute {
        path: WirePath,
        name: String,
        value: AttrValue,
        flags: u32,
    },
    QuerySettableAttributes { path: WirePath },
    QueryWritableNamespaces { path: WirePath },
    CreateDirMonitor { path: WirePath, flags: u32 },
    CreateFileMonitor { path: WirePath, flags: u32 },
    MonitorSubscribe { object_path: String },
    MonitorUnsubscribe { object_path: String },
    MountMountable { path: WirePath },
    UnmountMountable { path: WirePath, flags: u32 },
    StartMountable { path: WirePath },
    StopMountable { path: WirePath, flags: u32 },
    PollMountable { path: WirePath },
    OpenIconForRead { icon_id: String },
}

impl Method {
    /// Method name for logs and dispatch tables.
    pub fn name(&self) -> &'static str {
        match self {
            Method::GetConnection => "GetConnection",
            Method::Cancel { .. } => "Cancel",
            Method::LookupMount { .. } => "LookupMount",
            Method::LookupMountByFusePath { .. } => "LookupMountByFusePath",
            Method::ListMounts => "ListMounts",
            Method::ListMountableInfo => "ListMountableInfo",
            Method::RegisterMount { .. } => "RegisterMount",
            Method::UnregisterMount { .. } => "UnregisterMount",
            Method::RegisterFuse { .. } => "RegisterFuse",
            Method::Unmount { .. } => "Unmount",
            Method::OpenForRead { .. } => "OpenForRead",
            Method::OpenForWrite { .. } => "OpenForWrite",
            Method::Read { .. } => "Read",
            Method::Write { .. } => "Write",
            Method::Seek { .. } => "Seek",
            Method::Close { .. } => "Close",
            Method::QueryInfo { .. } => "QueryInfo",
            Method::QueryFsInfo { .. } => "QueryFsInfo",
            Method::Enumerate { .. } => "Enumerate",
            Method::SetDisplayName { .. } => "SetDisplayName",
            Method::Delete { .. } => "Delete",
            Method::Trash { .. } => "Trash",
            Method::MakeDirectory { .. } => "MakeDirectory",
            Method::MakeSymlink { .. } => "MakeSymlink",
            Method::Copy { .. } => "Copy",
            Method::Move { .. } => "Move",
            Method::Push { .. } => "Push",
            Method::Pull { .. } => "Pull",
            Method::SetAttribute { .. } => "SetAttribute",
            Method::QuerySettableAttributes { .. } => "QuerySettableAttributes",
            Method::QueryWritableNamespaces { .. } => "QueryWritableNamespaces",
            Method::CreateDirMonitor { .. } => "CreateDirMonitor",
            Method::CreateFileMonitor { .. } => "CreateFileMonitor",
            Method::MonitorSubscribe { .. } => "MonitorSubscribe",
            Method::MonitorUnsubscribe { .. } => "MonitorUnsubscribe",
            Method::MountMountable { .. } => "MountMountable",
            Method::UnmountMountable { .. } => "UnmountMountable",
            Method::StartMountable { .. } => "StartMountable",
            Method::StopMountable { .. } => "StopMountable",
            Method::PollMountable { .. } => "PollMountable",
            Method::OpenIconForRead { .. } => "OpenIconForRead",
        }
    }

    /// Methods that never get a reply frame.
    pub fn is_fire_and_forget(&self) -> bool {
        matches!(self, Method::Cancel { .. })
    }
}

/// Success payloads, one per method family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reply")]
pub enum Reply {
    /// Methods with no payload (Delete, Close, RegisterMount, ...).
    Unit,
    /// `GetConnection`: addresses of the private pair of sockets.
    Connection { peer_addr: String, side_addr: String },
    /// Tracker lookups.
    Mount { info: MountInfo },
    Mounts { mounts: Vec<MountInfo> },
    Mountables { mountables: Vec<MountableInfo> },
    /// `OpenForRead`/`OpenForWrite`/`OpenIconForRead`: a stream handle
    /// plus the id under which the data fd travels on the side socket.
    Open { handle: u32, fd_id: u32, can_seek: bool },
    Read { data: Vec<u8>, eof: bool },
    Written { count: u64 },
    SeekDone { offset: u64 },
    Info { info: FileInfo },
    FsInfo { info: FsInfo },
    Entries { entries: Vec<FileInfo> },
    Attributes { attributes: Vec<String> },
    /// `CreateDirMonitor`/`CreateFileMonitor`: the monitor object path.
    Monitor { object_path: String },
}

#[cfg(test)]
#[path = "method_tests.rs"]
mod tests;
