// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The fsbus error taxonomy.
//!
//! One closed set of error kinds crosses every layer: jobs fail with a
//! kind, the wire carries its dotted name, and the FUSE bridge (out of
//! scope here) maps it to an errno. `Retry` is internal to the call
//! engines and never reaches an end user.

use nix::errno::Errno;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error kinds shared by clients, daemons and the wire protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Failed,
    NotFound,
    Exists,
    IsDirectory,
    NotDirectory,
    NotEmpty,
    NotRegularFile,
    NotSymbolicLink,
    NotMountableFile,
    FilenameTooLong,
    InvalidFilename,
    TooManyLinks,
    NoSpace,
    InvalidArgument,
    PermissionDenied,
    NotSupported,
    NotMounted,
    AlreadyMounted,
    Closed,
    Cancelled,
    Pending,
    ReadOnly,
    CantCreateBackup,
    WrongEtag,
    TimedOut,
    Busy,
    WouldBlock,
    /// Internal: the endpoint cache is stale; invalidate and re-issue.
    Retry,
}

const WIRE_PREFIX: &str = "org.fsbus.Error.";

macro_rules! kind_names {
    ($($kind:ident => $name:literal),* $(,)?) => {
        impl ErrorKind {
            /// Dotted wire name, e.g. `org.fsbus.Error.NotFound`.
            pub fn wire_name(self) -> &'static str {
                match self {
                    $(ErrorKind::$kind => concat!("org.fsbus.Error.", $name),)*
                }
            }

            /// Reverse of [`ErrorKind::wire_name`]; unknown names map to
            /// `Failed` so newer peers degrade instead of erroring.
            pub fn from_wire_name(name: &str) -> Self {
                match name.strip_prefix(WIRE_PREFIX) {
                    $(Some($name) => ErrorKind::$kind,)*
                    _ => ErrorKind::Failed,
                }
            }
        }
    };
}

kind_names! {
    Failed => "Failed",
    NotFound => "NotFound",
    Exists => "Exists",
    IsDirectory => "IsDirectory",
    NotDirectory => "NotDirectory",
    NotEmpty => "NotEmpty",
    NotRegularFile => "NotRegularFile",
    NotSymbolicLink => "NotSymbolicLink",
    NotMountableFile => "NotMountableFile",
    FilenameTooLong => "FilenameTooLong",
    InvalidFilename => "InvalidFilename",
    TooManyLinks => "TooManyLinks",
    NoSpace => "NoSpace",
    InvalidArgument => "InvalidArgument",
    PermissionDenied => "PermissionDenied",
    NotSupported => "NotSupported",
    NotMounted => "NotMounted",
    AlreadyMounted => "AlreadyMounted",
    Closed => "Closed",
    Cancelled => "Cancelled",
    Pending => "Pending",
    ReadOnly => "ReadOnly",
    CantCreateBackup => "CantCreateBackup",
    WrongEtag => "WrongETag",
    TimedOut => "TimedOut",
    Busy => "Busy",
    WouldBlock => "WouldBlock",
    Retry => "Retry",
}

impl ErrorKind {
    /// POSIX errno equivalent, for bridging into kernel-facing layers.
    pub fn errno(self) -> Errno {
        match self {
            ErrorKind::Failed => Errno::EIO,
            ErrorKind::NotFound => Errno::ENOENT,
            ErrorKind::Exists => Errno::EEXIST,
            ErrorKind::IsDirectory => Errno::EISDIR,
            ErrorKind::NotDirectory => Errno::ENOTDIR,
            ErrorKind::NotEmpty => Errno::ENOTEMPTY,
            ErrorKind::NotRegularFile => Errno::EINVAL,
            ErrorKind::NotSymbolicLink => Errno::EINVAL,
            ErrorKind::NotMountableFile => Errno::ENOENT,
            ErrorKind::FilenameTooLong => Errno::ENAMETOOLONG,
            ErrorKind::InvalidFilename => Errno::EINVAL,
            ErrorKind::TooManyLinks => Errno::EMLINK,
            ErrorKind::NoSpace => Errno::ENOSPC,
            ErrorKind::InvalidArgument => Errno::EINVAL,
            ErrorKind::PermissionDenied => Errno::EACCES,
            ErrorKind::NotSupported => Errno::ENOTSUP,
            ErrorKind::NotMounted => Errno::ENOENT,
            ErrorKind::AlreadyMounted => Errno::EALREADY,
            ErrorKind::Closed => Errno::EBADF,
            ErrorKind::Cancelled => Errno::EINTR,
            ErrorKind::Pending => Errno::EAGAIN,
            ErrorKind::ReadOnly => Errno::EROFS,
            ErrorKind::CantCreateBackup => Errno::EIO,
            ErrorKind::WrongEtag => Errno::EIO,
            ErrorKind::TimedOut => Errno::ETIMEDOUT,
            ErrorKind::Busy => Errno::EBUSY,
            ErrorKind::WouldBlock => Errno::EAGAIN,
            ErrorKind::Retry => Errno::EAGAIN,
        }
    }

    /// True for the internal retry sentinel.
    pub fn is_retry(self) -> bool {
        matches!(self, ErrorKind::Retry)
    }
}

/// An error kind plus a human-readable description.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct VfsError {
    pub kind: ErrorKind,
    pub message: String,
}

impl VfsError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    /// A bare kind with its wire name as the message.
    pub fn from_kind(kind: ErrorKind) -> Self {
        Self { kind, message: kind.wire_name().to_string() }
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "operation was cancelled")
    }

    pub fn not_supported() -> Self {
        Self::new(ErrorKind::NotSupported, "operation not supported by backend")
    }

    /// The retry sentinel, consumed by the call engines.
    pub fn retry() -> Self {
        Self::new(ErrorKind::Retry, "mount information is stale")
    }

    pub fn is_retry(&self) -> bool {
        self.kind.is_retry()
    }
}

impl From<std::io::Error> for VfsError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind as Io;
        let kind = match err.kind() {
            Io::NotFound => ErrorKind::NotFound,
            Io::AlreadyExists => ErrorKind::Exists,
            Io::PermissionDenied => ErrorKind::PermissionDenied,
            Io::InvalidInput => ErrorKind::InvalidArgument,
            Io::TimedOut => ErrorKind::TimedOut,
            Io::WouldBlock => ErrorKind::WouldBlock,
            Io::Unsupported => ErrorKind::NotSupported,
            _ => ErrorKind::Failed,
        };
        Self::new(kind, err.to_string())
    }
}

pub type VfsResult<T> = Result<T, VfsError>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
