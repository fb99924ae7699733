// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire protocol for fsbus connections.
//!
//! Wire format: 4-byte length prefix (big-endian) + JSON payload. The
//! same framing carries tracker traffic on the session socket and
//! per-mount traffic on peer connections; replies are matched to calls by
//! envelope serial.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod frame;
mod message;
mod method;
mod mountspec;

pub use frame::{
    decode, encode, read_message, read_message_sync, write_message, write_message_sync,
    ProtocolError, MAX_MESSAGE_SIZE,
};
pub use message::{error_from_wire, Envelope, Message, SignalEvent};
pub use method::{
    AttrValue, FileInfo, FileType, FsInfo, Method, MountableInfo, OpenMode, Reply, SeekWhence,
    WirePath, TRACKER_OBJECT_PATH,
};
pub use mountspec::{from_wire, to_wire, WireMountSpec};
