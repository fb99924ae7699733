// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message envelopes and signals.

use serde::{Deserialize, Serialize};

use fsbus_core::{ErrorKind, EventType, VfsError};

use crate::method::{Method, Reply, WirePath};
use crate::mountspec::WireMountSpec;
use fsbus_core::MountInfo;

/// One frame on a connection. Serials are assigned by the sending side
/// and are monotonically increasing per connection; replies are matched
/// by `reply_serial`, so no cross-serial ordering is promised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub serial: u32,
    #[serde(flatten)]
    pub body: Message,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Message {
    Call {
        object_path: String,
        #[serde(flatten)]
        method: Method,
    },
    Reply {
        reply_serial: u32,
        #[serde(flatten)]
        payload: Reply,
    },
    Error {
        reply_serial: u32,
        name: String,
        message: String,
    },
    Signal {
        object_path: String,
        #[serde(flatten)]
        event: SignalEvent,
    },
}

impl Message {
    /// Build the error message for a failed call.
    pub fn error_for(reply_serial: u32, err: &VfsError) -> Message {
        Message::Error {
            reply_serial,
            name: err.kind.wire_name().to_string(),
            message: err.message.clone(),
        }
    }
}

/// Broadcast events. Tracker signals carry mount records; monitor signals
/// carry the changed location (and the second location for moves).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum SignalEvent {
    Mounted {
        info: MountInfo,
    },
    Unmounted {
        info: MountInfo,
    },
    Changed {
        event_type: EventType,
        spec: WireMountSpec,
        path: WirePath,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        other_spec: Option<WireMountSpec>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        other_path: Option<WirePath>,
    },
}

/// Decode a wire error back into the taxonomy.
pub fn error_from_wire(name: &str, message: &str) -> VfsError {
    VfsError::new(ErrorKind::from_wire_name(name), message.to_string())
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
