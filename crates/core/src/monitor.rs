// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File and directory monitor event types.

use serde::{Deserialize, Serialize};

/// Change event kinds a backend monitor can emit. Closed set; move events
/// carry a second (spec, path) pair on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Changed,
    ChangesDoneHint,
    Created,
    Deleted,
    PreUnmount,
    Unmounted,
    AttributeChanged,
    MoveStart,
    MoveEnd,
}

impl EventType {
    /// Whether the event references a second file.
    pub fn has_other_file(self) -> bool {
        matches!(self, EventType::MoveStart | EventType::MoveEnd)
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EventType::Changed => "changed",
            EventType::ChangesDoneHint => "changes-done-hint",
            EventType::Created => "created",
            EventType::Deleted => "deleted",
            EventType::PreUnmount => "pre-unmount",
            EventType::Unmounted => "unmounted",
            EventType::AttributeChanged => "attribute-changed",
            EventType::MoveStart => "move-start",
            EventType::MoveEnd => "move-end",
        };
        write!(f, "{name}")
    }
}
