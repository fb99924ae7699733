// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! fsbus-core: shared types for the fsbus virtual filesystem fabric.
//!
//! Everything here is runtime-agnostic: mount identities, the error
//! taxonomy, cancellation, monitor event types and the unix mount table
//! model. The wire, client and daemon crates build on these.

pub mod cancel;
pub mod error;
pub mod info;
pub mod monitor;
pub mod mounts;
pub mod spec;
pub mod sys;

pub use cancel::CancelToken;
pub use error::{ErrorKind, VfsError, VfsResult};
pub use info::MountInfo;
pub use monitor::EventType;
pub use mounts::MountEntry;
pub use spec::{MountSpec, Spec};
