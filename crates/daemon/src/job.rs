// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job lifecycle.
//!
//! A job is one decoded method call bound to a backend. Lifecycle:
//! queued → running → (succeeded | failed) → replied → finalized. The
//! fast path may settle the job without ever reaching the worker pool.
//! `Cancel(serial)` reaches an in-flight job through its [`JobHandle`]:
//! the context token flips for the backend to observe, and a running
//! job's state moves to cancelling while it winds down.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use fsbus_core::CancelToken;
use fsbus_wire::{Message, Method};

use crate::backend::{Backend, JobContext, JobOutcome};
use crate::dispatch::{dispatch_run, dispatch_try};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Queued,
    Running,
    Cancelling,
    Succeeded,
    Failed,
    Replied,
    Finalized,
}

/// Cancellation-side view of an in-flight job, held by the dispatcher's
/// serial table while the job runs.
#[derive(Clone)]
pub struct JobHandle {
    state: Arc<Mutex<JobState>>,
    cancel: CancelToken,
}

impl JobHandle {
    /// Fire the job's token and record the cancelling transition if the
    /// job is still running. The backend observes the token; the state
    /// change is the bookkeeping side of the same event.
    pub fn cancel(&self) {
        self.cancel.cancel();
        let mut state = self.state.lock();
        if *state == JobState::Running {
            *state = JobState::Cancelling;
        }
    }

    pub fn state(&self) -> JobState {
        *self.state.lock()
    }
}

/// One in-flight method call against a backend.
pub struct BackendJob {
    backend: Arc<dyn Backend>,
    method: Method,
    ctx: JobContext,
    state: Arc<Mutex<JobState>>,
    replied: bool,
}

impl BackendJob {
    pub fn new(backend: Arc<dyn Backend>, method: Method, ctx: JobContext) -> Self {
        Self {
            backend,
            method,
            ctx,
            state: Arc::new(Mutex::new(JobState::Queued)),
            replied: false,
        }
    }

    pub fn state(&self) -> JobState {
        *self.state.lock()
    }

    /// Handle for the dispatcher's cancellation table.
    pub fn handle(&self) -> JobHandle {
        JobHandle { state: Arc::clone(&self.state), cancel: self.ctx.cancel.clone() }
    }

    pub fn serial(&self) -> u32 {
        self.ctx.serial
    }

    pub fn method_name(&self) -> &'static str {
        self.method.name()
    }

    fn settle(&mut self, outcome: &JobOutcome) {
        let settled = if outcome.is_ok() { JobState::Succeeded } else { JobState::Failed };
        *self.state.lock() = settled;
        trace!(
            serial = self.ctx.serial,
            method = self.method_name(),
            state = ?settled,
            "job settled"
        );
    }

    /// Fast-path attempt; runs on the dispatcher task and must not
    /// block. `Some` means the job is settled.
    pub fn try_fast(&mut self) -> Option<JobOutcome> {
        debug_assert_eq!(self.state(), JobState::Queued);
        let outcome = dispatch_try(self.backend.as_ref(), &self.method, &self.ctx)?;
        self.settle(&outcome);
        Some(outcome)
    }

    /// Full execution; may block, so callers put it on the worker pool.
    pub fn run_blocking(&mut self) -> JobOutcome {
        debug_assert_eq!(self.state(), JobState::Queued);
        *self.state.lock() = if self.ctx.cancel.is_cancelled() {
            JobState::Cancelling
        } else {
            JobState::Running
        };
        let outcome = dispatch_run(self.backend.as_ref(), &self.method, &self.ctx);
        self.settle(&outcome);
        outcome
    }

    /// Build the reply frame, exactly once. A second call gets `None`.
    pub fn create_reply(&mut self, outcome: &JobOutcome) -> Option<Message> {
        if self.replied {
            return None;
        }
        self.replied = true;
        *self.state.lock() = JobState::Replied;
        Some(match outcome {
            Ok(reply) => {
                Message::Reply { reply_serial: self.ctx.serial, payload: reply.clone() }
            }
            Err(err) => Message::error_for(self.ctx.serial, err),
        })
    }

    pub fn finalize(&mut self) {
        *self.state.lock() = JobState::Finalized;
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
