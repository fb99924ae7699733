// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

use fsbus_core::{CancelToken, ErrorKind};
use fsbus_wire::{Reply, WirePath};

use crate::backend::Backend;
use crate::monitor::MonitorRegistry;

struct FakeBackend;

impl Backend for FakeBackend {
    fn display_name(&self) -> String {
        "fake".to_string()
    }

    // Close settles on the fast path.
    fn try_close(&self, _handle: u32, _ctx: &JobContext) -> Option<JobOutcome> {
        Some(Ok(Reply::Unit))
    }

    fn delete(&self, _path: &WirePath, _ctx: &JobContext) -> JobOutcome {
        Ok(Reply::Unit)
    }

    fn read(&self, _handle: u32, _count: u32, ctx: &JobContext) -> JobOutcome {
        ctx.check_cancelled()?;
        Ok(Reply::Read { data: vec![1, 2, 3], eof: false })
    }
}

fn ctx(serial: u32, cancel: CancelToken) -> JobContext {
    JobContext::new(
        serial,
        "/org/fsbus/mount/1".to_string(),
        cancel,
        None,
        MonitorRegistry::new(),
    )
}

#[tokio::test]
async fn fast_path_settles_without_worker() {
    let mut job = BackendJob::new(
        Arc::new(FakeBackend),
        Method::Close { handle: 9 },
        ctx(1, CancelToken::new().unwrap()),
    );
    assert_eq!(job.state(), JobState::Queued);

    let outcome = job.try_fast().expect("close has a fast path");
    assert_eq!(outcome.unwrap(), Reply::Unit);
    assert_eq!(job.state(), JobState::Succeeded);
}

#[tokio::test]
async fn run_transitions_through_running() {
    let mut job = BackendJob::new(
        Arc::new(FakeBackend),
        Method::Delete { path: WirePath::from("/f") },
        ctx(2, CancelToken::new().unwrap()),
    );

    assert!(job.try_fast().is_none(), "delete has no fast path");
    let outcome = job.run_blocking();
    assert!(outcome.is_ok());
    assert_eq!(job.state(), JobState::Succeeded);
}

#[tokio::test]
async fn unimplemented_op_fails_not_supported() {
    let mut job = BackendJob::new(
        Arc::new(FakeBackend),
        Method::MakeDirectory { path: WirePath::from("/d") },
        ctx(3, CancelToken::new().unwrap()),
    );
    let outcome = job.run_blocking();
    assert_eq!(outcome.unwrap_err().kind, ErrorKind::NotSupported);
    assert_eq!(job.state(), JobState::Failed);
}

#[tokio::test]
async fn cancelled_job_reports_cancelled() {
    let token = CancelToken::new().unwrap();
    token.cancel();
    let mut job = BackendJob::new(
        Arc::new(FakeBackend),
        Method::Read { handle: 1, count: 16 },
        ctx(4, token),
    );
    let outcome = job.run_blocking();
    assert_eq!(outcome.unwrap_err().kind, ErrorKind::Cancelled);
    assert_eq!(job.state(), JobState::Failed);
}

#[tokio::test]
async fn create_reply_is_exactly_once() {
    let mut job = BackendJob::new(
        Arc::new(FakeBackend),
        Method::Delete { path: WirePath::from("/f") },
        ctx(5, CancelToken::new().unwrap()),
    );
    job.try_fast();
    let outcome = job.run_blocking();

    let first = job.create_reply(&outcome);
    assert!(matches!(first, Some(Message::Reply { reply_serial: 5, .. })));
    assert_eq!(job.state(), JobState::Replied);

    assert!(job.create_reply(&outcome).is_none(), "second reply must be refused");

    job.finalize();
    assert_eq!(job.state(), JobState::Finalized);
}

#[tokio::test]
async fn error_reply_carries_wire_name() {
    let mut job = BackendJob::new(
        Arc::new(FakeBackend),
        Method::MakeDirectory { path: WirePath::from("/d") },
        ctx(6, CancelToken::new().unwrap()),
    );
    let outcome = job.run_blocking();
    let reply = job.create_reply(&outcome).unwrap();
    match reply {
        Message::Error { reply_serial, name, .. } => {
            assert_eq!(reply_serial, 6);
            assert_eq!(name, "org.fsbus.Error.NotSupported");
        }
        other => panic!("expected error reply, got {other:?}"),
    }
}

/// Backend whose read parks on a gate, so tests can observe a job
/// mid-flight.
struct GatedBackend {
    started: std::sync::mpsc::Sender<()>,
    release: parking_lot::Mutex<Option<std::sync::mpsc::Receiver<()>>>,
}

impl Backend for GatedBackend {
    fn display_name(&self) -> String {
        "gated".to_string()
    }

    fn read(&self, _handle: u32, _count: u32, ctx: &JobContext) -> JobOutcome {
        let _ = self.started.send(());
        if let Some(gate) = self.release.lock().take() {
            let _ = gate.recv();
        }
        ctx.check_cancelled()?;
        Ok(fsbus_wire::Reply::Read { data: Vec::new(), eof: true })
    }
}

#[test]
fn handle_cancel_flips_running_jobs_to_cancelling() {
    let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
    let _guard = rt.enter();

    let (started_tx, started_rx) = std::sync::mpsc::channel();
    let (release_tx, release_rx) = std::sync::mpsc::channel();
    let backend = Arc::new(GatedBackend {
        started: started_tx,
        release: parking_lot::Mutex::new(Some(release_rx)),
    });

    let mut job = BackendJob::new(
        backend,
        Method::Read { handle: 1, count: 16 },
        ctx(7, CancelToken::new().unwrap()),
    );
    let handle = job.handle();

    let worker = std::thread::spawn(move || {
        let outcome = job.run_blocking();
        (job, outcome)
    });

    // The job is parked inside the backend now.
    started_rx.recv().unwrap();
    assert_eq!(handle.state(), JobState::Running);

    handle.cancel();
    assert_eq!(handle.state(), JobState::Cancelling, "cancel marks the running job");

    release_tx.send(()).unwrap();
    let (job, outcome) = worker.join().unwrap();
    assert_eq!(outcome.unwrap_err().kind, ErrorKind::Cancelled);
    assert_eq!(job.state(), JobState::Failed);
}

#[test]
fn handle_cancel_of_settled_job_changes_nothing() {
    let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
    let _guard = rt.enter();

    let mut job = BackendJob::new(
        Arc::new(FakeBackend),
        Method::Delete { path: WirePath::from("/f") },
        ctx(8, CancelToken::new().unwrap()),
    );
    let handle = job.handle();
    let outcome = job.run_blocking();
    assert!(outcome.is_ok());

    handle.cancel();
    assert_eq!(job.state(), JobState::Succeeded, "only running jobs flip to cancelling");
}
