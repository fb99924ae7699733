// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixture: one tracker, one backend daemon, one registered
//! mount, all on sockets under a scratch directory.

use std::io::Write;
use std::os::fd::OwnedFd;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use fsbus_core::spec::MountSpec;
use fsbus_core::{MountInfo, VfsError};
use fsbus_daemon::{Backend, BackendDaemon, JobContext, JobOutcome, MountTracker};
use fsbus_wire::{FileInfo, FileType, Reply, WirePath};

use fsbus_client::VfsClient;

pub const OBJECT_PATH: &str = "/org/fsbus/mount/1";

/// A backend with enough behavior to exercise the engines: fd replies,
/// cancellation, a configurable number of retry demands.
pub struct TestBackend {
    retries_to_demand: AtomicU32,
}

impl TestBackend {
    pub fn new(retries_to_demand: u32) -> Arc<Self> {
        Arc::new(Self { retries_to_demand: AtomicU32::new(retries_to_demand) })
    }
}

impl Backend for TestBackend {
    fn display_name(&self) -> String {
        "testfs on h1".to_string()
    }

    fn open_for_read(&self, path: &WirePath, ctx: &JobContext) -> JobOutcome {
        let mut file = tempfile::tempfile().map_err(VfsError::from)?;
        file.write_all(b"payload:").map_err(VfsError::from)?;
        file.write_all(path.as_bytes()).map_err(VfsError::from)?;
        file.flush().map_err(VfsError::from)?;
        let fd_id = ctx.send_fd(OwnedFd::from(file))?;
        Ok(Reply::Open { handle: 1, fd_id, can_seek: true })
    }

    fn try_query_info(&self, path: &WirePath, _attrs: &str, _flags: u32, _ctx: &JobContext) -> Option<JobOutcome> {
        Some(Ok(Reply::Info {
            info: FileInfo {
                name: path.clone(),
                file_type: FileType::Regular,
                size: 42,
                mtime: None,
                attributes: Default::default(),
            },
        }))
    }

    fn read(&self, _handle: u32, _count: u32, ctx: &JobContext) -> JobOutcome {
        // Spin until cancelled (or give up after ~5s and report data).
        for _ in 0..500 {
            ctx.check_cancelled()?;
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        Ok(Reply::Read { data: vec![0; 4], eof: true })
    }

    fn delete(&self, _path: &WirePath, _ctx: &JobContext) -> JobOutcome {
        let remaining = self.retries_to_demand.load(Ordering::SeqCst);
        if remaining > 0 {
            self.retries_to_demand.fetch_sub(1, Ordering::SeqCst);
            return Err(VfsError::retry());
        }
        Ok(Reply::Unit)
    }
}

pub struct Fabric {
    pub client: VfsClient,
    pub spec: MountSpec,
    pub endpoint: String,
    /// The backend's registration client; dropping it makes the tracker
    /// sweep the mount.
    pub backend_client: VfsClient,
    pub daemon: BackendDaemon,
    _dir: tempfile::TempDir,
}

pub fn test_spec() -> MountSpec {
    let mut spec = MountSpec::new("testfs");
    spec.set("host", "h1");
    spec
}

async fn wait_for_socket(path: &std::path::Path) {
    for _ in 0..200 {
        if path.exists() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("socket {} never appeared", path.display());
}

/// Start tracker + backend daemon and register one mount.
pub async fn start_fabric(backend: Arc<TestBackend>) -> Fabric {
    let dir = tempfile::tempdir().unwrap();
    let bus_addr = dir.path().join("bus.sock");

    let listener = tokio::net::UnixListener::bind(&bus_addr).unwrap();
    let tracker = MountTracker::new(Vec::new());
    tokio::spawn(tracker.serve(listener));

    let daemon = BackendDaemon::new(dir.path().join("backend.sock"));
    daemon.register_object(OBJECT_PATH, backend);
    let serving = daemon.clone();
    tokio::spawn(async move {
        let _ = serving.serve().await;
    });
    wait_for_socket(daemon.public_addr()).await;

    let endpoint = daemon.public_addr().display().to_string();

    let backend_client = VfsClient::new(&bus_addr);
    backend_client
        .register_mount(MountInfo {
            endpoint: endpoint.clone(),
            object_path: OBJECT_PATH.to_string(),
            spec: test_spec(),
            display_name: "testfs on h1".to_string(),
            stable_name: "testfs-h1".to_string(),
            icon: None,
            preferred_filename_encoding: None,
            user_visible: true,
            fuse_mountpoint: None,
            default_location: None,
            x_content_types: String::new(),
        })
        .await
        .unwrap();

    Fabric {
        client: VfsClient::new(&bus_addr),
        spec: test_spec(),
        endpoint,
        backend_client,
        daemon,
        _dir: dir,
    }
}
