// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::io::{Read, Seek, SeekFrom};

use fsbus_core::{CancelToken, ErrorKind};
use fsbus_wire::{Method, Reply, WirePath};

use crate::support::{start_fabric, TestBackend};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sync_calls_work_from_plain_threads() {
    let fabric = start_fabric(TestBackend::new(0)).await;
    let client = fabric.client.clone();
    let spec = fabric.spec.clone();

    let reply = tokio::task::spawn_blocking(move || {
        client.call_mount_sync(
            &spec,
            "/",
            Method::QueryInfo {
                path: WirePath::from("/f"),
                attributes: "standard::*".to_string(),
                flags: 0,
            },
            None,
        )
    })
    .await
    .unwrap()
    .unwrap();

    match reply {
        Reply::Info { info } => assert_eq!(info.size, 42),
        other => panic!("expected Info, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sync_fd_delivery_is_in_order() {
    let fabric = start_fabric(TestBackend::new(0)).await;
    let client = fabric.client.clone();
    let spec = fabric.spec.clone();
    let endpoint = fabric.endpoint.clone();

    let contents = tokio::task::spawn_blocking(move || {
        let open = |path: &str| {
            let reply = client
                .call_mount_sync(
                    &spec,
                    "/",
                    Method::OpenForRead { path: WirePath::from(path) },
                    None,
                )
                .unwrap();
            match reply {
                Reply::Open { fd_id, .. } => fd_id,
                other => panic!("expected Open, got {other:?}"),
            }
        };

        let first = open("/a");
        let second = open("/b");
        assert_eq!((first, second), (0, 1));

        // Claim them out of order; ids still map to the right fds.
        let read_all = |fd_id| {
            let fd = client.get_fd_sync(&endpoint, fd_id).unwrap();
            let mut file = std::fs::File::from(fd);
            file.seek(SeekFrom::Start(0)).unwrap();
            let mut s = String::new();
            file.read_to_string(&mut s).unwrap();
            s
        };
        (read_all(second), read_all(first))
    })
    .await
    .unwrap();

    assert_eq!(contents, ("payload:/b".to_string(), "payload:/a".to_string()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sync_cancel_unblocks_the_poll_loop() {
    let fabric = start_fabric(TestBackend::new(0)).await;
    let client = fabric.client.clone();
    let spec = fabric.spec.clone();
    let token = CancelToken::new().unwrap();

    let canceller = token.clone();
    std::thread::spawn(move || {
        std::thread::sleep(std::time::Duration::from_millis(100));
        canceller.cancel();
    });

    let err = tokio::task::spawn_blocking(move || {
        client.call_mount_sync(
            &spec,
            "/",
            Method::Read { handle: 1, count: 16 },
            Some(&token),
        )
    })
    .await
    .unwrap()
    .unwrap_err();

    assert_eq!(err.kind, ErrorKind::Cancelled);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sync_retry_is_transparent_once() {
    let fabric = start_fabric(TestBackend::new(1)).await;
    let client = fabric.client.clone();
    let spec = fabric.spec.clone();

    let reply = tokio::task::spawn_blocking(move || {
        client.call_mount_sync(&spec, "/", Method::Delete { path: WirePath::from("/f") }, None)
    })
    .await
    .unwrap()
    .unwrap();
    assert_eq!(reply, Reply::Unit);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sync_engine_keeps_connections_per_thread() {
    let fabric = start_fabric(TestBackend::new(0)).await;

    // Two dedicated threads each bootstrap their own peer connection;
    // their fd id sequences are independent and both start at zero.
    let mut ids = Vec::new();
    for _ in 0..2 {
        let client = fabric.client.clone();
        let spec = fabric.spec.clone();
        let handle = std::thread::spawn(move || {
            let reply = client
                .call_mount_sync(
                    &spec,
                    "/",
                    Method::OpenForRead { path: WirePath::from("/x") },
                    None,
                )
                .unwrap();
            match reply {
                Reply::Open { fd_id, .. } => fd_id,
                other => panic!("expected Open, got {other:?}"),
            }
        });
        let id = tokio::task::spawn_blocking(move || handle.join())
            .await
            .unwrap()
            .unwrap();
        ids.push(id);
    }

    assert_eq!(ids, [0, 0]);
}
