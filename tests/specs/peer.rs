// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::io::{Read, Seek, SeekFrom};

use fsbus_core::{CancelToken, ErrorKind};
use fsbus_wire::{Method, Reply, WirePath};

use crate::support::{start_fabric, TestBackend};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn open_for_read_delivers_fd_on_side_channel() {
    let fabric = start_fabric(TestBackend::new(0)).await;

    let (reply, conn) = fabric
        .client
        .call_mount(
            &fabric.spec,
            "/",
            Method::OpenForRead { path: WirePath::from("/data.bin") },
            None,
        )
        .await
        .unwrap();

    let fd_id = match reply {
        Reply::Open { fd_id, .. } => fd_id,
        other => panic!("expected Open, got {other:?}"),
    };
    assert_eq!(fd_id, 0, "first fd on the connection");

    let fd = conn.fds().get_fd(fd_id).await.unwrap();
    let mut file = std::fs::File::from(fd);
    file.seek(SeekFrom::Start(0)).unwrap();
    let mut contents = String::new();
    file.read_to_string(&mut contents).unwrap();
    assert_eq!(contents, "payload:/data.bin");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fast_path_queries_answer_inline() {
    let fabric = start_fabric(TestBackend::new(0)).await;

    let (reply, _conn) = fabric
        .client
        .call_mount(
            &fabric.spec,
            "/",
            Method::QueryInfo {
                path: WirePath::from("/f"),
                attributes: "standard::*".to_string(),
                flags: 0,
            },
            None,
        )
        .await
        .unwrap();
    match reply {
        Reply::Info { info } => assert_eq!(info.size, 42),
        other => panic!("expected Info, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn defaulted_operations_report_not_supported() {
    let fabric = start_fabric(TestBackend::new(0)).await;

    let err = fabric
        .client
        .call_mount(
            &fabric.spec,
            "/",
            Method::MakeDirectory { path: WirePath::from("/new") },
            None,
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotSupported);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn single_retry_is_transparent() {
    let fabric = start_fabric(TestBackend::new(1)).await;

    let (reply, _conn) = fabric
        .client
        .call_mount(&fabric.spec, "/", Method::Delete { path: WirePath::from("/f") }, None)
        .await
        .unwrap();
    assert_eq!(reply, Reply::Unit);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn second_retry_is_a_hard_failure() {
    let fabric = start_fabric(TestBackend::new(2)).await;

    let err = fabric
        .client
        .call_mount(&fabric.spec, "/", Method::Delete { path: WirePath::from("/f") }, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Failed);
    assert!(!err.is_retry(), "the sentinel must never escape the engine");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancellation_reaches_the_running_job() {
    let fabric = start_fabric(TestBackend::new(0)).await;
    let token = CancelToken::new().unwrap();

    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        canceller.cancel();
    });

    let err = fabric
        .client
        .call_mount(
            &fabric.spec,
            "/",
            Method::Read { handle: 1, count: 128 },
            Some(&token),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Cancelled);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pre_cancelled_calls_never_reach_the_backend() {
    let fabric = start_fabric(TestBackend::new(0)).await;
    let token = CancelToken::new().unwrap();
    token.cancel();

    let err = fabric
        .client
        .call_mount(
            &fabric.spec,
            "/",
            Method::Read { handle: 1, count: 128 },
            Some(&token),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Cancelled);
}
