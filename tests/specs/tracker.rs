// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use fsbus_core::ErrorKind;
use fsbus_wire::SignalEvent;

use crate::support::{start_fabric, test_spec, TestBackend};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn lookup_resolves_and_caches() {
    let fabric = start_fabric(TestBackend::new(0)).await;

    let info = fabric.client.lookup_mount(&fabric.spec, "/some/path").await.unwrap();
    assert_eq!(info.endpoint, fabric.endpoint);
    assert_eq!(info.object_path, crate::support::OBJECT_PATH);

    // The second resolution is served from the cache: same allocation.
    let again = fabric.client.lookup_mount(&fabric.spec, "/some/path").await.unwrap();
    assert!(Arc::ptr_eq(&info, &again));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn lookup_of_unknown_spec_is_not_mounted() {
    let fabric = start_fabric(TestBackend::new(0)).await;

    let mut other = test_spec();
    other.set("host", "nowhere");
    let err = fabric.client.lookup_mount(&other, "/").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotMounted);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn list_mounts_sees_the_registration() {
    let fabric = start_fabric(TestBackend::new(0)).await;

    let mounts = fabric.client.list_mounts().await.unwrap();
    assert_eq!(mounts.len(), 1);
    assert_eq!(mounts[0].display_name, "testfs on h1");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn backend_death_sweeps_its_mounts() {
    let fabric = start_fabric(TestBackend::new(0)).await;

    let mut events = fabric.client.subscribe_mount_events().await.unwrap();
    // Ensure the subscription connection is established before the kill.
    assert_eq!(fabric.client.list_mounts().await.unwrap().len(), 1);

    drop(fabric.backend_client);

    let event = tokio::time::timeout(std::time::Duration::from_secs(5), events.recv())
        .await
        .expect("expected an unmount signal")
        .expect("signal stream ended");
    match event {
        SignalEvent::Unmounted { info } => assert_eq!(info.endpoint, fabric.endpoint),
        other => panic!("expected Unmounted, got {other:?}"),
    }

    assert!(fabric.client.list_mounts().await.unwrap().is_empty());

    // The stale cache entry is the client's problem; a fresh lookup now
    // fails.
    fabric.client.cache().invalidate(&fabric.endpoint);
    let err = fabric.client.lookup_mount(&fabric.spec, "/").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotMounted);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn racing_lookups_share_one_rpc() {
    let fabric = start_fabric(TestBackend::new(0)).await;

    let a = fabric.client.clone();
    let b = fabric.client.clone();
    let spec = fabric.spec.clone();
    let spec_b = fabric.spec.clone();

    let (left, right) = tokio::join!(
        tokio::spawn(async move { a.lookup_mount(&spec, "/race").await }),
        tokio::spawn(async move { b.lookup_mount(&spec_b, "/race").await }),
    );
    let left = left.unwrap().unwrap();
    let right = right.unwrap().unwrap();
    assert!(Arc::ptr_eq(&left, &right), "losers adopt the winner's entry");
}
