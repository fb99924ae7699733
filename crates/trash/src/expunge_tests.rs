// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

use std::os::unix::fs::PermissionsExt;

fn wait_until_empty(dir: &Path) {
    for _ in 0..200 {
        let empty = std::fs::read_dir(dir).map(|e| e.count() == 0).unwrap_or(false);
        if empty {
            return;
        }
        std::thread::sleep(Duration::from_millis(25));
    }
    panic!("{} was not emptied", dir.display());
}

#[test]
fn empties_nested_content_but_keeps_the_directory() {
    let dir = tempfile::tempdir().unwrap();
    let expunged = dir.path().join("expunged");
    std::fs::create_dir_all(expunged.join("1/sub")).unwrap();
    std::fs::write(expunged.join("1/sub/file"), b"x").unwrap();
    std::fs::write(expunged.join("2"), b"y").unwrap();

    schedule_expunge(expunged.clone());

    wait_until_empty(&expunged);
    assert!(expunged.exists(), "the expunged dir itself is reusable");
}

#[test]
fn unwritable_subdirectories_are_forced_open() {
    let dir = tempfile::tempdir().unwrap();
    let expunged = dir.path().join("expunged");
    let locked = expunged.join("3/locked");
    std::fs::create_dir_all(&locked).unwrap();
    std::fs::write(locked.join("file"), b"x").unwrap();
    std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o500)).unwrap();

    schedule_expunge(expunged.clone());

    wait_until_empty(&expunged);
}

#[test]
fn scheduling_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let expunged = dir.path().join("expunged");
    std::fs::create_dir_all(&expunged).unwrap();
    std::fs::write(expunged.join("f"), b"x").unwrap();

    schedule_expunge(expunged.clone());
    schedule_expunge(expunged.clone());

    wait_until_empty(&expunged);
}
