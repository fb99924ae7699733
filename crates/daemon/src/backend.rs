// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The backend vtable.
//!
//! A backend implements one protocol behind the per-mount method table.
//! Every operation comes as a pair: `try_*` runs on the dispatcher task
//! and may synthesize an immediate reply without blocking (return
//! `Some`), while the plain method may block and runs on the worker
//! pool. Unimplemented operations fail with `NotSupported`.

use std::os::fd::OwnedFd;
use std::sync::Arc;

use fsbus_core::{CancelToken, ErrorKind, VfsError, VfsResult};
use fsbus_wire::{AttrValue, OpenMode, Reply, SeekWhence, WirePath};

use crate::monitor::MonitorRegistry;
use crate::peer::FdSender;

/// What a finished job reports: a typed reply or a taxonomy error.
pub type JobOutcome = VfsResult<Reply>;

/// Per-job state handed to every backend operation.
#[derive(Clone)]
pub struct JobContext {
    /// Bus serial of the originating call; `Cancel(serial)` targets it.
    pub serial: u32,
    /// Object path the call was addressed to.
    pub object_path: String,
    /// Set when the client cancelled; long operations should observe it.
    pub cancel: CancelToken,
    fd_sender: Option<FdSender>,
    monitors: Arc<MonitorRegistry>,
}

impl JobContext {
    pub(crate) fn new(
        serial: u32,
        object_path: String,
        cancel: CancelToken,
        fd_sender: Option<FdSender>,
        monitors: Arc<MonitorRegistry>,
    ) -> Self {
        Self { serial, object_path, cancel, fd_sender, monitors }
    }

    /// Ship an fd over the connection's side channel; the returned id
    /// goes into the reply so the client can claim the fd.
    pub fn send_fd(&self, fd: OwnedFd) -> VfsResult<u32> {
        let sender = self.fd_sender.as_ref().ok_or_else(|| {
            VfsError::new(ErrorKind::NotSupported, "connection has no fd side channel")
        })?;
        sender.send(fd).map_err(|e| {
            VfsError::new(ErrorKind::Failed, format!("fd side channel send: {e}"))
        })
    }

    /// Registry for allocating monitor object paths.
    pub fn monitors(&self) -> &Arc<MonitorRegistry> {
        &self.monitors
    }

    /// Early-out helper for cancellation-honoring backends.
    pub fn check_cancelled(&self) -> VfsResult<()> {
        self.cancel.check()
    }
}

macro_rules! backend_ops {
    ($(
        $(#[$doc:meta])*
        $try_name:ident / $name:ident ( $($arg:ident : $ty:ty),* );
    )*) => {
        /// One mounted protocol implementation.
        ///
        /// The dispatcher materializes each incoming method call into a
        /// job and drives it through this vtable; see the crate docs for
        /// the execution contract.
        pub trait Backend: Send + Sync + 'static {
            /// Human-readable name used in mount registration and logs.
            fn display_name(&self) -> String;

            $(
                $(#[$doc])*
                fn $name(&self, $($arg: $ty,)* ctx: &JobContext) -> JobOutcome {
                    let _ = (($($arg,)*), ctx);
                    Err(VfsError::not_supported())
                }

                /// Non-blocking fast path; `Some` skips the worker pool.
                fn $try_name(&self, $($arg: $ty,)* ctx: &JobContext) -> Option<JobOutcome> {
                    let _ = (($($arg,)*), ctx);
                    None
                }
            )*
        }
    };
}

backend_ops! {
    /// Tear the mount down. Backends unregister from the tracker here.
    try_unmount / unmount(flags: u32);
    try_open_for_read / open_for_read(path: &WirePath);
    try_open_for_write / open_for_write(
        path: &WirePath,
        mode: OpenMode,
        etag: Option<&str>,
        make_backup: bool,
        flags: u32
    );
    try_read / read(handle: u32, count: u32);
    try_write / write(handle: u32, data: &[u8]);
    try_seek / seek(handle: u32, offset: i64, whence: SeekWhence);
    try_close / close(handle: u32);
    try_query_info / query_info(path: &WirePath, attributes: &str, flags: u32);
    try_query_fs_info / query_fs_info(path: &WirePath, attributes: &str);
    try_enumerate / enumerate(path: &WirePath, attributes: &str, flags: u32);
    try_set_display_name / set_display_name(path: &WirePath, display_name: &str);
    try_delete / delete(path: &WirePath);
    try_trash / trash(path: &WirePath);
    try_make_directory / make_directory(path: &WirePath);
    try_make_symlink / make_symlink(path: &WirePath, target: &WirePath);
    try_copy / copy(src: &WirePath, dst: &WirePath, flags: u32);
    try_move_file / move_file(src: &WirePath, dst: &WirePath, flags: u32);
    try_push / push(dst: &WirePath, local_path: &WirePath, flags: u32, remove_source: bool);
    try_pull / pull(src: &WirePath, local_path: &WirePath, flags: u32, remove_source: bool);
    try_set_attribute / set_attribute(
        path: &WirePath,
        name: &str,
        value: &AttrValue,
        flags: u32
    );
    try_query_settable_attributes / query_settable_attributes(path: &WirePath);
    try_query_writable_namespaces / query_writable_namespaces(path: &WirePath);
    /// Allocate a monitor via `ctx.monitors()` and reply with its path.
    try_create_dir_monitor / create_dir_monitor(path: &WirePath, flags: u32);
    try_create_file_monitor / create_file_monitor(path: &WirePath, flags: u32);
    try_mount_mountable / mount_mountable(path: &WirePath);
    try_unmount_mountable / unmount_mountable(path: &WirePath, flags: u32);
    try_start_mountable / start_mountable(path: &WirePath);
    try_stop_mountable / stop_mountable(path: &WirePath, flags: u32);
    try_poll_mountable / poll_mountable(path: &WirePath);
    try_open_icon_for_read / open_icon_for_read(icon_id: &str);
}
