// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! fsbusd: the session mount tracker daemon.

use std::process::ExitCode;

use tokio::net::UnixListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use fsbus_daemon::env::{bus_socket, mountable_dir, PROTOCOL_VERSION};
use fsbus_daemon::{load_mountables, MountTracker};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("fsbusd failed: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let socket_path = bus_socket();
    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let _ = std::fs::remove_file(&socket_path);
    let listener = UnixListener::bind(&socket_path)?;
    info!(
        version = PROTOCOL_VERSION,
        socket = %socket_path.display(),
        "fsbusd starting"
    );

    let mountables = load_mountables(&mountable_dir());
    info!(count = mountables.len(), "mountable declarations loaded");

    let tracker = MountTracker::new(mountables);
    let serve = tokio::spawn(tracker.serve(listener));

    shutdown_signal().await;
    info!("shutting down");
    serve.abort();
    let _ = std::fs::remove_file(&socket_path);
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(e) => {
            error!("cannot install SIGTERM handler: {e}");
            // Fall back to ctrl-c only.
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = term.recv() => {}
        _ = tokio::signal::ctrl_c() => {}
    }
}
