// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

use std::io::Write;

fn new_conn(stream: StdUnixStream) -> SyncConn {
    SyncConn { stream, side: None, serial: 0, next_fd_id: 0, stored_fds: HashMap::new() }
}

fn read_env(stream: &mut StdUnixStream) -> Envelope {
    let frame = read_message_sync(stream).unwrap();
    decode(&frame).unwrap()
}

fn write_env(stream: &mut StdUnixStream, env: &Envelope) {
    let bytes = encode(env).unwrap();
    write_message_sync(stream, &bytes).unwrap();
}

#[test]
fn call_returns_matching_reply() {
    let (client_end, mut server_end) = StdUnixStream::pair().unwrap();
    let server = std::thread::spawn(move || {
        let env = read_env(&mut server_end);
        let serial = env.serial;
        // An unrelated signal first; the engine must skip it.
        write_env(
            &mut server_end,
            &Envelope {
                serial: 100,
                body: Message::Signal {
                    object_path: "/org/fsbus/monitor/1".to_string(),
                    event: fsbus_wire::SignalEvent::Unmounted { info: sample_info() },
                },
            },
        );
        write_env(
            &mut server_end,
            &Envelope {
                serial: 101,
                body: Message::Reply { reply_serial: serial, payload: Reply::Unit },
            },
        );
    });

    let mut conn = new_conn(client_end);
    let reply = conn.call("/obj", Method::ListMounts, None).unwrap();
    assert_eq!(reply, Reply::Unit);
    server.join().unwrap();
}

#[test]
fn error_reply_maps_to_taxonomy() {
    let (client_end, mut server_end) = StdUnixStream::pair().unwrap();
    let server = std::thread::spawn(move || {
        let env = read_env(&mut server_end);
        write_env(
            &mut server_end,
            &Envelope {
                serial: 1,
                body: Message::Error {
                    reply_serial: env.serial,
                    name: "org.fsbus.Error.NotFound".to_string(),
                    message: "no such file".to_string(),
                },
            },
        );
    });

    let mut conn = new_conn(client_end);
    let err = conn.call("/obj", Method::ListMounts, None).unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
    server.join().unwrap();
}

#[test]
fn disconnect_mid_call_returns_retry_sentinel() {
    let (client_end, mut server_end) = StdUnixStream::pair().unwrap();
    let server = std::thread::spawn(move || {
        let _ = read_env(&mut server_end);
        drop(server_end);
    });

    let mut conn = new_conn(client_end);
    let err = conn.call("/obj", Method::ListMounts, None).unwrap_err();
    assert!(err.is_retry());
    server.join().unwrap();
}

#[test]
fn cancelled_token_wins_before_send() {
    let (client_end, _server_end) = StdUnixStream::pair().unwrap();
    let token = CancelToken::new().unwrap();
    token.cancel();

    let mut conn = new_conn(client_end);
    let err = conn.call("/obj", Method::ListMounts, Some(&token)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Cancelled);
}

#[test]
fn cancel_fd_emits_one_cancel_message() {
    let (client_end, mut server_end) = StdUnixStream::pair().unwrap();
    let token = CancelToken::new().unwrap();

    let server = std::thread::spawn(move || {
        let call = read_env(&mut server_end);
        let call_serial = call.serial;

        // Hold the reply until the cancel arrives.
        let cancel = read_env(&mut server_end);
        let cancelled_serial = match cancel.body {
            Message::Call { method: Method::Cancel { serial }, .. } => serial,
            other => panic!("expected Cancel, got {other:?}"),
        };
        assert_eq!(cancelled_serial, call_serial);

        write_env(
            &mut server_end,
            &Envelope {
                serial: 2,
                body: Message::Error {
                    reply_serial: call_serial,
                    name: "org.fsbus.Error.Cancelled".to_string(),
                    message: "operation was cancelled".to_string(),
                },
            },
        );
    });

    // Fire the token from another thread shortly after the call starts.
    let fire = std::thread::spawn({
        let token = token.clone();
        move || {
            std::thread::sleep(std::time::Duration::from_millis(50));
            token.cancel();
        }
    });

    let mut conn = new_conn(client_end);
    let err = conn.call("/obj", Method::ListMounts, Some(&token)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Cancelled);

    fire.join().unwrap();
    server.join().unwrap();
}

#[test]
fn get_fd_delivers_by_id_regardless_of_request_order() {
    let (client_side, server_side) = StdUnixStream::pair().unwrap();
    let (client_stream, _server_stream) = StdUnixStream::pair().unwrap();

    let mut files = Vec::new();
    for i in 0..3 {
        let mut f = tempfile::tempfile().unwrap();
        write!(f, "fd-{i}").unwrap();
        f.flush().unwrap();
        files.push(f);
    }
    for f in &files {
        fsbus_core::sys::send_fd(server_side.as_fd(), f.as_fd()).unwrap();
    }

    let mut conn = SyncConn {
        stream: client_stream,
        side: Some(client_side),
        serial: 0,
        next_fd_id: 0,
        stored_fds: HashMap::new(),
    };

    let read_tag = |fd: OwnedFd| {
        use std::io::{Read, Seek, SeekFrom};
        let mut f = std::fs::File::from(fd);
        f.seek(SeekFrom::Start(0)).unwrap();
        let mut s = String::new();
        f.read_to_string(&mut s).unwrap();
        s
    };

    assert_eq!(read_tag(conn.get_fd(1).unwrap()), "fd-1");
    assert_eq!(read_tag(conn.get_fd(0).unwrap()), "fd-0");
    assert_eq!(read_tag(conn.get_fd(2).unwrap()), "fd-2");
}

fn sample_info() -> fsbus_core::MountInfo {
    fsbus_core::MountInfo {
        endpoint: "/run/fsbus/x.sock".to_string(),
        object_path: "/org/fsbus/mount/1".to_string(),
        spec: MountSpec::new("sftp"),
        display_name: "d".to_string(),
        stable_name: "s".to_string(),
        icon: None,
        preferred_filename_encoding: None,
        user_visible: false,
        fuse_mountpoint: None,
        default_location: None,
        x_content_types: String::new(),
    }
}
