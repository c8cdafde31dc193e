use std::io::{BufRead, BufReader as IoBufReader, Cursor};
use std::net::TcpListener;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use super::*;

#[test]
fn frames_round_trip() {
    let mut buffer = Vec::new();
    write_frame(&mut buffer, br#"{"token":"aws:index:getAmi"}"#).expect("write frame");
    write_frame(&mut buffer, b"second").expect("write frame");

    let mut reader = Cursor::new(buffer);
    let first = read_frame(&mut reader).expect("read").expect("frame");
    assert_eq!(first, br#"{"token":"aws:index:getAmi"}"#);
    let second = read_frame(&mut reader).expect("read").expect("frame");
    assert_eq!(second, b"second");
    assert!(read_frame(&mut reader).expect("read").is_none());
}

#[test]
fn oversized_frames_are_rejected() {
    let mut buffer = Vec::new();
    buffer.extend_from_slice(&u32::MAX.to_be_bytes());
    let error = read_frame(&mut Cursor::new(buffer)).expect_err("must fail");
    assert_eq!(error.kind(), std::io::ErrorKind::InvalidData);
}

/// A monitor that answers every request line with the given reply line.
fn fake_monitor(reply: &'static str) -> String {
    let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind");
    let address = listener.local_addr().expect("addr").to_string();
    thread::spawn(move || {
        let (stream, _) = listener.accept().expect("accept");
        let mut reader = IoBufReader::new(stream.try_clone().expect("clone"));
        let mut writer = stream;
        let mut line = String::new();
        while reader.read_line(&mut line).unwrap_or(0) > 0 {
            writer.write_all(reply.as_bytes()).expect("reply");
            writer.write_all(b"\n").expect("newline");
            line.clear();
        }
    });
    address
}

#[cfg(unix)]
#[test]
fn serves_sync_invokes_in_order() {
    let address = fake_monitor(r#"{"kind":"response","body":{"return":{"id":"ami-123"}}}"#);
    let client = MonitorClient::connect(&address).expect("connect");
    let (pipes, errors) = SyncInvokePipes::start(client).expect("start pipes");
    let directory = pipes.directory().to_path_buf();

    // Play the child: write two framed requests, read two framed replies.
    let child = thread::spawn(move || {
        let mut request = std::fs::OpenOptions::new()
            .write(true)
            .open(directory.join("invoke_req"))
            .expect("open request pipe");
        let mut reply = IoBufReader::new(
            std::fs::File::open(directory.join("invoke_res")).expect("open reply pipe"),
        );
        let mut bodies = Vec::new();
        for token in ["aws:index:getAmi", "aws:index:getAzs"] {
            let frame = serde_json::json!({"token": token, "args": {}}).to_string();
            write_frame(&mut request, frame.as_bytes()).expect("write request");
            let body = read_frame(&mut reply).expect("read reply").expect("reply frame");
            bodies.push(serde_json::from_slice::<serde_json::Value>(&body).expect("reply json"));
        }
        bodies
    });

    let bodies = child.join().expect("child thread");
    assert_eq!(bodies.len(), 2);
    for body in bodies {
        assert_eq!(body["return"]["id"], "ami-123");
    }

    drop(pipes);
    assert!(
        errors.try_recv().is_err(),
        "clean shutdown must produce no error event"
    );
}

#[cfg(unix)]
#[test]
fn monitor_failure_surfaces_on_error_channel() {
    let address = fake_monitor(r#"{"kind":"error","message":"engine went away"}"#);
    let client = MonitorClient::connect(&address).expect("connect");
    let (pipes, errors) = SyncInvokePipes::start(client).expect("start pipes");
    let directory = pipes.directory().to_path_buf();

    let child = thread::spawn(move || {
        let mut request = std::fs::OpenOptions::new()
            .write(true)
            .open(directory.join("invoke_req"))
            .expect("open request pipe");
        let _reply = std::fs::File::open(directory.join("invoke_res")).expect("open reply pipe");
        let frame = serde_json::json!({"token": "aws:index:getAmi"}).to_string();
        write_frame(&mut request, frame.as_bytes()).expect("write request");
        // Hold the pipes open long enough for the serve loop to fail.
        thread::sleep(Duration::from_millis(200));
    });

    let error = errors
        .recv_timeout(Duration::from_secs(5))
        .expect("error event");
    assert!(matches!(error, PipeError::Monitor(_)), "{error}");
    child.join().expect("child thread");
}

#[cfg(unix)]
#[test]
fn dropping_without_a_child_cleans_up_and_does_not_hang() {
    let address = fake_monitor(r#"{"kind":"response","body":{}}"#);
    let client = MonitorClient::connect(&address).expect("connect");
    let (pipes, _errors) = SyncInvokePipes::start(client).expect("start pipes");
    let directory = pipes.directory().to_path_buf();

    let (done_tx, done_rx) = mpsc::channel();
    thread::spawn(move || {
        drop(pipes);
        done_tx.send(()).ok();
    });

    done_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("drop must not hang on a child that never connected");
    assert!(!directory.exists(), "pipe directory must be removed");
}
