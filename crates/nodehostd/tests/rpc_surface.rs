//! End-to-end tests of the RPC surface over a real loopback socket.

use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::sync::Arc;

use nodehost_config::HostOptions;
use nodehostd::DispatchConnectionHandler;
use nodehostd::transport::TcpServerListener;

/// Starts a host endpoint and returns the address to dial.
fn start_host() -> (std::net::SocketAddr, nodehostd::transport::ListenerHandle) {
    let listener = TcpServerListener::bind(([127, 0, 0, 1], 0).into()).expect("bind");
    let addr = listener.local_addr();
    let handler = Arc::new(DispatchConnectionHandler::new(HostOptions::default()));
    let handle = listener.start(handler).expect("start");
    (addr, handle)
}

/// Sends one request line and collects every response line.
fn call(addr: std::net::SocketAddr, request: &serde_json::Value) -> Vec<serde_json::Value> {
    let mut stream = TcpStream::connect(addr).expect("connect");
    stream
        .write_all(request.to_string().as_bytes())
        .expect("write request");
    stream.write_all(b"\n").expect("write newline");
    stream.flush().expect("flush");

    let mut messages = Vec::new();
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    while reader.read_line(&mut line).expect("read response") > 0 {
        messages.push(serde_json::from_str(line.trim_end()).expect("response json"));
        line.clear();
    }
    messages
}

#[test]
fn get_plugin_info_reports_host_version() {
    let (addr, handle) = start_host();
    let messages = call(addr, &serde_json::json!({"method": "get-plugin-info"}));

    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["kind"], "response");
    assert_eq!(messages[0]["body"]["version"], env!("CARGO_PKG_VERSION"));
    handle.shutdown();
}

#[test]
fn get_required_plugins_reports_discovered_plugins() {
    let project = tempfile::TempDir::new().expect("project");
    let package = project.path().join("node_modules/@pulumi/aws");
    fs::create_dir_all(&package).expect("package dir");
    fs::write(
        package.join("package.json"),
        r#"{"name": "@pulumi/aws", "version": "5.1.0", "pulumi": {"resource": true}}"#,
    )
    .expect("manifest");

    let (addr, handle) = start_host();
    let messages = call(
        addr,
        &serde_json::json!({
            "method": "get-required-plugins",
            "params": {"program": project.path().to_string_lossy()},
        }),
    );

    assert_eq!(messages.len(), 1);
    let plugins = messages[0]["body"]["plugins"]
        .as_array()
        .expect("plugin list");
    assert_eq!(plugins.len(), 1);
    assert_eq!(plugins[0]["name"], "aws");
    assert_eq!(plugins[0]["kind"], "resource");
    assert_eq!(plugins[0]["version"], "v5.1.0");
    handle.shutdown();
}

#[test]
fn get_program_dependencies_without_lockfiles_is_an_error() {
    let project = tempfile::TempDir::new().expect("project");

    let (addr, handle) = start_host();
    let messages = call(
        addr,
        &serde_json::json!({
            "method": "get-program-dependencies",
            "params": {"pwd": project.path().to_string_lossy(), "transitiveDependencies": true},
        }),
    );

    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["kind"], "error");
    let message = messages[0]["message"].as_str().expect("message");
    assert!(message.contains("could not find either"), "{message}");
    handle.shutdown();
}

#[test]
fn concurrent_calls_are_served_independently() {
    let (addr, handle) = start_host();

    let workers: Vec<_> = (0..4)
        .map(|_| {
            std::thread::spawn(move || {
                call(addr, &serde_json::json!({"method": "get-plugin-info"}))
            })
        })
        .collect();
    for worker in workers {
        let messages = worker.join().expect("worker");
        assert_eq!(messages[0]["kind"], "response");
    }
    handle.shutdown();
}
