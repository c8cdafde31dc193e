//! Transparent per-run proxy in front of the engine's resource monitor.

use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::sync::mpsc::{Receiver, SyncSender, sync_channel};

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::transport::{ConnectionHandler, ListenerError, ListenerHandle, TcpServerListener};

use super::MONITOR_TARGET;
use super::client::MonitorClient;

/// Methods of the resource-monitor surface the proxy forwards.
///
/// The proxy adds no behaviour of its own: every method passes its
/// parameters to the real monitor verbatim and relays the reply untouched.
/// Its only value is giving the child a local endpoint whose lifetime the
/// host controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorMethod {
    /// Capability negotiation.
    SupportsFeature,
    /// Provider function invocation.
    Invoke,
    /// Streaming provider function invocation.
    StreamInvoke,
    /// Provider method call.
    Call,
    /// Read an existing resource.
    ReadResource,
    /// Register a resource.
    RegisterResource,
    /// Register a resource's output properties.
    RegisterResourceOutputs,
}

impl MonitorMethod {
    /// Parses a wire method name.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "supports-feature" => Some(Self::SupportsFeature),
            "invoke" => Some(Self::Invoke),
            "stream-invoke" => Some(Self::StreamInvoke),
            "call" => Some(Self::Call),
            "read-resource" => Some(Self::ReadResource),
            "register-resource" => Some(Self::RegisterResource),
            "register-resource-outputs" => Some(Self::RegisterResourceOutputs),
            _ => None,
        }
    }

    /// Returns the canonical wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SupportsFeature => "supports-feature",
            Self::Invoke => "invoke",
            Self::StreamInvoke => "stream-invoke",
            Self::Call => "call",
            Self::ReadResource => "read-resource",
            Self::RegisterResource => "register-resource",
            Self::RegisterResourceOutputs => "register-resource-outputs",
        }
    }
}

/// Request envelope read from the child runtime.
#[derive(Debug, Deserialize)]
struct ProxyRequest {
    method: String,
    #[serde(default)]
    params: Value,
}

/// The per-run monitor proxy server.
pub struct MonitorProxy;

impl MonitorProxy {
    /// Starts a proxy on a kernel-chosen loopback port.
    ///
    /// Terminal failures (the upstream monitor becoming unreachable) are
    /// reported on the returned error channel, which yields at most one
    /// message.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError`] when the loopback listener cannot start.
    pub fn start(
        monitor_address: String,
    ) -> Result<(MonitorProxyHandle, Receiver<String>), ListenerError> {
        let listener = TcpServerListener::bind(([127, 0, 0, 1], 0).into())?;
        let local_address = format!("127.0.0.1:{}", listener.local_addr().port());
        let (error_tx, error_rx) = sync_channel(1);
        let handler = ForwardingHandler {
            monitor_address,
            error_tx,
        };
        let listener = listener.start(Arc::new(handler))?;
        debug!(target: MONITOR_TARGET, address = %local_address, "monitor proxy serving");
        Ok((
            MonitorProxyHandle {
                local_address,
                _listener: listener,
            },
            error_rx,
        ))
    }
}

/// Handle controlling a running proxy's lifetime.
///
/// Dropping the handle shuts the listener down.
pub struct MonitorProxyHandle {
    local_address: String,
    _listener: ListenerHandle,
}

impl MonitorProxyHandle {
    /// The loopback address the child runtime should dial.
    #[must_use]
    pub fn local_address(&self) -> &str {
        &self.local_address
    }
}

/// Per-connection forwarder between the child and the real monitor.
struct ForwardingHandler {
    monitor_address: String,
    error_tx: SyncSender<String>,
}

impl ConnectionHandler for ForwardingHandler {
    fn handle(&self, stream: TcpStream) {
        // Each child connection gets its own upstream connection; ordering
        // is preserved per channel, never across channels.
        let mut upstream = match MonitorClient::connect(&self.monitor_address) {
            Ok(upstream) => upstream,
            Err(error) => {
                warn!(
                    target: MONITOR_TARGET,
                    error = %error,
                    "monitor unreachable from proxy"
                );
                let _ = write_error(&stream, &error.to_string());
                let _ = self.error_tx.try_send(error.to_string());
                return;
            }
        };

        let mut reader = BufReader::new(match stream.try_clone() {
            Ok(clone) => clone,
            Err(error) => {
                warn!(target: MONITOR_TARGET, error = %error, "failed to clone proxy stream");
                return;
            }
        });
        let mut line = String::new();
        loop {
            line.clear();
            match reader.read_line(&mut line) {
                Ok(0) => break,
                Ok(_) => {}
                Err(error) => {
                    warn!(target: MONITOR_TARGET, error = %error, "proxy read failed");
                    break;
                }
            }

            let request: ProxyRequest = match serde_json::from_str(line.trim_end()) {
                Ok(request) => request,
                Err(error) => {
                    if write_error(&stream, &format!("malformed monitor request: {error}"))
                        .is_err()
                    {
                        break;
                    }
                    continue;
                }
            };
            let Some(method) = MonitorMethod::parse(&request.method) else {
                if write_error(
                    &stream,
                    &format!("unknown monitor method: {}", request.method),
                )
                .is_err()
                {
                    break;
                }
                continue;
            };

            let written = match upstream.call(method.as_str(), &request.params) {
                Ok(body) => write_response(&stream, &body),
                Err(error) => write_error(&stream, &error.to_string()),
            };
            if written.is_err() {
                break;
            }
        }
    }
}

fn write_response(mut stream: &TcpStream, body: &Value) -> std::io::Result<()> {
    let message = serde_json::json!({ "kind": "response", "body": body });
    stream.write_all(message.to_string().as_bytes())?;
    stream.write_all(b"\n")?;
    stream.flush()
}

fn write_error(mut stream: &TcpStream, message: &str) -> std::io::Result<()> {
    let message = serde_json::json!({ "kind": "error", "message": message });
    stream.write_all(message.to_string().as_bytes())?;
    stream.write_all(b"\n")?;
    stream.flush()
}
