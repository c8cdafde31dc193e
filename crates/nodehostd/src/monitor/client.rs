//! Blocking JSONL client for the engine's resource monitor.

use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use super::MONITOR_TARGET;

/// Errors raised while talking to the resource monitor.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// The monitor address could not be dialled.
    #[error("failed to connect to resource monitor at {address}: {source}")]
    Connect {
        /// Address that was dialled.
        address: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The connection failed mid-exchange.
    #[error("resource monitor connection failed: {source}")]
    Io {
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The monitor closed the connection before replying.
    #[error("resource monitor disconnected")]
    Disconnected,

    /// The monitor's reply was not a valid protocol message.
    #[error("invalid reply from resource monitor: {message}")]
    Protocol {
        /// Description of the violation.
        message: String,
    },

    /// The monitor answered the call with an error.
    #[error("{message}")]
    Remote {
        /// Method that failed.
        method: String,
        /// The monitor's error message.
        message: String,
    },
}

/// Reply envelope read back from the monitor.
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum MonitorReply {
    Response { body: Value },
    Error { message: String },
}

/// A blocking connection to the resource monitor.
///
/// One request/reply exchange per call; calls on a single client are
/// strictly ordered. Independent channels (the proxy's connections, the
/// pipe server) each hold their own client, so no ordering exists between
/// them.
#[derive(Debug)]
pub struct MonitorClient {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    address: String,
}

impl MonitorClient {
    /// Dials the monitor at the given `host:port` address.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::Connect`] when the address is unreachable.
    pub fn connect(address: &str) -> Result<Self, MonitorError> {
        let stream = TcpStream::connect(address).map_err(|source| MonitorError::Connect {
            address: address.to_string(),
            source,
        })?;
        let reader = stream
            .try_clone()
            .map_err(|source| MonitorError::Io { source })?;
        Ok(Self {
            reader: BufReader::new(reader),
            writer: stream,
            address: address.to_string(),
        })
    }

    /// The address this client is connected to.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Calls a monitor method, passing its parameters through verbatim.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError`] on transport failures, protocol violations,
    /// or a remote error reply.
    pub fn call(&mut self, method: &str, params: &Value) -> Result<Value, MonitorError> {
        debug!(target: MONITOR_TARGET, method, "forwarding monitor call");
        let request = serde_json::json!({ "method": method, "params": params });
        let mut line =
            serde_json::to_vec(&request).map_err(|error| MonitorError::Protocol {
                message: error.to_string(),
            })?;
        line.push(b'\n');
        self.writer
            .write_all(&line)
            .and_then(|()| self.writer.flush())
            .map_err(|source| MonitorError::Io { source })?;

        let mut reply_line = String::new();
        let read = self
            .reader
            .read_line(&mut reply_line)
            .map_err(|source| MonitorError::Io { source })?;
        if read == 0 {
            return Err(MonitorError::Disconnected);
        }
        let reply: MonitorReply =
            serde_json::from_str(reply_line.trim_end()).map_err(|error| MonitorError::Protocol {
                message: error.to_string(),
            })?;
        match reply {
            MonitorReply::Response { body } => Ok(body),
            MonitorReply::Error { message } => Err(MonitorError::Remote {
                method: method.to_string(),
                message,
            }),
        }
    }

    /// Issues a synchronous `invoke` call on behalf of the child runtime.
    ///
    /// # Errors
    ///
    /// See [`MonitorClient::call`].
    pub fn invoke(&mut self, request: &Value) -> Result<Value, MonitorError> {
        self.call("invoke", request)
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;
    use std::thread;

    use super::*;

    /// Accepts one connection and answers every request with the given line.
    fn fake_monitor(reply: &'static str) -> String {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind");
        let address = listener.local_addr().expect("addr").to_string();
        thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept");
            let mut reader = BufReader::new(stream.try_clone().expect("clone"));
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

    #[test]
    fn call_round_trips_response_body() {
        let address = fake_monitor(r#"{"kind":"response","body":{"ok":true}}"#);
        let mut client = MonitorClient::connect(&address).expect("connect");
        let body = client
            .call("supports-feature", &serde_json::json!({"id": "secrets"}))
            .expect("call");
        assert_eq!(body, serde_json::json!({"ok": true}));
    }

    #[test]
    fn remote_errors_surface_as_remote() {
        let address = fake_monitor(r#"{"kind":"error","message":"no such resource"}"#);
        let mut client = MonitorClient::connect(&address).expect("connect");
        let error = client
            .invoke(&serde_json::json!({"token": "aws:index:getAmi"}))
            .expect_err("must fail");
        assert!(matches!(error, MonitorError::Remote { .. }));
        assert_eq!(error.to_string(), "no such resource");
    }

    #[test]
    fn unreachable_monitor_is_a_connect_error() {
        let error = MonitorClient::connect("127.0.0.1:1").expect_err("must fail");
        assert!(matches!(error, MonitorError::Connect { .. }));
    }
}
