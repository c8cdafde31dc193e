//! Connection handler that dispatches JSONL requests.
//!
//! Reads a single bounded request line per connection, parses it into the
//! typed envelope, routes it, and guarantees the engine sees a terminal
//! message whichever way the call goes.

use std::io::{self, Read};
use std::net::TcpStream;

use tracing::{debug, warn};

use nodehost_config::HostOptions;

use crate::transport::ConnectionHandler;

use super::DISPATCH_TARGET;
use super::errors::DispatchError;
use super::request::RpcRequest;
use super::response::ResponseWriter;
use super::router::MethodRouter;

/// Maximum size of a single request line in bytes.
const MAX_REQUEST_BYTES: usize = 1024 * 1024;

/// Connection handler for the engine-facing RPC endpoint.
///
/// Each connection is handled synchronously on its pooled thread: one
/// request line in, a stream of response messages out, connection closed.
#[derive(Debug)]
pub struct DispatchConnectionHandler {
    router: MethodRouter,
}

impl DispatchConnectionHandler {
    /// Creates a handler over the host options.
    #[must_use]
    pub fn new(options: HostOptions) -> Self {
        Self {
            router: MethodRouter::new(options),
        }
    }

    fn dispatch(&self, mut stream: TcpStream) {
        let request_bytes = match read_request_line(&mut stream) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                debug!(target: DISPATCH_TARGET, "client disconnected without request");
                return;
            }
            Err(error) => {
                warn!(target: DISPATCH_TARGET, %error, "failed to read request");
                let mut writer = ResponseWriter::new(&mut stream);
                let _ = writer.write_error(&DispatchError::Io(error));
                return;
            }
        };

        let mut writer = ResponseWriter::new(&mut stream);

        let request = match RpcRequest::parse(&request_bytes) {
            Ok(request) => request,
            Err(error) => {
                warn!(target: DISPATCH_TARGET, %error, "malformed request");
                let _ = writer.write_error(&error);
                return;
            }
        };
        if let Err(error) = request.validate() {
            warn!(target: DISPATCH_TARGET, %error, "invalid request");
            let _ = writer.write_error(&error);
            return;
        }

        if let Err(error) = self.router.route(&request, &mut writer) {
            warn!(
                target: DISPATCH_TARGET,
                method = request.method(),
                %error,
                "dispatch failed"
            );
            let _ = writer.write_error(&error);
        }
    }
}

impl ConnectionHandler for DispatchConnectionHandler {
    fn handle(&self, stream: TcpStream) {
        self.dispatch(stream);
    }
}

/// Reads a bounded JSONL request line from the stream.
///
/// Returns `Ok(None)` if the client disconnects without sending data,
/// `Ok(Some(bytes))` on a complete line (or EOF with partial data), and an
/// error when reading fails or the request exceeds the maximum size.
fn read_request_line(stream: &mut TcpStream) -> io::Result<Option<Vec<u8>>> {
    let mut buffer = Vec::new();
    let mut chunk = [0_u8; 1024];

    loop {
        let bytes_read = read_with_retry(stream, &mut chunk)?;

        if bytes_read == 0 {
            return Ok(if buffer.is_empty() {
                None
            } else {
                Some(buffer)
            });
        }

        if let Some(newline_pos) = chunk[..bytes_read].iter().position(|b| *b == b'\n') {
            buffer.extend_from_slice(&chunk[..=newline_pos]);
            enforce_limit(buffer.len())?;
            return Ok(Some(buffer));
        }

        buffer.extend_from_slice(&chunk[..bytes_read]);
        enforce_limit(buffer.len())?;
    }
}

/// Reads from the stream, retrying on interrupts.
fn read_with_retry(stream: &mut TcpStream, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        match stream.read(buf) {
            Ok(n) => return Ok(n),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

/// Enforces the maximum request size limit.
fn enforce_limit(size: usize) -> io::Result<()> {
    if size > MAX_REQUEST_BYTES {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "request exceeds maximum size",
        ));
    }
    Ok(())
}
