//! Connection handling abstraction for the daemon listeners.

use std::net::TcpStream;

/// Handles accepted socket connections.
///
/// Implementations run on a pooled handler thread and should avoid
/// panicking; a connection-level failure is reported to the peer or logged,
/// never propagated.
pub trait ConnectionHandler: Send + Sync + 'static {
    /// Handles a single connection.
    fn handle(&self, stream: TcpStream);
}
