//! TCP listener shared by the daemon's RPC surfaces.
//!
//! Both the engine-facing RPC endpoint and the per-run monitor proxy bind a
//! loopback TCP listener and accept connections in a background thread. The
//! listener is non-blocking with a bounded pool of handler threads; each
//! accepted connection is handed to a [`ConnectionHandler`].

mod errors;
mod handler;
mod listener;

pub use self::errors::ListenerError;
pub use self::handler::ConnectionHandler;
pub use self::listener::{ListenerHandle, TcpServerListener};

const LISTENER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");
