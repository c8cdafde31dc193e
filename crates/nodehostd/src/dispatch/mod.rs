//! JSONL request dispatch for the engine-facing RPC surface.
//!
//! Each connection carries a single request envelope naming a method and its
//! parameters. The handler parses and validates the envelope, routes it to
//! the method implementation, and streams tagged response messages back,
//! ending with exactly one terminal `response` or `error` message.

mod errors;
mod handler;
mod install;
mod request;
mod response;
mod router;

pub use self::errors::DispatchError;
pub use self::handler::DispatchConnectionHandler;
pub use self::install::InstallError;
pub use self::request::{
    GetProgramDependenciesParams, GetRequiredPluginsParams, InstallDependenciesParams, RpcRequest,
    RunParams,
};
pub use self::response::{HostMessage, ResponseWriter, StreamTarget};
pub use self::router::{Method, MethodRouter};

pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");
