//! The language host daemon for NodeJS programs.
//!
//! The daemon sits between the deployment engine and a spawned NodeJS child
//! process. The engine drives it over a JSONL-over-TCP RPC surface; the
//! child cannot block on sockets, so synchronous invokes travel over a pair
//! of named pipes instead. The `run` operation composes three concurrent
//! activities — a monitor proxy the child talks to, the sync-invoke pipe
//! server, and the child supervisor — and returns whichever terminal event
//! arrives first.
//!
//! Secondary surfaces enumerate the plugins a program requires (a walk over
//! its `node_modules` tree, provided by `nodehost-plugins`), report its
//! dependencies from package-manager lockfile output, install dependencies
//! with streamed output, and answer toolchain introspection queries.

pub mod deps;
pub mod dispatch;
pub mod monitor;
pub mod pipes;
pub mod run;
pub mod telemetry;
pub mod toolchain;
pub mod transport;

pub use dispatch::DispatchConnectionHandler;
pub use telemetry::{TelemetryError, TelemetryHandle};
