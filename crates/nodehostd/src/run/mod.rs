//! The run orchestrator.
//!
//! Composes the three concurrent activities of a `run` call: the monitor
//! proxy the child talks to, the sync-invoke pipe server, and the child
//! supervisor. Terminal events from all three funnel through one
//! rendezvous channel as a tagged variant; the first one received becomes
//! the response, and the losers' resources are torn down by scoped drops
//! on the way out.

pub mod arguments;
pub mod environment;
mod supervisor;

use std::fmt;
use std::io::Write;
use std::sync::mpsc::{Receiver, SyncSender, sync_channel};
use std::thread;

use serde::Serialize;
use tracing::{debug, error};

use nodehost_config::{DEFAULT_RUN_PATH, HostOptions, RUN_PATH_ENV_VAR};

use crate::dispatch::RunParams;
use crate::monitor::{MonitorClient, MonitorProxy};
use crate::pipes::{PipeError, SyncInvokePipes};
use crate::toolchain::{self, SystemCommandRunner};

pub(crate) const RUN_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::run");

/// User-facing hint printed when the runtime shim cannot be resolved.
pub const SDK_INSTALL_HINT: &str =
    "It looks like the Pulumi SDK has not been installed. Have you run npm install or yarn install?";

/// The response of a `run` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunResult {
    /// Failure description, empty on success and on bail.
    pub error: String,
    /// Cooperative-termination marker: the child already printed a
    /// user-actionable message and nothing more should be shown.
    pub bail: bool,
}

impl RunResult {
    /// Creates a failed result.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            bail: false,
        }
    }

    /// Creates a bail result.
    #[must_use]
    pub fn bail() -> Self {
        Self {
            error: String::new(),
            bail: true,
        }
    }
}

/// Which activity produced a terminal event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventSource {
    Proxy,
    Pipes,
    Child,
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Proxy => "monitor proxy",
            Self::Pipes => "pipe server",
            Self::Child => "child process",
        })
    }
}

/// A terminal event from one of the three run activities.
struct RunEvent {
    source: EventSource,
    result: RunResult,
}

/// Executes a run request and returns exactly one response.
///
/// Infrastructure failures before the child launches surface in the
/// returned result. A missing interpreter or an unresolvable runtime shim
/// terminates the host process with an actionable message, matching the
/// contract with the calling engine.
pub fn execute(options: &HostOptions, params: RunParams) -> RunResult {
    // The pipe server gets its own monitor connection: sync invokes are
    // strictly ordered on one channel, independent of the proxy's traffic.
    let pipe_client = match MonitorClient::connect(&params.monitor_address) {
        Ok(client) => client,
        Err(err) => return RunResult::error(err.to_string()),
    };
    let (proxy, proxy_errors) = match MonitorProxy::start(params.monitor_address.clone()) {
        Ok(started) => started,
        Err(err) => return RunResult::error(err.to_string()),
    };
    let (pipes, pipe_errors) = match SyncInvokePipes::start(pipe_client) {
        Ok(started) => started,
        Err(err) => return RunResult::error(err.to_string()),
    };

    let runner = SystemCommandRunner;
    let Some(node_bin) = toolchain::find_on_path("node") else {
        exit_with_message("could not find node on the $PATH");
    };
    let configured_run_path =
        std::env::var(RUN_PATH_ENV_VAR).unwrap_or_else(|_| DEFAULT_RUN_PATH.to_string());
    let run_path = match toolchain::locate_module(&runner, &node_bin, &configured_run_path) {
        Ok(run_path) => run_path,
        Err(err) => {
            error!(target: RUN_TARGET, error = %err, "failed to resolve runtime shim");
            exit_with_message(SDK_INSTALL_HINT);
        }
    };

    let (event_tx, event_rx): (SyncSender<RunEvent>, Receiver<RunEvent>) = sync_channel(3);

    forward_errors(EventSource::Proxy, proxy_errors, &event_tx);
    forward_pipe_errors(pipe_errors, &event_tx);

    let monitor_address = proxy.local_address().to_string();
    let pipes_directory = pipes.directory().to_string_lossy().into_owned();
    {
        let event_tx = event_tx.clone();
        let options = options.clone();
        thread::spawn(move || {
            let result = supervisor::launch(
                &options,
                &params,
                &node_bin,
                &run_path,
                &monitor_address,
                &pipes_directory,
            );
            let _ = event_tx.send(RunEvent {
                source: EventSource::Child,
                result,
            });
        });
    }

    let event = match event_rx.recv() {
        Ok(event) => event,
        // Unreachable in practice: the child thread always sends.
        Err(_) => RunEvent {
            source: EventSource::Child,
            result: RunResult::error("run terminated without a result"),
        },
    };
    debug!(
        target: RUN_TARGET,
        source = %event.source,
        error = %event.result.error,
        bail = event.result.bail,
        "run finished"
    );

    // Dropping the proxy handle and the pipe server here tears down the
    // losing producers' resources, whichever event won.
    event.result
}

/// Forwards a producer's first terminal error into the rendezvous channel.
fn forward_errors(source: EventSource, errors: Receiver<String>, event_tx: &SyncSender<RunEvent>) {
    let event_tx = event_tx.clone();
    thread::spawn(move || {
        if let Ok(message) = errors.recv() {
            let _ = event_tx.send(RunEvent {
                source,
                result: RunResult::error(message),
            });
        }
    });
}

fn forward_pipe_errors(errors: Receiver<PipeError>, event_tx: &SyncSender<RunEvent>) {
    let event_tx = event_tx.clone();
    thread::spawn(move || {
        if let Ok(error) = errors.recv() {
            let _ = event_tx.send(RunEvent {
                source: EventSource::Pipes,
                result: RunResult::error(error.to_string()),
            });
        }
    });
}

/// Prints an actionable message and terminates the host process.
fn exit_with_message(message: &str) -> ! {
    let mut stderr = std::io::stderr();
    let _ = writeln!(stderr, "error: {message}");
    let _ = stderr.flush();
    std::process::exit(1);
}
