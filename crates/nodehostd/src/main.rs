//! Daemon entry point.
//!
//! The engine spawns this binary with the engine's own address as the only
//! positional argument, reads the port line the daemon prints on stdout,
//! and then drives it over the RPC surface. Everything diagnostic goes to
//! stderr; stdout carries exactly the port line.

use std::io::Write;
use std::net::{TcpStream, ToSocketAddrs};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use clap::Parser;

use nodehost_config::{HostOptions, LogFormat, LogFormatParseError};
use nodehostd::DispatchConnectionHandler;
use nodehostd::telemetry;
use nodehostd::transport::TcpServerListener;

/// How long the engine gets to become reachable before startup fails.
const ENGINE_WAIT_BUDGET: Duration = Duration::from_secs(5 * 60);

/// Delay between engine reachability probes.
const ENGINE_PROBE_INTERVAL: Duration = Duration::from_millis(500);

/// Language host for NodeJS programs.
#[derive(Parser, Debug)]
#[command(name = "nodehostd", disable_help_subcommand = true)]
struct Cli {
    /// Emit tracing to the given endpoint, forwarded to the child runtime.
    #[arg(long, value_name = "ENDPOINT", default_value = "")]
    tracing: String,
    /// Use ts-node at runtime to support TypeScript source natively.
    #[arg(long, value_name = "BOOL", default_value_t = true, action = clap::ArgAction::Set)]
    typescript: bool,
    /// Project root path to use.
    #[arg(long, value_name = "PATH")]
    root: Option<Utf8PathBuf>,
    /// Path to tsconfig.json to use.
    #[arg(long, value_name = "PATH")]
    tsconfig: Option<Utf8PathBuf>,
    /// Arguments for the Node process.
    #[arg(long, value_name = "ARGS", default_value = "")]
    nodeargs: String,
    /// Logging output format (json or compact).
    #[arg(long, value_name = "FORMAT", default_value = "compact", value_parser = parse_log_format)]
    log_format: LogFormat,
    /// Address of the deployment engine.
    #[arg(value_name = "ENGINE_ADDRESS")]
    engine_address: Option<String>,
}

fn parse_log_format(value: &str) -> Result<LogFormat, LogFormatParseError> {
    value.parse()
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut options = HostOptions::new(cli.engine_address.clone())
        .with_tracing_endpoint(cli.tracing)
        .with_typescript(cli.typescript)
        .with_nodeargs(cli.nodeargs)
        .with_log_format(cli.log_format);
    if let Some(root) = cli.root {
        options = options.with_project_root(root);
    }
    if let Some(tsconfig) = cli.tsconfig {
        options = options.with_tsconfig_path(tsconfig);
    }

    if let Err(error) = telemetry::initialise(&options) {
        eprintln!("failed to initialise telemetry: {error}");
        return ExitCode::FAILURE;
    }

    if let Some(engine_address) = options.engine_address() {
        if let Err(error) = wait_for_engine(engine_address, ENGINE_WAIT_BUDGET) {
            eprintln!("could not start health check host RPC server: {error}");
            return ExitCode::FAILURE;
        }
    }

    let listener = match TcpServerListener::bind(([127, 0, 0, 1], 0).into()) {
        Ok(listener) => listener,
        Err(error) => {
            eprintln!("could not start language host RPC server: {error}");
            return ExitCode::FAILURE;
        }
    };
    let port = listener.local_addr().port();

    let handler = Arc::new(DispatchConnectionHandler::new(options));
    let handle = match listener.start(handler) {
        Ok(handle) => handle,
        Err(error) => {
            eprintln!("could not start language host RPC server: {error}");
            return ExitCode::FAILURE;
        }
    };

    // The spawner reads this single line to learn where to connect.
    println!("{port}");
    let _ = std::io::stdout().flush();

    match handle.join() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("language host RPC stopped serving: {error}");
            ExitCode::FAILURE
        }
    }
}

/// Polls the engine address until it accepts a connection or the budget is
/// exhausted.
fn wait_for_engine(address: &str, budget: Duration) -> Result<(), String> {
    let deadline = Instant::now() + budget;
    loop {
        let addrs = address
            .to_socket_addrs()
            .map_err(|error| format!("invalid engine address '{address}': {error}"))?;
        for addr in addrs {
            if TcpStream::connect_timeout(&addr, ENGINE_PROBE_INTERVAL).is_ok() {
                return Ok(());
            }
        }
        if Instant::now() >= deadline {
            return Err(format!(
                "engine at {address} was unreachable for {} seconds",
                budget.as_secs()
            ));
        }
        std::thread::sleep(ENGINE_PROBE_INTERVAL);
    }
}
