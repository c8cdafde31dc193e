//! Streaming dependency installation.
//!
//! Runs the package manager in the requested directory and relays its
//! stdout and stderr to the engine line by line as `stream` messages. Both
//! pipes are pumped concurrently into one channel so neither can stall the
//! child on a full buffer.

use std::io::{BufRead, BufReader, Read, Write};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};

use thiserror::Error;
use tracing::debug;

use crate::toolchain::find_on_path;

use super::DISPATCH_TARGET;
use super::errors::DispatchError;
use super::response::{HostMessage, ResponseWriter, StreamTarget};

/// Errors raised while installing dependencies.
#[derive(Debug, Error)]
pub enum InstallError {
    /// No npm executable exists on `PATH`.
    #[error("npm install failed: no npm executable found on PATH")]
    NpmMissing,
    /// The installer could not be spawned or awaited.
    #[error("npm install failed: {0}")]
    Run(String),
    /// The installer exited unsuccessfully.
    #[error("npm install failed: exit status {0}")]
    Exit(i32),
    /// The installer was killed by a signal.
    #[error("npm install failed: terminated by signal")]
    Killed,
}

/// Installs dependencies in `directory`, streaming installer output.
pub(super) fn install_dependencies<W: Write>(
    directory: &Path,
    writer: &mut ResponseWriter<W>,
) -> Result<(), DispatchError> {
    writer.write_stdout("Installing dependencies...\n\n")?;

    let npm = find_on_path("npm").ok_or(InstallError::NpmMissing)?;
    debug!(
        target: DISPATCH_TARGET,
        directory = %directory.display(),
        "running npm install"
    );
    stream_command(&npm, &["install"], directory, writer)?;

    writer.write_stdout("Finished installing dependencies\n\n")?;
    Ok(())
}

/// Runs a command in `directory`, relaying its output as stream messages.
fn stream_command<W: Write>(
    program: &Path,
    args: &[&str],
    directory: &Path,
    writer: &mut ResponseWriter<W>,
) -> Result<(), DispatchError> {
    let mut child = Command::new(program)
        .args(args)
        .current_dir(directory)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|error| InstallError::Run(error.to_string()))?;

    let (line_tx, line_rx) = mpsc::channel();
    let mut pumps = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        pumps.push(pump_lines(StreamTarget::Stdout, stdout, line_tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        pumps.push(pump_lines(StreamTarget::Stderr, stderr, line_tx.clone()));
    }
    drop(line_tx);

    for (stream, data) in line_rx {
        writer.write_message(&HostMessage::Stream { stream, data })?;
    }
    for pump in pumps {
        let _ = pump.join();
    }

    let status = child
        .wait()
        .map_err(|error| InstallError::Run(error.to_string()))?;
    if status.success() {
        return Ok(());
    }
    Err(match status.code() {
        Some(code) => InstallError::Exit(code).into(),
        None => InstallError::Killed.into(),
    })
}

/// Pumps one output pipe into the line channel until EOF.
fn pump_lines(
    target: StreamTarget,
    reader: impl Read + Send + 'static,
    lines: Sender<(StreamTarget, String)>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut reader = BufReader::new(reader);
        let mut buffer = Vec::new();
        loop {
            buffer.clear();
            match reader.read_until(b'\n', &mut buffer) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buffer).into_owned();
                    if lines.send((target, line)).is_err() {
                        break;
                    }
                }
            }
        }
    })
}
