//! Synchronous invoke server over a pair of named pipes.
//!
//! The child runtime cannot block on sockets, so its synchronous invokes
//! travel over two FIFOs in a fresh temporary directory: the child writes
//! length-prefixed requests into one and reads length-prefixed replies from
//! the other. The host runs a strictly ordered read loop, forwarding each
//! request to the engine monitor as a single `invoke` call and writing the
//! reply back with the same framing. Parallelising the loop would buy
//! nothing and break the child's framing assumptions.
//!
//! Frames are a 4-byte big-endian length followed by exactly that many
//! bytes of JSON. A zero-length frame is the host's own shutdown sentinel
//! and never appears in child traffic.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, SyncSender, sync_channel};
use std::thread::{self, JoinHandle};

use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, warn};

use crate::monitor::{MonitorClient, MonitorError};

const PIPES_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::pipes");

/// FIFO the child writes invoke requests into.
const REQUEST_PIPE: &str = "invoke_req";

/// FIFO the child reads invoke replies from.
const REPLY_PIPE: &str = "invoke_res";

/// Upper bound on a single frame body.
const MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

/// Errors raised by the pipe server.
#[derive(Debug, Error)]
pub enum PipeError {
    /// The temporary pipe directory could not be created.
    #[error("failed to create pipe directory: {source}")]
    TempDir {
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A FIFO could not be created.
    #[cfg(unix)]
    #[error("failed to create pipe {}: {source}", path.display())]
    CreateFifo {
        /// FIFO path.
        path: PathBuf,
        /// Underlying errno.
        #[source]
        source: nix::Error,
    },

    /// A pipe could not be opened.
    #[error("failed to open pipe {}: {source}", path.display())]
    Open {
        /// Pipe path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Reading an invoke request failed.
    #[error("failed to read invoke request: {source}")]
    Read {
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Writing an invoke reply failed.
    #[error("failed to write invoke reply: {source}")]
    Write {
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// An invoke request frame was not valid JSON.
    #[error("invalid invoke request: {source}")]
    Decode {
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// An invoke reply could not be encoded.
    #[error("failed to encode invoke reply: {source}")]
    Encode {
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The forwarded invoke failed against the monitor.
    #[error(transparent)]
    Monitor(#[from] MonitorError),
}

/// The pipe pair and its serve loop.
///
/// Dropping the server unblocks the serve thread and removes the temporary
/// directory; cleanup happens on every exit path of `run`.
pub struct SyncInvokePipes {
    request_path: PathBuf,
    reply_path: PathBuf,
    temp_dir: Option<TempDir>,
    thread: Option<JoinHandle<()>>,
}

impl SyncInvokePipes {
    /// Creates the pipe pair and starts the serve loop.
    ///
    /// Terminal serve-loop failures arrive on the returned receiver; a clean
    /// end-of-stream from the child produces nothing.
    ///
    /// # Errors
    ///
    /// Returns [`PipeError`] when the directory or FIFOs cannot be created.
    pub fn start(client: MonitorClient) -> Result<(Self, Receiver<PipeError>), PipeError> {
        let temp_dir = tempfile::Builder::new()
            .prefix("pulumi-node-pipes")
            .tempdir()
            .map_err(|source| PipeError::TempDir { source })?;
        let request_path = temp_dir.path().join(REQUEST_PIPE);
        let reply_path = temp_dir.path().join(REPLY_PIPE);
        create_fifo(&request_path)?;
        create_fifo(&reply_path)?;

        let (error_tx, error_rx) = sync_channel(1);
        let thread = {
            let request_path = request_path.clone();
            let reply_path = reply_path.clone();
            thread::spawn(move || serve(&request_path, &reply_path, client, &error_tx))
        };

        debug!(
            target: PIPES_TARGET,
            directory = %temp_dir.path().display(),
            "sync invoke pipes serving"
        );
        Ok((
            Self {
                request_path,
                reply_path,
                temp_dir: Some(temp_dir),
                thread: Some(thread),
            },
            error_rx,
        ))
    }

    /// Directory holding the pipe pair, passed to the child as `--sync`.
    #[must_use]
    pub fn directory(&self) -> &Path {
        self.temp_dir
            .as_ref()
            .map(TempDir::path)
            .unwrap_or_else(|| self.request_path.parent().unwrap_or(Path::new("")))
    }
}

impl Drop for SyncInvokePipes {
    fn drop(&mut self) {
        if let Some(thread) = self.thread.take() {
            // The serve thread may still be blocked opening either FIFO.
            // Opening the reply pipe non-blocking for read satisfies its
            // writer open; opening the request pipe read-write satisfies its
            // reader open and lets us push the shutdown sentinel. The thread
            // is not joined: an invoke in flight against a dead engine would
            // block indefinitely, and the loop exits on its own once the
            // sentinel (or an ENOENT on the unlinked pipes) reaches it.
            let reply_guard = open_reply_nonblocking(&self.reply_path);
            if let Ok(mut request) = std::fs::OpenOptions::new()
                .read(true)
                .write(true)
                .open(&self.request_path)
            {
                let _ = request.write_all(&0_u32.to_be_bytes());
                let _ = request.flush();
            }
            if thread.is_finished() {
                let _ = thread.join();
            }
            drop(reply_guard);
        }
        // Unlinking the FIFOs is safe while the serve thread still holds
        // them open; removal happens on every exit path.
        self.temp_dir.take();
    }
}

#[cfg(unix)]
fn create_fifo(path: &Path) -> Result<(), PipeError> {
    use nix::sys::stat::Mode;

    nix::unistd::mkfifo(path, Mode::S_IRUSR | Mode::S_IWUSR).map_err(|source| {
        PipeError::CreateFifo {
            path: path.to_path_buf(),
            source,
        }
    })
}

#[cfg(unix)]
fn open_reply_nonblocking(path: &Path) -> Option<File> {
    use std::os::unix::fs::OpenOptionsExt;

    std::fs::OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(path)
        .ok()
}

/// The ordered serve loop: one request, one monitor call, one reply.
fn serve(
    request_path: &Path,
    reply_path: &Path,
    mut client: MonitorClient,
    error_tx: &SyncSender<PipeError>,
) {
    let fail = |error: PipeError| {
        warn!(target: PIPES_TARGET, error = %error, "pipe server failed");
        let _ = error_tx.try_send(error);
    };

    // Both opens block until the child (or the shutdown path) opens the
    // opposite ends.
    let request = match File::open(request_path) {
        Ok(request) => request,
        Err(source) => {
            return fail(PipeError::Open {
                path: request_path.to_path_buf(),
                source,
            });
        }
    };
    let reply = match std::fs::OpenOptions::new().write(true).open(reply_path) {
        Ok(reply) => reply,
        Err(source) => {
            return fail(PipeError::Open {
                path: reply_path.to_path_buf(),
                source,
            });
        }
    };

    let mut reader = BufReader::new(request);
    let mut writer = BufWriter::new(reply);
    loop {
        let frame = match read_frame(&mut reader) {
            Ok(Some(frame)) => frame,
            // EOF: the child closed its write end.
            Ok(None) => break,
            Err(source) => return fail(PipeError::Read { source }),
        };
        // Zero-length frames are the host's own shutdown sentinel.
        if frame.is_empty() {
            break;
        }

        let request: serde_json::Value = match serde_json::from_slice(&frame) {
            Ok(request) => request,
            Err(source) => return fail(PipeError::Decode { source }),
        };
        debug!(
            target: PIPES_TARGET,
            token = request.get("token").and_then(|t| t.as_str()).unwrap_or(""),
            "forwarding sync invoke"
        );

        let body = match client.invoke(&request) {
            Ok(body) => body,
            Err(error) => return fail(error.into()),
        };
        let encoded = match serde_json::to_vec(&body) {
            Ok(encoded) => encoded,
            Err(source) => return fail(PipeError::Encode { source }),
        };
        if let Err(source) = write_frame(&mut writer, &encoded) {
            return fail(PipeError::Write { source });
        }
    }
    debug!(target: PIPES_TARGET, "pipe server finished cleanly");
}

/// Reads one length-prefixed frame; `None` means a clean end of stream.
pub(crate) fn read_frame(reader: &mut impl Read) -> io::Result<Option<Vec<u8>>> {
    let mut length_bytes = [0_u8; 4];
    match reader.read_exact(&mut length_bytes) {
        Ok(()) => {}
        Err(error) if error.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(error) => return Err(error),
    }
    let length = u32::from_be_bytes(length_bytes) as usize;
    if length > MAX_FRAME_BYTES {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame of {length} bytes exceeds the {MAX_FRAME_BYTES} byte limit"),
        ));
    }
    let mut body = vec![0_u8; length];
    reader.read_exact(&mut body)?;
    Ok(Some(body))
}

/// Writes one length-prefixed frame and flushes.
pub(crate) fn write_frame(writer: &mut impl Write, body: &[u8]) -> io::Result<()> {
    let length = u32::try_from(body.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "frame too large to encode"))?;
    writer.write_all(&length.to_be_bytes())?;
    writer.write_all(body)?;
    writer.flush()
}

#[cfg(test)]
mod tests;
