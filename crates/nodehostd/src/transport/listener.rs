//! Listener implementation for the daemon's TCP endpoints.

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};
use std::thread;
use std::time::Duration;

use tracing::{info, warn};

use super::{ConnectionHandler, LISTENER_TARGET, ListenerError};

const ACCEPT_BACKOFF: Duration = Duration::from_millis(25);
const ERROR_BACKOFF: Duration = Duration::from_millis(150);
const MAX_HANDLER_THREADS: usize = 128;

/// Listener bound to a TCP address, usually a kernel-chosen loopback port.
#[derive(Debug)]
pub struct TcpServerListener {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl TcpServerListener {
    /// Binds the listener to the given address.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError`] when the address cannot be bound.
    pub fn bind(addr: SocketAddr) -> Result<Self, ListenerError> {
        let listener = TcpListener::bind(addr).map_err(|source| ListenerError::Bind {
            addr,
            source,
        })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ListenerError::LocalAddr { source })?;
        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// The address the listener is actually bound to.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Starts the accept loop on a background thread.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError`] when the listener cannot be switched to
    /// non-blocking mode.
    pub fn start(self, handler: Arc<dyn ConnectionHandler>) -> Result<ListenerHandle, ListenerError> {
        let shutdown = Arc::new(AtomicBool::new(false));
        self.listener
            .set_nonblocking(true)
            .map_err(|source| ListenerError::NonBlocking { source })?;
        let shutdown_flag = Arc::clone(&shutdown);
        let handle = thread::spawn(move || run_accept_loop(&self, &shutdown_flag, &handler));
        Ok(ListenerHandle {
            shutdown,
            handle: Some(handle),
        })
    }
}

/// Handle to the background listener thread.
pub struct ListenerHandle {
    shutdown: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl ListenerHandle {
    /// Requests the accept loop to stop.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Waits for the accept loop to finish.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::ThreadPanic`] when the loop panicked.
    pub fn join(mut self) -> Result<(), ListenerError> {
        if let Some(handle) = self.handle.take() {
            match handle.join() {
                Ok(()) => Ok(()),
                Err(_) => Err(ListenerError::ThreadPanic),
            }
        } else {
            Ok(())
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!(
                    target: LISTENER_TARGET,
                    "listener thread panicked during drop"
                );
            }
        }
    }
}

struct HandlerLimiter {
    active: Arc<AtomicUsize>,
    max: usize,
}

impl HandlerLimiter {
    fn new(max: usize) -> Self {
        Self {
            active: Arc::new(AtomicUsize::new(0)),
            max,
        }
    }

    fn try_acquire(&self) -> Option<HandlerPermit> {
        let mut current = self.active.load(Ordering::SeqCst);
        loop {
            if current >= self.max {
                return None;
            }
            match self.active.compare_exchange(
                current,
                current + 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return Some(HandlerPermit::new(Arc::clone(&self.active))),
                Err(next) => current = next,
            }
        }
    }
}

struct HandlerPermit {
    active: Arc<AtomicUsize>,
}

impl HandlerPermit {
    fn new(active: Arc<AtomicUsize>) -> Self {
        Self { active }
    }
}

impl Drop for HandlerPermit {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

fn run_accept_loop(
    listener: &TcpServerListener,
    shutdown: &Arc<AtomicBool>,
    handler: &Arc<dyn ConnectionHandler>,
) {
    info!(
        target: LISTENER_TARGET,
        addr = %listener.local_addr,
        "socket listener active"
    );
    let mut last_error = None::<io::ErrorKind>;
    let limiter = HandlerLimiter::new(MAX_HANDLER_THREADS);
    while !shutdown.load(Ordering::SeqCst) {
        if let Some(delay) = handle_accept_cycle(listener, handler, &limiter, &mut last_error) {
            thread::sleep(delay);
        }
    }
}

fn handle_accept_cycle(
    listener: &TcpServerListener,
    handler: &Arc<dyn ConnectionHandler>,
    limiter: &HandlerLimiter,
    last_error: &mut Option<io::ErrorKind>,
) -> Option<Duration> {
    match accept_connection(listener) {
        Ok(Some(stream)) => {
            *last_error = None;
            if let Some(permit) = limiter.try_acquire() {
                let handler = Arc::clone(handler);
                thread::spawn(move || {
                    let _permit = permit;
                    handler.handle(stream);
                });
            } else {
                warn!(
                    target: LISTENER_TARGET,
                    max_threads = limiter.max,
                    "listener at capacity, dropping connection"
                );
            }
            None
        }
        Ok(None) => Some(ACCEPT_BACKOFF),
        Err(error) => {
            let kind = error.kind();
            if *last_error != Some(kind) {
                warn!(
                    target: LISTENER_TARGET,
                    error = %error,
                    "socket accept error"
                );
            }
            *last_error = Some(kind);
            Some(ERROR_BACKOFF)
        }
    }
}

fn accept_connection(listener: &TcpServerListener) -> Result<Option<TcpStream>, io::Error> {
    match listener.listener.accept() {
        Ok((stream, _)) => {
            stream.set_nonblocking(false)?;
            Ok(Some(stream))
        }
        Err(error) if error.kind() == io::ErrorKind::WouldBlock => Ok(None),
        Err(error) => Err(error),
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::TcpStream;
    use std::sync::mpsc;

    use super::*;

    struct EchoHandler;

    impl ConnectionHandler for EchoHandler {
        fn handle(&self, mut stream: TcpStream) {
            let mut buffer = [0_u8; 64];
            while let Ok(n) = stream.read(&mut buffer) {
                if n == 0 {
                    break;
                }
                if stream.write_all(&buffer[..n]).is_err() {
                    break;
                }
            }
        }
    }

    #[test]
    fn binds_kernel_chosen_port() {
        let listener = TcpServerListener::bind(([127, 0, 0, 1], 0).into()).expect("bind");
        assert_ne!(listener.local_addr().port(), 0);
    }

    #[test]
    fn accepts_and_dispatches_connections() {
        let listener = TcpServerListener::bind(([127, 0, 0, 1], 0).into()).expect("bind");
        let addr = listener.local_addr();
        let handle = listener.start(Arc::new(EchoHandler)).expect("start");

        let mut client = TcpStream::connect(addr).expect("connect");
        client.write_all(b"ping").expect("write");
        let mut reply = [0_u8; 4];
        client.read_exact(&mut reply).expect("read");
        assert_eq!(&reply, b"ping");

        handle.shutdown();
        handle.join().expect("join");
    }

    #[test]
    fn shutdown_stops_accept_loop() {
        let listener = TcpServerListener::bind(([127, 0, 0, 1], 0).into()).expect("bind");
        let handle = listener.start(Arc::new(EchoHandler)).expect("start");
        let (done_tx, done_rx) = mpsc::channel();
        handle.shutdown();
        thread::spawn(move || {
            done_tx.send(handle.join().is_ok()).ok();
        });
        let joined = done_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("join completes");
        assert!(joined);
    }
}
