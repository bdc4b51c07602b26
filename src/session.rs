//! Connection session loop: the per-connection protocol state machine.
//!
//! Each accepted connection runs one [`Session`]: read a header line,
//! read the declared data block if there is one, dispatch the completed
//! frame to the engine, write the response, then branch on the engine's
//! state signal. Frame and engine state are reset together exactly once
//! per request cycle, so nothing leaks into the next request.

use crate::engine::{Engine, ProtocolState};
use crate::frame::FrameAssembler;
use crate::shutdown::{ShutdownGuard, Worker};
use std::fmt;
use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::time::timeout;
use tracing::{debug, trace, warn};

/// Maximum accepted header line length, CRLF included.
pub const MAX_HEADER_BYTES: usize = 1024;

/// Diagnostic written before closing on unknown engine states and frames
/// that never reach completeness.
const SERVER_ERROR_LINE: &[u8] = b"SERVER ERROR unknown state";

/// Keep-alive policy for one connection.
#[derive(Debug, Clone)]
pub struct KeepaliveConfig {
    /// Budget for each blocking read (header and data block alike).
    pub timeout: Duration,
    /// Requests served before the connection is closed.
    pub max_requests: usize,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(5000),
            max_requests: 1024,
        }
    }
}

/// Connection-fatal session errors. None of these are retried; the
/// connection is closed and the worker keeps serving other connections.
#[derive(Debug)]
pub enum SessionError {
    /// Read or write failure on the underlying stream.
    Io(io::Error),
    /// A read exceeded the keep-alive timeout.
    Timeout,
    /// Header line longer than [`MAX_HEADER_BYTES`].
    HeaderTooLong,
    /// Peer disconnected in the middle of a frame.
    UnexpectedEof,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Io(e) => write!(f, "I/O error: {}", e),
            SessionError::Timeout => write!(f, "read timed out"),
            SessionError::HeaderTooLong => {
                write!(f, "header line exceeds {} bytes", MAX_HEADER_BYTES)
            }
            SessionError::UnexpectedEof => write!(f, "connection closed mid-frame"),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<io::Error> for SessionError {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            SessionError::UnexpectedEof
        } else {
            SessionError::Io(e)
        }
    }
}

/// One accepted client connection for the lifetime of its loop.
pub struct Session<S, E> {
    io: BufReader<S>,
    engine: E,
    assembler: FrameAssembler,
    keepalive: KeepaliveConfig,
    live: bool,
    served: usize,
}

impl<S, E> Session<S, E>
where
    S: AsyncRead + AsyncWrite + Unpin,
    E: Engine,
{
    /// Create a session over a connection's byte stream.
    pub fn new(stream: S, engine: E, keepalive: KeepaliveConfig) -> Self {
        Self {
            io: BufReader::new(stream),
            engine,
            assembler: FrameAssembler::new(),
            keepalive,
            live: true,
            served: 0,
        }
    }

    /// Run the session loop until the connection terminates.
    ///
    /// Returns `Ok(())` for state-machine exits (close state, diagnostic
    /// paths, clean client disconnect) and `Err` for I/O and timeout
    /// faults. The caller closes the connection in either case.
    pub async fn run(&mut self) -> Result<(), SessionError> {
        while self.live {
            let header = match self.read_header_line().await? {
                Some(line) => line,
                None => {
                    trace!("Connection closed by client");
                    break;
                }
            };
            self.assembler.push(&header);

            // At most one further read per frame: the declared data block
            // plus its CRLF.
            if !self.assembler.is_complete() {
                if let Some(needed) = self.assembler.bytes_to_read() {
                    let block = self.read_exact_timed(needed + 2).await?;
                    self.assembler.push(&block);
                }
            }

            if self.assembler.is_complete() {
                self.dispatch().await?;
            } else {
                // Malformed frame: the header can never size this request.
                warn!("Frame never reached completeness");
                self.assembler.reset();
                self.engine.reset();
                self.write_diagnostic().await?;
                self.live = false;
            }
        }
        Ok(())
    }

    /// Dispatch the completed frame and drive the state machine.
    async fn dispatch(&mut self) -> Result<(), SessionError> {
        self.engine.request(self.assembler.frame());
        self.served += 1;

        // Response and terminator are written unconditionally, even when
        // the response is empty, so the client's framing always holds.
        self.io.write_all(self.engine.response()).await?;
        self.io.write_all(self.engine.newline()).await?;
        self.io.flush().await?;

        let state = self.engine.state();
        self.assembler.reset();
        self.engine.reset();

        match state {
            ProtocolState::Continue => {
                if self.served >= self.keepalive.max_requests {
                    debug!(served = self.served, "Keep-alive request budget reached");
                    self.live = false;
                }
            }
            ProtocolState::Close => {
                trace!("Engine requested close");
                self.live = false;
            }
            ProtocolState::Unknown => {
                warn!("Engine returned unknown state");
                self.write_diagnostic().await?;
                self.live = false;
            }
        }
        Ok(())
    }

    /// Read one header line, bounded in size and time.
    ///
    /// `Ok(None)` means the peer closed cleanly before sending anything.
    async fn read_header_line(&mut self) -> Result<Option<Vec<u8>>, SessionError> {
        let deadline = self.keepalive.timeout;
        let io = &mut self.io;

        let read = async {
            let mut line = Vec::with_capacity(64);
            loop {
                let available = io.fill_buf().await?;
                if available.is_empty() {
                    if line.is_empty() {
                        return Ok(None);
                    }
                    return Err(SessionError::UnexpectedEof);
                }

                match available.iter().position(|&b| b == b'\n') {
                    Some(pos) => {
                        line.extend_from_slice(&available[..=pos]);
                        io.consume(pos + 1);
                        if line.len() > MAX_HEADER_BYTES {
                            return Err(SessionError::HeaderTooLong);
                        }
                        return Ok(Some(line));
                    }
                    None => {
                        let n = available.len();
                        line.extend_from_slice(available);
                        io.consume(n);
                        if line.len() > MAX_HEADER_BYTES {
                            return Err(SessionError::HeaderTooLong);
                        }
                    }
                }
            }
        };

        match timeout(deadline, read).await {
            Ok(result) => result,
            Err(_) => Err(SessionError::Timeout),
        }
    }

    /// Read exactly `n` bytes under the keep-alive timeout.
    async fn read_exact_timed(&mut self, n: usize) -> Result<Vec<u8>, SessionError> {
        let deadline = self.keepalive.timeout;
        let io = &mut self.io;

        let read = async {
            let mut block = vec![0u8; n];
            io.read_exact(&mut block).await?;
            Ok::<_, SessionError>(block)
        };

        match timeout(deadline, read).await {
            Ok(result) => result,
            Err(_) => Err(SessionError::Timeout),
        }
    }

    /// Write the diagnostic line that precedes a protocol-error close.
    async fn write_diagnostic(&mut self) -> Result<(), SessionError> {
        self.io.write_all(SERVER_ERROR_LINE).await?;
        self.io.write_all(self.engine.newline()).await?;
        self.io.flush().await?;
        Ok(())
    }

    /// Tear down the connection. Errors during teardown are ignored; the
    /// stream is gone either way.
    pub async fn close(mut self) {
        let _ = self.io.shutdown().await;
    }
}

/// Serve one connection to completion.
///
/// Entry point invoked by a driving runtime: builds the session, runs it,
/// closes the connection exactly once on every exit path, and guarantees
/// the worker notification even if the loop faults.
pub async fn handle<S, E, W>(
    stream: S,
    engine: E,
    worker: W,
    keepalive: KeepaliveConfig,
) -> Result<(), SessionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    E: Engine,
    W: Worker,
{
    let _guard = ShutdownGuard::new(Some(worker));
    let mut session = Session::new(stream, engine, keepalive);
    let result = session.run().await;
    session.close().await;
    result
}

/// Capability set a driving runtime invokes per connection.
///
/// Any runtime owning execution units (thread pool, reactor, task
/// scheduler) drives the core through this boundary; variants correspond
/// to different transport or worker implementations.
pub trait ConnectionHandler<S>: Send + Sync {
    /// One-time setup before the runtime starts dispatching connections.
    fn initialize(&self) {}

    /// Serve one accepted connection to completion.
    fn handle<W: Worker + 'static>(&self, stream: S, worker: W) -> impl Future<Output = ()> + Send;

    /// The runtime is shutting down.
    fn shutdown(&self) {}
}

/// [`ConnectionHandler`] that runs a [`Session`] with a fresh engine
/// client per connection.
pub struct SessionHandler<F> {
    make_engine: F,
    keepalive: KeepaliveConfig,
}

impl<F> SessionHandler<F> {
    pub fn new(make_engine: F, keepalive: KeepaliveConfig) -> Self {
        Self {
            make_engine,
            keepalive,
        }
    }
}

impl<S, F, E> ConnectionHandler<S> for SessionHandler<F>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    F: Fn() -> E + Send + Sync,
    E: Engine + 'static,
{
    fn handle<W: Worker + 'static>(&self, stream: S, worker: W) -> impl Future<Output = ()> + Send {
        let engine = (self.make_engine)();
        let keepalive = self.keepalive.clone();
        async move {
            match handle(stream, engine, worker, keepalive).await {
                Ok(()) => trace!("Session ended"),
                Err(e) => debug!(error = %e, "Session error"),
            }
        }
    }
}
