//! TCP front end driving one session per accepted connection.
//!
//! Owns the accept loop and the per-connection execution units; the
//! session core itself performs no concurrency control beyond
//! per-connection sequencing.

use crate::session::ConnectionHandler;
use crate::shutdown::Worker;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info};

/// Maximum number of concurrent connections
const MAX_CONNECTIONS: usize = 10000;

/// Session-end notification delivered to the supervisor task.
struct SessionEnd {
    id: u64,
}

/// Worker handle owned by one connection's execution unit.
///
/// Holds the connection slot permit; reporting back and releasing the
/// slot happen when the session's shutdown guard drops it.
pub struct PoolWorker {
    id: u64,
    _permit: OwnedSemaphorePermit,
    events: mpsc::UnboundedSender<SessionEnd>,
}

impl Worker for PoolWorker {
    fn shutdown(&self) {
        // The supervisor may already be gone during teardown.
        let _ = self.events.send(SessionEnd { id: self.id });
    }
}

/// Server instance
pub struct Server<H> {
    listener: TcpListener,
    handler: Arc<H>,
    connection_limit: Arc<Semaphore>,
}

impl<H> Server<H>
where
    H: ConnectionHandler<TcpStream> + 'static,
{
    /// Bind the listening socket.
    pub async fn bind(listen: &str, handler: H) -> io::Result<Self> {
        let listener = TcpListener::bind(listen).await?;
        Ok(Server {
            listener,
            handler: Arc::new(handler),
            connection_limit: Arc::new(Semaphore::new(MAX_CONNECTIONS)),
        })
    }

    /// Address the server is listening on.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until the process exits.
    pub async fn run(self) -> io::Result<()> {
        info!(address = %self.local_addr()?, "Server listening");
        self.handler.initialize();

        let (events_tx, mut events_rx) = mpsc::unbounded_channel::<SessionEnd>();

        // Supervisor task: observes session ends. Respawn policy stays
        // with the runtime that owns the workers.
        tokio::spawn(async move {
            while let Some(end) = events_rx.recv().await {
                debug!(session = end.id, "Session ended");
            }
        });

        let mut next_id: u64 = 0;
        let result = loop {
            // Wait for a connection slot
            let permit = match self.connection_limit.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => break Err(io::Error::new(io::ErrorKind::Other, e)),
            };

            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    debug!(peer = %addr, session = next_id, "New connection");

                    let handler = Arc::clone(&self.handler);
                    let worker = PoolWorker {
                        id: next_id,
                        _permit: permit,
                        events: events_tx.clone(),
                    };
                    next_id += 1;

                    tokio::spawn(async move {
                        handler.handle(stream, worker).await;
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        };

        self.handler.shutdown();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::{EchoEngine, PingEngine};
    use crate::session::{KeepaliveConfig, SessionHandler};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn test_keepalive() -> KeepaliveConfig {
        KeepaliveConfig {
            timeout: Duration::from_millis(500),
            max_requests: 1024,
        }
    }

    #[tokio::test]
    async fn test_ping_session_over_tcp() {
        let handler = SessionHandler::new(PingEngine::new, test_keepalive());
        let server = Server::bind("127.0.0.1:0", handler).await.unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.run());

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"ping\r\n").await.unwrap();
        let mut buf = [0u8; 6];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"PONG\r\n");

        stream.write_all(b"quit\r\n").await.unwrap();
        let mut tail = Vec::new();
        stream.read_to_end(&mut tail).await.unwrap();
        assert_eq!(tail, b"\r\n");
    }

    #[tokio::test]
    async fn test_echo_session_with_payload_over_tcp() {
        let handler = SessionHandler::new(EchoEngine::new, test_keepalive());
        let server = Server::bind("127.0.0.1:0", handler).await.unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.run());

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"set foo 0 0 3\r\nbar\r\n").await.unwrap();
        let mut buf = [0u8; 5];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"bar\r\n");

        stream.write_all(b"quit\r\n").await.unwrap();
        let mut tail = Vec::new();
        stream.read_to_end(&mut tail).await.unwrap();
        assert_eq!(tail, b"\r\n");
    }

    #[tokio::test]
    async fn test_concurrent_connections() {
        let handler = SessionHandler::new(PingEngine::new, test_keepalive());
        let server = Server::bind("127.0.0.1:0", handler).await.unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.run());

        let mut tasks = Vec::new();
        for _ in 0..8 {
            tasks.push(tokio::spawn(async move {
                let mut stream = TcpStream::connect(addr).await.unwrap();
                stream.write_all(b"ping\r\nquit\r\n").await.unwrap();
                let mut output = Vec::new();
                stream.read_to_end(&mut output).await.unwrap();
                assert_eq!(output, b"PONG\r\n\r\n");
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
    }
}
