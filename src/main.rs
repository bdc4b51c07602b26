//! memframe: per-connection session core for memcached-style protocols
//!
//! For each accepted connection the server repeatedly reads a request
//! frame, dispatches it to an engine, writes the response, and follows
//! the engine's state signal to keep the connection open or close it.
//!
//! Features:
//! - Exact byte-count framing (header line plus declared data block)
//! - Keep-alive with read timeout and per-connection request budget
//! - Crash-safe teardown with worker notification
//! - Configuration via CLI arguments or TOML file

mod config;
mod engine;
mod engines;
mod frame;
mod server;
mod session;
mod shutdown;

use config::{Config, EngineType};
use engines::{EchoEngine, PingEngine};
use server::Server;
use session::{ConnectionHandler, SessionHandler};
use tokio::net::TcpStream;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        listen = %config.listen,
        engine = ?config.engine,
        timeout_ms = config.timeout_ms,
        max_requests = config.max_requests,
        "Starting memframe server"
    );

    let keepalive = config.keepalive();
    match config.engine {
        EngineType::Ping => {
            serve(&config.listen, SessionHandler::new(PingEngine::new, keepalive)).await
        }
        EngineType::Echo => {
            serve(&config.listen, SessionHandler::new(EchoEngine::new, keepalive)).await
        }
    }
}

async fn serve<H>(listen: &str, handler: H) -> Result<(), Box<dyn std::error::Error>>
where
    H: ConnectionHandler<TcpStream> + 'static,
{
    let server = Server::bind(listen, handler).await?;
    server.run().await?;
    Ok(())
}
