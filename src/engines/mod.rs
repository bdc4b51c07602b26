//! Bundled engine implementations.
//!
//! Minimal engines that exercise the session core end to end without a
//! key-value store behind them:
//! - `ping`: ping/pong liveness engine
//! - `echo`: echoes frames back, for I/O path testing

pub mod echo;
pub mod ping;

pub use echo::EchoEngine;
pub use ping::PingEngine;
