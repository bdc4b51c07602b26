//! Cache engine contract consumed by the session loop.
//!
//! The engine owns request semantics (what a command means, what the
//! response says); the session core only moves completed frames in and
//! response bytes out, and branches on the state signal.

use crate::frame::Frame;

/// Next-action signal produced by the engine after each dispatch.
///
/// Exactly one state is produced per successful dispatch. A frame that
/// never completes is a distinct error path in the session loop, not a
/// state value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolState {
    /// Keep the connection open and accept the next frame.
    Continue,
    /// Terminate the connection after this response is written.
    Close,
    /// The engine produced a state the session cannot trust; the
    /// connection is terminated with a diagnostic line.
    Unknown,
}

/// Per-connection client of the cache engine.
///
/// `request` is side-effecting: the response and state become queryable
/// afterwards and stay valid until [`Engine::reset`]. Each session owns
/// its engine client exclusively; any store shared between clients must
/// provide its own concurrency safety.
pub trait Engine: Send {
    /// Dispatch a completed frame.
    fn request(&mut self, frame: Frame<'_>);

    /// Response payload of the last dispatch. May be empty.
    fn response(&self) -> &[u8];

    /// Line terminator the response must be framed with.
    fn newline(&self) -> &[u8] {
        b"\r\n"
    }

    /// State signal of the last dispatch.
    fn state(&self) -> ProtocolState;

    /// Clear per-request working state for reuse on the next frame.
    fn reset(&mut self);
}
