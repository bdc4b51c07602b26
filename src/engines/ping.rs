//! Ping engine: minimal liveness protocol.
//!
//! `ping` answers `PONG`, `ping <msg>` answers `PONG <msg>`, `quit`
//! closes the connection. Any other frame yields an unknown state, which
//! the session treats as fatal.

use crate::engine::{Engine, ProtocolState};
use crate::frame::Frame;

/// Engine client answering ping frames.
#[derive(Debug)]
pub struct PingEngine {
    response: Vec<u8>,
    state: ProtocolState,
}

impl PingEngine {
    pub fn new() -> Self {
        Self {
            response: Vec::new(),
            state: ProtocolState::Continue,
        }
    }
}

impl Default for PingEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for PingEngine {
    fn request(&mut self, frame: Frame<'_>) {
        let header = frame.header;

        if header.eq_ignore_ascii_case(b"ping") {
            self.response.extend_from_slice(b"PONG");
            self.state = ProtocolState::Continue;
        } else if header.len() > 5 && header[..5].eq_ignore_ascii_case(b"ping ") {
            self.response.extend_from_slice(b"PONG ");
            self.response.extend_from_slice(&header[5..]);
            self.state = ProtocolState::Continue;
        } else if header.eq_ignore_ascii_case(b"quit") {
            self.state = ProtocolState::Close;
        } else {
            self.response.extend_from_slice(b"ERROR unknown command");
            self.state = ProtocolState::Unknown;
        }
    }

    fn response(&self) -> &[u8] {
        &self.response
    }

    fn state(&self) -> ProtocolState {
        self.state
    }

    fn reset(&mut self) {
        self.response.clear();
        self.state = ProtocolState::Continue;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_frame(header: &[u8]) -> Frame<'_> {
        Frame {
            header,
            payload: None,
        }
    }

    #[test]
    fn test_ping_pong() {
        let mut engine = PingEngine::new();
        engine.request(header_frame(b"ping"));

        assert_eq!(engine.response(), b"PONG");
        assert_eq!(engine.state(), ProtocolState::Continue);
    }

    #[test]
    fn test_ping_with_message() {
        let mut engine = PingEngine::new();
        engine.request(header_frame(b"PING hello"));

        assert_eq!(engine.response(), b"PONG hello");
        assert_eq!(engine.state(), ProtocolState::Continue);
    }

    #[test]
    fn test_quit_closes() {
        let mut engine = PingEngine::new();
        engine.request(header_frame(b"quit"));

        assert!(engine.response().is_empty());
        assert_eq!(engine.state(), ProtocolState::Close);
    }

    #[test]
    fn test_other_frames_are_unknown() {
        let mut engine = PingEngine::new();
        engine.request(header_frame(b"stats"));

        assert_eq!(engine.response(), b"ERROR unknown command");
        assert_eq!(engine.state(), ProtocolState::Unknown);
    }

    #[test]
    fn test_reset_clears_response() {
        let mut engine = PingEngine::new();
        engine.request(header_frame(b"ping"));
        engine.reset();

        assert!(engine.response().is_empty());
        assert_eq!(engine.state(), ProtocolState::Continue);
    }
}
