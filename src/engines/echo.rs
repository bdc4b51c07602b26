//! Echo engine: reflects frames back to the client.
//!
//! Header-only frames echo their header line; frames with a data block
//! echo the block. No storage interaction, purely for exercising the
//! session's read and write paths.

use crate::engine::{Engine, ProtocolState};
use crate::frame::Frame;

/// Engine client echoing every frame.
#[derive(Debug, Default)]
pub struct EchoEngine {
    response: Vec<u8>,
    closing: bool,
}

impl EchoEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Engine for EchoEngine {
    fn request(&mut self, frame: Frame<'_>) {
        if frame.header.eq_ignore_ascii_case(b"quit") {
            self.closing = true;
            return;
        }
        match frame.payload {
            Some(payload) => self.response.extend_from_slice(payload),
            None => self.response.extend_from_slice(frame.header),
        }
    }

    fn response(&self) -> &[u8] {
        &self.response
    }

    fn state(&self) -> ProtocolState {
        if self.closing {
            ProtocolState::Close
        } else {
            ProtocolState::Continue
        }
    }

    fn reset(&mut self) {
        self.response.clear();
        self.closing = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_echoes_header() {
        let mut engine = EchoEngine::new();
        engine.request(Frame {
            header: b"get foo",
            payload: None,
        });

        assert_eq!(engine.response(), b"get foo");
        assert_eq!(engine.state(), ProtocolState::Continue);
    }

    #[test]
    fn test_echoes_payload() {
        let mut engine = EchoEngine::new();
        engine.request(Frame {
            header: b"set foo 0 0 3",
            payload: Some(b"bar"),
        });

        assert_eq!(engine.response(), b"bar");
        assert_eq!(engine.state(), ProtocolState::Continue);
    }

    #[test]
    fn test_quit_closes() {
        let mut engine = EchoEngine::new();
        engine.request(Frame {
            header: b"quit",
            payload: None,
        });

        assert!(engine.response().is_empty());
        assert_eq!(engine.state(), ProtocolState::Close);
    }
}
