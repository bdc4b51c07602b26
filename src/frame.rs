//! Request frame assembly for the memcached-style text framing rule.
//!
//! A frame is a header line, optionally followed by a data block whose
//! length the header declares, plus the block's trailing CRLF. The
//! assembler only sizes frames; command semantics belong to the engine.

use bytes::BytesMut;
use std::str;

/// Maximum accepted data block length. Larger declarations are treated
/// as malformed headers, never as read or allocation sizes.
pub const MAX_PAYLOAD_BYTES: usize = 1024 * 1024;

/// Commands whose header declares a data block length in the fifth token.
const PAYLOAD_COMMANDS: &[&str] = &["set", "add", "replace", "append", "prepend", "cas"];

/// Commands that are structurally complete after the header line alone.
const INLINE_COMMANDS: &[&str] = &[
    "get", "gets", "delete", "incr", "decr", "touch", "flush_all", "stats", "version", "quit",
    "ping",
];

/// A completed request frame, borrowed from the assembler's buffers.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    /// Header line without its CRLF.
    pub header: &'a [u8],
    /// Data block without its trailing CRLF, if one was declared.
    pub payload: Option<&'a [u8]>,
}

/// Accumulates bytes for one request frame.
///
/// One instance is created per connection and reused for every request on
/// it via [`FrameAssembler::reset`]; it is never shared across connections.
///
/// A header that is neither a recognized inline command nor a payload
/// command with a parseable length can never reach completeness; the
/// caller surfaces that as a protocol error.
#[derive(Debug, Default)]
pub struct FrameAssembler {
    header: BytesMut,
    payload: BytesMut,
    declared: Option<usize>,
    header_parsed: bool,
    complete: bool,
}

impl FrameAssembler {
    /// Create an empty assembler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes to the current frame.
    ///
    /// The first push is taken as the header line; it is parsed
    /// immediately and any declared data length extracted. Subsequent
    /// pushes fill the declared data block.
    pub fn push(&mut self, bytes: &[u8]) {
        if !self.header_parsed {
            self.header.extend_from_slice(strip_line_ending(bytes));
            self.header_parsed = true;
            self.parse_header();
            return;
        }

        if self.complete {
            return;
        }

        if let Some(declared) = self.declared {
            self.payload.extend_from_slice(bytes);
            // Complete only when the declared bytes arrived with their CRLF.
            if self.payload.len() >= declared + 2
                && &self.payload[declared..declared + 2] == b"\r\n"
            {
                self.payload.truncate(declared);
                self.complete = true;
            }
        }
    }

    /// Whether all declared bytes of the frame have been pushed.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Data block bytes still required, excluding the trailing CRLF.
    ///
    /// `None` until the header is parsed, and for frames that declare no
    /// data block.
    pub fn bytes_to_read(&self) -> Option<usize> {
        if !self.header_parsed || self.complete {
            return None;
        }
        self.declared
            .map(|declared| declared.saturating_sub(self.payload.len()))
    }

    /// View of the completed frame.
    ///
    /// Only meaningful once [`FrameAssembler::is_complete`] returns true.
    pub fn frame(&self) -> Frame<'_> {
        Frame {
            header: &self.header,
            payload: self.declared.map(|_| &self.payload[..]),
        }
    }

    /// Clear all accumulated state for reuse on the next request.
    ///
    /// Buffers keep their capacity, so a long-lived connection does not
    /// reallocate per request.
    pub fn reset(&mut self) {
        self.header.clear();
        self.payload.clear();
        self.declared = None;
        self.header_parsed = false;
        self.complete = false;
    }

    /// Classify the header line and extract any declared data length.
    fn parse_header(&mut self) {
        let line = match str::from_utf8(&self.header) {
            Ok(s) => s,
            Err(_) => return,
        };

        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some(&name) = parts.first() else {
            return;
        };
        let name = name.to_lowercase();

        if PAYLOAD_COMMANDS.contains(&name.as_str()) {
            // Format: <command> <key> <flags> <exptime> <bytes> [...]
            let min_tokens = if name == "cas" { 6 } else { 5 };
            if parts.len() < min_tokens {
                return;
            }
            match parts[4].parse::<usize>() {
                Ok(declared) if declared <= MAX_PAYLOAD_BYTES => {
                    self.declared = Some(declared);
                }
                // Unparseable or oversized length: frame never completes.
                _ => {}
            }
        } else if INLINE_COMMANDS.contains(&name.as_str()) {
            self.complete = true;
        }
        // Anything else: unrecognized header, frame never completes.
    }
}

/// Strip a trailing CRLF (or bare LF) from a header line.
fn strip_line_ending(bytes: &[u8]) -> &[u8] {
    let bytes = bytes.strip_suffix(b"\n").unwrap_or(bytes);
    bytes.strip_suffix(b"\r").unwrap_or(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_only_frame_completes() {
        let mut asm = FrameAssembler::new();
        asm.push(b"get foo\r\n");

        assert!(asm.is_complete());
        assert_eq!(asm.bytes_to_read(), None);
        assert_eq!(asm.frame().header, b"get foo");
        assert!(asm.frame().payload.is_none());
    }

    #[test]
    fn test_payload_frame_declares_bytes() {
        let mut asm = FrameAssembler::new();
        asm.push(b"set foo 0 0 3\r\n");

        assert!(!asm.is_complete());
        assert_eq!(asm.bytes_to_read(), Some(3));
    }

    #[test]
    fn test_payload_frame_completes_with_terminator() {
        let mut asm = FrameAssembler::new();
        asm.push(b"set foo 0 0 3\r\n");
        asm.push(b"bar\r\n");

        assert!(asm.is_complete());
        assert_eq!(asm.frame().header, b"set foo 0 0 3");
        assert_eq!(asm.frame().payload, Some(&b"bar"[..]));
    }

    #[test]
    fn test_zero_length_payload() {
        let mut asm = FrameAssembler::new();
        asm.push(b"set foo 0 0 0\r\n");

        assert!(!asm.is_complete());
        assert_eq!(asm.bytes_to_read(), Some(0));

        asm.push(b"\r\n");
        assert!(asm.is_complete());
        assert_eq!(asm.frame().payload, Some(&b""[..]));
    }

    #[test]
    fn test_cas_requires_six_tokens() {
        let mut asm = FrameAssembler::new();
        asm.push(b"cas foo 0 0 3\r\n");
        assert_eq!(asm.bytes_to_read(), None);

        asm.reset();
        asm.push(b"cas foo 0 0 3 42\r\n");
        assert_eq!(asm.bytes_to_read(), Some(3));
    }

    #[test]
    fn test_garbage_header_never_completes() {
        let mut asm = FrameAssembler::new();
        asm.push(b"garbage\r\n");

        assert!(!asm.is_complete());
        assert_eq!(asm.bytes_to_read(), None);
    }

    #[test]
    fn test_invalid_length_token_never_completes() {
        let mut asm = FrameAssembler::new();
        asm.push(b"set foo 0 0 abc\r\n");

        assert!(!asm.is_complete());
        assert_eq!(asm.bytes_to_read(), None);
    }

    #[test]
    fn test_oversized_declared_length_never_completes() {
        let mut asm = FrameAssembler::new();
        asm.push(b"set foo 0 0 18446744073709551615\r\n");

        assert!(!asm.is_complete());
        assert_eq!(asm.bytes_to_read(), None);

        asm.reset();
        asm.push(format!("set foo 0 0 {}\r\n", MAX_PAYLOAD_BYTES + 1).as_bytes());
        assert_eq!(asm.bytes_to_read(), None);

        asm.reset();
        asm.push(format!("set foo 0 0 {}\r\n", MAX_PAYLOAD_BYTES).as_bytes());
        assert_eq!(asm.bytes_to_read(), Some(MAX_PAYLOAD_BYTES));
    }

    #[test]
    fn test_missing_terminator_stays_incomplete() {
        let mut asm = FrameAssembler::new();
        asm.push(b"set foo 0 0 3\r\n");
        asm.push(b"barXY");

        assert!(!asm.is_complete());
    }

    #[test]
    fn test_reset_allows_reuse() {
        let mut asm = FrameAssembler::new();
        asm.push(b"set foo 0 0 3\r\n");
        asm.push(b"bar\r\n");
        assert!(asm.is_complete());

        asm.reset();
        assert!(!asm.is_complete());
        assert_eq!(asm.bytes_to_read(), None);

        asm.push(b"version\r\n");
        assert!(asm.is_complete());
        assert_eq!(asm.frame().header, b"version");
        assert!(asm.frame().payload.is_none());
    }

    #[test]
    fn test_commands_are_case_insensitive() {
        let mut asm = FrameAssembler::new();
        asm.push(b"GET foo\r\n");
        assert!(asm.is_complete());

        asm.reset();
        asm.push(b"SET foo 0 0 2\r\n");
        assert_eq!(asm.bytes_to_read(), Some(2));
    }

    #[test]
    fn test_partial_payload_reports_remaining() {
        let mut asm = FrameAssembler::new();
        asm.push(b"set foo 0 0 10\r\n");
        asm.push(b"hello");

        assert!(!asm.is_complete());
        assert_eq!(asm.bytes_to_read(), Some(5));
    }
}
