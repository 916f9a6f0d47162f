//! Wire messages in both directions.
//!
//! Outbound lines are a command keyword followed by its parameters, all
//! separated by single spaces. Inbound lines use a small IRC-like convention:
//!
//! ```text
//! [>][!NAME] param param :trailing text with spaces
//! ```

use std::fmt;

use crate::codec::LINE_TERMINATOR;

/// Marker the firmware puts in front of lines that echo host input.
pub const ECHO_MARKER: char = '>';

/// Marker that introduces a command token in an inbound line.
pub const COMMAND_MARKER: char = '!';

/// Marker that introduces the trailing parameter.
pub const TRAILING_MARKER: char = ':';

/// A command line sent from the host to the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    name: String,
    params: Vec<String>,
}

impl OutgoingMessage {
    /// Build a message from a command name and its parameters.
    pub fn new<I, S>(name: impl Into<String>, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        OutgoingMessage {
            name: name.into(),
            params: params.into_iter().map(Into::into).collect(),
        }
    }

    /// The empty message used for the initialize handshake.
    pub fn empty() -> Self {
        OutgoingMessage {
            name: String::new(),
            params: Vec::new(),
        }
    }

    /// Command name (may be empty).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Command parameters.
    pub fn params(&self) -> &[String] {
        &self.params
    }

    /// Encode the message for transmission, including the `\r\n` terminator.
    ///
    /// An empty name produces a bare terminator regardless of parameters.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        if !self.name.is_empty() {
            buf.extend_from_slice(self.to_string().as_bytes());
        }
        buf.extend_from_slice(LINE_TERMINATOR);
        buf
    }
}

impl fmt::Display for OutgoingMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for param in &self.params {
            write!(f, " {}", param)?;
        }
        Ok(())
    }
}

/// A line received from the device.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IncomingMessage {
    /// Command keyword without the `!` marker. `None` for free text.
    pub command: Option<String>,
    /// Parameters in order. The last one may be a rejoined trailing parameter.
    pub params: Vec<String>,
}

impl IncomingMessage {
    /// Decode a single line (without its terminator).
    pub fn decode(line: &str) -> IncomingMessage {
        let line = line.trim_matches(' ');
        let line = line.strip_prefix(ECHO_MARKER).unwrap_or(line);

        let parts: Vec<&str> = line.split(' ').collect();
        let mut rest = parts.as_slice();

        let mut command = None;
        if let Some((first, tail)) = rest.split_first() {
            if let Some(name) = first.strip_prefix(COMMAND_MARKER) {
                // A bare `!` consumes its slot but names nothing.
                if !name.is_empty() {
                    command = Some(name.to_string());
                }
                rest = tail;
            }
        }

        let mut params = Vec::new();
        let mut iter = rest.iter();
        while let Some(part) = iter.next() {
            if part.is_empty() {
                continue;
            }
            if let Some(head) = part.strip_prefix(TRAILING_MARKER) {
                let mut trailing = head.to_string();
                let tail: Vec<&str> = iter.copied().collect();
                if !tail.is_empty() {
                    trailing.push(' ');
                    trailing.push_str(&tail.join(" "));
                }
                params.push(trailing);
                break;
            }
            params.push(part.to_string());
        }

        IncomingMessage { command, params }
    }

    /// Whether this line is free text rather than a command.
    pub fn is_text(&self) -> bool {
        self.command.is_none()
    }

    /// Parameters rejoined with single spaces.
    pub fn text(&self) -> String {
        self.params.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_with_params() {
        let msg = OutgoingMessage::new("LINE", ["0", "0", "10", "10"]);
        assert_eq!(msg.encode(), b"LINE 0 0 10 10\r\n");
    }

    #[test]
    fn test_encode_without_params() {
        let msg = OutgoingMessage::new("DEMO", Vec::<String>::new());
        assert_eq!(msg.encode(), b"DEMO\r\n");
    }

    #[test]
    fn test_encode_empty_name() {
        assert_eq!(OutgoingMessage::empty().encode(), b"\r\n");
        assert_eq!(OutgoingMessage::new("", ["ignored"]).encode(), b"\r\n");
    }

    #[test]
    fn test_decode_command() {
        let msg = IncomingMessage::decode("!STARTED");
        assert_eq!(msg.command.as_deref(), Some("STARTED"));
        assert!(msg.params.is_empty());
    }

    #[test]
    fn test_decode_trailing_parameter() {
        let msg = IncomingMessage::decode("!CMD a :b c d");
        assert_eq!(msg.command.as_deref(), Some("CMD"));
        assert_eq!(msg.params, vec!["a", "b c d"]);
    }

    #[test]
    fn test_decode_trailing_parameter_single_word() {
        let msg = IncomingMessage::decode("!ERROR :overflow");
        assert_eq!(msg.params, vec!["overflow"]);
    }

    #[test]
    fn test_decode_echo_marker() {
        let msg = IncomingMessage::decode(">!INITIALIZED");
        assert_eq!(msg.command.as_deref(), Some("INITIALIZED"));
    }

    #[test]
    fn test_decode_free_text() {
        let msg = IncomingMessage::decode("  Moving into starting position. ");
        assert!(msg.is_text());
        assert_eq!(msg.text(), "Moving into starting position.");
    }

    #[test]
    fn test_decode_skips_empty_tokens() {
        let msg = IncomingMessage::decode("!MOVE 1   2");
        assert_eq!(msg.params, vec!["1", "2"]);
    }

    #[test]
    fn test_decode_trailing_preserves_inner_spacing() {
        let msg = IncomingMessage::decode("!ERROR :a  b");
        assert_eq!(msg.params, vec!["a  b"]);
    }

    #[test]
    fn test_decode_bare_command_marker_is_text() {
        let msg = IncomingMessage::decode("! hello");
        assert!(msg.is_text());
        assert_eq!(msg.params, vec!["hello"]);
    }

    #[test]
    fn test_round_trip() {
        let cases: [(&str, &[&str]); 3] = [
            ("CIRCLE", &["0", "0", "5"]),
            ("DEMO", &[]),
            ("HILBERT", &["4"]),
        ];
        for (name, params) in cases {
            let encoded = OutgoingMessage::new(format!("!{}", name), params.iter().copied()).encode();
            let line = std::str::from_utf8(&encoded).unwrap().trim_end_matches("\r\n");
            let decoded = IncomingMessage::decode(line);
            assert_eq!(decoded.command.as_deref(), Some(name));
            assert_eq!(decoded.params, params);
        }
    }
}
