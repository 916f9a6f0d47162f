//! Reply classification for inbound messages.
//!
//! Only lines carrying a `!` command token can be replies. The firmware uses a
//! fixed set of keywords; anything else is ignored.

use std::fmt;

use crate::message::IncomingMessage;

/// A reply from the device that the command sender cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyKind {
    /// Handshake complete (`INITIALIZED`).
    Initialized,
    /// The device began moving the head (`STARTED`).
    DrawingStarted,
    /// A simple drawing completed (`FINISHED`).
    DrawingFinished,
    /// A complex drawing completed (`COMPLEX_FINISHED`).
    ComplexDrawingFinished,
    /// The device rejected or aborted something (`ERROR`).
    Error(String),
    /// The device is closing the session (`QUIT`).
    Quit,
}

impl ReplyKind {
    /// Classify a command keyword. `params` is only used for `ERROR` text.
    pub fn from_keyword(keyword: &str, params: &[String]) -> Option<ReplyKind> {
        match keyword {
            "INITIALIZED" => Some(ReplyKind::Initialized),
            "STARTED" => Some(ReplyKind::DrawingStarted),
            "FINISHED" => Some(ReplyKind::DrawingFinished),
            "COMPLEX_FINISHED" => Some(ReplyKind::ComplexDrawingFinished),
            "ERROR" => Some(ReplyKind::Error(params.join(" "))),
            "QUIT" => Some(ReplyKind::Quit),
            _ => None,
        }
    }

    /// Classify a decoded message. Free text and unknown keywords give `None`.
    pub fn classify(msg: &IncomingMessage) -> Option<ReplyKind> {
        let keyword = msg.command.as_deref()?;
        let reply = Self::from_keyword(keyword, &msg.params);
        if reply.is_none() {
            log::debug!("ignoring unknown device command {:?}", keyword);
        }
        reply
    }

    /// Check if this is an error reply.
    pub fn is_error(&self) -> bool {
        matches!(self, ReplyKind::Error(_))
    }
}

impl fmt::Display for ReplyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplyKind::Initialized => f.write_str("INITIALIZED"),
            ReplyKind::DrawingStarted => f.write_str("STARTED"),
            ReplyKind::DrawingFinished => f.write_str("FINISHED"),
            ReplyKind::ComplexDrawingFinished => f.write_str("COMPLEX_FINISHED"),
            ReplyKind::Error(text) if text.is_empty() => f.write_str("ERROR"),
            ReplyKind::Error(text) => write!(f, "ERROR {}", text),
            ReplyKind::Quit => f.write_str("QUIT"),
        }
    }
}
