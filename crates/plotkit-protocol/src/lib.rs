//! Plotter serial protocol
//!
//! This crate provides the types and framing rules for talking to the plotter
//! firmware over its serial line. Both directions are plain text, one message
//! per line, terminated with `\r\n`.
//!
//! # Protocol Overview
//!
//! - **Commands** (host → device): `<NAME> <p1> <p2> ...\r\n`. The initialize
//!   handshake is a bare `\r\n`.
//! - **Messages** (device → host): an optional `>` echo marker, an optional
//!   `!<NAME>` command token, then space separated parameters. A parameter
//!   starting with `:` swallows the rest of the line.
//! - **Free text**: lines without a `!` token are console output from the
//!   device and are shown to the user verbatim.
//!
//! # Example
//!
//! ```rust
//! use plotkit_protocol::{IncomingMessage, OutgoingMessage, ReplyKind};
//!
//! let msg = OutgoingMessage::new("CIRCLE", ["0", "0", "5"]);
//! assert_eq!(msg.encode(), b"CIRCLE 0 0 5\r\n");
//!
//! let incoming = IncomingMessage::decode("!ERROR :pen is up");
//! assert_eq!(ReplyKind::classify(&incoming), Some(ReplyKind::Error("pen is up".to_string())));
//! ```

mod codec;
mod commands;
mod error;
mod message;
mod responses;

pub use codec::*;
pub use commands::*;
pub use error::*;
pub use message::*;
pub use responses::*;
