//! Error types for the plotter protocol.

use thiserror::Error;

/// Errors that can occur when working with the plotter protocol.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The user command keyword is not part of the grammar.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// The command was recognised but given the wrong number of arguments.
    #[error("{command} expects {expected} argument(s), got {actual}")]
    WrongArity {
        command: String,
        expected: usize,
        actual: usize,
    },

    /// The input line held no command at all.
    #[error("empty command")]
    EmptyCommand,

    /// Buffer overflow (a line grew past the limit without a terminator).
    #[error("buffer overflow: max {max} bytes, got {actual}")]
    BufferOverflow { max: usize, actual: usize },
}

/// Result type alias for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;
