//! Error types for the session runner.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that abort a session before or while it starts.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The device channel could not be opened.
    #[error("cannot open device {address}: {source}")]
    ChannelOpen {
        address: String,
        #[source]
        source: io::Error,
    },

    /// An operation on an open channel failed.
    #[error("device channel error: {0}")]
    Channel(#[from] io::Error),

    /// A worker thread could not be spawned.
    #[error("failed to spawn {name} worker: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: io::Error,
    },

    /// The configuration file could not be read.
    #[error("cannot read config {}: {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The configuration file is not valid YAML for [`SessionConfig`](crate::SessionConfig).
    #[error("invalid config {}: {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// More than one session mode was requested.
    #[error("only one mode may be selected")]
    ConflictingModes,
}

/// Result type alias for runner operations.
pub type RunnerResult<T> = Result<T, RunnerError>;

/// Errors that occur while loading a drawing file.
#[derive(Debug, Error)]
pub enum DrawingError {
    /// The file could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A group code line was not an integer.
    #[error("line {line}: invalid group code {code:?}")]
    InvalidGroupCode { line: usize, code: String },

    /// A group code had no value line after it.
    #[error("line {line}: group code without a value")]
    MissingValue { line: usize },

    /// A coordinate value was not a number.
    #[error("line {line}: invalid number {value:?}")]
    InvalidNumber { line: usize, value: String },

    /// An entity lacked a value the plotter needs.
    #[error("{entity} entity is missing group code {code}")]
    IncompleteEntity { entity: String, code: i32 },
}
