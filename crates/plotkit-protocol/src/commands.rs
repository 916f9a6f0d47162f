//! Commands that can be sent to the plotter firmware.
//!
//! The user types lowercase keywords (`circle 0 0 5`); the firmware expects
//! uppercase wire keywords (`CIRCLE 0 0 5`). Each drawing command has a fixed
//! argument count and puts a [`CommandKind`] in flight while the host waits
//! for the device to finish it.

use crate::error::{ProtocolError, ProtocolResult};
use crate::message::OutgoingMessage;

/// The kind of command currently awaiting a reply from the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// The empty handshake sent right after reset.
    Initialize,
    /// A single primitive: finishes with `FINISHED`.
    SimpleDrawing,
    /// A multi-stroke drawing: finishes with `COMPLEX_FINISHED`.
    ComplexDrawing {
        /// Set once the device reported the first `STARTED`.
        started: bool,
    },
    /// Session end. Sent without waiting for a reply.
    Quit,
}

impl CommandKind {
    /// A complex drawing that has not started yet.
    pub fn complex() -> Self {
        CommandKind::ComplexDrawing { started: false }
    }

    /// Whether the sender must wait for a reply after writing this command.
    pub fn awaits_reply(&self) -> bool {
        !matches!(self, CommandKind::Quit)
    }
}

/// Drawing commands understood by the firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawingCommand {
    /// Move the head without drawing (`MOVE x y`).
    Move,
    /// Straight line (`LINE x1 y1 x2 y2`).
    Line,
    /// Arc from the current position (`ARC cx cy angle`).
    Arc,
    /// Full circle (`CIRCLE cx cy r`).
    Circle,
    /// Built-in demo picture (`DEMO`).
    Demo,
    /// Hilbert curve of the given order (`HILBERT n`).
    Hilbert,
}

impl DrawingCommand {
    /// All drawing commands, in help order.
    pub const ALL: [DrawingCommand; 6] = [
        DrawingCommand::Move,
        DrawingCommand::Line,
        DrawingCommand::Arc,
        DrawingCommand::Circle,
        DrawingCommand::Demo,
        DrawingCommand::Hilbert,
    ];

    /// Keyword typed by the user.
    pub fn keyword(&self) -> &'static str {
        match self {
            DrawingCommand::Move => "move",
            DrawingCommand::Line => "line",
            DrawingCommand::Arc => "arc",
            DrawingCommand::Circle => "circle",
            DrawingCommand::Demo => "demo",
            DrawingCommand::Hilbert => "hilbert",
        }
    }

    /// Keyword sent on the wire.
    pub fn wire_name(&self) -> &'static str {
        match self {
            DrawingCommand::Move => "MOVE",
            DrawingCommand::Line => "LINE",
            DrawingCommand::Arc => "ARC",
            DrawingCommand::Circle => "CIRCLE",
            DrawingCommand::Demo => "DEMO",
            DrawingCommand::Hilbert => "HILBERT",
        }
    }

    /// Number of required arguments.
    pub fn arity(&self) -> usize {
        match self {
            DrawingCommand::Move => 2,
            DrawingCommand::Line => 4,
            DrawingCommand::Arc | DrawingCommand::Circle => 3,
            DrawingCommand::Demo => 0,
            DrawingCommand::Hilbert => 1,
        }
    }

    /// The command kind put in flight by this command.
    pub fn kind(&self) -> CommandKind {
        match self {
            DrawingCommand::Move
            | DrawingCommand::Line
            | DrawingCommand::Arc
            | DrawingCommand::Circle => CommandKind::SimpleDrawing,
            DrawingCommand::Demo | DrawingCommand::Hilbert => CommandKind::complex(),
        }
    }

    /// Look up a command by its user keyword (case-insensitive).
    pub fn from_keyword(s: &str) -> Option<DrawingCommand> {
        Self::ALL
            .into_iter()
            .find(|cmd| cmd.keyword().eq_ignore_ascii_case(s))
    }

    /// Build the wire message after checking the argument count.
    pub fn message(&self, args: &[&str]) -> ProtocolResult<OutgoingMessage> {
        if args.len() != self.arity() {
            return Err(ProtocolError::WrongArity {
                command: self.keyword().to_string(),
                expected: self.arity(),
                actual: args.len(),
            });
        }
        Ok(OutgoingMessage::new(self.wire_name(), args.iter().copied()))
    }
}

/// A parsed line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserCommand {
    /// Send a drawing command and wait for it to finish.
    Draw {
        /// The wire message.
        message: OutgoingMessage,
        /// The kind that goes in flight.
        kind: CommandKind,
    },
    /// Load a drawing file and queue its commands.
    Read {
        /// Path to the drawing file.
        path: String,
    },
    /// End the session.
    Quit,
}

/// Keyword that loads a drawing file.
pub const READ_KEYWORD: &str = "read";

/// Keyword that ends the session.
pub const QUIT_KEYWORD: &str = "quit";

/// Wire keyword sent to the device on session end.
pub const QUIT_WIRE_NAME: &str = "QUIT";

impl UserCommand {
    /// Parse a line of user input.
    pub fn parse(line: &str) -> ProtocolResult<UserCommand> {
        let mut parts = line.split_whitespace();
        let keyword = parts.next().ok_or(ProtocolError::EmptyCommand)?;
        let args: Vec<&str> = parts.collect();

        if let Some(cmd) = DrawingCommand::from_keyword(keyword) {
            let message = cmd.message(&args)?;
            return Ok(UserCommand::Draw {
                message,
                kind: cmd.kind(),
            });
        }

        if keyword.eq_ignore_ascii_case(READ_KEYWORD) {
            return match args.as_slice() {
                [path] => Ok(UserCommand::Read {
                    path: (*path).to_string(),
                }),
                _ => Err(wrong_arity(READ_KEYWORD, 1, args.len())),
            };
        }

        if keyword.eq_ignore_ascii_case(QUIT_KEYWORD) {
            return if args.is_empty() {
                Ok(UserCommand::Quit)
            } else {
                Err(wrong_arity(QUIT_KEYWORD, 0, args.len()))
            };
        }

        Err(ProtocolError::UnknownCommand(keyword.to_string()))
    }
}

fn wrong_arity(command: &str, expected: usize, actual: usize) -> ProtocolError {
    ProtocolError::WrongArity {
        command: command.to_string(),
        expected,
        actual,
    }
}
