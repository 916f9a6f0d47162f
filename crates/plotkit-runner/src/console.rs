//! User-facing output.
//!
//! Device text and protocol notices go to stdout, problems go to stderr.
//! Workers write through the [`Console`] trait so tests can capture the
//! transcript instead.

use std::fmt;
use std::io::Write;

use parking_lot::Mutex;

/// Progress notices printed by the sender worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    /// The device answered the handshake.
    Initialized,
    /// A simple drawing began.
    DrawingStarted,
    /// A simple drawing completed.
    DrawingFinished,
    /// A complex drawing began.
    ComplexDrawingStarted,
    /// A complex drawing completed.
    ComplexDrawingFinished,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Notice::Initialized => "Plotter initialized",
            Notice::DrawingStarted => "Drawing has started",
            Notice::DrawingFinished => "Drawing has finished",
            Notice::ComplexDrawingStarted => "Complex drawing has started",
            Notice::ComplexDrawingFinished => "Complex drawing has finished",
        };
        f.write_str(text)
    }
}

/// Sink for everything the user sees.
pub trait Console: Send + Sync {
    /// A protocol progress notice.
    fn notice(&self, notice: Notice);

    /// A line of free text from the device.
    fn text(&self, line: &str);

    /// A problem the user should know about.
    fn error(&self, message: &str);
}

/// Console on the process's stdout and stderr.
#[derive(Debug, Default)]
pub struct StdConsole;

impl Console for StdConsole {
    fn notice(&self, notice: Notice) {
        let _ = writeln!(std::io::stdout().lock(), "{}", notice);
    }

    fn text(&self, line: &str) {
        let _ = writeln!(std::io::stdout().lock(), "{}", line);
    }

    fn error(&self, message: &str) {
        let _ = writeln!(std::io::stderr().lock(), "{}", message);
    }
}

/// One captured console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleLine {
    /// From [`Console::notice`].
    Notice(Notice),
    /// From [`Console::text`].
    Text(String),
    /// From [`Console::error`].
    Error(String),
}

/// Console that records lines in order.
#[derive(Debug, Default)]
pub struct RecordingConsole {
    lines: Mutex<Vec<ConsoleLine>>,
}

impl RecordingConsole {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    pub fn lines(&self) -> Vec<ConsoleLine> {
        self.lines.lock().clone()
    }

    /// Only the notices, in order.
    pub fn notices(&self) -> Vec<Notice> {
        self.lines
            .lock()
            .iter()
            .filter_map(|line| match line {
                ConsoleLine::Notice(n) => Some(*n),
                _ => None,
            })
            .collect()
    }

    /// Only the error messages, in order.
    pub fn errors(&self) -> Vec<String> {
        self.lines
            .lock()
            .iter()
            .filter_map(|line| match line {
                ConsoleLine::Error(e) => Some(e.clone()),
                _ => None,
            })
            .collect()
    }
}

impl Console for RecordingConsole {
    fn notice(&self, notice: Notice) {
        self.lines.lock().push(ConsoleLine::Notice(notice));
    }

    fn text(&self, line: &str) {
        self.lines.lock().push(ConsoleLine::Text(line.to_string()));
    }

    fn error(&self, message: &str) {
        self.lines.lock().push(ConsoleLine::Error(message.to_string()));
    }
}
