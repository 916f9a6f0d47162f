//! Input worker: turns user lines into queued commands.

use std::io::{self, BufRead};
use std::path::Path;
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use plotkit_protocol::{CommandKind, OutgoingMessage, UserCommand};
use tracing::{debug, info, warn};

use crate::config::SessionMode;
use crate::console::Console;
use crate::drawing::DrawingSource;
use crate::notification::{Notification, ShutdownReason, ShutdownSignal};
use crate::sender::Flow;

/// A blocking source of user input lines.
pub trait LineSource: Send {
    /// Next line without its terminator, or `None` at end of input.
    fn next_line(&mut self) -> io::Result<Option<String>>;
}

/// Lines read from any buffered reader, such as locked stdin.
pub struct ReaderLines<R> {
    reader: R,
}

impl<R: BufRead + Send> ReaderLines<R> {
    /// Wrap a reader.
    pub fn new(reader: R) -> Self {
        ReaderLines { reader }
    }
}

impl<R: BufRead + Send> LineSource for ReaderLines<R> {
    fn next_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let trimmed = line.trim_end_matches(['\r', '\n']).len();
        line.truncate(trimmed);
        Ok(Some(line))
    }
}

/// Lines pushed through a channel; closing the channel ends input.
impl LineSource for Receiver<String> {
    fn next_line(&mut self) -> io::Result<Option<String>> {
        Ok(self.recv().ok())
    }
}

/// The input worker.
pub struct InputWorker {
    source: Box<dyn LineSource>,
    outgoing: Sender<Notification>,
    console: Arc<dyn Console>,
    signal: ShutdownSignal,
    mode: SessionMode,
    drawings: Arc<dyn DrawingSource>,
}

impl InputWorker {
    /// Create an input worker queueing into `outgoing`.
    pub fn new(
        source: Box<dyn LineSource>,
        outgoing: Sender<Notification>,
        console: Arc<dyn Console>,
        signal: ShutdownSignal,
        mode: SessionMode,
        drawings: Arc<dyn DrawingSource>,
    ) -> Self {
        InputWorker {
            source,
            outgoing,
            console,
            signal,
            mode,
            drawings,
        }
    }

    /// Read lines until end of input, `quit`, or session shutdown.
    pub fn run(mut self) {
        loop {
            let line = match self.source.next_line() {
                Ok(Some(line)) => line,
                Ok(None) => {
                    info!("end of input");
                    self.signal.trigger(ShutdownReason::EndOfInput);
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "reading input failed");
                    self.signal.trigger(ShutdownReason::EndOfInput);
                    break;
                }
            };

            if self.signal.is_triggered() {
                break;
            }
            if self.handle_line(&line) == Flow::Stop {
                break;
            }
        }
        debug!("input worker exiting");
    }

    /// Handle one line of user input.
    pub fn handle_line(&self, line: &str) -> Flow {
        if line.trim().is_empty() {
            return Flow::Continue;
        }
        if !self.mode.can_send() {
            self.console
                .error("You are in listening mode; commands are not sent.");
            return Flow::Continue;
        }

        match UserCommand::parse(line) {
            Ok(UserCommand::Draw { message, kind }) => self.queue(message, kind),
            Ok(UserCommand::Read { path }) => self.queue_file(Path::new(&path)),
            Ok(UserCommand::Quit) => {
                self.signal.trigger(ShutdownReason::UserQuit);
                Flow::Stop
            }
            Err(e) => {
                self.console.error(&format!("Invalid command: {}.", e));
                Flow::Continue
            }
        }
    }

    fn queue_file(&self, path: &Path) -> Flow {
        let commands = match self.drawings.load(path) {
            Ok(commands) => commands,
            Err(e) => {
                warn!(error = %e, "drawing file rejected");
                self.console
                    .error(&format!("Error drawing the file: {}", e));
                return Flow::Continue;
            }
        };
        info!(path = %path.display(), count = commands.len(), "queueing drawing file");
        for message in commands {
            if self.queue(message, CommandKind::SimpleDrawing) == Flow::Stop {
                return Flow::Stop;
            }
        }
        Flow::Continue
    }

    fn queue(&self, message: OutgoingMessage, kind: CommandKind) -> Flow {
        match self.outgoing.send(Notification::command(message, kind)) {
            Ok(()) => Flow::Continue,
            Err(_) => {
                debug!("sender queue closed, input stops");
                Flow::Stop
            }
        }
    }
}
