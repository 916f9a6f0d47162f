//! Messages exchanged between session workers, and the shutdown signal.

use std::fmt;
use std::sync::Arc;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use plotkit_protocol::{CommandKind, OutgoingMessage, ReplyKind};

/// A unit of work delivered to the sender worker's queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// Stop the worker.
    Shutdown,
    /// The listener classified a reply from the device.
    ReplyArrived(ReplyKind),
    /// A message to write, with the command kind it puts in flight (if any).
    OutgoingQueued(OutgoingMessage, Option<CommandKind>),
}

impl Notification {
    /// Queue a message that puts `kind` in flight.
    pub fn command(message: OutgoingMessage, kind: CommandKind) -> Self {
        Notification::OutgoingQueued(message, Some(kind))
    }
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// The user typed `quit`.
    UserQuit,
    /// Standard input was closed.
    EndOfInput,
    /// The process received an interrupt or terminate signal.
    Interrupted,
    /// The device sent `QUIT`.
    DeviceQuit,
    /// The in-flight command got no reply before its deadline.
    ReplyTimeout,
    /// Writing to the device failed.
    WriteFailed,
    /// Reading from the device failed.
    ReadFailed,
    /// The inbound stream could not be framed.
    StreamCorrupted,
    /// A worker thread could not be started.
    StartupFailed,
}

impl ShutdownReason {
    /// Whether the session ended because of a protocol fault.
    pub fn is_fault(&self) -> bool {
        matches!(
            self,
            ShutdownReason::ReplyTimeout
                | ShutdownReason::WriteFailed
                | ShutdownReason::ReadFailed
                | ShutdownReason::StreamCorrupted
                | ShutdownReason::StartupFailed
        )
    }
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ShutdownReason::UserQuit => "user quit",
            ShutdownReason::EndOfInput => "end of input",
            ShutdownReason::Interrupted => "interrupted",
            ShutdownReason::DeviceQuit => "device closed the session",
            ShutdownReason::ReplyTimeout => "device did not reply in time",
            ShutdownReason::WriteFailed => "write to device failed",
            ShutdownReason::ReadFailed => "read from device failed",
            ShutdownReason::StreamCorrupted => "device stream could not be parsed",
            ShutdownReason::StartupFailed => "session workers could not be started",
        };
        f.write_str(text)
    }
}

struct SignalInner {
    reason: Mutex<Option<ShutdownReason>>,
    /// Dropped on trigger; every clone of `cancelled` then wakes up.
    trigger_tx: Mutex<Option<Sender<()>>>,
    cancelled: Receiver<()>,
}

/// Session-wide cancellation token.
///
/// The first [`trigger`](Self::trigger) wins and records its reason; later
/// triggers are no-ops. Waiters block on a channel that disconnects on
/// trigger, so no polling is involved.
#[derive(Clone)]
pub struct ShutdownSignal {
    inner: Arc<SignalInner>,
}

impl ShutdownSignal {
    /// Create an untriggered signal.
    pub fn new() -> Self {
        let (trigger_tx, cancelled) = crossbeam_channel::bounded(0);
        ShutdownSignal {
            inner: Arc::new(SignalInner {
                reason: Mutex::new(None),
                trigger_tx: Mutex::new(Some(trigger_tx)),
                cancelled,
            }),
        }
    }

    /// Trigger shutdown. Returns `true` if this call was the first.
    pub fn trigger(&self, reason: ShutdownReason) -> bool {
        let mut current = self.inner.reason.lock();
        if current.is_some() {
            tracing::trace!(%reason, "shutdown already triggered");
            return false;
        }
        *current = Some(reason);
        drop(self.inner.trigger_tx.lock().take());
        tracing::info!(%reason, "shutdown triggered");
        true
    }

    /// Whether shutdown has been triggered.
    pub fn is_triggered(&self) -> bool {
        self.inner.reason.lock().is_some()
    }

    /// The reason recorded by the first trigger.
    pub fn reason(&self) -> Option<ShutdownReason> {
        *self.inner.reason.lock()
    }

    /// A receiver that disconnects on trigger, for use in `select!`.
    ///
    /// Nothing is ever sent on it; a `recv` arm fires once shutdown begins.
    pub fn cancelled(&self) -> Receiver<()> {
        self.inner.cancelled.clone()
    }

    /// Block until shutdown is triggered.
    pub fn wait(&self) -> ShutdownReason {
        loop {
            // Nothing is ever sent; recv only returns once the sender is dropped.
            let _ = self.inner.cancelled.recv();
            if let Some(reason) = self.reason() {
                return reason;
            }
        }
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownSignal")
            .field("reason", &self.reason())
            .finish()
    }
}
