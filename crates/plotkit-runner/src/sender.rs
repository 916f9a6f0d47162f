//! Sender worker: the outbound protocol state machine.
//!
//! The plotter handles one command at a time. The sender writes a command,
//! then refuses to write the next one until the device reports the first as
//! finished. Every wait is bounded by an absolute deadline: a short one until
//! the device acknowledges the command, a long one once the head is moving.
//!
//! ```text
//!            OutgoingQueued (kind awaits reply)
//!   Idle ───────────────────────────────────────▶ AwaitingReply(kind, deadline)
//!    ▲                                                  │
//!    └────────── terminal reply matching kind ──────────┘
//!                (deadline passes: shutdown)
//! ```
//!
//! While a command is in flight the worker also watches the session's
//! shutdown signal, so a fault elsewhere ends the wait at once. An idle
//! worker only watches its queue: the shutdown sequence queues `QUIT` after
//! the signal fires, and that message must still reach the wire.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{select, Receiver};
use plotkit_protocol::{CommandKind, OutgoingMessage, ReplyKind};
use tracing::{debug, trace, warn};

use crate::channel::ChannelWriter;
use crate::config::{ErrorReplyPolicy, SessionConfig};
use crate::console::{Console, Notice};
use crate::notification::{Notification, ShutdownReason, ShutdownSignal};

/// Protocol state of the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderState {
    /// No command in flight; the next queued message is written immediately.
    Idle,
    /// A command is in flight and must be resolved before anything else is written.
    AwaitingReply {
        /// The in-flight command.
        command: CommandKind,
        /// When the device must have answered by.
        deadline: Instant,
    },
}

/// Whether the worker loop keeps going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Wait for the next notification.
    Continue,
    /// Exit the worker.
    Stop,
}

/// The sender worker. Owns the writer half of the channel and the in-flight command.
pub struct SenderWorker {
    writer: Box<dyn ChannelWriter>,
    console: Arc<dyn Console>,
    signal: ShutdownSignal,
    reply_timeout: Duration,
    drawing_timeout: Duration,
    error_policy: ErrorReplyPolicy,
    state: SenderState,
    backlog: VecDeque<(OutgoingMessage, Option<CommandKind>)>,
}

impl SenderWorker {
    /// Create an idle sender.
    pub fn new(
        writer: Box<dyn ChannelWriter>,
        console: Arc<dyn Console>,
        signal: ShutdownSignal,
        config: &SessionConfig,
    ) -> Self {
        SenderWorker {
            writer,
            console,
            signal,
            reply_timeout: config.reply_timeout(),
            drawing_timeout: config.drawing_timeout(),
            error_policy: config.error_policy,
            state: SenderState::Idle,
            backlog: VecDeque::new(),
        }
    }

    /// Current protocol state.
    pub fn state(&self) -> SenderState {
        self.state
    }

    /// Number of queued messages not yet written.
    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    /// Run the worker until shutdown, a fatal fault, or the queue closes.
    pub fn run(mut self, queue: Receiver<Notification>) {
        let cancelled = self.signal.cancelled();
        loop {
            let flow = match self.state {
                SenderState::Idle => match queue.recv() {
                    Ok(notification) => self.handle(notification),
                    Err(_) => queue_closed(),
                },
                SenderState::AwaitingReply { command, deadline } => select! {
                    recv(queue) -> next => match next {
                        Ok(notification) => self.handle(notification),
                        Err(_) => queue_closed(),
                    },
                    recv(cancelled) -> _ => {
                        let reason = self.signal.reason();
                        debug!(?command, ?reason, "shutdown while command in flight");
                        Flow::Stop
                    },
                    default(deadline.saturating_duration_since(Instant::now())) => self.on_deadline(),
                },
            };

            if flow == Flow::Stop {
                break;
            }
        }
        debug!(backlog = self.backlog.len(), "sender worker exiting");
    }

    /// Process one notification.
    pub fn handle(&mut self, notification: Notification) -> Flow {
        let flow = match notification {
            Notification::Shutdown => return Flow::Stop,
            Notification::ReplyArrived(reply) => self.on_reply(reply),
            Notification::OutgoingQueued(message, kind) => {
                trace!(%message, ?kind, "queued");
                self.backlog.push_back((message, kind));
                Flow::Continue
            }
        };
        match flow {
            Flow::Continue => self.drain_backlog(),
            Flow::Stop => Flow::Stop,
        }
    }

    /// The in-flight command's deadline passed without a reply.
    pub fn on_deadline(&mut self) -> Flow {
        if let SenderState::AwaitingReply { command, .. } = self.state {
            warn!(?command, "no reply before deadline");
        }
        self.console.error("Device did not reply in time.");
        self.signal.trigger(ShutdownReason::ReplyTimeout);
        Flow::Stop
    }

    fn on_reply(&mut self, reply: ReplyKind) -> Flow {
        let SenderState::AwaitingReply { command, .. } = self.state else {
            return self.on_idle_reply(reply);
        };

        match (reply, command) {
            (ReplyKind::DrawingStarted, CommandKind::SimpleDrawing) => {
                self.console.notice(Notice::DrawingStarted);
                self.await_reply(command, self.drawing_timeout);
            }
            (ReplyKind::DrawingStarted, CommandKind::ComplexDrawing { started: false }) => {
                self.console.notice(Notice::ComplexDrawingStarted);
                self.await_reply(CommandKind::ComplexDrawing { started: true }, self.drawing_timeout);
            }
            (ReplyKind::DrawingFinished, CommandKind::SimpleDrawing) => {
                self.console.notice(Notice::DrawingFinished);
                self.state = SenderState::Idle;
            }
            (ReplyKind::ComplexDrawingFinished, CommandKind::ComplexDrawing { .. }) => {
                self.console.notice(Notice::ComplexDrawingFinished);
                self.state = SenderState::Idle;
            }
            (ReplyKind::Initialized, CommandKind::Initialize) => {
                self.console.notice(Notice::Initialized);
                self.state = SenderState::Idle;
            }
            (ReplyKind::Quit, _) => return self.on_device_quit(),
            (ReplyKind::Error(text), _) => {
                self.report_error(&text);
                if self.error_policy == ErrorReplyPolicy::ReleaseCommand {
                    debug!(?command, "releasing in-flight command after error");
                    self.state = SenderState::Idle;
                }
            }
            (reply, command) => {
                debug!(%reply, ?command, "ignoring reply that does not match in-flight command");
            }
        }
        Flow::Continue
    }

    fn on_idle_reply(&mut self, reply: ReplyKind) -> Flow {
        match reply {
            ReplyKind::Quit => self.on_device_quit(),
            ReplyKind::Error(text) => {
                self.report_error(&text);
                Flow::Continue
            }
            reply => {
                debug!(%reply, "ignoring reply while idle");
                Flow::Continue
            }
        }
    }

    fn on_device_quit(&mut self) -> Flow {
        debug!("device sent QUIT");
        self.signal.trigger(ShutdownReason::DeviceQuit);
        Flow::Stop
    }

    fn report_error(&self, text: &str) {
        if text.is_empty() {
            self.console.error("Device replied with error.");
        } else {
            self.console
                .error(&format!("Device replied with error: {}.", text));
        }
    }

    fn await_reply(&mut self, command: CommandKind, timeout: Duration) {
        self.state = SenderState::AwaitingReply {
            command,
            deadline: Instant::now() + timeout,
        };
    }

    /// Write queued messages while no command is in flight.
    fn drain_backlog(&mut self) -> Flow {
        while self.state == SenderState::Idle {
            let Some((message, kind)) = self.backlog.pop_front() else {
                break;
            };

            if let Err(e) = self.write_message(&message) {
                warn!(error = %e, %message, "write to device failed");
                self.console.error("Error while writing to plotter.");
                self.signal.trigger(ShutdownReason::WriteFailed);
                return Flow::Stop;
            }

            if let Some(kind) = kind.filter(CommandKind::awaits_reply) {
                let timeout = match kind {
                    CommandKind::Initialize => self.drawing_timeout,
                    _ => self.reply_timeout,
                };
                self.await_reply(kind, timeout);
            }
        }
        Flow::Continue
    }

    fn write_message(&mut self, message: &OutgoingMessage) -> std::io::Result<()> {
        debug!(line = %message, "-> device");
        for byte in message.encode() {
            self.writer.write_byte(byte)?;
        }
        self.writer.flush()
    }
}

fn queue_closed() -> Flow {
    debug!("sender queue closed");
    Flow::Stop
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::RecordingConsole;
    use crate::loopback::{DeviceEnd, LoopbackChannel};
    use crate::ByteChannel;
    use plotkit_protocol::QUIT_WIRE_NAME;

    const WAIT: Duration = Duration::from_millis(200);

    fn setup(config: SessionConfig) -> (SenderWorker, DeviceEnd, Arc<RecordingConsole>, ShutdownSignal) {
        let (mut channel, device) = LoopbackChannel::new_pair();
        let (_reader, writer) = channel.split().unwrap();
        let console = Arc::new(RecordingConsole::new());
        let signal = ShutdownSignal::new();
        let sender = SenderWorker::new(writer, console.clone(), signal.clone(), &config);
        (sender, device, console, signal)
    }

    fn draw(name: &str, params: &[&str], kind: CommandKind) -> Notification {
        Notification::command(OutgoingMessage::new(name, params.iter().copied()), kind)
    }

    fn reply(kind: ReplyKind) -> Notification {
        Notification::ReplyArrived(kind)
    }

    fn in_flight(sender: &SenderWorker) -> Option<CommandKind> {
        match sender.state() {
            SenderState::AwaitingReply { command, .. } => Some(command),
            SenderState::Idle => None,
        }
    }

    #[test]
    fn test_initialize_handshake() {
        let (mut sender, mut device, console, _) = setup(SessionConfig::default());
        sender.handle(Notification::command(OutgoingMessage::empty(), CommandKind::Initialize));
        assert_eq!(device.recv_line(WAIT).as_deref(), Some(""));
        assert_eq!(in_flight(&sender), Some(CommandKind::Initialize));

        sender.handle(reply(ReplyKind::Initialized));
        assert_eq!(sender.state(), SenderState::Idle);
        assert_eq!(console.notices(), vec![Notice::Initialized]);
    }

    #[test]
    fn test_initialize_uses_drawing_timeout() {
        let config = SessionConfig::default()
            .with_reply_timeout(Duration::from_secs(1))
            .with_drawing_timeout(Duration::from_secs(600));
        let (mut sender, _device, _, _) = setup(config);
        let before = Instant::now();
        sender.handle(Notification::command(OutgoingMessage::empty(), CommandKind::Initialize));
        let SenderState::AwaitingReply { deadline, .. } = sender.state() else {
            panic!("expected in-flight handshake");
        };
        assert!(deadline >= before + Duration::from_secs(600));
    }

    #[test]
    fn test_second_command_waits_for_first() {
        let (mut sender, mut device, console, _) = setup(SessionConfig::default());
        sender.handle(draw("LINE", &["0", "0", "1", "1"], CommandKind::SimpleDrawing));
        sender.handle(draw("CIRCLE", &["0", "0", "5"], CommandKind::SimpleDrawing));

        assert_eq!(device.recv_line(WAIT).as_deref(), Some("LINE 0 0 1 1"));
        assert!(device.is_quiet(Duration::from_millis(20)));
        assert_eq!(sender.backlog_len(), 1);

        sender.handle(reply(ReplyKind::DrawingStarted));
        assert!(device.is_quiet(Duration::from_millis(20)));

        sender.handle(reply(ReplyKind::DrawingFinished));
        assert_eq!(device.recv_line(WAIT).as_deref(), Some("CIRCLE 0 0 5"));
        assert_eq!(in_flight(&sender), Some(CommandKind::SimpleDrawing));
        assert_eq!(
            console.notices(),
            vec![Notice::DrawingStarted, Notice::DrawingFinished]
        );
    }

    #[test]
    fn test_started_extends_deadline() {
        let config = SessionConfig::default()
            .with_reply_timeout(Duration::from_millis(100))
            .with_drawing_timeout(Duration::from_secs(300));
        let (mut sender, _device, _, _) = setup(config);
        sender.handle(draw("MOVE", &["1", "2"], CommandKind::SimpleDrawing));
        let SenderState::AwaitingReply { deadline: first, .. } = sender.state() else {
            panic!("expected in-flight command");
        };
        sender.handle(reply(ReplyKind::DrawingStarted));
        let SenderState::AwaitingReply { deadline: second, .. } = sender.state() else {
            panic!("expected in-flight command");
        };
        assert!(second > first + Duration::from_secs(200));
    }

    #[test]
    fn test_complex_started_reported_once() {
        let (mut sender, _device, console, _) = setup(SessionConfig::default());
        sender.handle(draw("DEMO", &[], CommandKind::complex()));
        sender.handle(reply(ReplyKind::DrawingStarted));
        sender.handle(reply(ReplyKind::DrawingStarted));
        sender.handle(reply(ReplyKind::DrawingStarted));
        assert_eq!(
            in_flight(&sender),
            Some(CommandKind::ComplexDrawing { started: true })
        );
        assert_eq!(console.notices(), vec![Notice::ComplexDrawingStarted]);

        sender.handle(reply(ReplyKind::ComplexDrawingFinished));
        assert_eq!(sender.state(), SenderState::Idle);
    }

    #[test]
    fn test_finished_ignored_during_complex_drawing() {
        let (mut sender, _device, console, _) = setup(SessionConfig::default());
        sender.handle(draw("HILBERT", &["3"], CommandKind::complex()));
        let before = sender.state();
        sender.handle(reply(ReplyKind::DrawingFinished));
        assert_eq!(sender.state(), before);
        assert!(console.notices().is_empty());
    }

    #[test]
    fn test_mismatched_replies_are_ignored() {
        let (mut sender, _device, _, _) = setup(SessionConfig::default());
        sender.handle(draw("ARC", &["0", "0", "90"], CommandKind::SimpleDrawing));
        let before = sender.state();
        sender.handle(reply(ReplyKind::ComplexDrawingFinished));
        sender.handle(reply(ReplyKind::Initialized));
        assert_eq!(sender.state(), before);
    }

    #[test]
    fn test_error_keeps_waiting_by_default() {
        let (mut sender, _device, console, signal) = setup(SessionConfig::default());
        sender.handle(draw("CIRCLE", &["0", "0", "5"], CommandKind::SimpleDrawing));
        let flow = sender.handle(reply(ReplyKind::Error("pen is up".to_string())));
        assert_eq!(flow, Flow::Continue);
        assert_eq!(in_flight(&sender), Some(CommandKind::SimpleDrawing));
        assert_eq!(
            console.errors(),
            vec!["Device replied with error: pen is up.".to_string()]
        );
        assert!(!signal.is_triggered());
    }

    #[test]
    fn test_error_release_policy_frees_queue() {
        let config = SessionConfig::default().with_error_policy(ErrorReplyPolicy::ReleaseCommand);
        let (mut sender, mut device, _, _) = setup(config);
        sender.handle(draw("CIRCLE", &["0", "0", "5"], CommandKind::SimpleDrawing));
        sender.handle(draw("MOVE", &["0", "0"], CommandKind::SimpleDrawing));
        assert_eq!(device.recv_line(WAIT).as_deref(), Some("CIRCLE 0 0 5"));

        sender.handle(reply(ReplyKind::Error(String::new())));
        assert_eq!(device.recv_line(WAIT).as_deref(), Some("MOVE 0 0"));
    }

    #[test]
    fn test_quit_message_is_fire_and_forget() {
        let (mut sender, mut device, _, _) = setup(SessionConfig::default());
        sender.handle(Notification::OutgoingQueued(
            OutgoingMessage::new("QUIT", Vec::<String>::new()),
            Some(CommandKind::Quit),
        ));
        sender.handle(Notification::OutgoingQueued(
            OutgoingMessage::new("DEMO", Vec::<String>::new()),
            None,
        ));
        assert_eq!(device.recv_line(WAIT).as_deref(), Some("QUIT"));
        assert_eq!(device.recv_line(WAIT).as_deref(), Some("DEMO"));
        assert_eq!(sender.state(), SenderState::Idle);
    }

    #[test]
    fn test_device_quit_stops_and_signals() {
        let (mut sender, _device, _, signal) = setup(SessionConfig::default());
        sender.handle(draw("DEMO", &[], CommandKind::complex()));
        assert_eq!(sender.handle(reply(ReplyKind::Quit)), Flow::Stop);
        assert_eq!(signal.reason(), Some(ShutdownReason::DeviceQuit));
    }

    #[test]
    fn test_write_failure_is_fatal() {
        let (mut sender, mut device, console, signal) = setup(SessionConfig::default());
        device.refuse_writes();
        let flow = sender.handle(draw("MOVE", &["1", "1"], CommandKind::SimpleDrawing));
        assert_eq!(flow, Flow::Stop);
        assert_eq!(signal.reason(), Some(ShutdownReason::WriteFailed));
        assert_eq!(console.errors().len(), 1);
    }

    #[test]
    fn test_run_times_out_once() {
        let config = SessionConfig::default().with_reply_timeout(Duration::from_millis(30));
        let (sender, _device, console, signal) = setup(config);
        let (tx, rx) = crossbeam_channel::unbounded();
        tx.send(draw("MOVE", &["1", "1"], CommandKind::SimpleDrawing)).unwrap();

        let started = Instant::now();
        sender.run(rx);
        assert!(started.elapsed() >= Duration::from_millis(30));
        assert_eq!(signal.reason(), Some(ShutdownReason::ReplyTimeout));
        assert_eq!(console.errors(), vec!["Device did not reply in time.".to_string()]);
    }

    #[test]
    fn test_unrelated_notifications_do_not_reset_deadline() {
        let config = SessionConfig::default().with_reply_timeout(Duration::from_millis(100));
        let (sender, _device, _, signal) = setup(config);
        let (tx, rx) = crossbeam_channel::unbounded();
        tx.send(draw("MOVE", &["1", "1"], CommandKind::SimpleDrawing)).unwrap();

        let feeder = std::thread::spawn(move || {
            for _ in 0..8 {
                std::thread::sleep(Duration::from_millis(25));
                if tx.send(reply(ReplyKind::Initialized)).is_err() {
                    break;
                }
            }
        });

        let started = Instant::now();
        sender.run(rx);
        assert!(started.elapsed() < Duration::from_millis(250));
        assert_eq!(signal.reason(), Some(ShutdownReason::ReplyTimeout));
        feeder.join().unwrap();
    }

    #[test]
    fn test_signal_ends_wait_for_reply() {
        let config = SessionConfig::default().with_reply_timeout(Duration::from_secs(30));
        let (sender, mut device, console, signal) = setup(config);
        let (tx, rx) = crossbeam_channel::unbounded();
        tx.send(draw("DEMO", &[], CommandKind::ComplexDrawing { started: false }))
            .unwrap();

        let remote = signal.clone();
        let trigger = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            remote.trigger(ShutdownReason::ReadFailed);
        });

        let started = Instant::now();
        sender.run(rx);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(device.recv_line(WAIT).as_deref(), Some("DEMO"));
        assert_eq!(signal.reason(), Some(ShutdownReason::ReadFailed));
        assert!(console.errors().is_empty());
        trigger.join().unwrap();
        drop(tx);
    }

    #[test]
    fn test_idle_sender_writes_quit_after_signal() {
        let (sender, mut device, _, signal) = setup(SessionConfig::default());
        let (tx, rx) = crossbeam_channel::unbounded();
        signal.trigger(ShutdownReason::UserQuit);
        tx.send(Notification::OutgoingQueued(
            OutgoingMessage::new(QUIT_WIRE_NAME, Vec::<String>::new()),
            Some(CommandKind::Quit),
        ))
        .unwrap();
        tx.send(Notification::Shutdown).unwrap();

        sender.run(rx);
        assert_eq!(device.recv_line(WAIT).as_deref(), Some("QUIT"));
    }

    #[test]
    fn test_shutdown_notification_stops_run() {
        let (sender, _device, _, signal) = setup(SessionConfig::default());
        let (tx, rx) = crossbeam_channel::unbounded();
        tx.send(Notification::Shutdown).unwrap();
        sender.run(rx);
        assert!(!signal.is_triggered());
    }
}
