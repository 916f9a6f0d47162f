//! Listener worker: reads the device stream and routes what it says.
//!
//! Replies go to the sender's queue, free text goes to the console. The
//! listener never blocks longer than one read timeout, so it notices a
//! shutdown within that bound.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Sender;
use plotkit_protocol::{IncomingMessage, LineCodec, ReplyKind};
use tracing::{debug, warn};

use crate::channel::ChannelReader;
use crate::console::Console;
use crate::notification::{Notification, ShutdownReason, ShutdownSignal};
use crate::sender::Flow;

const READ_CHUNK: usize = 256;

/// The listener worker. Owns the reader half of the channel.
pub struct ListenerWorker {
    reader: Box<dyn ChannelReader>,
    codec: LineCodec,
    replies: Sender<Notification>,
    console: Arc<dyn Console>,
    signal: ShutdownSignal,
    read_timeout: Duration,
}

impl ListenerWorker {
    /// Create a listener forwarding replies into `replies`.
    pub fn new(
        reader: Box<dyn ChannelReader>,
        replies: Sender<Notification>,
        console: Arc<dyn Console>,
        signal: ShutdownSignal,
        read_timeout: Duration,
    ) -> Self {
        ListenerWorker {
            reader,
            codec: LineCodec::new(),
            replies,
            console,
            signal,
            read_timeout,
        }
    }

    /// Run until shutdown is signalled or the stream fails.
    pub fn run(mut self) {
        while !self.signal.is_triggered() {
            if self.poll() == Flow::Stop {
                break;
            }
        }
        debug!(buffered = self.codec.buffered_len(), "listener worker exiting");
    }

    /// One bounded read followed by dispatch of every complete line.
    pub fn poll(&mut self) -> Flow {
        let mut buf = [0u8; READ_CHUNK];
        match self.reader.read_timeout(&mut buf, self.read_timeout) {
            Ok(n) => self.codec.push(&buf[..n]),
            Err(e) => {
                warn!(error = %e, "read from device failed");
                self.console
                    .error(&format!("Lost connection to plotter: {}", e));
                self.signal.trigger(ShutdownReason::ReadFailed);
                return Flow::Stop;
            }
        }

        loop {
            match self.codec.decode_line() {
                Ok(Some(line)) => {
                    if self.dispatch(&line) == Flow::Stop {
                        return Flow::Stop;
                    }
                }
                Ok(None) => return Flow::Continue,
                Err(e) => {
                    warn!(error = %e, "device stream corrupted");
                    self.console
                        .error(&format!("Error occurred while listening: {}", e));
                    self.signal.trigger(ShutdownReason::StreamCorrupted);
                    return Flow::Stop;
                }
            }
        }
    }

    fn dispatch(&self, line: &str) -> Flow {
        debug!(line, "<- device");
        let msg = IncomingMessage::decode(line);
        if msg.is_text() {
            self.console.text(&msg.text());
            return Flow::Continue;
        }

        let Some(reply) = ReplyKind::classify(&msg) else {
            return Flow::Continue;
        };
        let is_quit = reply == ReplyKind::Quit;
        if self.replies.send(Notification::ReplyArrived(reply)).is_err() {
            debug!("sender queue closed, reply dropped");
        }
        if is_quit {
            self.signal.trigger(ShutdownReason::DeviceQuit);
            return Flow::Stop;
        }
        Flow::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::{ConsoleLine, RecordingConsole};
    use crate::loopback::{DeviceEnd, LoopbackChannel};
    use crate::ByteChannel;
    use crossbeam_channel::Receiver;

    fn setup() -> (
        ListenerWorker,
        DeviceEnd,
        Receiver<Notification>,
        Arc<RecordingConsole>,
        ShutdownSignal,
    ) {
        let (mut channel, device) = LoopbackChannel::new_pair();
        let (reader, _writer) = channel.split().unwrap();
        let (tx, rx) = crossbeam_channel::unbounded();
        let console = Arc::new(RecordingConsole::new());
        let signal = ShutdownSignal::new();
        let listener = ListenerWorker::new(
            reader,
            tx,
            console.clone(),
            signal.clone(),
            Duration::from_millis(20),
        );
        (listener, device, rx, console, signal)
    }

    #[test]
    fn test_replies_forwarded_in_order() {
        let (mut listener, device, rx, _, _) = setup();
        device.send(b"!STARTED\r\n>!FINISHED\r\n");
        assert_eq!(listener.poll(), Flow::Continue);
        assert_eq!(rx.try_recv(), Ok(Notification::ReplyArrived(ReplyKind::DrawingStarted)));
        assert_eq!(rx.try_recv(), Ok(Notification::ReplyArrived(ReplyKind::DrawingFinished)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_split_reads_reassemble() {
        let (mut listener, device, rx, _, _) = setup();
        device.send(b"!COMPLEX_");
        listener.poll();
        assert!(rx.try_recv().is_err());
        device.send(b"FINISHED\r\n");
        listener.poll();
        assert_eq!(
            rx.try_recv(),
            Ok(Notification::ReplyArrived(ReplyKind::ComplexDrawingFinished))
        );
    }

    #[test]
    fn test_free_text_printed() {
        let (mut listener, device, rx, console, _) = setup();
        device.send_line("Moving into starting  position.");
        listener.poll();
        assert!(rx.try_recv().is_err());
        assert_eq!(
            console.lines(),
            vec![ConsoleLine::Text("Moving into starting position.".to_string())]
        );
    }

    #[test]
    fn test_blank_device_lines_not_printed() {
        let (mut listener, device, rx, console, _) = setup();
        device.send(b"   \r\n\r\n  \r\nready\r\n");
        assert_eq!(listener.poll(), Flow::Continue);
        assert!(rx.try_recv().is_err());
        assert_eq!(console.lines(), vec![ConsoleLine::Text("ready".to_string())]);
    }

    #[test]
    fn test_unknown_command_ignored() {
        let (mut listener, device, rx, console, _) = setup();
        device.send_line("!DEBUG :x=3");
        assert_eq!(listener.poll(), Flow::Continue);
        assert!(rx.try_recv().is_err());
        assert!(console.lines().is_empty());
    }

    #[test]
    fn test_quit_forwards_and_stops() {
        let (mut listener, device, rx, _, signal) = setup();
        device.send(b"!QUIT\r\n!STARTED\r\n");
        assert_eq!(listener.poll(), Flow::Stop);
        assert_eq!(rx.try_recv(), Ok(Notification::ReplyArrived(ReplyKind::Quit)));
        assert!(rx.try_recv().is_err());
        assert_eq!(signal.reason(), Some(ShutdownReason::DeviceQuit));
    }

    #[test]
    fn test_read_failure_is_fatal() {
        let (mut listener, mut device, _, console, signal) = setup();
        device.hang_up();
        assert_eq!(listener.poll(), Flow::Stop);
        assert_eq!(signal.reason(), Some(ShutdownReason::ReadFailed));
        assert_eq!(console.errors().len(), 1);
    }

    #[test]
    fn test_overflow_is_fatal() {
        let (mut listener, device, _, _, signal) = setup();
        device.send(&vec![b'#'; plotkit_protocol::MAX_LINE_LENGTH + 10]);
        assert_eq!(listener.poll(), Flow::Stop);
        assert_eq!(signal.reason(), Some(ShutdownReason::StreamCorrupted));
    }

    #[test]
    fn test_run_exits_on_signal() {
        let (listener, _device, _, _, signal) = setup();
        signal.trigger(ShutdownReason::UserQuit);
        listener.run();
    }
}
