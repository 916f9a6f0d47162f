//! Interactive session runner for the serial plotter.
//!
//! A session connects to the plotter over a [`ByteChannel`], performs the
//! initialize handshake, and then forwards user commands one at a time while
//! printing whatever the device reports. Three worker threads cooperate:
//!
//! - [`InputWorker`] validates user lines and queues commands.
//! - [`SenderWorker`] writes commands and tracks the single in-flight command.
//! - [`ListenerWorker`] frames the device stream and routes replies back to
//!   the sender.
//!
//! [`Session`] wires them together and owns the shutdown sequence.
//!
//! ```rust,no_run
//! use std::io::BufReader;
//! use std::sync::Arc;
//! use plotkit_runner::{
//!     DxfDrawingSource, LoopbackChannel, ReaderLines, Session, SessionConfig, SessionIo,
//!     StdConsole,
//! };
//!
//! let (channel, _device) = LoopbackChannel::new_pair();
//! let io = SessionIo {
//!     input: Box::new(ReaderLines::new(BufReader::new(std::io::stdin()))),
//!     console: Arc::new(StdConsole),
//!     drawings: Arc::new(DxfDrawingSource),
//! };
//! let session = Session::start(SessionConfig::default(), Box::new(channel), io)?;
//! let reason = session.run();
//! println!("session ended: {}", reason);
//! # Ok::<(), plotkit_runner::RunnerError>(())
//! ```

pub mod channel;
pub mod config;
pub mod console;
pub mod drawing;
pub mod error;
pub mod input;
pub mod listener;
pub mod loopback;
pub mod notification;
pub mod sender;
pub mod session;

pub use channel::{ByteChannel, ChannelReader, ChannelWriter, TcpChannel};
pub use config::{ErrorReplyPolicy, SessionConfig, SessionMode, DEFAULT_DEVICE};
pub use console::{Console, ConsoleLine, Notice, RecordingConsole, StdConsole};
pub use drawing::{parse_dxf, DrawingSource, DxfDrawingSource};
pub use error::{DrawingError, RunnerError, RunnerResult};
pub use input::{InputWorker, LineSource, ReaderLines};
pub use listener::ListenerWorker;
pub use loopback::{DeviceEnd, LoopbackChannel};
pub use notification::{Notification, ShutdownReason, ShutdownSignal};
pub use sender::{Flow, SenderState, SenderWorker};
pub use session::{Session, SessionIo};
