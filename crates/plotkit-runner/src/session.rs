//! Session controller.
//!
//! Owns the device channel and the three workers. A session starts with a
//! device reset and the initialize handshake, runs until something triggers
//! the shutdown signal, then tells the device to quit, stops the workers,
//! resets the device and closes the channel.
//!
//! ## Threads
//!
//! - `plotkit-input`: reads user lines. It may be blocked on the terminal at
//!   shutdown, so it is never joined.
//! - `plotkit-sender`: writes commands, owns the protocol state machine.
//! - `plotkit-listener`: reads the device, forwards replies to the sender.

use std::collections::HashSet;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use plotkit_protocol::{CommandKind, OutgoingMessage, QUIT_WIRE_NAME};
use tracing::{debug, info, warn};

use crate::channel::ByteChannel;
use crate::config::SessionConfig;
use crate::console::Console;
use crate::drawing::DrawingSource;
use crate::error::{RunnerError, RunnerResult};
use crate::input::{InputWorker, LineSource};
use crate::listener::ListenerWorker;
use crate::notification::{Notification, ShutdownReason, ShutdownSignal};
use crate::sender::SenderWorker;

const SENDER: &str = "sender";
const LISTENER: &str = "listener";
const INPUT: &str = "input";

/// Everything a session needs besides the channel.
pub struct SessionIo {
    /// Where user commands come from.
    pub input: Box<dyn LineSource>,
    /// Where user-facing output goes.
    pub console: Arc<dyn Console>,
    /// Loader for `read <file>`.
    pub drawings: Arc<dyn DrawingSource>,
}

struct WorkerHandle {
    name: &'static str,
    thread: JoinHandle<()>,
}

/// Resources released exactly once by [`Session::shutdown`].
struct Resources {
    workers: Vec<WorkerHandle>,
    channel: Option<Box<dyn ByteChannel>>,
}

/// A running plotter session.
pub struct Session {
    config: SessionConfig,
    signal: ShutdownSignal,
    outgoing: Sender<Notification>,
    exits: Receiver<&'static str>,
    resources: Mutex<Resources>,
}

impl Session {
    /// Reset the device, queue the handshake and start the workers.
    ///
    /// The channel must already be open. If a worker cannot be spawned, the
    /// workers already running are stopped and the channel is closed.
    pub fn start(
        config: SessionConfig,
        mut channel: Box<dyn ByteChannel>,
        io: SessionIo,
    ) -> RunnerResult<Session> {
        info!(device = %channel.describe(), mode = ?config.mode, "starting session");
        channel.reset_device()?;
        let (reader, writer) = channel.split()?;

        let signal = ShutdownSignal::new();
        let (outgoing_tx, outgoing_rx) = crossbeam_channel::unbounded();
        let (exit_tx, exit_rx) = crossbeam_channel::unbounded();

        let session = Session {
            config,
            signal: signal.clone(),
            outgoing: outgoing_tx.clone(),
            exits: exit_rx,
            resources: Mutex::new(Resources {
                workers: Vec::new(),
                channel: Some(channel),
            }),
        };

        session.queue(Notification::command(
            OutgoingMessage::empty(),
            CommandKind::Initialize,
        ));

        let sender = SenderWorker::new(writer, io.console.clone(), signal.clone(), &session.config);
        let listener = ListenerWorker::new(
            reader,
            outgoing_tx.clone(),
            io.console.clone(),
            signal.clone(),
            session.config.read_timeout(),
        );
        let input = InputWorker::new(
            io.input,
            outgoing_tx,
            io.console,
            signal,
            session.config.mode,
            io.drawings,
        );

        let started = session
            .spawn_joined(SENDER, exit_tx.clone(), move || sender.run(outgoing_rx))
            .and_then(|()| session.spawn_joined(LISTENER, exit_tx, move || listener.run()))
            .and_then(|()| spawn_worker(INPUT, move || input.run()).map(drop));

        if let Err(e) = started {
            session.shutdown(ShutdownReason::StartupFailed);
            return Err(e);
        }
        Ok(session)
    }

    /// The session's shutdown signal, for interrupt handlers.
    pub fn signal(&self) -> ShutdownSignal {
        self.signal.clone()
    }

    /// Queue a notification for the sender worker.
    pub fn queue(&self, notification: Notification) {
        if self.outgoing.send(notification).is_err() {
            debug!("sender queue closed");
        }
    }

    /// Block until shutdown is triggered.
    pub fn wait(&self) -> ShutdownReason {
        self.signal.wait()
    }

    /// Wait for shutdown, then run the shutdown sequence.
    pub fn run(&self) -> ShutdownReason {
        let reason = self.wait();
        self.shutdown(reason)
    }

    /// Stop the session and release the device.
    ///
    /// Safe to call any number of times from any thread; only the first call
    /// does work, later calls wait for it and return the same reason.
    pub fn shutdown(&self, reason: ShutdownReason) -> ShutdownReason {
        self.signal.trigger(reason);
        let mut resources = self.resources.lock();

        if let Some(mut channel) = resources.channel.take() {
            self.queue(Notification::OutgoingQueued(
                OutgoingMessage::new(QUIT_WIRE_NAME, Vec::<String>::new()),
                Some(CommandKind::Quit),
            ));
            self.queue(Notification::Shutdown);

            let workers = std::mem::take(&mut resources.workers);
            self.join_workers(workers);

            if let Err(e) = channel.reset_device() {
                warn!(error = %e, "failed to reset device");
            }
            if let Err(e) = channel.release_control_lines() {
                warn!(error = %e, "failed to release control lines");
            }
            if let Err(e) = channel.close() {
                warn!(error = %e, "failed to close device channel");
            }
            info!(device = %channel.describe(), "device channel closed");
        }

        self.signal.reason().unwrap_or(reason)
    }

    fn spawn_joined(
        &self,
        name: &'static str,
        exit_tx: Sender<&'static str>,
        body: impl FnOnce() + Send + 'static,
    ) -> RunnerResult<()> {
        let thread = spawn_worker(name, move || {
            body();
            let _ = exit_tx.send(name);
        })?;
        self.resources.lock().workers.push(WorkerHandle { name, thread });
        Ok(())
    }

    fn join_workers(&self, workers: Vec<WorkerHandle>) {
        let deadline = Instant::now() + self.config.join_timeout();
        let mut exited = HashSet::new();
        while exited.len() < workers.len() {
            match self.exits.recv_deadline(deadline) {
                Ok(name) => {
                    exited.insert(name);
                }
                Err(_) => break,
            }
        }

        for worker in workers {
            if !exited.contains(worker.name) {
                warn!(worker = worker.name, "worker did not stop in time, detaching");
                continue;
            }
            if worker.thread.join().is_err() {
                warn!(worker = worker.name, "worker panicked");
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown(ShutdownReason::Interrupted);
    }
}

fn spawn_worker(
    name: &'static str,
    body: impl FnOnce() + Send + 'static,
) -> RunnerResult<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("plotkit-{}", name))
        .spawn(body)
        .map_err(|source| RunnerError::Spawn { name, source })
}
