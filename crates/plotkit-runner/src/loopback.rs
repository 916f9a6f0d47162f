//! In-process channel pair for driving a session without hardware.
//!
//! [`LoopbackChannel::new_pair`] returns the host side, which implements
//! [`ByteChannel`], and a [`DeviceEnd`] that plays the plotter: it receives
//! every byte the sender writes and can inject replies for the listener.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use crate::channel::{ByteChannel, ChannelReader, ChannelWriter};

#[derive(Debug, Default)]
struct LoopbackStats {
    resets: AtomicUsize,
    releases: AtomicUsize,
    closes: AtomicUsize,
}

/// Host side of a loopback pair.
pub struct LoopbackChannel {
    to_host: Option<Receiver<Vec<u8>>>,
    from_host: Option<Sender<u8>>,
    stats: Arc<LoopbackStats>,
}

/// Device side of a loopback pair.
pub struct DeviceEnd {
    to_host: Option<Sender<Vec<u8>>>,
    from_host: Option<Receiver<u8>>,
    pending: Vec<u8>,
    stats: Arc<LoopbackStats>,
}

impl LoopbackChannel {
    /// Create a connected host/device pair.
    pub fn new_pair() -> (LoopbackChannel, DeviceEnd) {
        let (to_host_tx, to_host_rx) = crossbeam_channel::unbounded();
        let (from_host_tx, from_host_rx) = crossbeam_channel::unbounded();
        let stats = Arc::new(LoopbackStats::default());
        (
            LoopbackChannel {
                to_host: Some(to_host_rx),
                from_host: Some(from_host_tx),
                stats: Arc::clone(&stats),
            },
            DeviceEnd {
                to_host: Some(to_host_tx),
                from_host: Some(from_host_rx),
                pending: Vec::new(),
                stats,
            },
        )
    }
}

impl ByteChannel for LoopbackChannel {
    fn describe(&self) -> String {
        "loopback".to_string()
    }

    fn reset_device(&mut self) -> io::Result<()> {
        self.stats.resets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn split(&mut self) -> io::Result<(Box<dyn ChannelReader>, Box<dyn ChannelWriter>)> {
        match (self.to_host.take(), self.from_host.take()) {
            (Some(rx), Some(tx)) => Ok((
                Box::new(LoopbackReader {
                    rx,
                    leftover: Vec::new(),
                }),
                Box::new(LoopbackWriter { tx }),
            )),
            _ => Err(io::Error::new(
                io::ErrorKind::Other,
                "loopback channel already split",
            )),
        }
    }

    fn release_control_lines(&mut self) -> io::Result<()> {
        self.stats.releases.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        self.stats.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct LoopbackReader {
    rx: Receiver<Vec<u8>>,
    leftover: Vec<u8>,
}

impl ChannelReader for LoopbackReader {
    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        if self.leftover.is_empty() {
            match self.rx.recv_timeout(timeout) {
                Ok(chunk) => self.leftover = chunk,
                Err(RecvTimeoutError::Timeout) => return Ok(0),
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "device end hung up",
                    ))
                }
            }
        }
        let n = self.leftover.len().min(buf.len());
        buf[..n].copy_from_slice(&self.leftover[..n]);
        self.leftover.drain(..n);
        Ok(n)
    }
}

struct LoopbackWriter {
    tx: Sender<u8>,
}

impl ChannelWriter for LoopbackWriter {
    fn write_byte(&mut self, byte: u8) -> io::Result<()> {
        self.tx
            .send(byte)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "device end refused data"))
    }
}

impl DeviceEnd {
    /// Send raw bytes to the host.
    pub fn send(&self, bytes: &[u8]) {
        if let Some(tx) = &self.to_host {
            let _ = tx.send(bytes.to_vec());
        }
    }

    /// Send one line to the host, appending `\r\n`.
    pub fn send_line(&self, line: &str) {
        let mut bytes = line.as_bytes().to_vec();
        bytes.extend_from_slice(b"\r\n");
        self.send(&bytes);
    }

    /// Receive the next `\r\n` terminated line written by the host.
    ///
    /// The terminator is stripped, so the initialize handshake reads as `""`.
    pub fn recv_line(&mut self, timeout: Duration) -> Option<String> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(pos) = self.pending.windows(2).position(|w| w == b"\r\n") {
                let line: Vec<u8> = self.pending.drain(..pos + 2).take(pos).collect();
                return Some(String::from_utf8_lossy(&line).into_owned());
            }
            let rx = self.from_host.as_ref()?;
            let remaining = deadline.checked_duration_since(Instant::now())?;
            match rx.recv_timeout(remaining) {
                Ok(byte) => self.pending.push(byte),
                Err(_) => return None,
            }
        }
    }

    /// Check that nothing more was written within `timeout`.
    pub fn is_quiet(&mut self, timeout: Duration) -> bool {
        if !self.pending.is_empty() {
            return false;
        }
        match &self.from_host {
            Some(rx) => match rx.recv_timeout(timeout) {
                Ok(byte) => {
                    self.pending.push(byte);
                    false
                }
                Err(_) => true,
            },
            None => true,
        }
    }

    /// Stop accepting bytes; the host's next write fails.
    pub fn refuse_writes(&mut self) {
        self.from_host = None;
    }

    /// Hang up the inbound direction; the host's next read fails.
    pub fn hang_up(&mut self) {
        self.to_host = None;
    }

    /// Number of device resets requested by the host.
    pub fn reset_count(&self) -> usize {
        self.stats.resets.load(Ordering::SeqCst)
    }

    /// Number of times the host released the control lines.
    pub fn release_count(&self) -> usize {
        self.stats.releases.load(Ordering::SeqCst)
    }

    /// Number of times the host closed the channel.
    pub fn close_count(&self) -> usize {
        self.stats.closes.load(Ordering::SeqCst)
    }
}
