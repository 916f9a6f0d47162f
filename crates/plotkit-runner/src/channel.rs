//! Byte channels to the plotter.
//!
//! A channel is opened once, split into a reader half owned by the listener
//! and a writer half owned by the sender, and closed by the session when both
//! workers are gone. The TCP implementation talks to a UART bridge that
//! exposes the plotter's serial port on a socket.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::debug;

/// Inbound half of a device channel.
pub trait ChannelReader: Send {
    /// Read available bytes, waiting at most `timeout`.
    ///
    /// Returns `Ok(0)` when nothing arrived in time. End of stream and other
    /// failures are errors.
    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize>;
}

/// Outbound half of a device channel.
pub trait ChannelWriter: Send {
    /// Write a single byte.
    fn write_byte(&mut self, byte: u8) -> io::Result<()>;

    /// Push written bytes out to the device.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// An open connection to the plotter.
pub trait ByteChannel: Send {
    /// Human readable description of the device end.
    fn describe(&self) -> String;

    /// Reset the device's microcontroller.
    fn reset_device(&mut self) -> io::Result<()>;

    /// Split off the reader and writer halves.
    fn split(&mut self) -> io::Result<(Box<dyn ChannelReader>, Box<dyn ChannelWriter>)>;

    /// Drop the modem control lines (RTS/DTR) so the device is left idle.
    fn release_control_lines(&mut self) -> io::Result<()>;

    /// Close the channel.
    fn close(&mut self) -> io::Result<()>;
}

/// A channel to a UART-over-TCP bridge.
pub struct TcpChannel {
    address: String,
    stream: TcpStream,
}

impl TcpChannel {
    /// Connect to the bridge at `address`.
    pub fn connect(address: &str, timeout: Duration) -> io::Result<TcpChannel> {
        let mut last_err = None;
        for addr in address.to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    debug!(%addr, "connected to device bridge");
                    return Ok(TcpChannel {
                        address: address.to_string(),
                        stream,
                    });
                }
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("{} did not resolve", address))
        }))
    }
}

impl ByteChannel for TcpChannel {
    fn describe(&self) -> String {
        format!("tcp://{}", self.address)
    }

    fn reset_device(&mut self) -> io::Result<()> {
        // The bridge owns the serial port's modem lines.
        debug!(address = %self.address, "device reset is not available over tcp");
        Ok(())
    }

    fn split(&mut self) -> io::Result<(Box<dyn ChannelReader>, Box<dyn ChannelWriter>)> {
        let reader = TcpReader {
            stream: self.stream.try_clone()?,
        };
        let writer = TcpWriter {
            stream: self.stream.try_clone()?,
        };
        Ok((Box::new(reader), Box::new(writer)))
    }

    fn release_control_lines(&mut self) -> io::Result<()> {
        debug!(address = %self.address, "control lines are not available over tcp");
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        match self.stream.shutdown(Shutdown::Both) {
            Err(e) if e.kind() != io::ErrorKind::NotConnected => Err(e),
            _ => Ok(()),
        }
    }
}

struct TcpReader {
    stream: TcpStream,
}

impl ChannelReader for TcpReader {
    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        // A zero duration would mean "block forever" to the socket.
        self.stream
            .set_read_timeout(Some(timeout.max(Duration::from_millis(1))))?;
        match self.stream.read(buf) {
            Ok(0) => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "device bridge closed the connection",
            )),
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                Ok(0)
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(0),
            Err(e) => Err(e),
        }
    }
}

struct TcpWriter {
    stream: TcpStream,
}

impl ChannelWriter for TcpWriter {
    fn write_byte(&mut self, byte: u8) -> io::Result<()> {
        self.stream.write_all(&[byte])
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}
