//! Line-based codec for the plotter serial stream.
//!
//! The device terminates every line with `\r\n`. Reads from the serial port
//! arrive in arbitrary chunks, so received bytes are accumulated until a full
//! terminator is present. A lone `\r` or `\n` is not a line break.

use bytes::BytesMut;

use crate::error::{ProtocolError, ProtocolResult};

/// Maximum length of a line that has not yet seen its terminator.
pub const MAX_LINE_LENGTH: usize = 1024;

/// Line terminator used in both directions.
pub const LINE_TERMINATOR: &[u8] = b"\r\n";

/// A codec for splitting the inbound byte stream into lines.
#[derive(Debug, Default)]
pub struct LineCodec {
    /// Buffer for accumulating incoming data.
    buffer: BytesMut,
}

impl LineCodec {
    /// Create a new line codec.
    pub fn new() -> Self {
        LineCodec {
            buffer: BytesMut::with_capacity(MAX_LINE_LENGTH),
        }
    }

    /// Add received data to the buffer.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to decode one complete line from the buffer.
    ///
    /// Returns `Ok(None)` when more data is needed. Empty lines and lines of
    /// only spaces are skipped.
    /// Invalid UTF-8 is replaced rather than rejected, since the firmware
    /// prints raw bytes during reset.
    pub fn decode_line(&mut self) -> ProtocolResult<Option<String>> {
        loop {
            let Some(end) = find_terminator(&self.buffer) else {
                if self.buffer.len() > MAX_LINE_LENGTH {
                    return Err(ProtocolError::BufferOverflow {
                        max: MAX_LINE_LENGTH,
                        actual: self.buffer.len(),
                    });
                }
                return Ok(None);
            };

            let line_data = self.buffer.split_to(end);
            let _ = self.buffer.split_to(LINE_TERMINATOR.len());

            // Blank lines, including lines of only spaces, carry nothing.
            if line_data.iter().all(|&b| b == b' ') {
                continue;
            }

            let line = String::from_utf8_lossy(&line_data).into_owned();
            log::trace!("decoded line: {:?}", line);
            return Ok(Some(line));
        }
    }

    /// Decode every complete line currently buffered.
    ///
    /// The trailing partial line, if any, stays in the buffer.
    pub fn decode_lines(&mut self) -> ProtocolResult<Vec<String>> {
        let mut lines = Vec::new();
        while let Some(line) = self.decode_line()? {
            lines.push(line);
        }
        Ok(lines)
    }

    /// Get the number of buffered bytes.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

}

fn find_terminator(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(LINE_TERMINATOR.len())
        .position(|window| window == LINE_TERMINATOR)
}
