//! Line-based codec for the ammeter serial console.
//!
//! The device terminates every record with `\n` (a preceding `\r` is
//! tolerated and stripped). Bytes are accumulated until a terminator is seen;
//! anything after the last terminator stays buffered for the next read.

use bytes::{Buf, BytesMut};

use crate::error::{ProtocolError, ProtocolResult};

/// Maximum number of unterminated bytes kept in the pending buffer.
pub const MAX_PENDING_LEN: usize = 4096;

/// Record terminator used in both directions.
pub const LINE_TERMINATOR: u8 = b'\n';

/// A codec for assembling device records from a byte stream.
///
/// Splitting happens on raw bytes before any text decoding, so a record
/// split across reads at any offset reassembles to the same line.
#[derive(Debug, Default)]
pub struct LineCodec {
    /// Bytes received but not yet consumed as a complete line.
    buffer: BytesMut,
}

impl LineCodec {
    /// Create a new line codec.
    pub fn new() -> Self {
        LineCodec {
            buffer: BytesMut::with_capacity(MAX_PENDING_LEN),
        }
    }

    /// Add received data to the buffer.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to decode the next complete line from the buffer.
    ///
    /// Returns `None` when no terminated line is pending. Blank lines are
    /// skipped. A line that is not valid UTF-8 is consumed and reported as
    /// [`ProtocolError::InvalidUtf8`]; if the unterminated tail exceeds
    /// [`MAX_PENDING_LEN`] it is dropped and reported as
    /// [`ProtocolError::BufferOverflow`].
    pub fn decode_line(&mut self) -> Option<ProtocolResult<String>> {
        loop {
            let end = match self.buffer.iter().position(|&b| b == LINE_TERMINATOR) {
                Some(end) => end,
                None => return self.check_overflow(),
            };

            let mut line = self.buffer.split_to(end);
            self.buffer.advance(1);

            if line.last() == Some(&b'\r') {
                line.truncate(line.len() - 1);
            }

            if line.is_empty() {
                continue;
            }

            return Some(String::from_utf8(line.to_vec()).map_err(|_| ProtocolError::InvalidUtf8));
        }
    }

    /// Decode every complete line currently buffered.
    ///
    /// The unterminated remainder, if any, stays in the buffer.
    pub fn drain(&mut self) -> Vec<ProtocolResult<String>> {
        let mut lines = Vec::new();
        while let Some(line) = self.decode_line() {
            lines.push(line);
        }
        lines
    }

    fn check_overflow(&mut self) -> Option<ProtocolResult<String>> {
        if self.buffer.len() <= MAX_PENDING_LEN {
            return None;
        }
        let actual = self.buffer.len();
        self.buffer.clear();
        Some(Err(ProtocolError::BufferOverflow {
            max: MAX_PENDING_LEN,
            actual,
        }))
    }

    /// Encode a command for transmission.
    ///
    /// Appends the `\n` terminator.
    pub fn encode_command(cmd: &str) -> Vec<u8> {
        let mut buf = Vec::with_capacity(cmd.len() + 1);
        buf.extend_from_slice(cmd.as_bytes());
        buf.push(LINE_TERMINATOR);
        buf
    }

    /// Get the number of buffered bytes.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Clear the buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Get the current buffer contents as a string (for debugging).
    pub fn buffer_as_str(&self) -> String {
        String::from_utf8_lossy(&self.buffer).to_string()
    }
}
