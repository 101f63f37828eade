//! Line Reassembly for the Tool Process Output Stream
//!
//! The tool process writes UTF-8 text to its stdout, but reads on our side
//! arrive as arbitrary byte chunks — a chunk boundary is not guaranteed to
//! align with a message boundary. The assembler keeps the trailing partial
//! line in a carry-over buffer and only yields complete newline-terminated
//! lines.

use thiserror::Error;

/// Maximum carry-over buffer size (1 MB). A line that never terminates
/// would otherwise grow the buffer without bound.
pub const MAX_LINE_BUFFER: usize = 1_048_576;

#[derive(Error, Debug)]
pub enum FramingError {
    #[error("line buffer overflow: {0} bytes exceeds maximum {1}")]
    BufferOverflow(usize, usize),
}

/// Reassembles newline-terminated lines from arbitrary byte chunks.
#[derive(Debug, Default)]
pub struct LineAssembler {
    carry: Vec<u8>,
}

impl LineAssembler {
    pub fn new() -> Self {
        Self { carry: Vec::with_capacity(4096) }
    }

    /// Feed a chunk of bytes, returning every line completed by it.
    ///
    /// Trailing `\r` is stripped so CRLF-emitting processes work too.
    /// Bytes after the last newline stay buffered until a later chunk
    /// completes them.
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<String>, FramingError> {
        if self.carry.len() + bytes.len() > MAX_LINE_BUFFER {
            // A pathological line; drop the partial state so the stream
            // can resynchronize at the next newline.
            let total = self.carry.len() + bytes.len();
            self.carry.clear();
            return Err(FramingError::BufferOverflow(total, MAX_LINE_BUFFER));
        }

        self.carry.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.carry.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.carry.drain(..=pos).collect();
            line.pop(); // the newline itself
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }

        Ok(lines)
    }

    /// Bytes currently held waiting for a terminating newline.
    pub fn pending_len(&self) -> usize {
        self.carry.len()
    }
}
