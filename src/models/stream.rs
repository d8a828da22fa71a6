//! Incremental line splitter for newline-delimited JSON responses
//!
//! Network chunks do not respect object boundaries: one chunk may carry
//! half an object, another several. The decoder buffers bytes and hands
//! back only complete lines.

use crate::models::ModelError;

/// Maximum buffered bytes without a newline (1MB)
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// Buffers raw bytes and yields complete `\n`-terminated lines
#[derive(Debug)]
pub struct LineDecoder {
    buffer: Vec<u8>,
    max_line_bytes: usize,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::with_capacity(MAX_LINE_BYTES)
    }

    /// Decoder that gives up once a single line grows past `max_line_bytes`
    pub fn with_capacity(max_line_bytes: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(4096),
            max_line_bytes,
        }
    }

    /// Add bytes and drain every line they complete
    ///
    /// Blank lines are skipped. A partial trailing line stays buffered
    /// until a later chunk finishes it.
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<String>, ModelError> {
        self.buffer.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(end) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=end).collect();
            let text = String::from_utf8_lossy(&line[..end]);
            let text = text.trim();
            if !text.is_empty() {
                lines.push(text.to_string());
            }
        }

        if self.buffer.len() > self.max_line_bytes {
            let buffered = self.buffer.len();
            self.buffer.clear();
            return Err(ModelError::Unavailable(format!(
                "Stream line of {} bytes exceeds maximum {}",
                buffered, self.max_line_bytes
            )));
        }

        Ok(lines)
    }

    /// Bytes waiting for a newline
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

impl Default for LineDecoder {
    fn default() -> Self {
        Self::new()
    }
}
