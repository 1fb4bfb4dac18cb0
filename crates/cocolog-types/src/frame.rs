//! Stateful frame decoder for the line-oriented sensor protocol.
//!
//! The wearable streams readings as newline-terminated text frames. A BLE
//! notification may carry a partial frame, one frame, or several frames
//! concatenated, so the decoder buffers incomplete trailing data across
//! calls and emits every completed frame exactly once, in arrival order.

use crate::error::DecodeError;

/// Default cap on buffered bytes awaiting a delimiter.
pub const DEFAULT_MAX_BUFFER: usize = 4096;

/// Accumulates transport chunks and yields complete frames.
///
/// One decoder instance belongs to one device session; its buffer is never
/// shared. Frames are terminated by `\n` (a trailing `\r` is tolerated),
/// and surrounding whitespace is stripped. Blank frames are skipped.
///
/// # Example
///
/// ```
/// use cocolog_types::frame::FrameDecoder;
///
/// let mut decoder = FrameDecoder::new();
/// assert!(decoder.feed(b"72,45.3,98\n33,1").len() == 1);
/// let frames = decoder.feed(b".2,95\n");
/// assert_eq!(frames[0].as_deref(), Ok("33,1.2,95"));
/// ```
#[derive(Debug)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    max_buffer: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    /// Create a decoder with the default buffer cap.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_buffer(DEFAULT_MAX_BUFFER)
    }

    /// Create a decoder with a custom buffer cap in bytes.
    #[must_use]
    pub fn with_max_buffer(max_buffer: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_buffer,
        }
    }

    /// Number of bytes currently buffered awaiting a delimiter.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Feed a transport chunk, returning every frame it completed.
    ///
    /// Each element is either a complete frame string or the error that
    /// made one frame unusable; an error never affects the frames around
    /// it. When buffered data reaches the cap without a delimiter the
    /// buffer is flushed and [`DecodeError::Overflow`] is reported in
    /// place of the lost frame.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Result<String, DecodeError>> {
        let mut out = Vec::new();

        for &byte in chunk {
            if byte == b'\n' {
                let line = std::mem::take(&mut self.buf);
                if let Some(frame) = complete_line(line) {
                    out.push(frame);
                }
            } else {
                if self.buf.len() >= self.max_buffer {
                    self.buf.clear();
                    out.push(Err(DecodeError::Overflow {
                        limit: self.max_buffer,
                    }));
                }
                self.buf.push(byte);
            }
        }

        out
    }

    /// Discard any buffered partial frame.
    ///
    /// Called on disconnect so a stale prefix is never glued onto data
    /// from the next connection.
    pub fn reset(&mut self) {
        self.buf.clear();
    }
}

/// Finish a delimited line: trim, reject non-UTF-8, skip blanks.
fn complete_line(mut line: Vec<u8>) -> Option<Result<String, DecodeError>> {
    if line.last() == Some(&b'\r') {
        line.pop();
    }

    match String::from_utf8(line) {
        Ok(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(Ok(trimmed.to_string()))
            }
        }
        Err(_) => Some(Err(DecodeError::NotUtf8)),
    }
}
