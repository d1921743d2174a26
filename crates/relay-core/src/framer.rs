//! Line framing.
//!
//! TCP delivers a byte stream, not messages: one read may carry half a line
//! or several lines at once. [`LineFramer`] buffers the bytes of a single
//! connection and hands out complete logical lines as terminators show up.
//!
//! # Invariants
//!
//! - Output does not depend on how the input was chunked.
//! - The buffer never holds more than `max_line_len + 1` bytes without a
//!   terminator. Past that the framer reports [`FramingError::LineTooLong`]
//!   and stops producing lines.

use bytes::{Bytes, BytesMut};
use thiserror::Error;

/// Longest line content (terminator excluded) accepted by default.
pub const DEFAULT_MAX_LINE_LEN: usize = 1023;

/// Errors produced while framing inbound bytes.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramingError {
    /// A line grew past the configured maximum before its terminator arrived.
    #[error("line exceeds maximum length of {max} bytes")]
    LineTooLong {
        /// Configured maximum line length
        max: usize,
    },
}

/// Per-connection line reassembly buffer.
#[derive(Debug, Clone)]
pub struct LineFramer {
    buf: BytesMut,
    max_line_len: usize,
    /// Prefix of `buf` already searched for a terminator.
    scanned: usize,
    poisoned: bool,
}

impl LineFramer {
    /// Create an empty framer accepting lines of up to `max_line_len` bytes.
    pub fn new(max_line_len: usize) -> Self {
        Self { buf: BytesMut::new(), max_line_len, scanned: 0, poisoned: false }
    }

    /// Append raw bytes to the buffer without extracting anything.
    ///
    /// Bytes pushed after the framer hit [`FramingError::LineTooLong`] are
    /// discarded.
    pub fn push(&mut self, bytes: &[u8]) {
        if !self.poisoned {
            self.buf.extend_from_slice(bytes);
        }
    }

    /// Append `bytes` and iterate over every line that is now complete.
    ///
    /// The iterator is lazy: lines are cut out of the buffer as it is
    /// advanced, and whatever follows the last terminator stays buffered for
    /// the next call.
    pub fn feed(&mut self, bytes: &[u8]) -> Lines<'_> {
        self.push(bytes);
        Lines { framer: self }
    }

    /// Extract the next complete line, if any.
    ///
    /// Returns `None` when no terminator is buffered. A trailing `\r` before
    /// the `\n` is stripped. Once an error has been returned, every later
    /// call returns `None`.
    pub fn next_line(&mut self) -> Option<Result<Bytes, FramingError>> {
        if self.poisoned {
            return None;
        }

        match self.buf[self.scanned..].iter().position(|&b| b == b'\n') {
            Some(offset) => {
                let end = self.scanned + offset;
                self.scanned = 0;

                let mut line = self.buf.split_to(end + 1);
                line.truncate(end);
                if line.last() == Some(&b'\r') {
                    line.truncate(end - 1);
                }

                if line.len() > self.max_line_len {
                    return Some(Err(self.poison()));
                }

                Some(Ok(line.freeze()))
            },
            None => {
                self.scanned = self.buf.len();

                if self.residue_too_long() {
                    return Some(Err(self.poison()));
                }

                None
            },
        }
    }

    /// Number of buffered bytes not yet returned as a line.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// The framer has reported [`FramingError::LineTooLong`].
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Unterminated residue can no longer become a valid line.
    ///
    /// One extra byte is tolerated when it is a `\r` that a following `\n`
    /// would strip.
    fn residue_too_long(&self) -> bool {
        let len = self.buf.len();
        len > self.max_line_len + 1
            || (len == self.max_line_len + 1 && self.buf.last() != Some(&b'\r'))
    }

    fn poison(&mut self) -> FramingError {
        self.poisoned = true;
        self.scanned = 0;
        self.buf = BytesMut::new();
        FramingError::LineTooLong { max: self.max_line_len }
    }
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINE_LEN)
    }
}

/// Lazy iterator over the complete lines of a [`LineFramer`].
///
/// Created by [`LineFramer::feed`].
#[derive(Debug)]
pub struct Lines<'a> {
    framer: &'a mut LineFramer,
}

impl Iterator for Lines<'_> {
    type Item = Result<Bytes, FramingError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.framer.next_line()
    }
}
