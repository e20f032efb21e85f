//! Incremental line framing over arbitrary chunk boundaries.
//!
//! The device writes one decimal value per line, terminated by `\r\n`. Reads
//! from the port return whatever happened to be buffered, so a terminator or
//! a number can be split across two chunks. [`LineFramer`] keeps the
//! unterminated tail between calls and only hands out complete lines.
//!
//! The buffer is not capped: a source that never sends a terminator grows it
//! without bound.

use std::iter::FusedIterator;

/// Line terminator emitted by the device. A lone `\n` does not end a line.
pub const TERMINATOR: &str = "\r\n";

/// Accumulates raw text chunks and yields complete, trimmed lines.
#[derive(Debug, Default, Clone)]
pub struct LineFramer {
    buffer: String,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `chunk` and return the lines it completed.
    ///
    /// After this call the buffer holds exactly the text following the last
    /// terminator seen so far.
    pub fn feed(&mut self, chunk: &str) -> Lines {
        self.buffer.push_str(chunk);

        match self.buffer.rfind(TERMINATOR) {
            Some(idx) => {
                let tail = self.buffer.split_off(idx + TERMINATOR.len());
                let complete = std::mem::replace(&mut self.buffer, tail);
                Lines { complete, pos: 0 }
            }
            None => Lines::default(),
        }
    }

    /// Unterminated text carried over to the next `feed`.
    pub fn pending(&self) -> &str {
        &self.buffer
    }

    /// Drop any partial line, ready for a new session.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}

/// Lines completed by a single [`LineFramer::feed`] call, produced lazily.
#[derive(Debug, Default)]
pub struct Lines {
    complete: String,
    pos: usize,
}

impl Iterator for Lines {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let rest = self.complete.get(self.pos..)?;
        let end = rest.find(TERMINATOR)?;
        let line = rest[..end].trim().to_string();
        self.pos += end + TERMINATOR.len();
        Some(line)
    }
}

impl FusedIterator for Lines {}
