//! # Refill Buffer
//!
//! Bounded window of compressed input. Bytes the backend has not consumed
//! yet (the start of a unit that continues past the window) are carried to
//! the front before new bytes are appended, so a backend always sees a unit
//! as one contiguous slice.
//!
//! ```text
//! before refill:  [consumed.......|carry][free........]
//! after refill:   [carry|fresh bytes.................][guard]
//! ```

use crate::traits::InputWindow;
use std::io::{self, Read};
use tracing::trace;

/// Outcome of [`RefillBuffer::refill`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refill {
    /// `usable` bytes are now in the window, `fresh` of them new.
    Filled { usable: usize, fresh: usize },
    /// No carry and nothing left to read.
    EndOfStream,
}

pub struct RefillBuffer {
    buf: Vec<u8>,
    capacity: usize,
    guard: usize,
    start: usize,
    end: usize,
    eof: bool,
}

impl RefillBuffer {
    /// A window of `capacity` data bytes followed by `guard` zero bytes.
    pub fn new(capacity: usize, guard: usize) -> Self {
        Self {
            buf: vec![0; capacity + guard],
            capacity,
            guard,
            start: 0,
            end: 0,
            eof: false,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Unconsumed bytes in the window.
    pub fn carry(&self) -> usize {
        self.end - self.start
    }

    pub fn is_full(&self) -> bool {
        self.carry() >= self.capacity
    }

    /// `true` once a read returned end of stream.
    pub fn is_eof(&self) -> bool {
        self.eof
    }

    /// The unconsumed bytes; the guard is included once the stream is
    /// exhausted.
    pub fn window(&self) -> InputWindow<'_> {
        let padded_end = if self.eof {
            self.end + self.guard
        } else {
            self.end
        };
        InputWindow::new(&self.buf[self.start..padded_end], self.carry(), self.eof)
    }

    /// Mark `n` bytes as consumed. Consuming past the data is clamped.
    ///
    /// Once the stream is exhausted the offsets stay put, so the zeroed guard
    /// behind the last byte remains the one `window` hands out.
    pub fn consume(&mut self, n: usize) {
        self.start += n.min(self.carry());
        if self.start == self.end && !self.eof {
            self.start = 0;
            self.end = 0;
        }
    }

    /// Forget all buffered bytes, e.g. after the stream was repositioned.
    pub fn discard(&mut self) {
        self.start = 0;
        self.end = 0;
        self.eof = false;
    }

    /// Move the carry to the front and read until the window is full or the
    /// stream ends.
    ///
    /// # Errors
    ///
    /// Read errors other than `Interrupted` are returned as-is; bytes read
    /// before the error stay in the window.
    pub fn refill<R: Read + ?Sized>(&mut self, reader: &mut R) -> io::Result<Refill> {
        let carry = self.carry();
        if self.start > 0 {
            self.buf.copy_within(self.start..self.end, 0);
            self.start = 0;
            self.end = carry;
        }

        let mut fresh = 0;
        while self.end < self.capacity {
            match reader.read(&mut self.buf[self.end..self.capacity]) {
                Ok(0) => {
                    self.eof = true;
                    break;
                }
                Ok(n) => {
                    self.end += n;
                    fresh += n;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        if self.eof {
            self.buf[self.end..self.end + self.guard].fill(0);
        }

        trace!(carry, fresh, eof = self.eof, "Refilled input window");

        if carry == 0 && fresh == 0 {
            return Ok(Refill::EndOfStream);
        }
        Ok(Refill::Filled {
            usable: self.end,
            fresh,
        })
    }
}
