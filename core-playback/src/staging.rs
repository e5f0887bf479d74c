//! # PCM Staging Buffer
//!
//! Packed PCM bytes produced by the last decoded unit but not yet handed to
//! the caller. The decode loop only refills it once it is empty, so a read
//! cursor over a growable vector is enough: no wrap-around, no shifting of
//! the remainder.

/// Single-owner byte staging area.
#[derive(Debug, Default)]
pub struct StagingBuffer {
    data: Vec<u8>,
    read_pos: usize,
}

impl StagingBuffer {
    /// Create a staging buffer with room for `capacity` bytes before it grows.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            read_pos: 0,
        }
    }

    /// Start a new fill. The returned vector is empty and keeps its
    /// allocation; anything still staged is dropped.
    pub fn begin_fill(&mut self) -> &mut Vec<u8> {
        self.data.clear();
        self.read_pos = 0;
        &mut self.data
    }

    /// Copy as many staged bytes as fit into `output`.
    ///
    /// Returns the number of bytes copied.
    pub fn read(&mut self, output: &mut [u8]) -> usize {
        let to_read = self.len().min(output.len());
        if to_read == 0 {
            return 0;
        }

        output[..to_read].copy_from_slice(&self.data[self.read_pos..self.read_pos + to_read]);
        self.read_pos += to_read;

        if self.read_pos == self.data.len() {
            self.data.clear();
            self.read_pos = 0;
        }
        to_read
    }

    /// Bytes staged and not yet read (the fill count).
    pub fn len(&self) -> usize {
        self.data.len() - self.read_pos
    }

    /// Returns `true` if nothing is staged.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Allocated size in bytes.
    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    /// Drop all staged bytes.
    pub fn clear(&mut self) {
        self.data.clear();
        self.read_pos = 0;
    }
}
