//! # Media Streams
//!
//! The byte source behind a decode session. Backends never open files
//! themselves; they are handed a [`MediaStream`] and read or seek it
//! synchronously when the core asks them to.

use bytes::Bytes;
use parking_lot::Mutex;
use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::sync::Arc;

/// A seekable byte source.
pub trait MediaStream: Read + Seek + Send {
    /// Total length in bytes. The read position is left where it was.
    fn total_len(&mut self) -> io::Result<u64> {
        let pos = self.stream_position()?;
        let len = self.seek(SeekFrom::End(0))?;
        if pos != len {
            self.seek(SeekFrom::Start(pos))?;
        }
        Ok(len)
    }
}

impl MediaStream for File {
    fn total_len(&mut self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }
}

impl MediaStream for Cursor<Vec<u8>> {
    fn total_len(&mut self) -> io::Result<u64> {
        Ok(self.get_ref().len() as u64)
    }
}

impl MediaStream for Cursor<Bytes> {
    fn total_len(&mut self) -> io::Result<u64> {
        Ok(self.get_ref().len() as u64)
    }
}

impl MediaStream for Cursor<&'static [u8]> {
    fn total_len(&mut self) -> io::Result<u64> {
        Ok(self.get_ref().len() as u64)
    }
}

impl<S: MediaStream + ?Sized> MediaStream for Box<S> {
    fn total_len(&mut self) -> io::Result<u64> {
        (**self).total_len()
    }
}

/// A cloneable handle to one underlying stream.
///
/// The decode core reads through it to refill its input window, and the
/// container backend hands a clone to its demuxer. The lock is never
/// contended: a session is driven by one thread at a time.
#[derive(Clone)]
pub struct SharedStream {
    inner: Arc<Mutex<Box<dyn MediaStream>>>,
}

impl SharedStream {
    pub fn new(stream: Box<dyn MediaStream>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(stream)),
        }
    }

    /// Read up to `limit` bytes starting at `offset`, then restore the read
    /// position.
    pub fn peek_at(&mut self, offset: u64, limit: usize) -> io::Result<Vec<u8>> {
        let mut stream = self.inner.lock();
        let saved = stream.stream_position()?;
        stream.seek(SeekFrom::Start(offset))?;
        let mut buf = Vec::with_capacity(limit);
        let result = (&mut *stream).take(limit as u64).read_to_end(&mut buf);
        stream.seek(SeekFrom::Start(saved))?;
        result?;
        Ok(buf)
    }
}

impl Read for SharedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.lock().read(buf)
    }
}

impl Seek for SharedStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.lock().seek(pos)
    }
}

impl MediaStream for SharedStream {
    fn total_len(&mut self) -> io::Result<u64> {
        self.inner.lock().total_len()
    }
}

#[cfg(feature = "core-decoder")]
impl symphonia::core::io::MediaSource for SharedStream {
    fn is_seekable(&self) -> bool {
        true
    }

    fn byte_len(&self) -> Option<u64> {
        self.inner.lock().total_len().ok()
    }
}

/// Read until `buf` is full or the stream ends. Returns the bytes read.
pub(crate) fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
