//! # Backend Capability
//!
//! The contract every codec adapter implements. The decode core owns the
//! input window, the staging area and the position bookkeeping; a backend only
//! frames and decodes units and knows how to reposition its stream.
//!
//! ## Unit lifecycle
//!
//! ```text
//! core: window ──decode_unit()──▶ backend
//!                                  ├─ Decoded(unit)      → core consumes unit.consumed bytes
//!                                  ├─ NeedMoreInput      → core refills the window, retries
//!                                  ├─ Recoverable{skip}  → core drops `skip` bytes, retries
//!                                  ├─ EndOfStream        → backend has nothing left
//!                                  ├─ Io                 → backend's own read failed, session over
//!                                  └─ Fatal              → session over
//! ```

use crate::error::Result;
use crate::stream::MediaStream;
use std::io;

/// Stream properties established when a backend opens its stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamProperties {
    /// Number of interleaved channels in the decoded output.
    pub channels: u32,
    /// Output sample rate in Hz.
    pub sample_rate: u32,
    /// Output bit depth; the packer accepts 8, 16 and 24.
    pub bits_per_sample: u32,
    /// Exact duration in seconds, when the container states it.
    pub duration: Option<f64>,
}

impl StreamProperties {
    pub fn new(channels: u32, sample_rate: u32, bits_per_sample: u32) -> Self {
        Self {
            channels,
            sample_rate,
            bits_per_sample,
            duration: None,
        }
    }

    pub fn with_duration(mut self, duration: Option<f64>) -> Self {
        self.duration = duration;
        self
    }
}

/// Compressed bytes visible to a backend for one `decode_unit` call.
#[derive(Debug, Clone, Copy)]
pub struct InputWindow<'a> {
    bytes: &'a [u8],
    data_len: usize,
    eof: bool,
}

impl<'a> InputWindow<'a> {
    /// `bytes` is the data followed by any zeroed guard bytes.
    pub fn new(bytes: &'a [u8], data_len: usize, eof: bool) -> Self {
        Self {
            bytes,
            data_len: data_len.min(bytes.len()),
            eof,
        }
    }

    /// Unconsumed stream bytes.
    pub fn data(&self) -> &'a [u8] {
        &self.bytes[..self.data_len]
    }

    /// Unconsumed stream bytes followed by the zero guard once the stream is
    /// exhausted.
    pub fn padded(&self) -> &'a [u8] {
        self.bytes
    }

    /// `true` once the underlying stream has no more bytes beyond `data()`.
    pub fn is_eof(&self) -> bool {
        self.eof
    }

    pub fn len(&self) -> usize {
        self.data_len
    }

    pub fn is_empty(&self) -> bool {
        self.data_len == 0
    }
}

/// How much work `decode_unit` should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeMode {
    /// Parse and decode samples.
    Full,
    /// Parse the unit header for its length and duration only.
    HeadersOnly,
}

/// Planar samples at the stream's output bit depth, right-aligned in `i32`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawSamples {
    planes: Vec<Vec<i32>>,
    frames: usize,
}

impl RawSamples {
    /// Frame count is the shortest plane.
    pub fn new(planes: Vec<Vec<i32>>) -> Self {
        let frames = planes.iter().map(Vec::len).min().unwrap_or(0);
        Self { planes, frames }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn planes(&self) -> &[Vec<i32>] {
        &self.planes
    }

    pub fn channels(&self) -> usize {
        self.planes.len()
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn is_empty(&self) -> bool {
        self.frames == 0
    }

    /// Drop up to `count` leading frames; returns how many were dropped.
    pub fn skip_frames(&mut self, count: usize) -> usize {
        let count = count.min(self.frames);
        if count > 0 {
            for plane in &mut self.planes {
                plane.drain(..count);
            }
            self.frames -= count;
        }
        count
    }

    /// Keep at most `count` frames.
    pub fn truncate(&mut self, count: usize) {
        if count < self.frames {
            for plane in &mut self.planes {
                plane.truncate(count);
            }
            self.frames = count;
        }
    }
}

/// One decoded unit.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedUnit {
    /// Window bytes the unit occupied.
    pub consumed: usize,
    /// Compressed bytes the unit represents, for bitrate and length estimates.
    pub source_bytes: u64,
    /// Seconds of audio the unit covers.
    pub duration: f64,
    /// Decoded samples; empty in [`DecodeMode::HeadersOnly`].
    pub samples: RawSamples,
}

impl DecodedUnit {
    /// A unit framed out of the core's input window.
    pub fn windowed(consumed: usize, duration: f64, samples: RawSamples) -> Self {
        Self {
            consumed,
            source_bytes: consumed as u64,
            duration,
            samples,
        }
    }

    /// A unit the backend read from its own demuxer; the window is untouched.
    pub fn demuxed(source_bytes: u64, duration: f64, samples: RawSamples) -> Self {
        Self {
            consumed: 0,
            source_bytes,
            duration,
            samples,
        }
    }
}

/// Result of one `decode_unit` call.
#[derive(Debug, Clone, PartialEq)]
pub enum UnitOutcome {
    Decoded(DecodedUnit),
    /// The window ends inside a unit.
    NeedMoreInput,
    /// Skip `skip` window bytes and try again.
    Recoverable { skip: usize, reason: String },
    /// The backend's own input is exhausted.
    EndOfStream,
    /// A read the backend made on its own stream failed. Never retried.
    Io {
        kind: io::ErrorKind,
        message: String,
    },
    Fatal(String),
}

impl UnitOutcome {
    pub fn recoverable(skip: usize, reason: impl Into<String>) -> Self {
        UnitOutcome::Recoverable {
            skip,
            reason: reason.into(),
        }
    }

    pub fn fatal(reason: impl Into<String>) -> Self {
        UnitOutcome::Fatal(reason.into())
    }

    pub fn io(err: &io::Error) -> Self {
        UnitOutcome::Io {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Seek target handed to a backend, already validated by the core.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeekTarget {
    /// Target time in seconds.
    pub seconds: f64,
    /// Target sample frame at the output rate.
    pub frame: u64,
    /// Session length (exact or estimated), for proportional seeking.
    pub length: Option<f64>,
}

impl SeekTarget {
    pub fn new(seconds: f64, sample_rate: u32, length: Option<f64>) -> Self {
        Self {
            seconds,
            frame: (seconds * sample_rate as f64).round() as u64,
            length,
        }
    }

    pub fn start() -> Self {
        Self {
            seconds: 0.0,
            frame: 0,
            length: None,
        }
    }

    /// Proportional byte offset of this target inside `[start, end)`.
    pub fn proportional_offset(&self, start: u64, end: u64) -> Option<u64> {
        let length = self.length.filter(|len| *len > 0.0)?;
        let span = end.saturating_sub(start) as f64;
        let fraction = (self.seconds / length).clamp(0.0, 1.0);
        Some(start + (span * fraction) as u64)
    }
}

/// Codec adapter.
///
/// Constructors (`open`) are backend specific: they receive the stream,
/// parse the headers, and must leave the stream positioned at the first
/// compressed unit.
pub trait Backend: Send {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Properties fixed at open time.
    fn properties(&self) -> StreamProperties;

    /// Largest unit the backend may need in one window, in bytes.
    fn max_unit_size(&self) -> usize;

    /// Byte offset of the first compressed unit.
    fn data_offset(&self) -> u64;

    /// Frame, and in [`DecodeMode::Full`] decode, the unit at the start of
    /// `window`.
    fn decode_unit(&mut self, window: InputWindow<'_>, mode: DecodeMode) -> UnitOutcome;

    /// Reposition so the next unit read from `stream` starts at (or just
    /// before) `target`, and reset codec state.
    ///
    /// # Errors
    ///
    /// On error the backend must not have changed any of its own state.
    fn seek(&mut self, stream: &mut dyn MediaStream, target: SeekTarget) -> Result<()>;

    /// Release codec resources. Called once, from `Decoder::close` or drop.
    fn close(&mut self) {}
}
