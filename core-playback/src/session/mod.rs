//! # Decode Session
//!
//! [`Decoder`] is the object a playback engine holds for one open stream. It
//! owns the input window, the PCM staging area and the position tracker, and
//! drives a [`Backend`] through a pull-based state machine:
//!
//! ```text
//! NeedInput ──unit──▶ HaveHeader ──▶ HaveSamples ──packed──▶ Draining
//!     ▲                                   │ (no frames)          │
//!     └───────────────────────────────────┴──────staging empty───┘
//! NeedInput ──end of stream──▶ Eof        any error ──▶ Fatal
//! ```
//!
//! `Eof` and `Fatal` are sticky: every further `decode` returns 0. A seek
//! leaves `Eof`; nothing leaves `Fatal`.

mod estimator;
mod seek;

use crate::backend::{self, FormatDetector};
use crate::config::DecoderConfig;
use crate::error::{PlaybackError, Result};
use crate::packer;
use crate::refill::{Refill, RefillBuffer};
use crate::staging::StagingBuffer;
use crate::stream::{MediaStream, SharedStream};
use crate::tracker::PositionTracker;
use crate::traits::{Backend, DecodeMode, DecodedUnit, StreamProperties, UnitOutcome};
use core_runtime::logging::strip_path;
use std::fs::File;
use std::io;
use std::mem;
use std::path::Path;
use tracing::{debug, error, info, instrument, trace, warn};

/// Where the decode loop stands between two `decode` calls.
#[derive(Debug)]
enum Phase {
    NeedInput,
    HaveHeader(DecodedUnit),
    HaveSamples(DecodedUnit),
    Draining,
    Eof,
    Fatal,
}

/// A streaming decode session.
///
/// ```no_run
/// use core_playback::Decoder;
///
/// let mut decoder = Decoder::open("album/01.flac")?;
/// let mut pcm = vec![0u8; 4096];
/// loop {
///     let n = decoder.decode(&mut pcm);
///     if n == 0 {
///         break;
///     }
///     // hand pcm[..n] to the output device
/// }
/// decoder.close();
/// # Ok::<(), core_playback::PlaybackError>(())
/// ```
pub struct Decoder {
    backend: Box<dyn Backend>,
    stream: SharedStream,
    window: RefillBuffer,
    staging: StagingBuffer,
    tracker: PositionTracker,
    props: StreamProperties,
    total_duration: Option<f64>,
    phase: Phase,
    config: DecoderConfig,
    failure: Option<PlaybackError>,
    closed: bool,
}

impl Decoder {
    /// Open the file at `path` with the default configuration.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_config(path, DecoderConfig::default())
    }

    /// Open the file at `path`.
    ///
    /// The backend is chosen from the leading bytes of the file, then from its
    /// extension.
    ///
    /// # Errors
    ///
    /// Returns an open error ([`PlaybackError::is_open_error`]) when the file
    /// cannot be read or no backend accepts it, and
    /// [`PlaybackError::UnsupportedFormat`] when the decoded layout cannot be
    /// packed.
    pub fn open_with_config(path: impl AsRef<Path>, config: DecoderConfig) -> Result<Self> {
        let path = path.as_ref();
        let shown = path.display().to_string();
        info!(file = strip_path(&shown), "Opening audio file");

        let file = File::open(path).map_err(|e| {
            error!(file = strip_path(&shown), "Failed to open file: {}", e);
            PlaybackError::OpenFailed(format!("{}: {}", strip_path(&shown), e))
        })?;

        let hint = FormatDetector::hint_from_path(path);
        Self::from_stream(Box::new(file), hint.as_deref(), config)
    }

    /// Open any seekable byte source. `hint` is a file extension used when
    /// the leading bytes are not conclusive.
    #[instrument(skip(stream, config))]
    pub fn from_stream(
        stream: Box<dyn MediaStream>,
        hint: Option<&str>,
        config: DecoderConfig,
    ) -> Result<Self> {
        config.validate().map_err(PlaybackError::Config)?;

        let mut stream = SharedStream::new(stream);
        let kind = FormatDetector::detect(&mut stream, hint).map_err(|e| {
            error!("Failed to read stream header: {}", e);
            PlaybackError::OpenFailed(format!("Failed to read stream header: {}", e))
        })?;
        debug!(?kind, "Selected backend");

        let backend = backend::open_backend(kind, &mut stream, hint, &config)?;
        Self::from_parts(backend, stream, config)
    }

    /// Wrap a backend that was opened on `stream` by the caller.
    ///
    /// `stream` must be positioned at the backend's first unit.
    pub fn with_backend(
        backend: Box<dyn Backend>,
        stream: Box<dyn MediaStream>,
        config: DecoderConfig,
    ) -> Result<Self> {
        config.validate().map_err(PlaybackError::Config)?;
        Self::from_parts(backend, SharedStream::new(stream), config)
    }

    fn from_parts(
        mut backend: Box<dyn Backend>,
        stream: SharedStream,
        config: DecoderConfig,
    ) -> Result<Self> {
        let props = backend.properties();
        let frame_bytes = match Self::check_properties(&props) {
            Ok(frame_bytes) => frame_bytes,
            Err(e) => {
                error!(backend = backend.name(), "Rejecting stream: {}", e);
                backend.close();
                return Err(e);
            }
        };

        let capacity = config
            .window_bytes
            .max(backend.max_unit_size().saturating_mul(2));

        let mut decoder = Self {
            window: RefillBuffer::new(capacity, config.guard_bytes),
            staging: StagingBuffer::with_capacity(config.pump_chunk_bytes.max(frame_bytes)),
            tracker: PositionTracker::new(frame_bytes, props.sample_rate),
            total_duration: props.duration,
            phase: Phase::NeedInput,
            failure: None,
            closed: false,
            backend,
            stream,
            props,
            config,
        };

        if decoder.total_duration.is_none() && decoder.config.estimate_length {
            decoder.total_duration = decoder.estimate_length()?;
        }
        decoder.tracker.set_total(decoder.total_duration);

        info!(
            backend = decoder.backend.name(),
            channels = props.channels,
            sample_rate = props.sample_rate,
            bits_per_sample = props.bits_per_sample,
            length = ?decoder.total_duration,
            "Decoder ready"
        );
        Ok(decoder)
    }

    fn check_properties(props: &StreamProperties) -> Result<usize> {
        if props.sample_rate == 0 {
            return Err(PlaybackError::UnsupportedFormat(
                "sample rate of 0 Hz".to_string(),
            ));
        }
        packer::bytes_per_frame(props.channels, props.bits_per_sample)
    }

    /// Fill `buf` with interleaved little-endian PCM.
    ///
    /// Returns the number of bytes written; 0 means the stream ended or the
    /// session failed (see [`Self::last_error`]). Bytes already returned are
    /// never affected by a later failure.
    pub fn decode(&mut self, buf: &mut [u8]) -> usize {
        if buf.is_empty() {
            return 0;
        }

        loop {
            match mem::replace(&mut self.phase, Phase::NeedInput) {
                Phase::NeedInput => match self.next_unit(DecodeMode::Full) {
                    Ok(Some(unit)) => self.phase = Phase::HaveHeader(unit),
                    Ok(None) => {
                        debug!(position = self.tracker.position(), "End of stream");
                        self.phase = Phase::Eof;
                        return 0;
                    }
                    Err(e) => {
                        self.fail(e);
                        return 0;
                    }
                },
                Phase::HaveHeader(unit) => {
                    self.tracker.record_unit(unit.source_bytes, unit.duration);
                    self.phase = Phase::HaveSamples(unit);
                }
                Phase::HaveSamples(unit) => {
                    let out = self.staging.begin_fill();
                    match packer::pack(
                        &unit.samples,
                        self.props.channels,
                        self.props.bits_per_sample,
                        out,
                    ) {
                        Ok(0) => self.phase = Phase::NeedInput,
                        Ok(packed) => {
                            trace!(frames = unit.samples.frames(), packed, "Staged unit");
                            self.phase = Phase::Draining;
                        }
                        Err(e) => {
                            self.fail(e);
                            return 0;
                        }
                    }
                }
                Phase::Draining => {
                    let written = self.staging.read(buf);
                    self.tracker.record_delivered(written);
                    if !self.staging.is_empty() {
                        self.phase = Phase::Draining;
                    }
                    if written > 0 {
                        return written;
                    }
                }
                Phase::Eof => {
                    self.phase = Phase::Eof;
                    return 0;
                }
                Phase::Fatal => {
                    self.phase = Phase::Fatal;
                    return 0;
                }
            }
        }
    }

    /// Pull the next unit out of the backend, refilling the window and
    /// skipping recoverable errors as needed. `None` is end of stream.
    fn next_unit(&mut self, mode: DecodeMode) -> Result<Option<DecodedUnit>> {
        let mut consecutive_errors = 0u32;

        loop {
            match self.backend.decode_unit(self.window.window(), mode) {
                UnitOutcome::Decoded(unit) => {
                    self.window.consume(unit.consumed);
                    return Ok(Some(unit));
                }
                UnitOutcome::EndOfStream => return Ok(None),
                UnitOutcome::NeedMoreInput => {
                    if self.window.is_eof() {
                        if self.window.carry() > 0 {
                            debug!(
                                trailing = self.window.carry(),
                                "Dropping incomplete unit at end of stream"
                            );
                        }
                        return Ok(None);
                    }
                    if self.window.is_full() {
                        return Err(PlaybackError::FatalParse(format!(
                            "unit larger than the {} byte input window",
                            self.window.capacity()
                        )));
                    }
                    if let Refill::EndOfStream = self.window.refill(&mut self.stream)? {
                        return Ok(None);
                    }
                }
                UnitOutcome::Recoverable { skip, reason } => {
                    consecutive_errors += 1;
                    warn!(
                        "Skipping {} bytes (attempt {}/{}): {}",
                        skip, consecutive_errors, self.config.max_recoverable_errors, reason
                    );

                    if consecutive_errors > self.config.max_recoverable_errors {
                        return Err(PlaybackError::FatalParse(format!(
                            "giving up after {} consecutive errors: {}",
                            consecutive_errors, reason
                        )));
                    }
                    self.window.consume(skip);
                }
                UnitOutcome::Io { kind, message } => {
                    return Err(PlaybackError::Io(io::Error::new(kind, message)))
                }
                UnitOutcome::Fatal(reason) => return Err(PlaybackError::FatalParse(reason)),
            }
        }
    }

    fn fail(&mut self, err: PlaybackError) {
        error!(
            backend = self.backend.name(),
            position = self.tracker.position(),
            "Decoding stopped: {}",
            err
        );
        self.staging.clear();
        self.phase = Phase::Fatal;
        self.failure = Some(err);
    }

    /// Current playback time in seconds: the time of the next byte `decode`
    /// will return.
    pub fn time(&self) -> f64 {
        self.tracker.position()
    }

    pub fn sample_rate(&self) -> u32 {
        self.props.sample_rate
    }

    pub fn channels(&self) -> u32 {
        self.props.channels
    }

    pub fn bits_per_sample(&self) -> u32 {
        self.props.bits_per_sample
    }

    /// Total length in seconds: exact when the stream states it, otherwise
    /// estimated at open time.
    pub fn length(&self) -> Option<f64> {
        self.total_duration
    }

    /// Bitrate of the most recently decoded unit in kbit/s.
    pub fn bitrate_kbps(&self) -> f64 {
        self.tracker.bitrate_kbps()
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// The error that ended the session, if any.
    pub fn last_error(&self) -> Option<&PlaybackError> {
        self.failure.as_ref()
    }

    /// Release the backend. Dropping the decoder does the same.
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.backend.close();
        self.staging.clear();
        self.window.discard();
        debug!(backend = self.backend.name(), "Decoder closed");
    }
}

impl Drop for Decoder {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Decoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decoder")
            .field("backend", &self.backend.name())
            .field("properties", &self.props)
            .field("length", &self.total_duration)
            .field("phase", &self.phase)
            .field("time", &self.time())
            .finish()
    }
}
