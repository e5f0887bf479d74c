//! # Output Sink
//!
//! The PCM consumer a playback engine connects to a [`Decoder`]. The decode
//! core never calls a sink itself; [`pump`] is the reference loop that moves
//! PCM from one to the other.

use crate::error::{PlaybackError, Result};
use crate::session::Decoder;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

/// PCM layout a sink is configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkFormat {
    pub sample_rate: u32,
    pub channels: u32,
    pub bits_per_sample: u32,
}

impl SinkFormat {
    /// The layout `decoder` produces.
    pub fn of(decoder: &Decoder) -> Self {
        Self {
            sample_rate: decoder.sample_rate(),
            channels: decoder.channels(),
            bits_per_sample: decoder.bits_per_sample(),
        }
    }

    pub fn bytes_per_second(&self) -> u64 {
        let sample_bytes = match self.bits_per_sample {
            24 => 4,
            bits => (bits as u64 + 7) / 8,
        };
        self.sample_rate as u64 * self.channels as u64 * sample_bytes
    }
}

/// Audio output device.
pub trait Sink: Send {
    fn configure(&mut self, format: SinkFormat) -> Result<()>;

    /// Accept interleaved PCM; returns how many bytes were taken.
    fn write(&mut self, pcm: &[u8]) -> Result<usize>;

    fn volume(&self) -> f32;

    /// # Errors
    ///
    /// [`PlaybackError::InvalidVolume`] outside `0.0..=1.0`.
    fn set_volume(&mut self, volume: f32) -> Result<()>;

    fn close(&mut self) -> Result<()>;
}

/// Sink that keeps everything written to it.
#[derive(Debug, Clone)]
pub struct MemorySink {
    format: Option<SinkFormat>,
    data: Vec<u8>,
    volume: f32,
    closed: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self {
            format: None,
            data: Vec::new(),
            volume: 1.0,
            closed: false,
        }
    }

    pub fn format(&self) -> Option<SinkFormat> {
        self.format
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Seconds of audio held, at the configured format.
    pub fn duration(&self) -> f64 {
        match self.format.map(|f| f.bytes_per_second()) {
            Some(rate) if rate > 0 => self.data.len() as f64 / rate as f64,
            _ => 0.0,
        }
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl Sink for MemorySink {
    fn configure(&mut self, format: SinkFormat) -> Result<()> {
        if self.closed {
            return Err(PlaybackError::SinkError("sink is closed".to_string()));
        }
        self.format = Some(format);
        Ok(())
    }

    fn write(&mut self, pcm: &[u8]) -> Result<usize> {
        if self.closed {
            return Err(PlaybackError::SinkError("sink is closed".to_string()));
        }
        if self.format.is_none() {
            return Err(PlaybackError::SinkError("sink is not configured".to_string()));
        }
        self.data.extend_from_slice(pcm);
        Ok(pcm.len())
    }

    fn volume(&self) -> f32 {
        self.volume
    }

    fn set_volume(&mut self, volume: f32) -> Result<()> {
        if !(0.0..=1.0).contains(&volume) {
            return Err(PlaybackError::InvalidVolume(volume));
        }
        self.volume = volume;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

/// Decode `decoder` to the end into `sink`, `chunk` bytes at a time.
///
/// Returns the PCM bytes delivered. A decode failure ends the loop like end
/// of stream does; check [`Decoder::last_error`] afterwards.
///
/// # Errors
///
/// Sink errors, and [`PlaybackError::SinkError`] when the sink stops
/// accepting data.
#[instrument(skip(decoder, sink), fields(backend = decoder.backend_name()))]
pub fn pump(decoder: &mut Decoder, sink: &mut dyn Sink, chunk: usize) -> Result<u64> {
    let format = SinkFormat::of(decoder);
    sink.configure(format)?;
    debug!(?format, "Sink configured");

    let mut buf = vec![0u8; chunk.max(1)];
    let mut total = 0u64;
    loop {
        let n = decoder.decode(&mut buf);
        if n == 0 {
            break;
        }

        let mut offset = 0;
        while offset < n {
            let accepted = sink.write(&buf[offset..n])?;
            if accepted == 0 {
                return Err(PlaybackError::SinkError(format!(
                    "sink stopped accepting data after {} bytes",
                    total + offset as u64
                )));
            }
            offset += accepted;
        }
        total += n as u64;
    }

    if let Some(err) = decoder.last_error() {
        warn!("Decoding ended early: {}", err);
    }
    info!(bytes = total, time = decoder.time(), "Pump finished");
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_volume_range() {
        let mut sink = MemorySink::new();
        assert_eq!(sink.volume(), 1.0);
        sink.set_volume(0.25).unwrap();
        assert_eq!(sink.volume(), 0.25);

        assert!(matches!(
            sink.set_volume(1.5),
            Err(PlaybackError::InvalidVolume(v)) if v == 1.5
        ));
        assert!(sink.set_volume(-0.1).is_err());
        assert_eq!(sink.volume(), 0.25);
    }

    #[test]
    fn test_memory_sink_requires_configure() {
        let mut sink = MemorySink::new();
        assert!(matches!(sink.write(&[1, 2]), Err(PlaybackError::SinkError(_))));

        sink.configure(SinkFormat {
            sample_rate: 44100,
            channels: 2,
            bits_per_sample: 16,
        })
        .unwrap();
        assert_eq!(sink.write(&[0; 44100 * 4]).unwrap(), 44100 * 4);
        assert_eq!(sink.duration(), 1.0);

        sink.close().unwrap();
        assert!(sink.write(&[1]).is_err());
    }

    #[test]
    fn test_bytes_per_second() {
        let format = SinkFormat {
            sample_rate: 48000,
            channels: 2,
            bits_per_sample: 24,
        };
        assert_eq!(format.bytes_per_second(), 48000 * 2 * 4);
    }
}
