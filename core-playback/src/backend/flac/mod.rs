//! # FLAC Backend
//!
//! Frames are located in the input window by this module (sync code, header
//! CRC-8, trailing CRC-16) and handed one at a time to symphonia's FLAC codec.
//!
//! Seeking is sample exact: a SEEKTABLE point (or the whole payload) brackets
//! the target, the bracket is bisected by scanning for frame headers, and the
//! samples between the frame start and the target are dropped after decoding.

pub mod frame;
pub mod metadata;

use self::frame::{FrameEnd, HeaderParse};
use self::metadata::{SeekTable, StreamInfo};
use super::sample_converter::SampleConverter;
use crate::error::{PlaybackError, Result};
use crate::stream::{read_full, MediaStream};
use crate::traits::{
    Backend, DecodeMode, DecodedUnit, InputWindow, RawSamples, SeekTarget, StreamProperties,
    UnitOutcome,
};
use std::io::SeekFrom;
use symphonia::core::codecs::{CodecParameters, Decoder as CodecDecoder, DecoderOptions, CODEC_TYPE_FLAC};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::Packet;
use tracing::{debug, error, info, instrument, trace};

pub struct FlacBackend {
    info: StreamInfo,
    seek_table: Option<SeekTable>,
    data_offset: u64,
    stream_len: u64,
    codec: Box<dyn CodecDecoder>,
    output_bits: u32,
    /// Leading samples still to drop after a seek.
    pending_skip: u64,
}

impl FlacBackend {
    /// Read the metadata section and prepare the codec. The stream is left at
    /// the first frame.
    #[instrument(skip(stream))]
    pub fn open(stream: &mut dyn MediaStream) -> Result<Self> {
        let metadata = metadata::read_metadata(stream)?;
        let info = metadata.stream_info;

        let output_bits = match info.bits_per_sample {
            1..=8 => 8,
            9..=16 => 16,
            17..=24 => 24,
            other => {
                error!("Unsupported FLAC bit depth: {}", other);
                return Err(PlaybackError::UnsupportedFormat(format!(
                    "{}-bit FLAC",
                    other
                )));
            }
        };

        let channels = super::channel_layout(info.channels)?;
        let mut params = CodecParameters::new();
        params
            .for_codec(CODEC_TYPE_FLAC)
            .with_sample_rate(info.sample_rate)
            .with_bits_per_sample(info.bits_per_sample)
            .with_channels(channels)
            .with_max_frames_per_packet(info.max_block as u64)
            .with_extra_data(info.raw.to_vec().into_boxed_slice());
        if let Some(duration) = info.duration() {
            debug!(duration, "FLAC length from STREAMINFO");
            params.with_n_frames(info.total_samples);
        }

        let codec = symphonia::default::get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(|e| {
                error!("Failed to create FLAC codec: {}", e);
                PlaybackError::UnsupportedCodec(format!("FLAC: {}", e))
            })?;

        let stream_len = stream
            .total_len()
            .map_err(|e| PlaybackError::OpenFailed(format!("FLAC stream size: {}", e)))?;

        info!(
            sample_rate = info.sample_rate,
            channels = info.channels,
            bits_per_sample = info.bits_per_sample,
            seek_points = metadata.seek_table.as_ref().map_or(0, SeekTable::len),
            "Opened FLAC stream"
        );

        Ok(Self {
            info,
            seek_table: metadata.seek_table,
            data_offset: metadata.data_offset,
            stream_len,
            codec,
            output_bits,
            pending_skip: 0,
        })
    }

    fn unit_duration(&self, frames: usize) -> f64 {
        frames as f64 / self.info.sample_rate as f64
    }

    fn decode_frame(&mut self, bytes: &[u8], first_sample: u64, block_size: u32) -> UnitOutcome {
        let packet = Packet::new_from_slice(0, first_sample, block_size as u64, bytes);
        let mut samples = match self.codec.decode(&packet) {
            Ok(decoded) => SampleConverter::to_raw_samples(&decoded, self.output_bits),
            Err(SymphoniaError::DecodeError(e)) => {
                return UnitOutcome::recoverable(bytes.len(), format!("FLAC frame: {}", e))
            }
            Err(SymphoniaError::IoError(e)) => {
                return UnitOutcome::recoverable(bytes.len(), format!("FLAC frame: {}", e))
            }
            Err(e) => return UnitOutcome::fatal(format!("FLAC codec: {}", e)),
        };

        if self.pending_skip > 0 {
            let skipped = samples.skip_frames(self.pending_skip as usize);
            self.pending_skip -= skipped as u64;
            trace!(skipped, "Dropped leading samples after seek");
        }

        let duration = self.unit_duration(samples.frames());
        UnitOutcome::Decoded(DecodedUnit::windowed(bytes.len(), duration, samples))
    }

    /// First frame starting at or after `from` and before `limit`, as
    /// `(offset, first_sample)`.
    fn frame_at_or_after(
        &self,
        stream: &mut dyn MediaStream,
        from: u64,
        limit: u64,
    ) -> Result<Option<(u64, u64)>> {
        let scan = (self.info.frame_size_bound() * 2).min(limit.saturating_sub(from) as usize);
        if scan == 0 {
            return Ok(None);
        }
        let mut buf = vec![0u8; scan];
        stream.seek(SeekFrom::Start(from))?;
        let len = read_full(stream, &mut buf)?;
        let buf = &buf[..len];

        let mut pos = frame::next_sync(buf, 0);
        while pos < buf.len() {
            if let HeaderParse::Parsed(header) = frame::parse_header(&buf[pos..]) {
                if header.matches(&self.info) {
                    return Ok(Some((from + pos as u64, header.first_sample(&self.info))));
                }
            }
            pos = frame::next_sync(buf, pos + 1);
        }
        Ok(None)
    }
}

impl Backend for FlacBackend {
    fn name(&self) -> &'static str {
        "flac"
    }

    fn properties(&self) -> StreamProperties {
        StreamProperties::new(self.info.channels, self.info.sample_rate, self.output_bits)
            .with_duration(self.info.duration())
    }

    fn max_unit_size(&self) -> usize {
        self.info.frame_size_bound()
    }

    fn data_offset(&self) -> u64 {
        self.data_offset
    }

    fn decode_unit(&mut self, window: InputWindow<'_>, mode: DecodeMode) -> UnitOutcome {
        let data = window.data();

        let header = match frame::parse_header(data) {
            HeaderParse::Parsed(header) if header.matches(&self.info) => header,
            HeaderParse::Incomplete => return UnitOutcome::NeedMoreInput,
            _ => {
                let skip = frame::next_sync(data, 1);
                return UnitOutcome::recoverable(skip, "lost FLAC frame sync");
            }
        };

        let len = match frame::find_frame_end(data, header.header_len, window.is_eof(), &self.info)
        {
            FrameEnd::At(len) => len,
            FrameEnd::NeedMore => return UnitOutcome::NeedMoreInput,
            FrameEnd::Corrupt => {
                let skip = frame::next_sync(data, 1);
                return UnitOutcome::recoverable(skip, "FLAC frame CRC mismatch");
            }
        };

        match mode {
            DecodeMode::HeadersOnly => UnitOutcome::Decoded(DecodedUnit::windowed(
                len,
                self.unit_duration(header.block_size as usize),
                RawSamples::empty(),
            )),
            DecodeMode::Full => {
                let first_sample = header.first_sample(&self.info);
                self.decode_frame(&data[..len], first_sample, header.block_size)
            }
        }
    }

    #[instrument(skip(self, stream), fields(frame = target.frame))]
    fn seek(&mut self, stream: &mut dyn MediaStream, target: SeekTarget) -> Result<()> {
        let sample = target.frame;
        let total = self.info.total_samples;

        if total > 0 && sample >= total {
            stream.seek(SeekFrom::Start(self.stream_len))?;
            self.pending_skip = 0;
            self.codec.reset();
            return Ok(());
        }

        let mut lo = (self.data_offset, 0u64);
        let mut hi = self.stream_len;
        if let Some(table) = &self.seek_table {
            let (before, after) = table.bracket(sample);
            if let Some(point) = before {
                lo = (self.data_offset + point.offset, point.sample);
            }
            if let Some(point) = after {
                hi = (self.data_offset + point.offset).min(self.stream_len);
            }
        }

        let bound = self.info.frame_size_bound() as u64;
        while hi > lo.0 + bound && sample - lo.1 >= self.info.max_block as u64 {
            let mid = lo.0 + (hi - lo.0) / 2;
            match self.frame_at_or_after(stream, mid, hi)? {
                Some((offset, first)) if first <= sample => lo = (offset, first),
                _ => hi = mid,
            }
        }

        stream.seek(SeekFrom::Start(lo.0))?;
        self.pending_skip = sample - lo.1;
        self.codec.reset();
        debug!(offset = lo.0, skip = self.pending_skip, "FLAC seek resolved");
        Ok(())
    }

    fn close(&mut self) {
        self.codec.reset();
    }
}
