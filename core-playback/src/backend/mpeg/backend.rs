use super::header::{self, FrameHeader, Layer};
use super::super::sample_converter::SampleConverter;
use crate::error::{PlaybackError, Result};
use crate::stream::{read_full, MediaStream};
use crate::traits::{
    Backend, DecodeMode, DecodedUnit, InputWindow, RawSamples, SeekTarget, StreamProperties,
    UnitOutcome,
};
use std::borrow::Cow;
use std::io::SeekFrom;
use symphonia::core::codecs::{
    CodecParameters, Decoder as CodecDecoder, DecoderOptions, CODEC_TYPE_MP1, CODEC_TYPE_MP2,
    CODEC_TYPE_MP3,
};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::Packet;
use tracing::{debug, error, info, instrument};

/// Bytes searched for the first frame after any ID3v2 tag.
const PROBE_BYTES: usize = 64 * 1024;
/// Largest MPEG audio frame (layer I, 448 kbps, 32 kHz, padded).
const MAX_FRAME_LEN: usize = 2881;
const ID3V1_LEN: u64 = 128;
const OUTPUT_BITS: u32 = 16;

pub struct MpegBackend {
    first: FrameHeader,
    data_offset: u64,
    payload_end: u64,
    duration: Option<f64>,
    codec: Box<dyn CodecDecoder>,
    next_ts: u64,
    /// A frame was decoded since the last jump; headers are trusted without
    /// looking at the following frame.
    synced: bool,
}

impl MpegBackend {
    /// Skip an ID3v2 tag, find the first frame confirmed by the frame after
    /// it, and read a VBR tag if present. The stream is left at the first
    /// audio frame.
    #[instrument(skip(stream))]
    pub fn open(stream: &mut dyn MediaStream) -> Result<Self> {
        let io_err = |e: std::io::Error| PlaybackError::OpenFailed(format!("MPEG stream: {}", e));

        let stream_len = stream.total_len().map_err(io_err)?;
        let mut head = [0u8; 10];
        stream.seek(SeekFrom::Start(0)).map_err(io_err)?;
        let head_len = read_full(stream, &mut head).map_err(io_err)?;
        let tag_len = header::id3v2_len(&head[..head_len]).unwrap_or(0) as u64;
        if tag_len > 0 {
            debug!(tag_len, "Skipping ID3v2 tag");
        }

        let mut probe = vec![0u8; PROBE_BYTES];
        stream.seek(SeekFrom::Start(tag_len)).map_err(io_err)?;
        let probe_len = read_full(stream, &mut probe).map_err(io_err)?;
        let probe = &probe[..probe_len];
        let probe_eof = tag_len + probe_len as u64 >= stream_len;

        let (pos, first) = find_first_frame(probe, probe_eof).ok_or_else(|| {
            error!("No MPEG audio frame found");
            PlaybackError::UnsupportedContainer("no MPEG audio frame found".to_string())
        })?;

        let mut data_offset = tag_len + pos as u64;
        let mut duration = None;
        let first_frame = &probe[pos..(pos + first.frame_len).min(probe.len())];
        if let Some(vbr) = header::parse_vbr_info(first_frame, &first) {
            duration = vbr.duration(&first);
            // The tag frame carries no audio.
            data_offset += first.frame_len as u64;
            debug!(frames = ?vbr.frames, bytes = ?vbr.bytes, "Found VBR tag");
        }

        let mut payload_end = stream_len;
        if stream_len >= data_offset + ID3V1_LEN {
            let mut tail = [0u8; 3];
            stream
                .seek(SeekFrom::Start(stream_len - ID3V1_LEN))
                .map_err(io_err)?;
            if read_full(stream, &mut tail).map_err(io_err)? == 3 && &tail == b"TAG" {
                payload_end = stream_len - ID3V1_LEN;
            }
        }

        let codec_type = match first.layer {
            Layer::I => CODEC_TYPE_MP1,
            Layer::II => CODEC_TYPE_MP2,
            Layer::III => CODEC_TYPE_MP3,
        };
        let mut params = CodecParameters::new();
        params
            .for_codec(codec_type)
            .with_sample_rate(first.sample_rate)
            .with_channels(super::super::channel_layout(first.channels())?);
        let codec = symphonia::default::get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(|e| {
                error!("Failed to create MPEG audio codec: {}", e);
                PlaybackError::UnsupportedCodec(format!("MPEG audio: {}", e))
            })?;

        stream.seek(SeekFrom::Start(data_offset)).map_err(io_err)?;

        info!(
            version = ?first.version,
            layer = ?first.layer,
            sample_rate = first.sample_rate,
            channels = first.channels(),
            bitrate_kbps = first.bitrate_kbps,
            duration = ?duration,
            "Opened MPEG audio stream"
        );

        Ok(Self {
            first,
            data_offset,
            payload_end,
            duration,
            codec,
            next_ts: 0,
            synced: true,
        })
    }

    fn decode_frame(&mut self, frame: &[u8], header: &FrameHeader, consumed: usize) -> UnitOutcome {
        let spf = header.samples_per_frame() as u64;
        let packet = Packet::new_from_slice(0, self.next_ts, spf, frame);
        self.next_ts += spf;

        match self.codec.decode(&packet) {
            Ok(decoded) => {
                let samples = SampleConverter::to_raw_samples(&decoded, OUTPUT_BITS);
                let duration = samples.frames() as f64 / header.sample_rate as f64;
                UnitOutcome::Decoded(DecodedUnit::windowed(consumed, duration, samples))
            }
            Err(SymphoniaError::DecodeError(e)) => {
                self.synced = false;
                UnitOutcome::recoverable(consumed, format!("MPEG frame: {}", e))
            }
            Err(SymphoniaError::IoError(e)) => {
                self.synced = false;
                UnitOutcome::recoverable(consumed, format!("MPEG frame: {}", e))
            }
            Err(e) => UnitOutcome::fatal(format!("MPEG audio codec: {}", e)),
        }
    }

    fn resync(&mut self, data: &[u8], reason: &str) -> UnitOutcome {
        self.synced = false;
        UnitOutcome::recoverable(next_sync(data, 1), reason)
    }
}

impl Backend for MpegBackend {
    fn name(&self) -> &'static str {
        "mpeg"
    }

    fn properties(&self) -> StreamProperties {
        StreamProperties::new(self.first.channels(), self.first.sample_rate, OUTPUT_BITS)
            .with_duration(self.duration)
    }

    fn max_unit_size(&self) -> usize {
        MAX_FRAME_LEN + FrameHeader::SIZE
    }

    fn data_offset(&self) -> u64 {
        self.data_offset
    }

    fn decode_unit(&mut self, window: InputWindow<'_>, mode: DecodeMode) -> UnitOutcome {
        let data = window.data();
        if data.len() < FrameHeader::SIZE {
            return UnitOutcome::NeedMoreInput;
        }

        let header = match FrameHeader::parse(data) {
            Some(header) if header.same_stream(&self.first) => header,
            _ => return self.resync(data, "lost MPEG frame sync"),
        };
        let frame_len = header.frame_len;

        if data.len() < frame_len && !window.is_eof() {
            return UnitOutcome::NeedMoreInput;
        }

        if !self.synced && data.len() >= frame_len + FrameHeader::SIZE {
            match FrameHeader::parse(&data[frame_len..]) {
                Some(next) if next.same_stream(&self.first) => {}
                _ => return self.resync(data, "unconfirmed MPEG frame header"),
            }
        } else if !self.synced && !window.is_eof() {
            return UnitOutcome::NeedMoreInput;
        }

        // A truncated last frame is decoded with the zero guard, then zeros.
        let consumed = frame_len.min(data.len());
        let frame: Cow<'_, [u8]> = if data.len() >= frame_len {
            Cow::Borrowed(&data[..frame_len])
        } else {
            let mut padded = window.padded().to_vec();
            padded.resize(frame_len, 0);
            Cow::Owned(padded)
        };

        self.synced = true;
        match mode {
            DecodeMode::HeadersOnly => UnitOutcome::Decoded(DecodedUnit::windowed(
                consumed,
                header.duration(),
                RawSamples::empty(),
            )),
            DecodeMode::Full => self.decode_frame(&frame, &header, consumed),
        }
    }

    #[instrument(skip(self, stream), fields(seconds = target.seconds))]
    fn seek(&mut self, stream: &mut dyn MediaStream, target: SeekTarget) -> Result<()> {
        let offset = if target.seconds <= 0.0 {
            self.data_offset
        } else {
            match target.proportional_offset(self.data_offset, self.payload_end) {
                Some(offset) => offset,
                None => {
                    // Unknown length: assume the first frame's bitrate holds.
                    let bytes_per_sec = self.first.bitrate_kbps as f64 * 1000.0 / 8.0;
                    self.data_offset + (target.seconds * bytes_per_sec) as u64
                }
            }
        };

        if offset > self.payload_end {
            return Err(PlaybackError::OutOfRange {
                target: target.seconds,
                length: target.length,
            });
        }

        stream.seek(SeekFrom::Start(offset))?;
        self.codec.reset();
        self.next_ts = target.frame;
        self.synced = target.seconds <= 0.0;
        debug!(offset, "MPEG seek resolved");
        Ok(())
    }

    fn close(&mut self) {
        self.codec.reset();
    }
}

/// First header in `probe` whose successor (at `frame_len`) is a header of
/// the same stream; at end of file a single frame is accepted.
fn find_first_frame(probe: &[u8], eof: bool) -> Option<(usize, FrameHeader)> {
    let mut pos = next_sync(probe, 0);
    while pos + FrameHeader::SIZE <= probe.len() {
        if let Some(first) = FrameHeader::parse(&probe[pos..]) {
            let next = pos + first.frame_len;
            let confirmed = match probe.get(next..) {
                Some(rest) if rest.len() >= FrameHeader::SIZE => FrameHeader::parse(rest)
                    .map_or(false, |h| h.same_stream(&first)),
                _ => eof,
            };
            if confirmed {
                return Some((pos, first));
            }
        }
        pos = next_sync(probe, pos + 1);
    }
    None
}

/// Next possible MPEG sync (11 set bits) at or after `from`.
fn next_sync(data: &[u8], from: usize) -> usize {
    let mut i = from;
    while i + 1 < data.len() {
        if data[i] == 0xFF && data[i + 1] & 0xE0 == 0xE0 {
            return i;
        }
        i += 1;
    }
    if data.last() == Some(&0xFF) && data.len() > from {
        data.len() - 1
    } else {
        data.len().max(from)
    }
}
