//! # Container Backend
//!
//! Everything the sniffers do not claim (WAV, AIFF, MP4/M4A, Matroska, Ogg
//! streams other than Vorbis) is demuxed and decoded by symphonia. The output
//! is normalised to stereo 16-bit at the configured rate; rubato converts
//! other source rates.
//!
//! This backend reads its own packets through a clone of the session stream,
//! so it never uses the core's input window.

use super::sample_converter::SampleConverter;
use crate::config::DecoderConfig;
use crate::error::{PlaybackError, Result};
use crate::stream::{MediaStream, SharedStream};
use crate::traits::{
    Backend, DecodeMode, DecodedUnit, InputWindow, RawSamples, SeekTarget, StreamProperties,
    UnitOutcome,
};
use rubato::{FftFixedOut, Resampler};
use std::io::{Seek, SeekFrom};
use symphonia::core::codecs::{Decoder as CodecDecoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::{Error as SymphoniaError, SeekErrorKind};
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::{Time, TimeBase};
use tracing::{debug, error, info, instrument, warn};

const OUTPUT_CHANNELS: usize = 2;
const OUTPUT_BITS: u32 = 16;
const RESAMPLER_SUB_CHUNKS: usize = 2;

pub struct ContainerBackend {
    format: Box<dyn FormatReader>,
    codec: Box<dyn CodecDecoder>,
    track_id: u32,
    time_base: Option<TimeBase>,
    source_rate: u32,
    output_rate: u32,
    chunk_frames: usize,
    resampler: Option<FftFixedOut<f32>>,
    /// Source-rate input not yet consumed by the resampler.
    pending: Vec<Vec<f32>>,
    /// Source frames to drop after an accurate seek.
    pending_skip: u64,
    /// Compressed bytes read since the last unit was returned.
    pending_bytes: u64,
    duration: Option<f64>,
    drained: bool,
}

impl ContainerBackend {
    /// Probe the container and prepare the first audio track's codec.
    #[instrument(skip(stream, config))]
    pub fn open(stream: &mut SharedStream, config: &DecoderConfig, hint: Option<&str>) -> Result<Self> {
        stream
            .seek(SeekFrom::Start(0))
            .map_err(|e| PlaybackError::OpenFailed(format!("container stream: {}", e)))?;

        let mut probe_hint = Hint::new();
        if let Some(extension) = hint {
            probe_hint.with_extension(extension);
        }

        let source = MediaSourceStream::new(Box::new(stream.clone()), Default::default());
        let probed = symphonia::default::get_probe()
            .format(
                &probe_hint,
                source,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| {
                error!("Format probe failed: {}", e);
                PlaybackError::UnsupportedContainer(format!("Failed to probe container: {}", e))
            })?;
        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| {
                error!("No audio track in container");
                PlaybackError::NoAudioStream("container has no decodable track".to_string())
            })?;

        let track_id = track.id;
        let params = track.codec_params.clone();
        let source_rate = params.sample_rate.ok_or_else(|| {
            PlaybackError::UnsupportedFormat("container track has no sample rate".to_string())
        })?;
        let duration = params
            .n_frames
            .map(|frames| frames as f64 / source_rate as f64);

        let codec = symphonia::default::get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(|e| {
                error!("Failed to create decoder: {}", e);
                PlaybackError::UnsupportedCodec(format!("container track: {}", e))
            })?;

        let output_rate = config.output_sample_rate;
        let chunk_frames = config.resample_chunk_frames;

        info!(
            track_id,
            source_rate,
            output_rate,
            source_channels = params.channels.map(|c| c.count()),
            duration = ?duration,
            "Opened container stream"
        );

        Ok(Self {
            format,
            codec,
            track_id,
            time_base: params.time_base,
            source_rate,
            output_rate,
            chunk_frames,
            resampler: make_resampler(source_rate, output_rate, chunk_frames),
            pending: vec![Vec::new(); OUTPUT_CHANNELS],
            pending_skip: 0,
            pending_bytes: 0,
            duration,
            drained: false,
        })
    }

    fn ts_to_secs(&self, ts: u64) -> f64 {
        match self.time_base {
            Some(tb) => {
                let time = tb.calc_time(ts);
                time.seconds as f64 + time.frac
            }
            None => ts as f64 / self.source_rate as f64,
        }
    }

    /// Queue decoded source frames for output.
    fn queue(&mut self, mut planes: Vec<Vec<f32>>) {
        if self.pending_skip > 0 {
            let frames = planes.first().map_or(0, Vec::len);
            let skip = (self.pending_skip as usize).min(frames);
            for plane in &mut planes {
                plane.drain(..skip);
            }
            self.pending_skip -= skip as u64;
        }
        for (queued, plane) in self.pending.iter_mut().zip(planes) {
            queued.extend(plane);
        }
    }

    /// Turn queued input into output frames. `flush` pads the final partial
    /// block with silence.
    fn take_output(&mut self, flush: bool) -> std::result::Result<RawSamples, String> {
        let planes = match self.resampler.as_mut() {
            Some(resampler) => {
                let ratio = self.output_rate as f64 / self.source_rate as f64;
                resample(resampler, &mut self.pending, flush, ratio)?
            }
            None => self
                .pending
                .iter_mut()
                .map(std::mem::take)
                .collect(),
        };

        Ok(RawSamples::new(
            planes
                .into_iter()
                .map(|plane| plane.into_iter().map(SampleConverter::f32_to_i16).collect())
                .collect(),
        ))
    }

    fn unit(&mut self, samples: RawSamples) -> UnitOutcome {
        let duration = samples.frames() as f64 / self.output_rate as f64;
        let source_bytes = std::mem::take(&mut self.pending_bytes);
        UnitOutcome::Decoded(DecodedUnit::demuxed(source_bytes, duration, samples))
    }

    fn finish(&mut self) -> UnitOutcome {
        if self.drained {
            return UnitOutcome::EndOfStream;
        }
        self.drained = true;
        match self.take_output(true) {
            Ok(samples) if !samples.is_empty() => {
                debug!(frames = samples.frames(), "Flushed resampler");
                self.unit(samples)
            }
            Ok(_) => UnitOutcome::EndOfStream,
            Err(e) => UnitOutcome::fatal(format!("resampler: {}", e)),
        }
    }
}

impl Backend for ContainerBackend {
    fn name(&self) -> &'static str {
        "container"
    }

    fn properties(&self) -> StreamProperties {
        StreamProperties::new(OUTPUT_CHANNELS as u32, self.output_rate, OUTPUT_BITS)
            .with_duration(self.duration)
    }

    fn max_unit_size(&self) -> usize {
        0
    }

    fn data_offset(&self) -> u64 {
        0
    }

    fn decode_unit(&mut self, _window: InputWindow<'_>, mode: DecodeMode) -> UnitOutcome {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return match mode {
                        DecodeMode::HeadersOnly => UnitOutcome::EndOfStream,
                        DecodeMode::Full => self.finish(),
                    };
                }
                Err(SymphoniaError::ResetRequired) => {
                    return UnitOutcome::fatal("container track list changed");
                }
                Err(SymphoniaError::IoError(e)) => {
                    error!("Container read failed: {}", e);
                    return UnitOutcome::io(&e);
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    return UnitOutcome::recoverable(0, format!("container demux: {}", e));
                }
                Err(e) => return UnitOutcome::fatal(format!("container demux: {}", e)),
            };

            if packet.track_id() != self.track_id {
                continue;
            }
            self.pending_bytes += packet.buf().len() as u64;

            if mode == DecodeMode::HeadersOnly {
                let duration = self.ts_to_secs(packet.dur());
                let source_bytes = std::mem::take(&mut self.pending_bytes);
                return UnitOutcome::Decoded(DecodedUnit::demuxed(
                    source_bytes,
                    duration,
                    RawSamples::empty(),
                ));
            }

            let planes = match self.codec.decode(&packet) {
                Ok(decoded) => SampleConverter::fit_channels(
                    SampleConverter::to_f32_planes(&decoded),
                    OUTPUT_CHANNELS,
                ),
                Err(SymphoniaError::DecodeError(e)) => {
                    return UnitOutcome::recoverable(0, format!("container packet: {}", e));
                }
                Err(SymphoniaError::IoError(e)) => {
                    error!("Container packet read failed: {}", e);
                    return UnitOutcome::io(&e);
                }
                Err(e) => return UnitOutcome::fatal(format!("container codec: {}", e)),
            };
            self.queue(planes);

            match self.take_output(false) {
                Ok(samples) if samples.is_empty() => continue,
                Ok(samples) => return self.unit(samples),
                Err(e) => return UnitOutcome::fatal(format!("resampler: {}", e)),
            }
        }
    }

    #[instrument(skip(self, _stream), fields(seconds = target.seconds))]
    fn seek(&mut self, _stream: &mut dyn MediaStream, target: SeekTarget) -> Result<()> {
        let seeked = self
            .format
            .seek(
                SeekMode::Accurate,
                SeekTo::Time {
                    time: Time::from(target.seconds),
                    track_id: Some(self.track_id),
                },
            )
            .map_err(|e| match e {
                SymphoniaError::SeekError(SeekErrorKind::OutOfRange) => PlaybackError::OutOfRange {
                    target: target.seconds,
                    length: target.length,
                },
                other => {
                    warn!("Container seek failed: {}", other);
                    PlaybackError::SeekFailed(format!("container seek: {}", other))
                }
            })?;

        let skip_secs = self.ts_to_secs(seeked.required_ts.saturating_sub(seeked.actual_ts));
        self.pending_skip = (skip_secs * self.source_rate as f64).round() as u64;
        self.codec.reset();
        for plane in &mut self.pending {
            plane.clear();
        }
        self.pending_bytes = 0;
        self.resampler = make_resampler(self.source_rate, self.output_rate, self.chunk_frames);
        self.drained = false;

        debug!(
            required_ts = seeked.required_ts,
            actual_ts = seeked.actual_ts,
            skip = self.pending_skip,
            "Container seek resolved"
        );
        Ok(())
    }

    fn close(&mut self) {
        self.codec.reset();
    }
}

fn make_resampler(source_rate: u32, output_rate: u32, chunk_frames: usize) -> Option<FftFixedOut<f32>> {
    (source_rate != output_rate).then(|| {
        FftFixedOut::new(
            source_rate as usize,
            output_rate as usize,
            chunk_frames,
            RESAMPLER_SUB_CHUNKS,
            OUTPUT_CHANNELS,
        )
    })
}

/// Run every full input block queued in `pending` through `resampler`.
fn resample(
    resampler: &mut FftFixedOut<f32>,
    pending: &mut [Vec<f32>],
    flush: bool,
    ratio: f64,
) -> std::result::Result<Vec<Vec<f32>>, String> {
    let mut out = vec![Vec::new(); pending.len()];

    loop {
        let needed = resampler.nbr_frames_needed();
        let queued = pending.first().map_or(0, Vec::len);
        if queued == 0 {
            break;
        }

        let keep = if queued >= needed {
            None
        } else if flush {
            for plane in pending.iter_mut() {
                plane.resize(needed, 0.0);
            }
            Some((queued as f64 * ratio).ceil() as usize)
        } else {
            break;
        };

        let block: Vec<&[f32]> = pending.iter().map(|plane| &plane[..needed]).collect();
        let resampled = resampler.process(&block).map_err(|e| e.to_string())?;
        for plane in pending.iter_mut() {
            plane.drain(..needed);
        }

        for (out_plane, mut plane) in out.iter_mut().zip(resampled) {
            if let Some(keep) = keep {
                plane.truncate(keep);
            }
            out_plane.extend(plane);
        }
        if keep.is_some() {
            break;
        }
    }

    Ok(out)
}
