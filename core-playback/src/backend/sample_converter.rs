//! # Sample Conversion
//!
//! Turns symphonia's decoded buffers into the planar layouts the rest of the
//! crate works with: right-aligned integers at a fixed bit depth for the
//! packer, or `f32` planes for the resampler.

use crate::traits::RawSamples;
use symphonia::core::audio::{AudioBuffer, AudioBufferRef, Signal};
use symphonia::core::conv::IntoSample;
use symphonia::core::sample::Sample;

pub struct SampleConverter;

impl SampleConverter {
    /// Convert any buffer to planar integers holding `bits_per_sample`
    /// significant bits (1..=32).
    ///
    /// Each sample is first scaled to full-scale `i32`, then shifted right,
    /// so a 16-bit source read at 16 bits is returned unchanged.
    pub fn to_raw_samples(buffer: &AudioBufferRef<'_>, bits_per_sample: u32) -> RawSamples {
        let shift = 32 - bits_per_sample.clamp(1, 32);
        let planes = match buffer {
            AudioBufferRef::U8(buf) => Self::int_planes(&**buf, shift),
            AudioBufferRef::U16(buf) => Self::int_planes(&**buf, shift),
            AudioBufferRef::U24(buf) => Self::int_planes(&**buf, shift),
            AudioBufferRef::U32(buf) => Self::int_planes(&**buf, shift),
            AudioBufferRef::S8(buf) => Self::int_planes(&**buf, shift),
            AudioBufferRef::S16(buf) => Self::int_planes(&**buf, shift),
            AudioBufferRef::S24(buf) => Self::int_planes(&**buf, shift),
            AudioBufferRef::S32(buf) => Self::int_planes(&**buf, shift),
            AudioBufferRef::F32(buf) => Self::int_planes(&**buf, shift),
            AudioBufferRef::F64(buf) => Self::int_planes(&**buf, shift),
        };
        RawSamples::new(planes)
    }

    /// Convert any buffer to `f32` planes in `[-1.0, 1.0]`.
    pub fn to_f32_planes(buffer: &AudioBufferRef<'_>) -> Vec<Vec<f32>> {
        match buffer {
            AudioBufferRef::U8(buf) => Self::float_planes(&**buf),
            AudioBufferRef::U16(buf) => Self::float_planes(&**buf),
            AudioBufferRef::U24(buf) => Self::float_planes(&**buf),
            AudioBufferRef::U32(buf) => Self::float_planes(&**buf),
            AudioBufferRef::S8(buf) => Self::float_planes(&**buf),
            AudioBufferRef::S16(buf) => Self::float_planes(&**buf),
            AudioBufferRef::S24(buf) => Self::float_planes(&**buf),
            AudioBufferRef::S32(buf) => Self::float_planes(&**buf),
            AudioBufferRef::F32(buf) => Self::float_planes(&**buf),
            AudioBufferRef::F64(buf) => Self::float_planes(&**buf),
        }
    }

    fn int_planes<S>(buf: &AudioBuffer<S>, shift: u32) -> Vec<Vec<i32>>
    where
        S: Sample + IntoSample<i32>,
    {
        (0..buf.spec().channels.count())
            .map(|ch| {
                buf.chan(ch)
                    .iter()
                    .map(|&sample| IntoSample::<i32>::into_sample(sample) >> shift)
                    .collect()
            })
            .collect()
    }

    fn float_planes<S>(buf: &AudioBuffer<S>) -> Vec<Vec<f32>>
    where
        S: Sample + IntoSample<f32>,
    {
        (0..buf.spec().channels.count())
            .map(|ch| {
                buf.chan(ch)
                    .iter()
                    .map(|&sample| IntoSample::<f32>::into_sample(sample))
                    .collect()
            })
            .collect()
    }

    /// Remap `planes` to `channels` planes: mono is duplicated, wider layouts
    /// keep their leading (front) channels.
    pub fn fit_channels(mut planes: Vec<Vec<f32>>, channels: usize) -> Vec<Vec<f32>> {
        if planes.len() == channels {
            return planes;
        }
        let frames = planes.first().map(Vec::len).unwrap_or(0);
        if planes.is_empty() {
            return vec![vec![0.0; frames]; channels];
        }
        if planes.len() > channels {
            planes.truncate(channels);
            return planes;
        }
        let last = planes.len() - 1;
        while planes.len() < channels {
            let copy = planes[last].clone();
            planes.push(copy);
        }
        planes
    }

    /// Float sample to a 16-bit value with clipping.
    pub fn f32_to_i16(sample: f32) -> i32 {
        (sample.clamp(-1.0, 1.0) * 32767.0).round() as i32
    }
}
