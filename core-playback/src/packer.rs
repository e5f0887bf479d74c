//! # Sample Packer
//!
//! Turns planar, right-aligned native samples into interleaved little-endian
//! PCM bytes. The layout depends only on the bit depth:
//!
//! | Depth | Bytes per sample | Layout |
//! |-------|------------------|--------|
//! | 8     | 1 | signed byte |
//! | 16    | 2 | `i16` LE |
//! | 24    | 4 | low three bytes LE, high byte zero |

use crate::error::{PlaybackError, Result};
use crate::traits::RawSamples;

/// Storage size of one sample at `bits_per_sample`.
///
/// # Errors
///
/// [`PlaybackError::UnsupportedFormat`] for depths other than 8, 16 and 24.
pub fn bytes_per_sample(bits_per_sample: u32) -> Result<usize> {
    match bits_per_sample {
        8 => Ok(1),
        16 => Ok(2),
        24 => Ok(4),
        other => Err(PlaybackError::UnsupportedFormat(format!(
            "{}-bit samples",
            other
        ))),
    }
}

/// Bytes of one interleaved frame.
pub fn bytes_per_frame(channels: u32, bits_per_sample: u32) -> Result<usize> {
    if channels == 0 {
        return Err(PlaybackError::UnsupportedFormat(
            "stream without channels".to_string(),
        ));
    }
    Ok(bytes_per_sample(bits_per_sample)? * channels as usize)
}

/// Append `samples` to `out` as interleaved little-endian PCM.
///
/// Returns the number of bytes written.
pub fn pack(
    samples: &RawSamples,
    channels: u32,
    bits_per_sample: u32,
    out: &mut Vec<u8>,
) -> Result<usize> {
    let frame_bytes = bytes_per_frame(channels, bits_per_sample)?;
    if samples.channels() != channels as usize {
        return Err(PlaybackError::UnsupportedFormat(format!(
            "unit has {} channels, stream has {}",
            samples.channels(),
            channels
        )));
    }

    let frames = samples.frames();
    let planes = samples.planes();
    let written = frames * frame_bytes;
    out.reserve(written);

    for frame in 0..frames {
        for plane in planes {
            let sample = plane[frame];
            match bits_per_sample {
                8 => out.push(sample as i8 as u8),
                16 => out.extend_from_slice(&(sample as i16).to_le_bytes()),
                _ => out.extend_from_slice(&((sample as u32) & 0x00FF_FFFF).to_le_bytes()),
            }
        }
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_16_bit_is_little_endian() {
        let samples = RawSamples::new(vec![vec![0x1234, -2], vec![0x0102, i16::MIN as i32]]);
        let mut out = Vec::new();

        let written = pack(&samples, 2, 16, &mut out).unwrap();

        assert_eq!(written, 8);
        assert_eq!(out, vec![0x34, 0x12, 0x02, 0x01, 0xFE, 0xFF, 0x00, 0x80]);
    }

    #[test]
    fn test_pack_8_bit() {
        let samples = RawSamples::new(vec![vec![1, -1, 127, -128]]);
        let mut out = Vec::new();

        assert_eq!(pack(&samples, 1, 8, &mut out).unwrap(), 4);
        assert_eq!(out, vec![0x01, 0xFF, 0x7F, 0x80]);
    }

    #[test]
    fn test_pack_24_bit_into_four_bytes_high_byte_zero() {
        let samples = RawSamples::new(vec![vec![0x123456, -1], vec![-0x800000, 1]]);
        let mut out = Vec::new();

        assert_eq!(pack(&samples, 2, 24, &mut out).unwrap(), 16);
        assert_eq!(
            out,
            vec![
                0x56, 0x34, 0x12, 0x00, // ch0 frame0
                0x00, 0x00, 0x80, 0x00, // ch1 frame0
                0xFF, 0xFF, 0xFF, 0x00, // ch0 frame1
                0x01, 0x00, 0x00, 0x00, // ch1 frame1
            ]
        );
    }

    #[test]
    fn test_pack_appends() {
        let samples = RawSamples::new(vec![vec![1]]);
        let mut out = vec![0xEE];
        pack(&samples, 1, 16, &mut out).unwrap();
        assert_eq!(out, vec![0xEE, 0x01, 0x00]);
    }

    #[test]
    fn test_unsupported_depth() {
        let samples = RawSamples::new(vec![vec![0; 4]]);
        let mut out = Vec::new();

        for bits in [0, 12, 20, 32] {
            let err = pack(&samples, 1, bits, &mut out).unwrap_err();
            assert!(matches!(err, PlaybackError::UnsupportedFormat(_)));
        }
        assert!(out.is_empty());
    }

    #[test]
    fn test_channel_mismatch_rejected() {
        let samples = RawSamples::new(vec![vec![0; 4]]);
        let mut out = Vec::new();
        assert!(matches!(
            pack(&samples, 2, 16, &mut out),
            Err(PlaybackError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            bytes_per_frame(0, 16),
            Err(PlaybackError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_sizes() {
        assert_eq!(bytes_per_sample(8).unwrap(), 1);
        assert_eq!(bytes_per_sample(16).unwrap(), 2);
        assert_eq!(bytes_per_sample(24).unwrap(), 4);
        assert_eq!(bytes_per_frame(6, 24).unwrap(), 24);
    }
}
