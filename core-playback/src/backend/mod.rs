//! # Codec Backends
//!
//! One adapter per codec family, each behind a cargo feature:
//!
//! | Backend     | Feature             | Units            | Seek          |
//! |-------------|---------------------|------------------|---------------|
//! | FLAC        | `decoder-flac`      | frames           | sample exact  |
//! | MPEG audio  | `decoder-mp3`       | frames           | proportional  |
//! | Ogg Vorbis  | `decoder-vorbis`    | pages            | proportional  |
//! | Container   | `decoder-container` | demuxed packets  | accurate      |
//!
//! Header parsing that does not need a codec library (CRCs, MPEG frame
//! headers, format sniffing) is always compiled.

pub mod crc;
pub mod format_detector;
pub mod mpeg;

#[cfg(feature = "decoder-flac")]
pub mod flac;

#[cfg(feature = "decoder-vorbis")]
pub mod vorbis;

#[cfg(feature = "decoder-container")]
pub mod container;

#[cfg(feature = "core-decoder")]
pub(crate) mod sample_converter;

pub use format_detector::{BackendKind, FormatDetector};

#[cfg(feature = "decoder-container")]
pub use container::ContainerBackend;
#[cfg(feature = "decoder-flac")]
pub use flac::FlacBackend;
#[cfg(feature = "decoder-mp3")]
pub use mpeg::MpegBackend;
#[cfg(feature = "decoder-vorbis")]
pub use vorbis::VorbisBackend;

use crate::config::DecoderConfig;
use crate::error::{PlaybackError, Result};
use crate::stream::SharedStream;
use crate::traits::Backend;
use tracing::error;

/// Open the backend for `kind` on `stream`, leaving the stream at its first
/// unit.
///
/// # Errors
///
/// [`PlaybackError::UnsupportedCodec`] when the backend was compiled out,
/// otherwise whatever the backend's constructor reports.
pub fn open_backend(
    kind: BackendKind,
    stream: &mut SharedStream,
    hint: Option<&str>,
    config: &DecoderConfig,
) -> Result<Box<dyn Backend>> {
    let _ = (&stream, hint, config);
    match kind {
        #[cfg(feature = "decoder-flac")]
        BackendKind::Flac => Ok(Box::new(FlacBackend::open(stream)?)),
        #[cfg(feature = "decoder-mp3")]
        BackendKind::Mpeg => Ok(Box::new(MpegBackend::open(stream)?)),
        #[cfg(feature = "decoder-vorbis")]
        BackendKind::Vorbis => Ok(Box::new(VorbisBackend::open(stream)?)),
        #[cfg(feature = "decoder-container")]
        BackendKind::Container => Ok(Box::new(ContainerBackend::open(stream, config, hint)?)),
        #[allow(unreachable_patterns)]
        other => {
            error!(backend = other.name(), "Backend not compiled in");
            Err(PlaybackError::UnsupportedCodec(format!(
                "{} support requires the `{}` feature",
                other.name(),
                other.feature()
            )))
        }
    }
}

/// Channel layout with `count` front channels, as symphonia's codecs expect.
#[cfg(feature = "core-decoder")]
pub(crate) fn channel_layout(count: u32) -> Result<symphonia::core::audio::Channels> {
    use symphonia::core::audio::Channels;

    if count == 0 || count > 8 {
        return Err(PlaybackError::UnsupportedFormat(format!(
            "{} channels",
            count
        )));
    }
    Ok(Channels::from_bits_truncate((1u32 << count) - 1))
}
