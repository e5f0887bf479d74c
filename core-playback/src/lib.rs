//! # Streaming Decode Core
//!
//! One pull-based decode session over four codec backends (FLAC, MPEG audio,
//! Ogg Vorbis and a symphonia container backend with resampling).
//!
//! ## Overview
//!
//! A [`Decoder`] owns:
//! - a refillable input window of compressed bytes ([`refill`])
//! - a staging area for packed PCM ([`staging`])
//! - position bookkeeping ([`tracker`])
//! - one [`Backend`] that frames and decodes units
//!
//! Callers ask for PCM with [`Decoder::decode`] and reposition with
//! [`Decoder::seek`]. Output is interleaved little-endian PCM at 8, 16 or
//! 24 bits per sample (24-bit samples occupy four bytes).
//!
//! ## Features
//!
//! - `decoder-flac`, `decoder-mp3`, `decoder-vorbis`, `decoder-container`
//! - `decoder-all` (default)

pub mod backend;
pub mod config;
pub mod error;
pub mod packer;
pub mod refill;
pub mod session;
pub mod sink;
pub mod staging;
pub mod stream;
pub mod tracker;
pub mod traits;

pub use backend::{BackendKind, FormatDetector};
pub use config::DecoderConfig;
pub use error::{PlaybackError, Result};
pub use session::Decoder;
pub use sink::{pump, MemorySink, Sink, SinkFormat};
pub use stream::{MediaStream, SharedStream};
pub use traits::{
    Backend, DecodeMode, DecodedUnit, InputWindow, RawSamples, SeekTarget, StreamProperties,
    UnitOutcome,
};
