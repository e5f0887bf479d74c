//! Workspace facade crate.
//!
//! Re-exports the decode core and the runtime helpers so a host application
//! can depend on `tonearm-workspace` alone and pick backends through the
//! `decoder-*` features.

pub use core_playback as playback;
pub use core_runtime as runtime;

pub use core_playback::{Decoder, DecoderConfig, MemorySink, PlaybackError, Sink};
