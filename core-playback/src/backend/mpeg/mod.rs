//! # MPEG Audio Backend
//!
//! MPEG-1/2/2.5 layer I-III frames are delimited here from their headers and
//! decoded one at a time by symphonia's MPEG audio codec. Length comes from
//! a Xing/Info or VBRI tag when the encoder wrote one; otherwise the session
//! estimates it by scanning headers. Seeking is proportional over the
//! payload, followed by frame resynchronisation.

pub mod header;

#[cfg(feature = "decoder-mp3")]
mod backend;

#[cfg(feature = "decoder-mp3")]
pub use backend::MpegBackend;
