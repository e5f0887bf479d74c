//! # Format Detection
//!
//! Chooses the backend for a stream: magic bytes first, then the file
//! extension, then the container backend as the catch-all.

use super::mpeg::header::FrameHeader;
use crate::stream::SharedStream;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use tracing::debug;

/// The four backend families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Flac,
    Mpeg,
    Vorbis,
    Container,
}

impl BackendKind {
    /// Map a file extension (case-insensitive, without the dot).
    pub fn from_extension(extension: &str) -> Self {
        match extension.to_ascii_lowercase().as_str() {
            "flac" | "fla" => BackendKind::Flac,
            "mp3" | "mp2" | "mp1" | "mpga" => BackendKind::Mpeg,
            "ogg" | "oga" => BackendKind::Vorbis,
            _ => BackendKind::Container,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BackendKind::Flac => "flac",
            BackendKind::Mpeg => "mpeg",
            BackendKind::Vorbis => "vorbis",
            BackendKind::Container => "container",
        }
    }

    /// Cargo feature that compiles the backend in.
    pub fn feature(&self) -> &'static str {
        match self {
            BackendKind::Flac => "decoder-flac",
            BackendKind::Mpeg => "decoder-mp3",
            BackendKind::Vorbis => "decoder-vorbis",
            BackendKind::Container => "decoder-container",
        }
    }
}

pub struct FormatDetector;

impl FormatDetector {
    /// Leading bytes inspected by [`Self::sniff`].
    pub const SNIFF_LEN: usize = 64;

    /// Lower-cased extension of `path`, if any.
    pub fn hint_from_path(path: &Path) -> Option<String> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        if extension.is_none() {
            debug!("No file extension found, relying on magic bytes");
        }
        extension
    }

    /// Identify a stream from its first bytes.
    pub fn sniff(head: &[u8]) -> Option<BackendKind> {
        if head.starts_with(b"fLaC") {
            return Some(BackendKind::Flac);
        }
        if head.starts_with(b"OggS") {
            return Some(if Self::ogg_carries_vorbis(head) {
                BackendKind::Vorbis
            } else {
                BackendKind::Container
            });
        }
        if head.starts_with(b"ID3") || FrameHeader::parse(head).is_some() {
            return Some(BackendKind::Mpeg);
        }
        if head.starts_with(b"RIFF")
            || head.starts_with(b"FORM")
            || head.starts_with(&[0x1A, 0x45, 0xDF, 0xA3])
            || head.get(4..8) == Some(b"ftyp".as_slice())
        {
            return Some(BackendKind::Container);
        }
        None
    }

    /// The first packet of the first page is a Vorbis identification header.
    fn ogg_carries_vorbis(head: &[u8]) -> bool {
        let Some(&segments) = head.get(26) else {
            return false;
        };
        let packet = 27 + segments as usize;
        head.get(packet..packet + 7) == Some(b"\x01vorbis".as_slice())
    }

    /// Pick a backend for `stream` without moving its read position.
    pub fn detect(stream: &mut SharedStream, hint: Option<&str>) -> io::Result<BackendKind> {
        let head = stream.peek_at(0, Self::SNIFF_LEN)?;
        if let Some(kind) = Self::sniff(&head) {
            debug!(?kind, "Backend chosen from magic bytes");
            return Ok(kind);
        }

        let kind = hint
            .map(BackendKind::from_extension)
            .unwrap_or(BackendKind::Container);
        debug!(?kind, ?hint, "Backend chosen from extension");
        Ok(kind)
    }
}
