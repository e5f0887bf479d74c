//! FLAC metadata blocks: STREAMINFO and SEEKTABLE. Everything else is
//! skipped.

use crate::error::{PlaybackError, Result};
use crate::stream::MediaStream;
use std::io::{Read, Seek, SeekFrom};
use tracing::debug;

const BLOCK_STREAMINFO: u8 = 0;
const BLOCK_SEEKTABLE: u8 = 3;

/// Parsed STREAMINFO block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    pub min_block: u16,
    pub max_block: u16,
    pub min_frame: u32,
    pub max_frame: u32,
    pub sample_rate: u32,
    pub channels: u32,
    pub bits_per_sample: u32,
    /// Zero when the encoder did not know the length.
    pub total_samples: u64,
    /// The block body as stored, handed to the codec.
    pub raw: [u8; StreamInfo::LEN],
}

impl StreamInfo {
    pub const LEN: usize = 34;

    pub fn parse(body: &[u8]) -> Option<Self> {
        let raw: [u8; Self::LEN] = body.get(..Self::LEN)?.try_into().ok()?;

        let be24 = |b: &[u8]| (b[0] as u32) << 16 | (b[1] as u32) << 8 | b[2] as u32;
        let packed = u64::from_be_bytes([
            raw[10], raw[11], raw[12], raw[13], raw[14], raw[15], raw[16], raw[17],
        ]);

        let info = Self {
            min_block: u16::from_be_bytes([raw[0], raw[1]]),
            max_block: u16::from_be_bytes([raw[2], raw[3]]),
            min_frame: be24(&raw[4..7]),
            max_frame: be24(&raw[7..10]),
            sample_rate: (packed >> 44) as u32,
            channels: ((packed >> 41) & 0x7) as u32 + 1,
            bits_per_sample: ((packed >> 36) & 0x1F) as u32 + 1,
            total_samples: packed & 0xF_FFFF_FFFF,
            raw,
        };

        if info.sample_rate == 0 || info.max_block < 16 || info.min_block > info.max_block {
            return None;
        }
        Some(info)
    }

    /// Exact length in seconds, when the sample count is known.
    pub fn duration(&self) -> Option<f64> {
        (self.total_samples > 0).then(|| self.total_samples as f64 / self.sample_rate as f64)
    }

    /// Upper bound of one encoded frame in bytes.
    pub fn frame_size_bound(&self) -> usize {
        if self.max_frame > 0 {
            return self.max_frame as usize;
        }
        // Verbatim subframes plus one extra bit per sample for side channels,
        // plus header and padding slack.
        let bits = self.max_block as usize * self.channels as usize * (self.bits_per_sample as usize + 1);
        bits / 8 + 64
    }
}

/// One SEEKTABLE entry. Offsets are relative to the first frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekPoint {
    pub sample: u64,
    pub offset: u64,
    pub frames: u16,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeekTable {
    points: Vec<SeekPoint>,
}

impl SeekTable {
    const PLACEHOLDER: u64 = u64::MAX;
    const POINT_LEN: usize = 18;

    pub fn parse(body: &[u8]) -> Self {
        let mut points: Vec<SeekPoint> = body
            .chunks_exact(Self::POINT_LEN)
            .map(|p| SeekPoint {
                sample: u64::from_be_bytes([p[0], p[1], p[2], p[3], p[4], p[5], p[6], p[7]]),
                offset: u64::from_be_bytes([
                    p[8], p[9], p[10], p[11], p[12], p[13], p[14], p[15],
                ]),
                frames: u16::from_be_bytes([p[16], p[17]]),
            })
            .filter(|p| p.sample != Self::PLACEHOLDER)
            .collect();
        points.sort_by_key(|p| p.sample);
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The last point at or before `sample` and the first one after it.
    pub fn bracket(&self, sample: u64) -> (Option<SeekPoint>, Option<SeekPoint>) {
        let idx = self.points.partition_point(|p| p.sample <= sample);
        let before = idx.checked_sub(1).map(|i| self.points[i]);
        (before, self.points.get(idx).copied())
    }
}

/// Everything the backend needs from the metadata section.
#[derive(Debug, Clone)]
pub struct Metadata {
    pub stream_info: StreamInfo,
    pub seek_table: Option<SeekTable>,
    /// Byte offset of the first frame.
    pub data_offset: u64,
}

/// Read the metadata blocks from the start of `stream`, leaving it at the
/// first frame.
pub fn read_metadata(stream: &mut dyn MediaStream) -> Result<Metadata> {
    let io_err = |e: std::io::Error| PlaybackError::OpenFailed(format!("FLAC metadata: {}", e));

    stream.seek(SeekFrom::Start(0)).map_err(io_err)?;
    let mut magic = [0u8; 4];
    stream.read_exact(&mut magic).map_err(io_err)?;
    if &magic != b"fLaC" {
        return Err(PlaybackError::UnsupportedContainer(
            "missing fLaC stream marker".to_string(),
        ));
    }

    let mut stream_info = None;
    let mut seek_table = None;
    let mut offset = 4u64;

    loop {
        let mut header = [0u8; 4];
        stream.read_exact(&mut header).map_err(io_err)?;
        let last = header[0] & 0x80 != 0;
        let kind = header[0] & 0x7F;
        let len = u32::from_be_bytes([0, header[1], header[2], header[3]]) as usize;
        offset += 4 + len as u64;

        match kind {
            BLOCK_STREAMINFO | BLOCK_SEEKTABLE => {
                let mut body = vec![0u8; len];
                stream.read_exact(&mut body).map_err(io_err)?;
                if kind == BLOCK_STREAMINFO {
                    stream_info = Some(StreamInfo::parse(&body).ok_or_else(|| {
                        PlaybackError::UnsupportedContainer("invalid STREAMINFO block".to_string())
                    })?);
                } else {
                    let table = SeekTable::parse(&body);
                    debug!(points = table.len(), "Read FLAC seek table");
                    seek_table = Some(table).filter(|t| !t.is_empty());
                }
            }
            127 => {
                return Err(PlaybackError::UnsupportedContainer(
                    "invalid metadata block type".to_string(),
                ))
            }
            _ => {
                stream
                    .seek(SeekFrom::Current(len as i64))
                    .map_err(io_err)?;
            }
        }

        if last {
            break;
        }
    }

    let stream_info = stream_info.ok_or_else(|| {
        PlaybackError::NoAudioStream("FLAC stream without STREAMINFO".to_string())
    })?;

    Ok(Metadata {
        stream_info,
        seek_table,
        data_offset: offset,
    })
}
