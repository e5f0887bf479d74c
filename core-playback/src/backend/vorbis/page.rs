//! Ogg page framing.

use super::super::crc;
use crate::stream::{read_full, MediaStream};
use std::io;

pub const CAPTURE: &[u8; 4] = b"OggS";
pub const HEADER_LEN: usize = 27;
/// Header, full lacing table and 255 full segments.
pub const MAX_PAGE_LEN: usize = HEADER_LEN + 255 + 255 * 255;

const FLAG_CONTINUED: u8 = 0x01;
const FLAG_BOS: u8 = 0x02;
const FLAG_EOS: u8 = 0x04;

/// A page whose checksum verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub continued: bool,
    pub bos: bool,
    pub eos: bool,
    /// `None` when no packet ends on this page.
    pub granule: Option<u64>,
    pub serial: u32,
    pub sequence: u32,
    pub lacing: Vec<u8>,
    pub header_len: usize,
    pub body_len: usize,
}

impl Page {
    pub fn len(&self) -> usize {
        self.header_len + self.body_len
    }

    /// Packet pieces in the body as `(range, complete)`; the last piece is
    /// incomplete when the packet continues on the next page.
    pub fn segments(&self) -> Vec<(std::ops::Range<usize>, bool)> {
        let mut pieces = Vec::new();
        let mut start = self.header_len;
        let mut end = start;
        for &lace in &self.lacing {
            end += lace as usize;
            if lace < 255 {
                pieces.push((start..end, true));
                start = end;
            }
        }
        if end > start {
            pieces.push((start..end, false));
        }
        pieces
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum PageParse {
    Parsed(Page),
    Incomplete,
    Invalid,
}

/// Parse the page at the start of `data`, verifying its CRC.
pub fn parse_page(data: &[u8]) -> PageParse {
    if data.len() < HEADER_LEN {
        return if CAPTURE.starts_with(&data[..data.len().min(4)]) {
            PageParse::Incomplete
        } else {
            PageParse::Invalid
        };
    }
    if &data[..4] != CAPTURE || data[4] != 0 {
        return PageParse::Invalid;
    }

    let segments = data[26] as usize;
    let header_len = HEADER_LEN + segments;
    if data.len() < header_len {
        return PageParse::Incomplete;
    }
    let lacing = data[HEADER_LEN..header_len].to_vec();
    let body_len: usize = lacing.iter().map(|&l| l as usize).sum();
    if data.len() < header_len + body_len {
        return PageParse::Incomplete;
    }

    let stored = u32::from_le_bytes([data[22], data[23], data[24], data[25]]);
    let mut sum = crc::crc32_ogg_update(0, &data[..22]);
    sum = crc::crc32_ogg_update(sum, &[0; 4]);
    sum = crc::crc32_ogg_update(sum, &data[26..header_len + body_len]);
    if sum != stored {
        return PageParse::Invalid;
    }

    let granule = i64::from_le_bytes([
        data[6], data[7], data[8], data[9], data[10], data[11], data[12], data[13],
    ]);
    let flags = data[5];
    PageParse::Parsed(Page {
        continued: flags & FLAG_CONTINUED != 0,
        bos: flags & FLAG_BOS != 0,
        eos: flags & FLAG_EOS != 0,
        granule: (granule >= 0).then_some(granule as u64),
        serial: u32::from_le_bytes([data[14], data[15], data[16], data[17]]),
        sequence: u32::from_le_bytes([data[18], data[19], data[20], data[21]]),
        lacing,
        header_len,
        body_len,
    })
}

/// Offset of the next capture pattern at or after `from`. A partial pattern at
/// the very end is kept; without one the whole slice can be dropped.
pub fn next_capture(data: &[u8], from: usize) -> usize {
    if let Some(pos) = data
        .get(from..)
        .and_then(|rest| rest.windows(4).position(|w| w == CAPTURE))
    {
        return from + pos;
    }
    let tail_start = data.len().saturating_sub(3).max(from);
    (tail_start..data.len())
        .find(|&i| CAPTURE.starts_with(&data[i..]))
        .unwrap_or_else(|| data.len().max(from))
}

/// Sequential page reader over a stream, used for the header pages and the
/// length probe.
pub struct PageReader<'a> {
    stream: &'a mut dyn MediaStream,
    pub offset: u64,
}

impl<'a> PageReader<'a> {
    pub fn new(stream: &'a mut dyn MediaStream, offset: u64) -> Self {
        Self { stream, offset }
    }

    /// The next page and its bytes, or `None` at end of stream.
    pub fn next_page(&mut self) -> io::Result<Option<(Page, Vec<u8>)>> {
        let mut bytes = vec![0u8; HEADER_LEN];
        if read_full(self.stream, &mut bytes)? < HEADER_LEN {
            return Ok(None);
        }
        let segments = bytes[26] as usize;
        bytes.resize(HEADER_LEN + segments, 0);
        if read_full(self.stream, &mut bytes[HEADER_LEN..])? < segments {
            return Ok(None);
        }
        let body: usize = bytes[HEADER_LEN..].iter().map(|&l| l as usize).sum();
        let header_len = bytes.len();
        bytes.resize(header_len + body, 0);
        if read_full(self.stream, &mut bytes[header_len..])? < body {
            return Ok(None);
        }

        match parse_page(&bytes) {
            PageParse::Parsed(page) => {
                self.offset += page.len() as u64;
                Ok(Some((page, bytes)))
            }
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("corrupt Ogg page at byte {}", self.offset),
            )),
        }
    }
}

/// Last page of `serial` with a granule position inside `tail`.
pub fn last_granule(tail: &[u8], serial: u32) -> Option<u64> {
    let mut found = None;
    let mut pos = next_capture(tail, 0);
    while pos < tail.len() {
        match parse_page(&tail[pos..]) {
            PageParse::Parsed(page) => {
                if page.serial == serial && page.granule.is_some() {
                    found = page.granule;
                }
                pos += page.len();
            }
            _ => pos = next_capture(tail, pos + 1),
        }
    }
    found
}
