//! FLAC frame framing: header parsing (with CRC-8) and locating the end of a
//! frame through its trailing CRC-16.

use super::metadata::StreamInfo;
use crate::backend::crc;

/// A parsed frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub variable_blocksize: bool,
    pub block_size: u32,
    /// `None` means "as in STREAMINFO".
    pub sample_rate: Option<u32>,
    pub channels: u32,
    /// `None` means "as in STREAMINFO".
    pub bits_per_sample: Option<u32>,
    /// Frame number (fixed block size) or first sample number (variable).
    pub number: u64,
    /// Header bytes including the CRC-8.
    pub header_len: usize,
}

impl FrameHeader {
    /// Index of the first sample in the frame.
    pub fn first_sample(&self, info: &StreamInfo) -> u64 {
        if self.variable_blocksize {
            self.number
        } else {
            self.number * info.max_block as u64
        }
    }

    /// Whether the header agrees with the stream's fixed properties.
    pub fn matches(&self, info: &StreamInfo) -> bool {
        self.channels == info.channels
            && self.sample_rate.map_or(true, |rate| rate == info.sample_rate)
            && self
                .bits_per_sample
                .map_or(true, |bits| bits == info.bits_per_sample)
            && self.block_size <= info.max_block as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderParse {
    Parsed(FrameHeader),
    /// The header runs past the available bytes.
    Incomplete,
    Invalid,
}

/// Parse a frame header at the start of `bytes`.
pub fn parse_header(bytes: &[u8]) -> HeaderParse {
    if bytes.len() < 2 {
        return HeaderParse::Incomplete;
    }
    if bytes[0] != 0xFF || bytes[1] & 0xFE != 0xF8 {
        return HeaderParse::Invalid;
    }
    if bytes.len() < 5 {
        return HeaderParse::Incomplete;
    }

    let variable_blocksize = bytes[1] & 0x01 == 1;
    let block_code = bytes[2] >> 4;
    let rate_code = bytes[2] & 0x0F;
    let channel_code = bytes[3] >> 4;
    let size_code = (bytes[3] >> 1) & 0x07;
    if bytes[3] & 0x01 != 0 || block_code == 0 || rate_code == 15 || size_code == 3 {
        return HeaderParse::Invalid;
    }

    let channels = match channel_code {
        0..=7 => channel_code as u32 + 1,
        8..=10 => 2,
        _ => return HeaderParse::Invalid,
    };
    let bits_per_sample = match size_code {
        0 => None,
        1 => Some(8),
        2 => Some(12),
        4 => Some(16),
        5 => Some(20),
        6 => Some(24),
        _ => Some(32),
    };

    let mut pos = 4;
    let number = match read_utf8_number(&bytes[pos..]) {
        Utf8Number::Value(value, len) => {
            pos += len;
            value
        }
        Utf8Number::Incomplete => return HeaderParse::Incomplete,
        Utf8Number::Invalid => return HeaderParse::Invalid,
    };

    let extra_block = match block_code {
        6 => 1,
        7 => 2,
        _ => 0,
    };
    let extra_rate = match rate_code {
        12 => 1,
        13 | 14 => 2,
        _ => 0,
    };
    if bytes.len() < pos + extra_block + extra_rate + 1 {
        return HeaderParse::Incomplete;
    }

    let block_size = match block_code {
        1 => 192,
        2..=5 => 576 << (block_code - 2),
        6 => bytes[pos] as u32 + 1,
        7 => u16::from_be_bytes([bytes[pos], bytes[pos + 1]]) as u32 + 1,
        _ => 256 << (block_code - 8),
    };
    pos += extra_block;

    let sample_rate = match rate_code {
        0 => None,
        1 => Some(88200),
        2 => Some(176400),
        3 => Some(192000),
        4 => Some(8000),
        5 => Some(16000),
        6 => Some(22050),
        7 => Some(24000),
        8 => Some(32000),
        9 => Some(44100),
        10 => Some(48000),
        11 => Some(96000),
        12 => Some(bytes[pos] as u32 * 1000),
        13 => Some(u16::from_be_bytes([bytes[pos], bytes[pos + 1]]) as u32),
        _ => Some(u16::from_be_bytes([bytes[pos], bytes[pos + 1]]) as u32 * 10),
    };
    pos += extra_rate;

    if crc::crc8(&bytes[..pos]) != bytes[pos] {
        return HeaderParse::Invalid;
    }

    HeaderParse::Parsed(FrameHeader {
        variable_blocksize,
        block_size,
        sample_rate,
        channels,
        bits_per_sample,
        number,
        header_len: pos + 1,
    })
}

enum Utf8Number {
    Value(u64, usize),
    Incomplete,
    Invalid,
}

/// FLAC's UTF-8-like variable length integer (up to 36 bits in 7 bytes).
fn read_utf8_number(bytes: &[u8]) -> Utf8Number {
    let Some(&first) = bytes.first() else {
        return Utf8Number::Incomplete;
    };
    let len = match first.leading_ones() {
        0 => return Utf8Number::Value(first as u64, 1),
        n @ 2..=7 => n as usize,
        _ => return Utf8Number::Invalid,
    };
    if bytes.len() < len {
        return Utf8Number::Incomplete;
    }

    let mut value = (first & (0x7F >> len)) as u64;
    for &byte in &bytes[1..len] {
        if byte & 0xC0 != 0x80 {
            return Utf8Number::Invalid;
        }
        value = (value << 6) | (byte & 0x3F) as u64;
    }
    Utf8Number::Value(value, len)
}

/// Where a frame starting at offset 0 ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameEnd {
    /// Frame length in bytes.
    At(usize),
    NeedMore,
    /// No CRC-16 match within the largest possible frame.
    Corrupt,
}

/// Find the end of the frame whose header (`header_len` bytes) starts
/// `data`.
///
/// A candidate end must carry the CRC-16 of every byte before it, and must
/// be followed by another valid frame header unless the stream ends there.
pub fn find_frame_end(data: &[u8], header_len: usize, eof: bool, info: &StreamInfo) -> FrameEnd {
    let bound = info.frame_size_bound().max(header_len + 2);
    let mut end = header_len + 2;
    if data.len() < end {
        return if eof { FrameEnd::Corrupt } else { FrameEnd::NeedMore };
    }

    let mut crc = crc::crc16(&data[..end - 2]);
    while end <= data.len() {
        if end > bound {
            return FrameEnd::Corrupt;
        }

        let stored = u16::from_be_bytes([data[end - 2], data[end - 1]]);
        if crc == stored {
            let rest = &data[end..];
            if rest.is_empty() {
                if eof {
                    return FrameEnd::At(end);
                }
                return FrameEnd::NeedMore;
            }
            match parse_header(rest) {
                HeaderParse::Parsed(next) if next.matches(info) => return FrameEnd::At(end),
                HeaderParse::Incomplete if eof => return FrameEnd::At(end),
                HeaderParse::Incomplete => return FrameEnd::NeedMore,
                _ => {}
            }
        }

        crc = crc::crc16_update(crc, &data[end - 2..end - 1]);
        end += 1;
    }

    if eof {
        FrameEnd::Corrupt
    } else {
        FrameEnd::NeedMore
    }
}

/// Offset of the next possible frame sync after `from`, or where to resume
/// looking once more bytes arrive.
pub fn next_sync(data: &[u8], from: usize) -> usize {
    let mut i = from;
    while i + 1 < data.len() {
        if data[i] == 0xFF && data[i + 1] & 0xFE == 0xF8 {
            return i;
        }
        i += 1;
    }
    // A trailing 0xFF may be the first half of a sync code.
    if data.last() == Some(&0xFF) && data.len() > from {
        data.len() - 1
    } else {
        data.len().max(from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> StreamInfo {
        let mut body = Vec::new();
        body.extend_from_slice(&16u16.to_be_bytes());
        body.extend_from_slice(&16u16.to_be_bytes());
        body.extend_from_slice(&[0; 6]);
        let packed: u64 = (44100 << 44) | (1 << 41) | (15 << 36) | 64;
        body.extend_from_slice(&packed.to_be_bytes());
        body.extend_from_slice(&[0; 16]);
        StreamInfo::parse(&body).unwrap()
    }

    /// Frame `number` of a stereo 16-bit stream with a 16-sample block
    /// (block code 6), 44.1 kHz, followed by `payload` and the CRC-16.
    fn frame(number: u8, payload: &[u8]) -> Vec<u8> {
        let mut bytes = vec![0xFF, 0xF8, 0x69, 0x18, number, 15];
        bytes.push(crc::crc8(&bytes));
        bytes.extend_from_slice(payload);
        let crc16 = crc::crc16(&bytes);
        bytes.extend_from_slice(&crc16.to_be_bytes());
        bytes
    }

    #[test]
    fn test_parse_header() {
        let bytes = frame(3, &[0; 4]);
        let HeaderParse::Parsed(header) = parse_header(&bytes) else {
            panic!("header did not parse");
        };
        assert_eq!(header.block_size, 16);
        assert_eq!(header.sample_rate, Some(44100));
        assert_eq!(header.channels, 2);
        assert_eq!(header.bits_per_sample, Some(16));
        assert_eq!(header.number, 3);
        assert_eq!(header.header_len, 7);
        assert_eq!(header.first_sample(&info()), 48);
        assert!(header.matches(&info()));
    }

    #[test]
    fn test_header_crc_mismatch() {
        let mut bytes = frame(0, &[]);
        bytes[6] ^= 0x01;
        assert_eq!(parse_header(&bytes), HeaderParse::Invalid);
    }

    #[test]
    fn test_header_incomplete_and_invalid() {
        assert_eq!(parse_header(&[0xFF]), HeaderParse::Incomplete);
        assert_eq!(parse_header(&[0xFF, 0xF8, 0x69]), HeaderParse::Incomplete);
        assert_eq!(parse_header(&[0xFF, 0xF0, 0x69, 0x18, 0]), HeaderParse::Invalid);
        assert_eq!(parse_header(&[0x12, 0x34]), HeaderParse::Invalid);
    }

    #[test]
    fn test_utf8_numbers() {
        assert!(matches!(read_utf8_number(&[0x7F]), Utf8Number::Value(0x7F, 1)));
        assert!(matches!(
            read_utf8_number(&[0xC2, 0x80]),
            Utf8Number::Value(0x80, 2)
        ));
        assert!(matches!(
            read_utf8_number(&[0xE0, 0xA0, 0x80]),
            Utf8Number::Value(0x800, 3)
        ));
        assert!(matches!(read_utf8_number(&[0xC2]), Utf8Number::Incomplete));
        assert!(matches!(read_utf8_number(&[0x80]), Utf8Number::Invalid));
    }

    #[test]
    fn test_frame_end_confirmed_by_next_header() {
        let first = frame(0, &[1, 2, 3, 4, 5]);
        let mut data = first.clone();
        data.extend_from_slice(&frame(1, &[6, 7]));

        assert_eq!(
            find_frame_end(&data, 7, false, &info()),
            FrameEnd::At(first.len())
        );
    }

    #[test]
    fn test_frame_end_needs_more() {
        let first = frame(0, &[1, 2, 3]);
        assert_eq!(find_frame_end(&first, 7, false, &info()), FrameEnd::NeedMore);
        assert_eq!(
            find_frame_end(&first, 7, true, &info()),
            FrameEnd::At(first.len())
        );
        assert_eq!(
            find_frame_end(&first[..first.len() - 1], 7, false, &info()),
            FrameEnd::NeedMore
        );
    }

    #[test]
    fn test_corrupt_frame() {
        let mut data = frame(0, &[1, 2, 3]);
        data[8] ^= 0xFF;
        assert_eq!(find_frame_end(&data, 7, true, &info()), FrameEnd::Corrupt);
    }

    #[test]
    fn test_next_sync() {
        assert_eq!(next_sync(&[0, 1, 0xFF, 0xF9, 4], 0), 2);
        assert_eq!(next_sync(&[0, 1, 2, 0xFF], 0), 3);
        assert_eq!(next_sync(&[0, 1, 2], 1), 3);
        assert_eq!(next_sync(&[0xFF, 0xF8, 0, 0xFF, 0xF8], 1), 3);
    }
}
