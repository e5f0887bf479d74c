//! MPEG audio frame headers (MPEG-1, MPEG-2 and MPEG-2.5, layers I to III)
//! and the Xing/Info and VBRI tables VBR encoders put in the first frame.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MpegVersion {
    Mpeg1,
    Mpeg2,
    Mpeg25,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    I,
    II,
    III,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMode {
    Stereo,
    JointStereo,
    DualChannel,
    Mono,
}

// Rows: V1 L1, V1 L2, V1 L3, V2 L1, V2 L2/L3. Index 0 is free format.
const BITRATES_KBPS: [[u32; 15]; 5] = [
    [0, 32, 64, 96, 128, 160, 192, 224, 256, 288, 320, 352, 384, 416, 448],
    [0, 32, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384],
    [0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320],
    [0, 32, 48, 56, 64, 80, 96, 112, 128, 144, 160, 176, 192, 224, 256],
    [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160],
];

const SAMPLE_RATES: [[u32; 3]; 3] = [
    [44100, 48000, 32000],
    [22050, 24000, 16000],
    [11025, 12000, 8000],
];

/// One parsed 4-byte frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: MpegVersion,
    pub layer: Layer,
    pub crc_protected: bool,
    pub bitrate_kbps: u32,
    pub sample_rate: u32,
    pub padding: bool,
    pub channel_mode: ChannelMode,
    /// Whole frame including the header, in bytes.
    pub frame_len: usize,
}

impl FrameHeader {
    pub const SIZE: usize = 4;

    /// Parse the header at the start of `bytes`. Free-format and reserved
    /// field values are rejected.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::SIZE {
            return None;
        }
        let word = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        if word >> 21 != 0x7FF {
            return None;
        }

        let version = match (word >> 19) & 0b11 {
            0b00 => MpegVersion::Mpeg25,
            0b10 => MpegVersion::Mpeg2,
            0b11 => MpegVersion::Mpeg1,
            _ => return None,
        };
        let layer = match (word >> 17) & 0b11 {
            0b01 => Layer::III,
            0b10 => Layer::II,
            0b11 => Layer::I,
            _ => return None,
        };
        let crc_protected = (word >> 16) & 1 == 0;

        let bitrate_index = ((word >> 12) & 0xF) as usize;
        if bitrate_index == 0 || bitrate_index == 15 {
            return None;
        }
        let table = match (version, layer) {
            (MpegVersion::Mpeg1, Layer::I) => 0,
            (MpegVersion::Mpeg1, Layer::II) => 1,
            (MpegVersion::Mpeg1, Layer::III) => 2,
            (_, Layer::I) => 3,
            _ => 4,
        };
        let bitrate_kbps = BITRATES_KBPS[table][bitrate_index];

        let rate_index = ((word >> 10) & 0b11) as usize;
        if rate_index == 3 {
            return None;
        }
        let sample_rate = match version {
            MpegVersion::Mpeg1 => SAMPLE_RATES[0][rate_index],
            MpegVersion::Mpeg2 => SAMPLE_RATES[1][rate_index],
            MpegVersion::Mpeg25 => SAMPLE_RATES[2][rate_index],
        };

        let padding = (word >> 9) & 1 == 1;
        let channel_mode = match (word >> 6) & 0b11 {
            0b00 => ChannelMode::Stereo,
            0b01 => ChannelMode::JointStereo,
            0b10 => ChannelMode::DualChannel,
            _ => ChannelMode::Mono,
        };

        let mut header = Self {
            version,
            layer,
            crc_protected,
            bitrate_kbps,
            sample_rate,
            padding,
            channel_mode,
            frame_len: 0,
        };
        header.frame_len = header.compute_frame_len();
        Some(header)
    }

    fn compute_frame_len(&self) -> usize {
        let bitrate = self.bitrate_kbps as usize * 1000;
        let rate = self.sample_rate as usize;
        let pad = usize::from(self.padding);
        match self.layer {
            Layer::I => (12 * bitrate / rate + pad) * 4,
            _ => self.samples_per_frame() as usize / 8 * bitrate / rate + pad,
        }
    }

    pub fn channels(&self) -> u32 {
        match self.channel_mode {
            ChannelMode::Mono => 1,
            _ => 2,
        }
    }

    pub fn samples_per_frame(&self) -> u32 {
        match (self.layer, self.version) {
            (Layer::I, _) => 384,
            (Layer::II, _) => 1152,
            (Layer::III, MpegVersion::Mpeg1) => 1152,
            (Layer::III, _) => 576,
        }
    }

    /// Seconds of audio in one frame.
    pub fn duration(&self) -> f64 {
        self.samples_per_frame() as f64 / self.sample_rate as f64
    }

    /// Headers of one stream agree on everything but bitrate and padding.
    pub fn same_stream(&self, other: &FrameHeader) -> bool {
        self.version == other.version
            && self.layer == other.layer
            && self.sample_rate == other.sample_rate
            && self.channels() == other.channels()
    }

    /// Offset of the Xing/Info tag inside a layer III frame.
    fn xing_offset(&self) -> usize {
        let side_info = match (self.version, self.channel_mode) {
            (MpegVersion::Mpeg1, ChannelMode::Mono) => 17,
            (MpegVersion::Mpeg1, _) => 32,
            (_, ChannelMode::Mono) => 9,
            _ => 17,
        };
        Self::SIZE + side_info
    }
}

/// Frame and byte counts from a VBR info frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VbrInfo {
    pub frames: Option<u32>,
    pub bytes: Option<u32>,
}

impl VbrInfo {
    /// Exact duration when the frame count is known.
    pub fn duration(&self, header: &FrameHeader) -> Option<f64> {
        self.frames
            .map(|frames| frames as f64 * header.duration())
            .filter(|d| *d > 0.0)
    }
}

/// Look for a Xing/Info or VBRI tag in `frame`, the complete first frame.
pub fn parse_vbr_info(frame: &[u8], header: &FrameHeader) -> Option<VbrInfo> {
    if header.layer != Layer::III {
        return None;
    }

    let xing = header.xing_offset();
    if let Some(tag) = frame.get(xing..xing + 8) {
        if &tag[..4] == b"Xing" || &tag[..4] == b"Info" {
            let flags = u32::from_be_bytes([tag[4], tag[5], tag[6], tag[7]]);
            let mut cursor = xing + 8;
            let mut info = VbrInfo::default();
            if flags & 0x1 != 0 {
                info.frames = read_u32(frame, cursor);
                cursor += 4;
            }
            if flags & 0x2 != 0 {
                info.bytes = read_u32(frame, cursor);
            }
            return Some(info);
        }
    }

    let vbri = FrameHeader::SIZE + 32;
    if frame.get(vbri..vbri + 4) == Some(b"VBRI".as_slice()) {
        return Some(VbrInfo {
            bytes: read_u32(frame, vbri + 10),
            frames: read_u32(frame, vbri + 14),
        });
    }
    None
}

fn read_u32(bytes: &[u8], at: usize) -> Option<u32> {
    let b = bytes.get(at..at + 4)?;
    Some(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

/// Size of an ID3v2 tag at the start of `bytes`, header and footer included.
pub fn id3v2_len(bytes: &[u8]) -> Option<usize> {
    if bytes.len() < 10 || &bytes[..3] != b"ID3" {
        return None;
    }
    let size = bytes[6..10]
        .iter()
        .fold(0usize, |acc, &b| (acc << 7) | (b & 0x7F) as usize);
    let footer = if bytes[5] & 0x10 != 0 { 10 } else { 0 };
    Some(10 + size + footer)
}
