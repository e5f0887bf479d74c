//! Shared fixtures for the integration tests: a toy codec backend, a
//! stream that fails on demand, and in-memory FLAC, WAV, Ogg Vorbis and
//! MPEG writers.

#![allow(dead_code)]

use core_playback::backend::crc;
use core_playback::{
    Backend, DecodeMode, DecodedUnit, Decoder, DecoderConfig, InputWindow, MediaStream,
    PlaybackError, RawSamples, Result, SeekTarget, StreamProperties, UnitOutcome,
};
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// ============================================================================
// Toy codec
// ============================================================================
//
// File:  "TOYC" | rate u32 LE | channels u8 | bits u8 (16) | total frames u32 LE
// Unit:  0x7E | frame count u16 LE | interleaved i16 LE samples

pub const TOY_MAGIC: &[u8; 4] = b"TOYC";
pub const TOY_HEADER_LEN: u64 = 14;
pub const TOY_UNIT_MARK: u8 = 0x7E;
pub const FRAMES_PER_UNIT: u64 = 441;

pub fn toy_sample(frame: u64, channel: u32) -> i16 {
    ((frame * 31 + channel as u64 * 7919) % 60000) as i16
}

/// A toy file of `frames` frames. With `state_length` unset the header
/// leaves the total at zero, so the session has to estimate it.
pub fn write_toy(rate: u32, channels: u8, frames: u64, state_length: bool) -> Vec<u8> {
    let mut file = TOY_MAGIC.to_vec();
    file.extend_from_slice(&rate.to_le_bytes());
    file.push(channels);
    file.push(16);
    let total = if state_length { frames as u32 } else { 0 };
    file.extend_from_slice(&total.to_le_bytes());

    let mut frame = 0;
    while frame < frames {
        let count = FRAMES_PER_UNIT.min(frames - frame);
        file.push(TOY_UNIT_MARK);
        file.extend_from_slice(&(count as u16).to_le_bytes());
        for f in frame..frame + count {
            for ch in 0..channels as u32 {
                file.extend_from_slice(&toy_sample(f, ch).to_le_bytes());
            }
        }
        frame += count;
    }
    file
}

/// Interleaved little-endian PCM the toy file decodes to, from `start`.
pub fn toy_pcm(channels: u8, start: u64, frames: u64) -> Vec<u8> {
    let mut pcm = Vec::new();
    for f in start..frames {
        for ch in 0..channels as u32 {
            pcm.extend_from_slice(&toy_sample(f, ch).to_le_bytes());
        }
    }
    pcm
}

pub struct ToyBackend {
    rate: u32,
    channels: u32,
    total_frames: u64,
    stream_len: u64,
    pending_skip: usize,
    pub fail_seeks: bool,
}

impl ToyBackend {
    pub fn open(stream: &mut dyn MediaStream) -> Result<Self> {
        stream.seek(SeekFrom::Start(0))?;
        let mut header = [0u8; TOY_HEADER_LEN as usize];
        stream
            .read_exact(&mut header)
            .map_err(|e| PlaybackError::OpenFailed(e.to_string()))?;
        if &header[..4] != TOY_MAGIC {
            return Err(PlaybackError::UnsupportedContainer("not a toy file".to_string()));
        }
        Ok(Self {
            rate: u32::from_le_bytes([header[4], header[5], header[6], header[7]]),
            channels: header[8] as u32,
            total_frames: u32::from_le_bytes([header[10], header[11], header[12], header[13]])
                as u64,
            stream_len: stream.total_len()?,
            pending_skip: 0,
            fail_seeks: false,
        })
    }

    fn unit_len(&self, frames: u64) -> u64 {
        3 + frames * self.channels as u64 * 2
    }
}

impl Backend for ToyBackend {
    fn name(&self) -> &'static str {
        "toy"
    }

    fn properties(&self) -> StreamProperties {
        let duration = (self.total_frames > 0).then(|| self.total_frames as f64 / self.rate as f64);
        StreamProperties::new(self.channels, self.rate, 16).with_duration(duration)
    }

    fn max_unit_size(&self) -> usize {
        self.unit_len(FRAMES_PER_UNIT) as usize
    }

    fn data_offset(&self) -> u64 {
        TOY_HEADER_LEN
    }

    fn decode_unit(&mut self, window: InputWindow<'_>, mode: DecodeMode) -> UnitOutcome {
        let data = window.data();
        if data.is_empty() {
            return UnitOutcome::NeedMoreInput;
        }
        if data[0] != TOY_UNIT_MARK {
            return UnitOutcome::recoverable(1, "not a unit mark");
        }
        if data.len() < 3 {
            return UnitOutcome::NeedMoreInput;
        }
        let frames = u16::from_le_bytes([data[1], data[2]]) as u64;
        let len = self.unit_len(frames) as usize;
        if data.len() < len {
            return UnitOutcome::NeedMoreInput;
        }
        let duration = frames as f64 / self.rate as f64;

        if mode == DecodeMode::HeadersOnly {
            return UnitOutcome::Decoded(DecodedUnit::windowed(len, duration, RawSamples::empty()));
        }

        let channels = self.channels as usize;
        let mut planes = vec![Vec::with_capacity(frames as usize); channels];
        for (i, pair) in data[3..len].chunks_exact(2).enumerate() {
            planes[i % channels].push(i16::from_le_bytes([pair[0], pair[1]]) as i32);
        }
        let mut samples = RawSamples::new(planes);
        let skipped = samples.skip_frames(self.pending_skip);
        self.pending_skip -= skipped;

        let duration = samples.frames() as f64 / self.rate as f64;
        UnitOutcome::Decoded(DecodedUnit::windowed(len, duration, samples))
    }

    fn seek(&mut self, stream: &mut dyn MediaStream, target: SeekTarget) -> Result<()> {
        if self.fail_seeks {
            return Err(PlaybackError::SeekFailed("toy seeks disabled".to_string()));
        }
        let unit = target.frame / FRAMES_PER_UNIT;
        let offset = TOY_HEADER_LEN + unit * self.unit_len(FRAMES_PER_UNIT);
        stream.seek(SeekFrom::Start(offset.min(self.stream_len)))?;
        self.pending_skip = (target.frame % FRAMES_PER_UNIT) as usize;
        Ok(())
    }
}

/// A session over a toy file held in memory.
pub fn toy_decoder(file: Vec<u8>, config: DecoderConfig) -> Result<Decoder> {
    toy_decoder_with(file, config, false)
}

pub fn toy_decoder_with(file: Vec<u8>, config: DecoderConfig, fail_seeks: bool) -> Result<Decoder> {
    let mut stream = Cursor::new(file);
    let mut backend = ToyBackend::open(&mut stream)?;
    backend.fail_seeks = fail_seeks;
    Decoder::with_backend(Box::new(backend), Box::new(stream), config)
}

/// A session over a toy file read through `stream`.
pub fn toy_decoder_over(mut stream: Box<dyn MediaStream>, config: DecoderConfig) -> Result<Decoder> {
    let backend = ToyBackend::open(&mut stream)?;
    Decoder::with_backend(Box::new(backend), stream, config)
}

/// Everything `decoder` still produces, `chunk` bytes at a time.
pub fn drain(decoder: &mut Decoder, chunk: usize) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf = vec![0u8; chunk];
    loop {
        let n = decoder.decode(&mut buf);
        if n == 0 {
            return out;
        }
        out.extend_from_slice(&buf[..n]);
    }
}

// ============================================================================
// Failing stream
// ============================================================================

/// In-memory stream whose reads fail once the position reaches `fail_at`.
pub struct FailingStream {
    inner: Cursor<Vec<u8>>,
    fail_at: u64,
    failed_reads: Arc<AtomicUsize>,
}

impl FailingStream {
    /// The stream and a counter of the reads that failed.
    pub fn new(data: Vec<u8>, fail_at: u64) -> (Self, Arc<AtomicUsize>) {
        let failed_reads = Arc::new(AtomicUsize::new(0));
        let stream = Self {
            inner: Cursor::new(data),
            fail_at,
            failed_reads: failed_reads.clone(),
        };
        (stream, failed_reads)
    }
}

impl Read for FailingStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let pos = self.inner.position();
        if pos >= self.fail_at {
            self.failed_reads.fetch_add(1, Ordering::SeqCst);
            return Err(io::Error::new(io::ErrorKind::Other, "device unplugged"));
        }
        let allowed = buf.len().min((self.fail_at - pos) as usize);
        self.inner.read(&mut buf[..allowed])
    }
}

impl Seek for FailingStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

impl MediaStream for FailingStream {
    fn total_len(&mut self) -> io::Result<u64> {
        Ok(self.inner.get_ref().len() as u64)
    }
}

// ============================================================================
// FLAC writer (verbatim subframes, 16-bit)
// ============================================================================

pub fn flac_sample(frame: u64, channel: u32) -> i16 {
    ((frame * 37 + channel as u64 * 1000) % 20000) as i16
}

pub fn flac_pcm(channels: u32, start: u64, frames: u64) -> Vec<u8> {
    let mut pcm = Vec::new();
    for f in start..frames {
        for ch in 0..channels {
            pcm.extend_from_slice(&flac_sample(f, ch).to_le_bytes());
        }
    }
    pcm
}

fn flac_rate_code(rate: u32) -> u8 {
    match rate {
        8000 => 4,
        16000 => 5,
        22050 => 6,
        24000 => 7,
        32000 => 8,
        44100 => 9,
        48000 => 10,
        96000 => 11,
        _ => 0,
    }
}

fn flac_utf8(number: u64) -> Vec<u8> {
    match number {
        0..=0x7F => vec![number as u8],
        0x80..=0x7FF => vec![0xC0 | (number >> 6) as u8, 0x80 | (number & 0x3F) as u8],
        _ => vec![
            0xE0 | (number >> 12) as u8,
            0x80 | ((number >> 6) & 0x3F) as u8,
            0x80 | (number & 0x3F) as u8,
        ],
    }
}

fn flac_frame(rate: u32, channels: u32, number: u64, start: u64, frames: u64) -> Vec<u8> {
    let mut frame = vec![
        0xFF,
        0xF8,
        (7 << 4) | flac_rate_code(rate),
        (((channels - 1) as u8) << 4) | (4 << 1),
    ];
    frame.extend(flac_utf8(number));
    frame.extend_from_slice(&((frames - 1) as u16).to_be_bytes());
    frame.push(crc::crc8(&frame));

    for ch in 0..channels {
        // Verbatim subframe, no wasted bits.
        frame.push(0x02);
        for f in start..start + frames {
            frame.extend_from_slice(&flac_sample(f, ch).to_be_bytes());
        }
    }
    let footer = crc::crc16(&frame);
    frame.extend_from_slice(&footer.to_be_bytes());
    frame
}

/// A 16-bit FLAC file of `frames` frames in blocks of `block`. With
/// `seek_table` set a SEEKTABLE point is written for every other frame.
pub fn write_flac(rate: u32, channels: u32, frames: u64, block: u16, seek_table: bool) -> Vec<u8> {
    let mut audio = Vec::new();
    let mut points = Vec::new();
    let mut start = 0;
    let mut number = 0;
    while start < frames {
        let count = (block as u64).min(frames - start);
        if number % 2 == 0 {
            points.push((start, audio.len() as u64, count as u16));
        }
        audio.extend(flac_frame(rate, channels, number, start, count));
        start += count;
        number += 1;
    }

    let mut info = Vec::new();
    info.extend_from_slice(&block.to_be_bytes());
    info.extend_from_slice(&block.to_be_bytes());
    info.extend_from_slice(&[0; 6]);
    let packed = (rate as u64) << 44 | ((channels - 1) as u64) << 41 | 15u64 << 36 | frames;
    info.extend_from_slice(&packed.to_be_bytes());
    info.extend_from_slice(&[0; 16]);

    let mut file = b"fLaC".to_vec();
    let block_header = |last: bool, kind: u8, len: usize| {
        let len = (len as u32).to_be_bytes();
        [(last as u8) << 7 | kind, len[1], len[2], len[3]]
    };
    file.extend_from_slice(&block_header(!seek_table, 0, info.len()));
    file.extend(info);

    if seek_table {
        let mut table = Vec::new();
        for (sample, offset, count) in points {
            table.extend_from_slice(&sample.to_be_bytes());
            table.extend_from_slice(&offset.to_be_bytes());
            table.extend_from_slice(&count.to_be_bytes());
        }
        file.extend_from_slice(&block_header(true, 3, table.len()));
        file.extend(table);
    }

    file.extend(audio);
    file
}

// ============================================================================
// WAV writer (16-bit PCM)
// ============================================================================

pub fn wav_sample(frame: u64, channel: u32) -> i16 {
    (((frame * 53 + channel as u64 * 4000) % 16000) as i16) - 8000
}

pub fn write_wav(rate: u32, channels: u16, frames: u64) -> Vec<u8> {
    let block_align = channels as u32 * 2;
    let data_len = frames as u32 * block_align;

    let mut file = b"RIFF".to_vec();
    file.extend_from_slice(&(36 + data_len).to_le_bytes());
    file.extend_from_slice(b"WAVEfmt ");
    file.extend_from_slice(&16u32.to_le_bytes());
    file.extend_from_slice(&1u16.to_le_bytes());
    file.extend_from_slice(&channels.to_le_bytes());
    file.extend_from_slice(&rate.to_le_bytes());
    file.extend_from_slice(&(rate * block_align).to_le_bytes());
    file.extend_from_slice(&(block_align as u16).to_le_bytes());
    file.extend_from_slice(&16u16.to_le_bytes());
    file.extend_from_slice(b"data");
    file.extend_from_slice(&data_len.to_le_bytes());
    for f in 0..frames {
        for ch in 0..channels as u32 {
            file.extend_from_slice(&wav_sample(f, ch).to_le_bytes());
        }
    }
    file
}

/// Open an in-memory file through format detection.
pub fn open_bytes(file: Vec<u8>, hint: Option<&str>) -> Result<Decoder> {
    Decoder::from_stream(Box::new(Cursor::new(file)), hint, DecoderConfig::default())
}

// ============================================================================
// Ogg Vorbis writer (silent short blocks)
// ============================================================================
//
// One codebook, one floor 1 without partitions, one residue 2 and one mode
// with 256-sample blocks. The audio packet `0x00` marks every channel as
// unused, which decodes to silence: 128 frames per packet once the overlap
// is primed, none for the first.

pub const VORBIS_SERIAL: u32 = 0x5EED;
pub const VORBIS_PACKET_FRAMES: u64 = 128;
pub const VORBIS_PACKETS_PER_PAGE: usize = 25;

/// A packet lewton rejects as a header in the audio stream.
const VORBIS_BAD_PACKET: &[u8] = &[0x01];

/// LSB-first bit packer.
struct BitWriter {
    bytes: Vec<u8>,
    bit: u32,
}

impl BitWriter {
    fn new(prefix: &[u8]) -> Self {
        Self {
            bytes: prefix.to_vec(),
            bit: 0,
        }
    }

    fn put(&mut self, value: u32, bits: u32) {
        for i in 0..bits {
            if self.bit == 0 {
                self.bytes.push(0);
            }
            if (value >> i) & 1 == 1 {
                if let Some(last) = self.bytes.last_mut() {
                    *last |= 1 << self.bit;
                }
            }
            self.bit = (self.bit + 1) % 8;
        }
    }
}

fn vorbis_ident(rate: u32, channels: u8) -> Vec<u8> {
    let mut packet = b"\x01vorbis".to_vec();
    packet.extend_from_slice(&0u32.to_le_bytes());
    packet.push(channels);
    packet.extend_from_slice(&rate.to_le_bytes());
    packet.extend_from_slice(&0i32.to_le_bytes());
    packet.extend_from_slice(&64_000i32.to_le_bytes());
    packet.extend_from_slice(&0i32.to_le_bytes());
    // Both block sizes 2^8.
    packet.push(0x88);
    packet.push(1);
    packet
}

fn vorbis_comment() -> Vec<u8> {
    let vendor = b"tonearm tests";
    let mut packet = b"\x03vorbis".to_vec();
    packet.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
    packet.extend_from_slice(vendor);
    packet.extend_from_slice(&0u32.to_le_bytes());
    packet.push(1);
    packet
}

fn vorbis_setup() -> Vec<u8> {
    let mut w = BitWriter::new(b"\x05vorbis");

    // Codebooks: one, 1 dimension, 2 entries of length 1, no lookup.
    w.put(0, 8);
    w.put(0x564342, 24);
    w.put(1, 16);
    w.put(2, 24);
    w.put(0, 1);
    w.put(0, 1);
    w.put(0, 5);
    w.put(0, 5);
    w.put(0, 4);

    // Time domain transforms: one placeholder.
    w.put(0, 6);
    w.put(0, 16);

    // Floors: one type 1, no partitions, multiplier 1, range bits 7.
    w.put(0, 6);
    w.put(1, 16);
    w.put(0, 5);
    w.put(0, 2);
    w.put(7, 4);

    // Residues: one type 2, empty range, one classification.
    w.put(0, 6);
    w.put(2, 16);
    w.put(0, 24);
    w.put(0, 24);
    w.put(0, 24);
    w.put(0, 6);
    w.put(0, 8);
    w.put(0, 3);
    w.put(0, 1);

    // Mappings: one, single submap, no coupling.
    w.put(0, 6);
    w.put(0, 16);
    w.put(0, 1);
    w.put(0, 1);
    w.put(0, 2);
    w.put(0, 8);
    w.put(0, 8);
    w.put(0, 8);

    // Modes: one, short blocks.
    w.put(0, 6);
    w.put(0, 1);
    w.put(0, 16);
    w.put(0, 16);
    w.put(0, 8);

    // Framing.
    w.put(1, 1);
    w.bytes
}

/// One Ogg page with its checksum filled in.
pub fn ogg_page(sequence: u32, granule: i64, flags: u8, packets: &[&[u8]]) -> Vec<u8> {
    let mut lacing = Vec::new();
    let mut body = Vec::new();
    for packet in packets {
        let mut len = packet.len();
        while len >= 255 {
            lacing.push(255);
            len -= 255;
        }
        lacing.push(len as u8);
        body.extend_from_slice(packet);
    }

    let mut page = b"OggS".to_vec();
    page.push(0);
    page.push(flags);
    page.extend_from_slice(&granule.to_le_bytes());
    page.extend_from_slice(&VORBIS_SERIAL.to_le_bytes());
    page.extend_from_slice(&sequence.to_le_bytes());
    page.extend_from_slice(&[0; 4]);
    page.push(lacing.len() as u8);
    page.extend_from_slice(&lacing);
    page.extend_from_slice(&body);

    let sum = crc::crc32_ogg(&page);
    page[22..26].copy_from_slice(&sum.to_le_bytes());
    page
}

/// A silent Ogg Vorbis file of `packets` audio packets, 25 to a page. It
/// decodes to `(packets - 1) * 128` frames. Packets whose index is in
/// `broken` are replaced by one the decoder rejects; granule positions are
/// written as if they were intact.
pub fn write_vorbis(rate: u32, channels: u8, packets: usize, broken: &[usize]) -> Vec<u8> {
    let ident = vorbis_ident(rate, channels);
    let comment = vorbis_comment();
    let setup = vorbis_setup();

    let mut file = ogg_page(0, 0, 0x02, &[&ident]);
    file.extend(ogg_page(1, 0, 0x00, &[&comment, &setup]));

    let audio: Vec<&[u8]> = (0..packets)
        .map(|i| {
            if broken.contains(&i) {
                VORBIS_BAD_PACKET
            } else {
                &[0x00][..]
            }
        })
        .collect();

    let pages = (packets + VORBIS_PACKETS_PER_PAGE - 1) / VORBIS_PACKETS_PER_PAGE;
    for (index, chunk) in audio.chunks(VORBIS_PACKETS_PER_PAGE).enumerate() {
        let last_packet = (index * VORBIS_PACKETS_PER_PAGE + chunk.len() - 1) as i64;
        let granule = last_packet * VORBIS_PACKET_FRAMES as i64;
        let flags = if index + 1 == pages { 0x04 } else { 0x00 };
        file.extend(ogg_page(index as u32 + 2, granule, flags, chunk));
    }
    file
}

/// Byte offsets of every page in an Ogg file.
pub fn ogg_page_offsets(file: &[u8]) -> Vec<usize> {
    let mut offsets = Vec::new();
    let mut at = 0;
    while at + 27 <= file.len() && &file[at..at + 4] == b"OggS" {
        offsets.push(at);
        let segments = file[at + 26] as usize;
        let body: usize = file[at + 27..at + 27 + segments]
            .iter()
            .map(|&l| l as usize)
            .sum();
        at += 27 + segments + body;
    }
    offsets
}

// ============================================================================
// MPEG writer (silent layer III)
// ============================================================================

/// MPEG-1 layer III, 128 kbps, 44.1 kHz, stereo, unpadded.
pub const MP3_HEADER: [u8; 4] = [0xFF, 0xFB, 0x90, 0x04];
pub const MP3_FRAME_LEN: usize = 417;
pub const MP3_FRAME_SAMPLES: u64 = 1152;
pub const MP3_RATE: u32 = 44100;

/// A frame with zeroed side info and no main data decodes to silence.
fn mp3_frame() -> Vec<u8> {
    let mut frame = MP3_HEADER.to_vec();
    frame.resize(MP3_FRAME_LEN, 0);
    frame
}

/// `frames` silent frames. `info_tag` prepends an Info frame stating the
/// count; `tags` wraps the audio in ID3v2 and ID3v1 tags.
pub fn write_mp3(frames: usize, info_tag: bool, tags: bool) -> Vec<u8> {
    let mut file = Vec::new();
    if tags {
        file.extend_from_slice(b"ID3\x04\x00\x00");
        file.extend_from_slice(&[0, 0, 0, 100]);
        file.resize(10 + 100, 0);
    }
    if info_tag {
        let mut frame = mp3_frame();
        // After the header and 32 bytes of stereo side info.
        frame[36..40].copy_from_slice(b"Info");
        frame[40..44].copy_from_slice(&1u32.to_be_bytes());
        frame[44..48].copy_from_slice(&(frames as u32).to_be_bytes());
        file.extend(frame);
    }
    for _ in 0..frames {
        file.extend(mp3_frame());
    }
    if tags {
        let mut v1 = b"TAG".to_vec();
        v1.resize(128, 0);
        file.extend(v1);
    }
    file
}
