//! # Ogg Vorbis Backend
//!
//! Ogg pages are framed and checksummed here; packets are reassembled across
//! pages and handed to lewton's packet decoder. One page is one decode unit.
//!
//! Length comes from the granule position of the last page. Seeking jumps
//! proportionally through the payload; the core then drops bytes up to the
//! next capture pattern and the packet that straddles it.

mod page;

use self::page::{PageParse, PageReader, MAX_PAGE_LEN};
use crate::error::{PlaybackError, Result};
use crate::stream::{read_full, MediaStream};
use crate::traits::{
    Backend, DecodeMode, DecodedUnit, InputWindow, RawSamples, SeekTarget, StreamProperties,
    UnitOutcome,
};
use lewton::audio::{read_audio_packet, PreviousWindowRight};
use lewton::header::{
    read_header_comment, read_header_ident, read_header_setup, IdentHeader, SetupHeader,
};
use std::io::SeekFrom;
use std::mem;
use tracing::{debug, error, info, instrument, warn};

const OUTPUT_BITS: u32 = 16;
const HEADER_PACKETS: usize = 3;

pub struct VorbisBackend {
    ident: IdentHeader,
    setup: SetupHeader,
    serial: u32,
    data_offset: u64,
    stream_len: u64,
    duration: Option<f64>,
    window_state: PreviousWindowRight,
    /// Start of a packet continued on the next page.
    partial: Vec<u8>,
    last_granule: Option<u64>,
    finished: bool,
}

impl VorbisBackend {
    /// Read the identification, comment and setup headers and the final
    /// granule position. The stream is left at the first audio page.
    #[instrument(skip(stream))]
    pub fn open(stream: &mut dyn MediaStream) -> Result<Self> {
        let io_err = |e: std::io::Error| PlaybackError::OpenFailed(format!("Ogg stream: {}", e));

        stream.seek(SeekFrom::Start(0)).map_err(io_err)?;
        let headers = collect_header_packets(&mut PageReader::new(stream, 0))?;

        let header_err = |what: &str, e: lewton::header::HeaderReadError| {
            error!("Invalid Vorbis {} header: {}", what, e);
            PlaybackError::UnsupportedCodec(format!("Vorbis {} header: {}", what, e))
        };
        let ident = read_header_ident(&headers.packets[0]).map_err(|e| header_err("identification", e))?;
        read_header_comment(&headers.packets[1]).map_err(|e| header_err("comment", e))?;
        let setup = read_header_setup(
            &headers.packets[2],
            ident.audio_channels,
            (ident.blocksize_0, ident.blocksize_1),
        )
        .map_err(|e| header_err("setup", e))?;

        let stream_len = stream.total_len().map_err(io_err)?;
        let tail_start = stream_len
            .saturating_sub(MAX_PAGE_LEN as u64)
            .max(headers.data_offset);
        let mut tail = vec![0u8; (stream_len - tail_start) as usize];
        stream.seek(SeekFrom::Start(tail_start)).map_err(io_err)?;
        let tail_len = read_full(stream, &mut tail).map_err(io_err)?;
        let duration = page::last_granule(&tail[..tail_len], headers.serial)
            .map(|granule| granule as f64 / ident.audio_sample_rate as f64);

        stream
            .seek(SeekFrom::Start(headers.data_offset))
            .map_err(io_err)?;

        info!(
            channels = ident.audio_channels,
            sample_rate = ident.audio_sample_rate,
            nominal_bitrate = ident.bitrate_nominal,
            duration = ?duration,
            "Opened Ogg Vorbis stream"
        );

        Ok(Self {
            ident,
            setup,
            serial: headers.serial,
            data_offset: headers.data_offset,
            stream_len,
            duration,
            window_state: PreviousWindowRight::new(),
            partial: Vec::new(),
            last_granule: Some(0),
            finished: false,
        })
    }

    /// Granule spans are only known from the start or after the first page
    /// with a granule position.
    fn reset(&mut self, at_start: bool) {
        self.window_state = PreviousWindowRight::new();
        self.partial.clear();
        self.last_granule = at_start.then_some(0);
        self.finished = false;
    }
}

impl Backend for VorbisBackend {
    fn name(&self) -> &'static str {
        "vorbis"
    }

    fn properties(&self) -> StreamProperties {
        StreamProperties::new(
            self.ident.audio_channels as u32,
            self.ident.audio_sample_rate,
            OUTPUT_BITS,
        )
        .with_duration(self.duration)
    }

    fn max_unit_size(&self) -> usize {
        MAX_PAGE_LEN
    }

    fn data_offset(&self) -> u64 {
        self.data_offset
    }

    fn decode_unit(&mut self, window: InputWindow<'_>, mode: DecodeMode) -> UnitOutcome {
        if self.finished {
            return UnitOutcome::EndOfStream;
        }

        let data = window.data();
        let page = match page::parse_page(data) {
            PageParse::Parsed(page) => page,
            PageParse::Incomplete => return UnitOutcome::NeedMoreInput,
            PageParse::Invalid => {
                self.partial.clear();
                return UnitOutcome::recoverable(page::next_capture(data, 1), "lost Ogg page sync");
            }
        };

        if page.serial != self.serial {
            return UnitOutcome::Decoded(DecodedUnit::windowed(
                page.len(),
                0.0,
                RawSamples::empty(),
            ));
        }

        if !page.continued {
            self.partial.clear();
        }
        // After a seek the first piece belongs to a packet we never saw.
        let skip_first = page.continued && self.partial.is_empty();

        let channels = self.ident.audio_channels as usize;
        let mut planes: Vec<Vec<i32>> = vec![Vec::new(); channels];
        for (index, (range, complete)) in page.segments().into_iter().enumerate() {
            if index == 0 && skip_first {
                continue;
            }
            self.partial.extend_from_slice(&data[range]);
            if !complete {
                continue;
            }

            let packet = mem::take(&mut self.partial);
            if mode == DecodeMode::HeadersOnly {
                continue;
            }
            match read_audio_packet(&self.ident, &self.setup, &packet, &mut self.window_state) {
                Ok(pcm) => {
                    for (plane, channel) in planes.iter_mut().zip(pcm) {
                        plane.extend(channel.into_iter().map(i32::from));
                    }
                }
                Err(e) => {
                    // The next packet restarts the overlap like the first one does.
                    warn!(sequence = page.sequence, "Dropping Vorbis packet: {}", e);
                    self.window_state = PreviousWindowRight::new();
                }
            }
        }

        let granule_span = match (self.last_granule, page.granule) {
            (Some(prev), Some(now)) => Some(now.saturating_sub(prev)),
            _ => None,
        };
        self.last_granule = page.granule.or(self.last_granule);
        self.finished = page.eos;

        let rate = self.ident.audio_sample_rate as f64;
        match mode {
            DecodeMode::HeadersOnly => {
                let duration = granule_span.map_or(0.0, |span| span as f64 / rate);
                UnitOutcome::Decoded(DecodedUnit::windowed(
                    page.len(),
                    duration,
                    RawSamples::empty(),
                ))
            }
            DecodeMode::Full => {
                let mut samples = RawSamples::new(planes);
                if page.eos {
                    if let Some(span) = granule_span {
                        // The last page ends before its final block does.
                        samples.truncate(span as usize);
                    }
                }
                let duration = samples.frames() as f64 / rate;
                UnitOutcome::Decoded(DecodedUnit::windowed(page.len(), duration, samples))
            }
        }
    }

    #[instrument(skip(self, stream), fields(seconds = target.seconds))]
    fn seek(&mut self, stream: &mut dyn MediaStream, target: SeekTarget) -> Result<()> {
        let offset = if target.seconds <= 0.0 {
            self.data_offset
        } else {
            target
                .proportional_offset(self.data_offset, self.stream_len)
                .ok_or_else(|| {
                    PlaybackError::SeekFailed("Vorbis stream length is unknown".to_string())
                })?
        };

        stream.seek(SeekFrom::Start(offset))?;
        self.reset(offset == self.data_offset);
        debug!(offset, "Vorbis seek resolved");
        Ok(())
    }

    fn close(&mut self) {
        self.reset(false);
    }
}

struct HeaderPackets {
    serial: u32,
    packets: Vec<Vec<u8>>,
    /// Offset of the first page after the headers.
    data_offset: u64,
}

/// Collect the three header packets of the first logical stream.
fn collect_header_packets(reader: &mut PageReader<'_>) -> Result<HeaderPackets> {
    let mut serial = None;
    let mut packets = Vec::with_capacity(HEADER_PACKETS);
    let mut partial = Vec::new();

    while packets.len() < HEADER_PACKETS {
        let (page, bytes) = reader
            .next_page()
            .map_err(|e| PlaybackError::UnsupportedContainer(format!("Ogg: {}", e)))?
            .ok_or_else(|| {
                PlaybackError::NoAudioStream("Ogg stream ends inside the Vorbis headers".to_string())
            })?;

        let wanted = *serial.get_or_insert_with(|| {
            debug!(serial = page.serial, bos = page.bos, "First Ogg logical stream");
            page.serial
        });
        if page.serial != wanted {
            continue;
        }

        for (range, complete) in page.segments() {
            partial.extend_from_slice(&bytes[range]);
            if complete && packets.len() < HEADER_PACKETS {
                packets.push(mem::take(&mut partial));
            }
        }
    }

    if !packets[0].starts_with(b"\x01vorbis") {
        return Err(PlaybackError::NoAudioStream(
            "first Ogg stream is not Vorbis".to_string(),
        ));
    }

    Ok(HeaderPackets {
        serial: serial.unwrap_or_default(),
        packets,
        data_offset: reader.offset,
    })
}
