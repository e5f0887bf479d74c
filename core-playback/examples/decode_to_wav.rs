//! Decode any supported file into a 16/24-bit WAV file.
//!
//! Run with:
//! ```bash
//! cargo run --example decode_to_wav -- input.flac output.wav
//!
//! # Start two seconds in, with debug logs as JSON
//! TONEARM_LOG=debug TONEARM_LOG_FORMAT=json \
//!     cargo run --example decode_to_wav -- input.ogg output.wav 2.0
//! ```

use core_playback::{pump, Decoder, DecoderConfig, MemorySink, SinkFormat};
use core_runtime::logging::{init_logging, LoggingConfig};
use std::env;
use std::fs;
use std::process::ExitCode;
use tracing::{error, info};

fn wav_header(format: SinkFormat, data_len: u32) -> Vec<u8> {
    // 24-bit output is packed in 4-byte containers.
    let container_bits = if format.bits_per_sample == 24 {
        32
    } else {
        format.bits_per_sample as u16
    };
    let block_align = format.channels as u16 * container_bits / 8;

    let mut header = Vec::with_capacity(44);
    header.extend_from_slice(b"RIFF");
    header.extend_from_slice(&(36 + data_len).to_le_bytes());
    header.extend_from_slice(b"WAVEfmt ");
    header.extend_from_slice(&16u32.to_le_bytes());
    header.extend_from_slice(&1u16.to_le_bytes());
    header.extend_from_slice(&(format.channels as u16).to_le_bytes());
    header.extend_from_slice(&format.sample_rate.to_le_bytes());
    header.extend_from_slice(&(format.sample_rate * block_align as u32).to_le_bytes());
    header.extend_from_slice(&block_align.to_le_bytes());
    header.extend_from_slice(&container_bits.to_le_bytes());
    header.extend_from_slice(b"data");
    header.extend_from_slice(&data_len.to_le_bytes());
    header
}

fn run(input: &str, output: &str, start: Option<f64>) -> Result<(), Box<dyn std::error::Error>> {
    let mut decoder = Decoder::open_with_config(input, DecoderConfig::default())?;
    info!(
        backend = decoder.backend_name(),
        length = ?decoder.length(),
        "Opened {}",
        input
    );

    if let Some(start) = start {
        decoder.seek(start, false)?;
    }

    let mut sink = MemorySink::new();
    let bytes = pump(&mut decoder, &mut sink, 16 * 1024)?;
    if let Some(err) = decoder.last_error() {
        error!("Output is truncated: {}", err);
    }

    let format = sink.format().ok_or("sink was never configured")?;
    let seconds = sink.duration();
    let mut file = wav_header(format, u32::try_from(bytes)?);
    file.extend_from_slice(&sink.into_data());
    fs::write(output, file)?;

    info!(bytes, seconds, "Wrote {}", output);
    decoder.close();
    Ok(())
}

fn main() -> ExitCode {
    let config = LoggingConfig::from_env().unwrap_or_default();
    if let Err(e) = init_logging(config) {
        eprintln!("Logging disabled: {}", e);
    }

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        eprintln!("usage: {} <input> <output.wav> [start-seconds]", args[0]);
        return ExitCode::FAILURE;
    }
    let start = match args.get(3).map(|s| s.parse::<f64>()) {
        Some(Ok(start)) => Some(start),
        Some(Err(e)) => {
            eprintln!("bad start time: {}", e);
            return ExitCode::FAILURE;
        }
        None => None,
    };

    match run(&args[1], &args[2], start) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Decoding failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
