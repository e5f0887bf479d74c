//! Tests for driving a decoder into an output sink.

mod common;

use common::*;
use core_playback::{pump, DecoderConfig, MemorySink, PlaybackError, Result, Sink, SinkFormat};
use mockall::{mock, predicate::*};
use std::sync::{Arc, Mutex};

mock! {
    pub AudioSink {}

    impl Sink for AudioSink {
        fn configure(&mut self, format: SinkFormat) -> Result<()>;
        fn write(&mut self, pcm: &[u8]) -> Result<usize>;
        fn volume(&self) -> f32;
        fn set_volume(&mut self, volume: f32) -> Result<()>;
        fn close(&mut self) -> Result<()>;
    }
}

const RATE: u32 = 22050;

fn stereo_format() -> SinkFormat {
    SinkFormat {
        sample_rate: RATE,
        channels: 2,
        bits_per_sample: 16,
    }
}

// ============================================================================
// Mocked sink
// ============================================================================

#[test]
fn test_pump_configures_with_decoder_format() {
    let frames = 441 * 3;
    let mut decoder = toy_decoder(write_toy(RATE, 2, frames, true), DecoderConfig::default()).unwrap();

    let mut sink = MockAudioSink::new();
    sink.expect_configure()
        .with(eq(stereo_format()))
        .times(1)
        .returning(|_| Ok(()));
    sink.expect_write().returning(|pcm| Ok(pcm.len()));

    let total = pump(&mut decoder, &mut sink, 1024).unwrap();
    assert_eq!(total, frames * 4);
}

#[test]
fn test_partial_writes_are_resubmitted() {
    let frames = 2000;
    let mut decoder = toy_decoder(write_toy(RATE, 2, frames, true), DecoderConfig::default()).unwrap();

    let written = Arc::new(Mutex::new(Vec::new()));
    let collected = written.clone();

    let mut sink = MockAudioSink::new();
    sink.expect_configure().returning(|_| Ok(()));
    sink.expect_write().returning(move |pcm| {
        let take = pcm.len().min(333);
        collected.lock().unwrap().extend_from_slice(&pcm[..take]);
        Ok(take)
    });

    let total = pump(&mut decoder, &mut sink, 4096).unwrap();
    assert_eq!(total, frames * 4);
    assert_eq!(*written.lock().unwrap(), toy_pcm(2, 0, frames));
}

#[test]
fn test_sink_error_stops_pump() {
    let mut decoder = toy_decoder(write_toy(RATE, 2, 441 * 10, true), DecoderConfig::default()).unwrap();

    let mut calls = 0;
    let mut sink = MockAudioSink::new();
    sink.expect_configure().returning(|_| Ok(()));
    sink.expect_write().returning(move |pcm| {
        calls += 1;
        if calls > 2 {
            Err(PlaybackError::SinkError("device unplugged".to_string()))
        } else {
            Ok(pcm.len())
        }
    });

    let err = pump(&mut decoder, &mut sink, 512).unwrap_err();
    assert!(matches!(err, PlaybackError::SinkError(ref msg) if msg == "device unplugged"));
    // Two chunks reached the sink and the third was read from the decoder.
    assert!((decoder.time() - 3.0 * 512.0 / 4.0 / RATE as f64).abs() < 1e-9);
}

#[test]
fn test_stalled_sink_is_an_error() {
    let mut decoder = toy_decoder(write_toy(RATE, 1, 441, true), DecoderConfig::default()).unwrap();

    let mut sink = MockAudioSink::new();
    sink.expect_configure().returning(|_| Ok(()));
    sink.expect_write().times(1).returning(|_| Ok(0));

    assert!(matches!(
        pump(&mut decoder, &mut sink, 256),
        Err(PlaybackError::SinkError(_))
    ));
}

#[test]
fn test_configure_failure_reads_nothing() {
    let mut decoder = toy_decoder(write_toy(RATE, 1, 441, true), DecoderConfig::default()).unwrap();

    let mut sink = MockAudioSink::new();
    sink.expect_configure()
        .returning(|_| Err(PlaybackError::SinkError("no device".to_string())));
    sink.expect_write().never();

    assert!(pump(&mut decoder, &mut sink, 256).is_err());
    assert_eq!(decoder.time(), 0.0);
}

// ============================================================================
// Memory sink
// ============================================================================

#[test]
fn test_memory_sink_collects_everything() {
    let frames = RATE as u64 * 2;
    let file = write_toy(RATE, 2, frames, true);

    let mut decoder = toy_decoder(file.clone(), DecoderConfig::default()).unwrap();
    let mut sink = MemorySink::new();
    let total = pump(&mut decoder, &mut sink, 3000).unwrap();
    sink.close().unwrap();

    assert_eq!(total, frames * 4);
    assert_eq!(sink.format(), Some(stereo_format()));
    assert!((sink.duration() - 2.0).abs() < 1e-9);
    assert!(sink.is_closed());

    let mut reference = toy_decoder(file, DecoderConfig::default()).unwrap();
    assert_eq!(sink.into_data(), drain(&mut reference, 4096));
}

#[test]
fn test_pump_after_seek_starts_at_target() {
    let frames = RATE as u64;
    let mut decoder = toy_decoder(write_toy(RATE, 1, frames, true), DecoderConfig::default()).unwrap();
    decoder.seek(0.5, false).unwrap();

    let mut sink = MemorySink::default();
    pump(&mut decoder, &mut sink, 1000).unwrap();
    assert_eq!(sink.data(), toy_pcm(1, frames / 2, frames).as_slice());
}

#[test]
fn test_closed_memory_sink_rejects_pump() {
    let mut decoder = toy_decoder(write_toy(RATE, 1, 441, true), DecoderConfig::default()).unwrap();
    let mut sink = MemorySink::new();
    sink.close().unwrap();

    assert!(matches!(
        pump(&mut decoder, &mut sink, 256),
        Err(PlaybackError::SinkError(_))
    ));
}
