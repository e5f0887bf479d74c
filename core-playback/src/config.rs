//! # Decoder Configuration
//!
//! Tuning knobs for a decode session. Every field has a serde default so a
//! configuration file only needs to name what it changes.

use crate::error::{PlaybackError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Decode session configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecoderConfig {
    /// Size of the compressed input window in bytes.
    ///
    /// A backend may raise this to twice its largest unit (an Ogg page can be
    /// 64 KiB), never lower it.
    ///
    /// Default: 40960 (5 × 8 KiB).
    #[serde(default = "default_window_bytes")]
    pub window_bytes: usize,

    /// Zeroed bytes kept after the last byte of the stream.
    ///
    /// Default: 8.
    #[serde(default = "default_guard_bytes")]
    pub guard_bytes: usize,

    /// Consecutive recoverable errors tolerated before the session fails.
    ///
    /// Default: 10.
    #[serde(default = "default_max_recoverable_errors")]
    pub max_recoverable_errors: u32,

    /// Scan the stream at open time when the backend has no exact length.
    ///
    /// Default: true.
    #[serde(default = "default_estimate_length")]
    pub estimate_length: bool,

    /// Seconds of audio the length estimator scans before extrapolating.
    ///
    /// Default: 420 seconds.
    #[serde(default = "default_estimate_cap_secs")]
    pub estimate_cap_secs: f64,

    /// Output rate of the container backend, whose output is always stereo
    /// 16-bit.
    ///
    /// Default: 44100 Hz.
    #[serde(default = "default_output_sample_rate")]
    pub output_sample_rate: u32,

    /// Resampler output block in frames.
    ///
    /// Default: 1024 frames.
    #[serde(default = "default_resample_chunk_frames")]
    pub resample_chunk_frames: usize,

    /// PCM bytes requested per `decode` call by [`crate::sink::pump`].
    ///
    /// Default: 4096 bytes.
    #[serde(default = "default_pump_chunk_bytes")]
    pub pump_chunk_bytes: usize,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            window_bytes: default_window_bytes(),
            guard_bytes: default_guard_bytes(),
            max_recoverable_errors: default_max_recoverable_errors(),
            estimate_length: default_estimate_length(),
            estimate_cap_secs: default_estimate_cap_secs(),
            output_sample_rate: default_output_sample_rate(),
            resample_chunk_frames: default_resample_chunk_frames(),
            pump_chunk_bytes: default_pump_chunk_bytes(),
        }
    }
}

impl DecoderConfig {
    /// Configuration for opening many files quickly (library scans, gapless
    /// preloading): no length estimation.
    pub fn fast_open() -> Self {
        Self {
            estimate_length: false,
            ..Default::default()
        }
    }

    /// Configuration that scans whole files for an exact length.
    pub fn exact_length() -> Self {
        Self {
            estimate_length: true,
            estimate_cap_secs: f64::INFINITY,
            ..Default::default()
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.window_bytes < 1024 {
            return Err("window_bytes must be at least 1024".to_string());
        }

        if self.max_recoverable_errors == 0 {
            return Err("max_recoverable_errors must be > 0".to_string());
        }

        if self.estimate_cap_secs.is_nan() || self.estimate_cap_secs <= 0.0 {
            return Err("estimate_cap_secs must be > 0".to_string());
        }

        if !(8000..=384_000).contains(&self.output_sample_rate) {
            return Err("output_sample_rate must be between 8000 and 384000".to_string());
        }

        if self.resample_chunk_frames < 64 {
            return Err("resample_chunk_frames must be at least 64".to_string());
        }

        if self.pump_chunk_bytes == 0 {
            return Err("pump_chunk_bytes must be > 0".to_string());
        }

        Ok(())
    }

    /// Load from a JSON file. The file may hold either the bare decoder
    /// object or a player configuration with a `"decoder"` section.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let file: ConfigFile = core_runtime::config::load_json_file(path)?;
        let config = file.into_decoder_config();
        config.validate().map_err(PlaybackError::Config)?;
        Ok(config)
    }

    /// Parse from a JSON string, same shapes as [`Self::from_json_file`].
    pub fn from_json_str(json: &str) -> Result<Self> {
        let file: ConfigFile = core_runtime::config::from_json_str(json)?;
        let config = file.into_decoder_config();
        config.validate().map_err(PlaybackError::Config)?;
        Ok(config)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ConfigFile {
    Sectioned { decoder: DecoderConfig },
    Bare(DecoderConfig),
}

impl ConfigFile {
    fn into_decoder_config(self) -> DecoderConfig {
        match self {
            ConfigFile::Sectioned { decoder } => decoder,
            ConfigFile::Bare(decoder) => decoder,
        }
    }
}

// ============================================================================
// Default Functions (for serde)
// ============================================================================

fn default_window_bytes() -> usize {
    5 * 8192
}

fn default_guard_bytes() -> usize {
    8
}

fn default_max_recoverable_errors() -> u32 {
    10
}

fn default_estimate_length() -> bool {
    true
}

fn default_estimate_cap_secs() -> f64 {
    420.0 // 7 minutes
}

fn default_output_sample_rate() -> u32 {
    44100
}

fn default_resample_chunk_frames() -> usize {
    1024
}

fn default_pump_chunk_bytes() -> usize {
    4096
}
