//! # Configuration Loading
//!
//! JSON configuration files for the player. Each crate owns its own typed
//! configuration struct (with serde defaults); this module only knows how to
//! turn a file or string into one of them.
//!
//! ```ignore
//! use core_runtime::config::load_json_file;
//! use core_playback::DecoderConfig;
//!
//! let config: DecoderConfig = load_json_file("decoder.json")?;
//! ```

use crate::error::{Error, Result};
use crate::logging::LoggingConfig;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Parse a configuration value from a JSON string.
///
/// # Errors
///
/// Returns [`Error::Config`] with the line and column of the first problem.
pub fn from_json_str<T: DeserializeOwned>(json: &str) -> Result<T> {
    serde_json::from_str(json).map_err(|e| {
        Error::Config(format!(
            "invalid configuration at line {} column {}: {}",
            e.line(),
            e.column(),
            e
        ))
    })
}

/// Read and parse a JSON configuration file.
///
/// # Errors
///
/// Returns [`Error::ConfigIo`] if the file cannot be read and
/// [`Error::Config`] if it does not parse.
pub fn load_json_file<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| Error::ConfigIo {
        path: path.display().to_string(),
        source,
    })?;
    debug!(bytes = text.len(), "Loaded configuration file");
    from_json_str(&text)
}

/// Read a JSON configuration file if it exists, otherwise return defaults.
pub fn load_json_file_or_default<T: DeserializeOwned + Default>(
    path: impl AsRef<Path>,
) -> Result<T> {
    let path = path.as_ref();
    if path.exists() {
        load_json_file(path)
    } else {
        debug!("No configuration file, using defaults");
        Ok(T::default())
    }
}

/// Runtime section of the player configuration file.
///
/// Unknown top-level sections are ignored so that the same file can carry the
/// decoder's settings next to these.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl RuntimeConfig {
    /// Load from `path` (or defaults when absent) and apply the `TONEARM_*`
    /// logging overrides from the environment.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let mut config: RuntimeConfig = load_json_file_or_default(path)?;
        config.logging = config.logging.with_env_overrides()?;
        Ok(config)
    }
}
