//! # Core Runtime Module
//!
//! Foundational runtime infrastructure shared by the decoding crates:
//! - Logging and tracing bootstrap
//! - JSON configuration loading with environment overrides
//!
//! Nothing in here knows about audio. Library crates only emit `tracing`
//! events; the host application decides whether and how they are rendered by
//! calling [`logging::init_logging`] once at startup.

pub mod config;
pub mod error;
pub mod logging;

pub use error::{Error, Result};
