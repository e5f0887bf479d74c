//! # Playback Error Types
//!
//! Error taxonomy shared by the decode core and every backend.

use thiserror::Error;

/// Errors that can occur while opening, decoding or seeking a stream.
#[derive(Error, Debug)]
pub enum PlaybackError {
    // ========================================================================
    // Open Errors
    // ========================================================================
    /// The file or stream could not be opened or read at all.
    #[error("Failed to open audio source: {0}")]
    OpenFailed(String),

    /// No backend recognises the container.
    #[error("Unsupported or invalid container: {0}")]
    UnsupportedContainer(String),

    /// The container holds no decodable audio stream.
    #[error("No audio stream found: {0}")]
    NoAudioStream(String),

    /// The codec inside the container has no decoder.
    #[error("Unsupported codec: {0}")]
    UnsupportedCodec(String),

    // ========================================================================
    // Decoding Errors
    // ========================================================================
    /// A unit could not be parsed but decoding can resume further on.
    #[error("Recoverable parse error: {0}")]
    RecoverableParse(String),

    /// The stream is corrupt beyond recovery; the session is over.
    #[error("Fatal parse error: {0}")]
    FatalParse(String),

    /// Bit depth or channel layout the sample packer cannot represent.
    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),

    // ========================================================================
    // Seek Errors
    // ========================================================================
    /// Seek target outside `[0, length]`.
    #[error("Seek target {target:.3}s is out of range (length {length:?})")]
    OutOfRange { target: f64, length: Option<f64> },

    /// The backend could not reposition the stream.
    #[error("Seek failed: {0}")]
    SeekFailed(String),

    /// The session hit a fatal error earlier and cannot be repositioned.
    #[error("Decode session terminated by an earlier fatal error")]
    SessionTerminated,

    // ========================================================================
    // Output Errors
    // ========================================================================
    /// Invalid volume value (must be in range [0.0, 1.0]).
    #[error("Invalid volume: {0} (must be between 0.0 and 1.0)")]
    InvalidVolume(f32),

    /// The audio sink rejected a buffer or configuration.
    #[error("Audio sink error: {0}")]
    SinkError(String),

    // ========================================================================
    // Generic Errors
    // ========================================================================
    /// Invalid decoder configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error (should not occur in normal operation).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PlaybackError {
    /// Returns `true` if this error was raised while opening a stream.
    pub fn is_open_error(&self) -> bool {
        matches!(
            self,
            PlaybackError::OpenFailed(_)
                | PlaybackError::UnsupportedContainer(_)
                | PlaybackError::NoAudioStream(_)
                | PlaybackError::UnsupportedCodec(_)
        )
    }

    /// Returns `true` if decoding can continue after skipping forward.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, PlaybackError::RecoverableParse(_))
    }

    /// Returns `true` if this error ends a decode session.
    pub fn ends_session(&self) -> bool {
        matches!(
            self,
            PlaybackError::FatalParse(_)
                | PlaybackError::Io(_)
                | PlaybackError::UnsupportedFormat(_)
                | PlaybackError::Internal(_)
        )
    }
}

impl From<core_runtime::Error> for PlaybackError {
    fn from(err: core_runtime::Error) -> Self {
        PlaybackError::Config(err.to_string())
    }
}

/// Result type for playback operations.
pub type Result<T> = std::result::Result<T, PlaybackError>;
