use std::io;
use thiserror::Error;

/// Errors returned by player API calls.
///
/// Playback faults observed while a stream is running are not reported through
/// this type; they are described by [`crate::StreamError`] values and drive the
/// player state machine instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlayerError {
    #[error("Invalid source URL: {url}")]
    InvalidSource { url: String },

    #[error("Decoder module failed to load: {reason}")]
    DecoderLoad { reason: String },

    #[error("Decoder creation failed: {reason}")]
    DecoderCreation { reason: String },

    #[error("Decoder is not supported on this device")]
    DecoderUnsupported,

    #[error("Playback rejected by media element: {reason}")]
    PlaybackRejected { reason: String },

    #[error("No source has been loaded")]
    NoSource,

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("IO error: {0}")]
    Io(String),
}

impl From<io::Error> for PlayerError {
    fn from(error: io::Error) -> Self {
        PlayerError::Io(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PlayerError>;
