//! Error types for the waveform pipeline.

use thiserror::Error;

/// Errors that can occur while extracting or resampling a waveform.
///
/// Cancellation is deliberately absent: a cancelled extraction is reported
/// through [`crate::DecodeOutcome::Cancelled`] and [`crate::JobStatus::Cancelled`].
#[derive(Debug, Error)]
pub enum WaveformError {
    #[error("No audio track found ({track_count} tracks in source)")]
    NoAudioTrack { track_count: usize },

    #[error("Decode failed: {0}")]
    Decode(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unsupported audio source: {0}")]
    UnsupportedSource(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Player error: {0}")]
    Player(String),

    #[error("Extraction job already started")]
    AlreadyStarted,

    #[error("Malformed waveform record: {0}")]
    Record(String),
}

impl From<symphonia::core::errors::Error> for WaveformError {
    fn from(err: symphonia::core::errors::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, WaveformError>;
