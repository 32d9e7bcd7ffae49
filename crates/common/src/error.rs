//! Central error types for the engine (thiserror-based).

use thiserror::Error;

/// Container parsing and sample extraction errors.
#[derive(Error, Debug)]
pub enum DemuxError {
    #[error("Invalid box at offset {offset}: {reason}")]
    InvalidStructure { offset: u64, reason: String },

    #[error("Required box '{0}' not found")]
    MissingBox(&'static str),

    #[error("No video track found")]
    NoVideoTrack,

    #[error("No audio track found")]
    NoAudioTrack,

    #[error("Track {0} not found in source")]
    UnknownTrack(u32),

    #[error("Truncated data: expected {expected} bytes, got {got}")]
    TruncatedData { expected: usize, got: usize },

    /// Failure reported by a sample source while it was still producing batches.
    #[error("Sample source failed: {0}")]
    Source(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type for demux operations.
pub type DemuxResult<T> = Result<T, DemuxError>;

/// Rejected `MuxConfig` value.
#[derive(Error, Debug, PartialEq)]
#[error("Invalid mux config: {0}")]
pub struct ConfigError(pub String);
