//! Muxer error types.

use dm_common::DemuxError;
use thiserror::Error;

/// Errors that can occur while assembling an output file.
#[derive(Error, Debug)]
pub enum MuxError {
    /// A required box is absent or malformed.
    #[error("Structural error: {0}")]
    Structural(String),

    /// The progressive output is too small to be a usable file.
    #[error("Progressive output too small: {size} bytes (minimum {min})")]
    BuildTooSmall { size: usize, min: usize },

    /// The fragmented output failed the size plausibility check.
    #[error("Implausible output size: {size} bytes (expected more than {expected})")]
    Implausible { size: usize, expected: usize },

    /// Track-related error (e.g. missing video track, unusable samples).
    #[error("Track error: {0}")]
    TrackError(String),

    /// A value exceeded the range of its box field.
    #[error("Buffer full: {0}")]
    BufferFull(String),

    #[error(transparent)]
    Demux(#[from] DemuxError),

    /// I/O error while writing into the output buffer.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Convenience Result type for mux operations.
pub type MuxResult<T> = Result<T, MuxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mux_error_display_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short write");
        let mux_err = MuxError::from(io_err);
        assert!(mux_err.to_string().contains("IO error"));
        assert!(mux_err.to_string().contains("short write"));
    }

    #[test]
    fn mux_error_display_structural() {
        let err = MuxError::Structural("video buffer has no moov".into());
        assert_eq!(err.to_string(), "Structural error: video buffer has no moov");
    }

    #[test]
    fn mux_error_display_size_checks() {
        let err = MuxError::BuildTooSmall { size: 100, min: 1024 };
        assert_eq!(
            err.to_string(),
            "Progressive output too small: 100 bytes (minimum 1024)"
        );
        let err = MuxError::Implausible { size: 50, expected: 90 };
        assert_eq!(
            err.to_string(),
            "Implausible output size: 50 bytes (expected more than 90)"
        );
    }

    #[test]
    fn mux_error_from_demux_error() {
        let err: MuxError = DemuxError::NoVideoTrack.into();
        assert!(matches!(err, MuxError::Demux(DemuxError::NoVideoTrack)));
        assert_eq!(err.to_string(), DemuxError::NoVideoTrack.to_string());
    }

    #[test]
    fn mux_error_display_track_error() {
        let err = MuxError::TrackError("no video samples".into());
        assert_eq!(err.to_string(), "Track error: no video samples");
    }
}
