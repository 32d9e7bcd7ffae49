//! Progress events reported while remuxing.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which form the final output took.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputKind {
    /// Non-fragmented file built from collected samples.
    Progressive,
    /// Merged init segment followed by the source fragments.
    Fragmented,
    /// The unmodified video input (last-resort fallback).
    RawVideo,
}

impl fmt::Display for OutputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Progressive => f.write_str("progressive"),
            Self::Fragmented => f.write_str("fragmented"),
            Self::RawVideo => f.write_str("raw video"),
        }
    }
}

/// Stage notifications. `Display` renders the human-readable stage description.
#[derive(Clone, Debug, PartialEq)]
pub enum MuxProgress {
    /// Sample collection started for `tracks` tracks.
    Collecting { tracks: usize },
    /// Collection finished; `complete` is false for timed-out or short sources.
    Collected { samples: usize, complete: bool },
    BuildingProgressive,
    BuildingFragmented,
    /// A strategy was abandoned and the next one will run.
    FallingBack { from: OutputKind, reason: String },
    Done { strategy: OutputKind, bytes: usize },
}

impl fmt::Display for MuxProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Collecting { tracks } => write!(f, "Collecting samples from {tracks} track(s)"),
            Self::Collected { samples, complete } => {
                if *complete {
                    write!(f, "Collected {samples} samples")
                } else {
                    write!(f, "Collected {samples} samples (partial)")
                }
            }
            Self::BuildingProgressive => f.write_str("Building progressive MP4"),
            Self::BuildingFragmented => f.write_str("Assembling fragmented MP4"),
            Self::FallingBack { from, reason } => {
                write!(f, "{from} output failed ({reason}), falling back")
            }
            Self::Done { strategy, bytes } => write!(f, "Done: {bytes} bytes ({strategy})"),
        }
    }
}
