//! Track and sample model shared between the demuxer, the collector and the builders.

use serde::{Deserialize, Serialize};

/// Movie-level timescale used for `mvhd` and `tkhd` durations (1 tick = 1 ms).
pub const MOVIE_TIMESCALE: u32 = 1000;

/// The two track kinds the engine combines.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackKind {
    Video,
    Audio,
}

impl TrackKind {
    /// `hdlr` handler type for this kind.
    pub fn handler_type(self) -> [u8; 4] {
        match self {
            Self::Video => *b"vide",
            Self::Audio => *b"soun",
        }
    }

    /// Track ID the engine assigns in its output (video 1, audio 2).
    pub fn output_track_id(self) -> u32 {
        match self {
            Self::Video => 1,
            Self::Audio => 2,
        }
    }

    /// Map an `hdlr` handler type to a kind. Other handlers (hint, text, meta) are ignored.
    pub fn from_handler(handler: &[u8; 4]) -> Option<Self> {
        match handler {
            b"vide" => Some(Self::Video),
            b"soun" => Some(Self::Audio),
            _ => None,
        }
    }
}

/// Media properties of a track, fixed at the demuxer boundary.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackMedia {
    Video { width: u16, height: u16 },
    Audio { channels: u16, sample_rate: u32 },
}

impl TrackMedia {
    pub fn kind(&self) -> TrackKind {
        match self {
            Self::Video { .. } => TrackKind::Video,
            Self::Audio { .. } => TrackKind::Audio,
        }
    }
}

/// A single demuxed access unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sample {
    pub data: Vec<u8>,
    /// Duration in track timescale ticks.
    pub duration: u32,
    /// Decode timestamp in track timescale ticks.
    pub dts: u64,
    /// Composition timestamp in track timescale ticks.
    pub cts: i64,
    pub is_sync: bool,
}

impl Sample {
    /// `cts - dts`, the value stored in `ctts`.
    pub fn composition_offset(&self) -> i64 {
        self.cts.saturating_sub(self.dts as i64)
    }
}

/// Structured sample entry, used when no raw `stsd` bytes are available.
///
/// `config_boxes` holds the already serialized codec configuration children
/// (`avcC`, `hvcC`, `esds`, `dOps`, ...) and is copied verbatim after the
/// fixed VisualSampleEntry/AudioSampleEntry fields.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SampleEntry {
    pub format: [u8; 4],
    pub data_reference_index: u16,
    pub config_boxes: Vec<u8>,
}

/// How a track's sample description reaches the output.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum SampleDescription {
    /// Complete `stsd` box bytes, copied byte-for-byte.
    Raw(Vec<u8>),
    Structured(SampleEntry),
    /// No description available. The output is structurally valid but not playable.
    #[default]
    Missing,
}

/// Everything collected for one track.
#[derive(Clone, Debug)]
pub struct CollectedTrack {
    /// Track ID in the source file.
    pub id: u32,
    pub media: TrackMedia,
    pub timescale: u32,
    /// Duration in track timescale. `None` means "recompute from the samples".
    pub duration: Option<u64>,
    pub description: SampleDescription,
    pub samples: Vec<Sample>,
}

impl CollectedTrack {
    pub fn kind(&self) -> TrackKind {
        self.media.kind()
    }

    /// Sum of sample durations in track timescale.
    pub fn sample_duration_sum(&self) -> u64 {
        self.samples.iter().map(|s| s.duration as u64).sum()
    }

    /// Declared duration, or the sample sum when it is absent or zero.
    pub fn effective_duration(&self) -> u64 {
        match self.duration {
            Some(d) if d > 0 => d,
            _ => self.sample_duration_sum(),
        }
    }

    /// Duration rescaled to `MOVIE_TIMESCALE`.
    pub fn movie_duration(&self) -> u64 {
        if self.timescale == 0 {
            return 0;
        }
        (self.effective_duration() as u128 * MOVIE_TIMESCALE as u128 / self.timescale as u128)
            as u64
    }
}
