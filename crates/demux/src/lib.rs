//! `dm-demux`: ISO BMFF reader and sample collection.
//!
//! Reads DASH video/audio buffers (fragmented or progressive MP4) and
//! gathers their samples for the progressive builder. Works entirely on
//! in-memory buffers; no file or network access.

pub mod collector;
pub mod mp4;
pub mod probe;
pub mod traits;

pub use collector::{
    collect_samples, CollectOutcome, Collection, Collector, CollectorHandle, CollectorState,
    TrackProgress,
};
pub use mp4::Mp4Demuxer;
pub use probe::{looks_like_mp4, probe_layout, Mp4Layout};
pub use traits::{SampleBatch, SampleSource, SourceTrack};
