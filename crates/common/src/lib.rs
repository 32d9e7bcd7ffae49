//! `dm-common`: Shared types, errors and configuration for the DashMux engine.
//!
//! This crate is the foundation that the demux and mux crates depend on:
//!
//! - **Track model**: `Sample`, `TrackKind`, `TrackMedia`, `SampleDescription`, `CollectedTrack`
//! - **Errors**: `DemuxError`, `ConfigError` (thiserror-based)
//! - **Config**: `MuxConfig`, `MuxStrategy` (serde, loadable from JSON)
//! - **Progress**: `MuxProgress`, `OutputKind` (stage reporting for the caller)

pub mod config;
pub mod error;
pub mod progress;
pub mod track;

// Re-export commonly used items at crate root
pub use config::{MuxConfig, MuxStrategy, MAX_COLLECT_TIMEOUT_SECS};
pub use error::{ConfigError, DemuxError, DemuxResult};
pub use progress::{MuxProgress, OutputKind};
pub use track::{
    CollectedTrack, Sample, SampleDescription, SampleEntry, TrackKind, TrackMedia,
    MOVIE_TIMESCALE,
};
