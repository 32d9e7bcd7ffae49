//! `dm-mux`: combine separate DASH video and audio streams into one MP4.
//!
//! # Architecture
//!
//! - **Progressive**: samples are collected through `dm-demux` and written
//!   into a fresh `ftyp` + `moov` + `mdat` file (two-pass offset layout)
//! - **Fragmented**: the audio `trak`/`trex` are merged into the video init
//!   segment and the source fragments are appended, renumbered where needed
//! - **Raw video**: the last resort; the video input is returned unchanged
//!
//! No FFmpeg dependency; everything is plain box reading and writing on
//! in-memory buffers.
//!
//! # Usage
//!
//! ```ignore
//! use dm_common::MuxConfig;
//! use dm_mux::Remuxer;
//!
//! let remuxer = Remuxer::new(MuxConfig::default());
//! let output = remuxer.remux(&video_bytes, Some(&audio_bytes), None);
//! std::fs::write("out.mp4", &output.bytes)?;
//! ```

pub mod atoms;
pub mod error;
pub mod fragmented;
pub mod merge;
pub mod patch;
pub mod progressive;
pub mod remux;

// Re-export primary API types
pub use error::{MuxError, MuxResult};
pub use fragmented::assemble_fragmented;
pub use merge::merge_moov;
pub use progressive::{build_progressive, ProgressiveOutput};
pub use remux::{RemuxOutput, Remuxer};
