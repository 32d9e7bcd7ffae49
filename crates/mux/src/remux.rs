//! Top-level remuxing: try each output strategy in turn and never fail.
//!
//! Order is progressive, then fragmented, then the raw video input.
//! `MuxConfig::strategy` can move fragmented to the front.

use std::sync::Arc;
use std::time::Instant;

use dm_common::{MuxConfig, MuxProgress, MuxStrategy, OutputKind, TrackKind};
use dm_demux::{probe_layout, Collection, Collector, Mp4Demuxer, SampleSource};
use tracing::{debug, info, warn};

use crate::error::{MuxError, MuxResult};
use crate::fragmented::assemble_fragmented;
use crate::progressive::build_progressive;

/// Final output of a remux.
#[derive(Clone, Debug)]
pub struct RemuxOutput {
    pub bytes: Vec<u8>,
    pub strategy: OutputKind,
}

/// Optional progress callback, forwarded to every stage.
struct Reporter<'a> {
    callback: Option<&'a mut dyn FnMut(&MuxProgress)>,
}

impl Reporter<'_> {
    fn emit(&mut self, event: MuxProgress) {
        debug!(%event, "Remux progress");
        if let Some(callback) = self.callback.as_mut() {
            callback(&event);
        }
    }
}

/// Combines a DASH video stream and an optional audio stream into one MP4.
pub struct Remuxer {
    config: MuxConfig,
}

impl Remuxer {
    /// Out-of-range config values are logged and clamped where they are used.
    pub fn new(config: MuxConfig) -> Self {
        if let Err(err) = config.validate() {
            warn!(error = %err, "Remuxer config out of range");
        }
        Self { config }
    }

    pub fn config(&self) -> &MuxConfig {
        &self.config
    }

    fn strategy_order(&self) -> [OutputKind; 2] {
        match self.config.strategy {
            MuxStrategy::Auto | MuxStrategy::Progressive => {
                [OutputKind::Progressive, OutputKind::Fragmented]
            }
            MuxStrategy::Fragmented => [OutputKind::Fragmented, OutputKind::Progressive],
        }
    }

    /// Remux `video` and `audio`, falling back until something succeeds.
    ///
    /// When every strategy fails the unmodified video is returned.
    pub fn remux(
        &self,
        video: &[u8],
        audio: Option<&[u8]>,
        progress: Option<&mut dyn FnMut(&MuxProgress)>,
    ) -> RemuxOutput {
        let mut reporter = Reporter { callback: progress };
        info!(
            video_bytes = video.len(),
            audio_bytes = ?audio.map(<[u8]>::len),
            video_layout = ?probe_layout(video),
            "Remux started"
        );

        for kind in self.strategy_order() {
            let result = match kind {
                OutputKind::Progressive => self.progressive(video, audio, &mut reporter),
                OutputKind::Fragmented => self.fragmented(video, audio, &mut reporter),
                OutputKind::RawVideo => continue,
            };
            match result {
                Ok(bytes) => {
                    reporter.emit(MuxProgress::Done {
                        strategy: kind,
                        bytes: bytes.len(),
                    });
                    info!(strategy = %kind, bytes = bytes.len(), "Remux finished");
                    return RemuxOutput {
                        bytes,
                        strategy: kind,
                    };
                }
                Err(err) => {
                    warn!(strategy = %kind, error = %err, "Output strategy failed");
                    reporter.emit(MuxProgress::FallingBack {
                        from: kind,
                        reason: err.to_string(),
                    });
                }
            }
        }

        warn!("Every strategy failed, returning the video stream unchanged");
        reporter.emit(MuxProgress::Done {
            strategy: OutputKind::RawVideo,
            bytes: video.len(),
        });
        RemuxOutput {
            bytes: video.to_vec(),
            strategy: OutputKind::RawVideo,
        }
    }

    /// Collect samples and build a progressive file.
    pub fn try_progressive(&self, video: &[u8], audio: Option<&[u8]>) -> MuxResult<Vec<u8>> {
        self.progressive(video, audio, &mut Reporter { callback: None })
    }

    /// Merge the init segments and concatenate the fragments.
    pub fn try_fragmented(&self, video: &[u8], audio: Option<&[u8]>) -> MuxResult<Vec<u8>> {
        self.fragmented(video, audio, &mut Reporter { callback: None })
    }

    fn progressive(
        &self,
        video: &[u8],
        audio: Option<&[u8]>,
        reporter: &mut Reporter<'_>,
    ) -> MuxResult<Vec<u8>> {
        let video_demuxer = Mp4Demuxer::open(Arc::<[u8]>::from(video))?;
        let audio_demuxer = audio.and_then(|buf| match Mp4Demuxer::open(Arc::<[u8]>::from(buf)) {
            Ok(demuxer) => Some(demuxer),
            Err(err) => {
                warn!(error = %err, "Audio stream unreadable, building without audio");
                None
            }
        });

        let track_count = video_demuxer.tracks().len()
            + audio_demuxer.as_ref().map_or(0, |d| d.tracks().len());
        reporter.emit(MuxProgress::Collecting { tracks: track_count });

        // Both collectors run at once and share one deadline.
        let now = Instant::now();
        let deadline = now.checked_add(self.config.collect_timeout()).unwrap_or(now);
        let video_collector = Collector::start(video_demuxer)?;
        let audio_collector = audio_demuxer.and_then(|d| match Collector::start(d) {
            Ok(collector) => Some(collector),
            Err(err) => {
                warn!(error = %err, "Could not start audio collection");
                None
            }
        });

        let mut video_collection = video_collector.wait_until(deadline)?;
        let audio_collection = audio_collector.and_then(|c| match c.wait_until(deadline) {
            Ok(collection) => Some(collection),
            Err(err) => {
                warn!(error = %err, "Audio collection failed, building without audio");
                None
            }
        });

        let complete = video_collection.is_complete()
            && audio_collection.as_ref().map_or(true, Collection::is_complete);
        let samples = video_collection.total_samples()
            + audio_collection.as_ref().map_or(0, Collection::total_samples);
        reporter.emit(MuxProgress::Collected { samples, complete });

        let mut tracks = Vec::with_capacity(2);
        tracks.push(
            video_collection
                .take_track(TrackKind::Video)
                .ok_or_else(|| MuxError::TrackError("video stream has no video track".into()))?,
        );
        if let Some(audio_track) =
            audio_collection.and_then(|mut c| c.take_track(TrackKind::Audio))
        {
            tracks.push(audio_track);
        }

        reporter.emit(MuxProgress::BuildingProgressive);
        let output = build_progressive(&tracks)?;
        if output.skipped_samples > 0 {
            warn!(skipped = output.skipped_samples, "Progressive output is missing samples");
        }

        let min = self.config.min_progressive_bytes;
        if output.bytes.len() < min {
            return Err(MuxError::BuildTooSmall {
                size: output.bytes.len(),
                min,
            });
        }
        Ok(output.bytes)
    }

    fn fragmented(
        &self,
        video: &[u8],
        audio: Option<&[u8]>,
        reporter: &mut Reporter<'_>,
    ) -> MuxResult<Vec<u8>> {
        let audio = audio
            .ok_or_else(|| MuxError::TrackError("fragmented output needs an audio stream".into()))?;

        reporter.emit(MuxProgress::BuildingFragmented);
        let output = assemble_fragmented(video, audio)?;

        let expected = (video.len() as f64 * self.config.fragmented_min_ratio) as usize;
        if output.len() <= expected {
            return Err(MuxError::Implausible {
                size: output.len(),
                expected,
            });
        }
        Ok(output)
    }
}
