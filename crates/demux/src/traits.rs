//! Sample source trait: the demuxer capability the collector drives.

use dm_common::{DemuxResult, Sample, SampleDescription, SampleEntry, TrackMedia};

/// Track metadata as announced by a source before any samples are read.
#[derive(Clone, Debug)]
pub struct SourceTrack {
    pub id: u32,
    pub media: TrackMedia,
    pub timescale: u32,
    /// Declared duration in track timescale; `None` when absent or zero.
    pub duration: Option<u64>,
    /// Number of samples the source will produce for this track.
    pub sample_count: u64,
    /// Complete `stsd` box bytes, when present in the source.
    pub raw_stsd: Option<Vec<u8>>,
    /// Parsed first sample entry, when present.
    pub entry: Option<SampleEntry>,
}

impl SourceTrack {
    /// Best available sample description: raw bytes, then structured entry.
    pub fn description(&self) -> SampleDescription {
        match (&self.raw_stsd, &self.entry) {
            (Some(raw), _) => SampleDescription::Raw(raw.clone()),
            (None, Some(entry)) => SampleDescription::Structured(entry.clone()),
            (None, None) => SampleDescription::Missing,
        }
    }
}

/// A group of consecutive samples of one track.
#[derive(Clone, Debug)]
pub struct SampleBatch {
    pub track_id: u32,
    pub samples: Vec<Sample>,
}

/// Trait for sample producers (fragmented or progressive MP4).
///
/// Sources are driven from a worker thread, hence `Send`.
pub trait SampleSource: Send {
    /// Tracks available in the source.
    fn tracks(&self) -> &[SourceTrack];

    /// Ask for samples of the given track. Unselected tracks are skipped.
    fn select_track(&mut self, id: u32) -> DemuxResult<()>;

    /// Next batch of samples, or `None` when the source is exhausted.
    fn next_batch(&mut self) -> DemuxResult<Option<SampleBatch>>;
}

impl<S: SampleSource + ?Sized> SampleSource for Box<S> {
    fn tracks(&self) -> &[SourceTrack] {
        (**self).tracks()
    }

    fn select_track(&mut self, id: u32) -> DemuxResult<()> {
        (**self).select_track(id)
    }

    fn next_batch(&mut self) -> DemuxResult<Option<SampleBatch>> {
        (**self).next_batch()
    }
}
