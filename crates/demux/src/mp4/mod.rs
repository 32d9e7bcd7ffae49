//! MP4 (ISO BMFF) demuxer over an in-memory buffer.
//!
//! Handles both layouts a DASH download produces:
//!
//! - **Fragmented**: init segment (`ftyp` + `moov` with `mvex`) followed by
//!   `moof`/`mdat` pairs. Every `moof` is pre-scanned on open so per-track
//!   sample counts are known up front; one batch is one `trun`.
//! - **Progressive**: a single `moov` whose `stbl` tables index the `mdat`.
//!   Batches hold up to [`PROGRESSIVE_BATCH`] samples.

pub mod boxes;
pub mod fragment;
pub mod sample;

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use boxes::{
    parse_boxes, parse_co64, parse_ctts, parse_hdlr, parse_mdhd, parse_stco, parse_stsc,
    parse_stsd, parse_stss, parse_stsz, parse_stts, parse_tkhd, parse_trex, BoxNode, TrexBox,
    CO64, CTTS, HDLR, MDHD, MDIA, MINF, MOOF, MOOV, MVEX, STBL, STCO, STSC, STSD, STSS, STSZ,
    STTS, TKHD, TRAK, TREX,
};
use dm_common::{DemuxError, DemuxResult, Sample, SampleEntry, TrackKind, TrackMedia};
use fragment::{parse_moof, DecodeClock, TrackRun};
use sample::{SampleTable, StblTables};
use tracing::{debug, info};

use crate::traits::{SampleBatch, SampleSource, SourceTrack};

/// Maximum samples per batch for progressive sources.
pub const PROGRESSIVE_BATCH: usize = 256;

/// Where the demuxer reads samples from.
enum Layout {
    Fragmented {
        runs: VecDeque<TrackRun>,
    },
    Progressive {
        /// Sample tables in track order, keyed by track ID.
        tables: Vec<(u32, SampleTable)>,
        track_pos: usize,
        sample_pos: usize,
    },
}

/// MP4 demuxer: yields sample batches with their payload bytes.
pub struct Mp4Demuxer {
    data: Arc<[u8]>,
    tracks: Vec<SourceTrack>,
    selected: HashSet<u32>,
    layout: Layout,
}

impl Mp4Demuxer {
    /// Parse the buffer's structure. Sample payloads are copied lazily in `next_batch`.
    pub fn open(data: impl Into<Arc<[u8]>>) -> DemuxResult<Self> {
        let data: Arc<[u8]> = data.into();
        let buf: &[u8] = &data;

        let top = parse_boxes(buf);
        let moov_header = top
            .iter()
            .find(|h| h.box_type == MOOV)
            .ok_or(DemuxError::MissingBox("moov"))?;
        let moov = BoxNode::parse(moov_header.bytes(buf)).ok_or(DemuxError::MissingBox("moov"))?;

        let mut tracks = Vec::new();
        let mut tables = Vec::new();
        for trak in moov.children().iter().filter(|c| c.box_type() == TRAK) {
            if let Some((track, stbl)) = parse_track(trak)? {
                tables.push((track.id, stbl));
                tracks.push(track);
            }
        }
        if tracks.is_empty() {
            return Err(DemuxError::MissingBox("trak"));
        }

        let trex = parse_trex_defaults(&moov)?;
        let moofs: Vec<_> = top.iter().filter(|h| h.box_type == MOOF).collect();

        let layout = if moofs.is_empty() {
            let mut built = Vec::with_capacity(tables.len());
            for (track, (id, stbl)) in tracks.iter_mut().zip(tables) {
                let table = SampleTable::build(&stbl, buf.len())?;
                track.sample_count = table.len() as u64;
                built.push((id, table));
            }
            Layout::Progressive {
                tables: built,
                track_pos: 0,
                sample_pos: 0,
            }
        } else {
            let mut clock = DecodeClock::new();
            let mut runs = VecDeque::new();
            for header in &moofs {
                runs.extend(parse_moof(buf, header, &trex, &mut clock)?);
            }
            for track in tracks.iter_mut() {
                track.sample_count = runs
                    .iter()
                    .filter(|r| r.track_id == track.id)
                    .map(|r| r.samples.len() as u64)
                    .sum();
            }
            Layout::Fragmented { runs }
        };

        info!(
            "MP4: {} track(s), {} layout, {} fragment(s)",
            tracks.len(),
            if moofs.is_empty() { "progressive" } else { "fragmented" },
            moofs.len()
        );
        for track in &tracks {
            debug!(
                track_id = track.id,
                media = ?track.media,
                timescale = track.timescale,
                samples = track.sample_count,
                "Track"
            );
        }

        Ok(Mp4Demuxer {
            data,
            tracks,
            selected: HashSet::new(),
            layout,
        })
    }

    /// Whether the buffer was read as a fragmented file.
    pub fn is_fragmented(&self) -> bool {
        matches!(self.layout, Layout::Fragmented { .. })
    }
}

/// Copy `size` bytes at `offset` out of the buffer.
fn copy_sample(data: &[u8], offset: u64, size: u32) -> DemuxResult<Vec<u8>> {
    let start = offset as usize;
    let end = start.saturating_add(size as usize);
    data.get(start..end)
        .map(<[u8]>::to_vec)
        .ok_or(DemuxError::TruncatedData {
            expected: end,
            got: data.len(),
        })
}

impl SampleSource for Mp4Demuxer {
    fn tracks(&self) -> &[SourceTrack] {
        &self.tracks
    }

    fn select_track(&mut self, id: u32) -> DemuxResult<()> {
        if !self.tracks.iter().any(|t| t.id == id) {
            return Err(DemuxError::UnknownTrack(id));
        }
        self.selected.insert(id);
        Ok(())
    }

    fn next_batch(&mut self) -> DemuxResult<Option<SampleBatch>> {
        match &mut self.layout {
            Layout::Fragmented { runs } => {
                while let Some(run) = runs.pop_front() {
                    if !self.selected.contains(&run.track_id) || run.samples.is_empty() {
                        continue;
                    }
                    let mut samples = Vec::with_capacity(run.samples.len());
                    for s in &run.samples {
                        samples.push(Sample {
                            data: copy_sample(&self.data, s.offset, s.size)?,
                            duration: s.duration,
                            dts: s.dts,
                            cts: s.cts,
                            is_sync: s.is_sync,
                        });
                    }
                    return Ok(Some(SampleBatch {
                        track_id: run.track_id,
                        samples,
                    }));
                }
                Ok(None)
            }
            Layout::Progressive {
                tables,
                track_pos,
                sample_pos,
            } => {
                while let Some((track_id, table)) = tables.get(*track_pos) {
                    if !self.selected.contains(track_id) || *sample_pos >= table.len() {
                        *track_pos += 1;
                        *sample_pos = 0;
                        continue;
                    }
                    let end = (*sample_pos + PROGRESSIVE_BATCH).min(table.len());
                    let refs = &table.samples[*sample_pos..end];
                    let track_id = *track_id;
                    *sample_pos = end;

                    let mut samples = Vec::with_capacity(refs.len());
                    for r in refs {
                        samples.push(Sample {
                            data: copy_sample(&self.data, r.offset, r.size)?,
                            duration: r.duration,
                            dts: r.dts,
                            cts: r.cts,
                            is_sync: r.is_sync,
                        });
                    }
                    return Ok(Some(SampleBatch { track_id, samples }));
                }
                Ok(None)
            }
        }
    }
}

/// Parse one `trak` into its source description and stbl tables.
/// Tracks with a handler other than video or audio are skipped.
fn parse_track(trak: &BoxNode) -> DemuxResult<Option<(SourceTrack, StblTables)>> {
    let tkhd = trak.child(TKHD).ok_or(DemuxError::MissingBox("tkhd"))?;
    let tkhd = parse_tkhd(tkhd.body())?;
    let mdhd = trak
        .find_path(&[MDIA, MDHD])
        .ok_or(DemuxError::MissingBox("mdhd"))?;
    let mdhd = parse_mdhd(mdhd.body())?;
    let hdlr = trak
        .find_path(&[MDIA, HDLR])
        .ok_or(DemuxError::MissingBox("hdlr"))?;
    let hdlr = parse_hdlr(hdlr.body())?;

    let kind = match TrackKind::from_handler(&hdlr.handler_type) {
        Some(kind) => kind,
        None => {
            debug!(
                "Skipping track {} with handler '{}'",
                tkhd.track_id,
                String::from_utf8_lossy(&hdlr.handler_type)
            );
            return Ok(None);
        }
    };

    let stbl = trak.find_path(&[MDIA, MINF, STBL]);
    let stsd = stbl.and_then(|s| s.child(STSD));
    let raw_stsd = stsd.map(|s| s.bytes().to_vec());
    let parsed_entry = match stsd {
        Some(s) => parse_stsd(s.body(), kind == TrackKind::Video)?,
        None => None,
    };

    let media = match kind {
        TrackKind::Video => TrackMedia::Video {
            width: parsed_entry
                .as_ref()
                .map(|e| e.width)
                .filter(|&w| w > 0)
                .unwrap_or(tkhd.width as u16),
            height: parsed_entry
                .as_ref()
                .map(|e| e.height)
                .filter(|&h| h > 0)
                .unwrap_or(tkhd.height as u16),
        },
        TrackKind::Audio => TrackMedia::Audio {
            channels: parsed_entry.as_ref().map_or(0, |e| e.channels),
            sample_rate: parsed_entry
                .as_ref()
                .map(|e| e.sample_rate)
                .filter(|&r| r > 0)
                .unwrap_or(mdhd.timescale),
        },
    };

    let entry = parsed_entry.map(|e| SampleEntry {
        format: e.format,
        data_reference_index: e.data_reference_index,
        config_boxes: e.config_boxes,
    });

    let tables = match stbl {
        Some(stbl) => parse_stbl_tables(stbl)?,
        None => StblTables::default(),
    };

    let track = SourceTrack {
        id: tkhd.track_id,
        media,
        timescale: mdhd.timescale,
        duration: Some(mdhd.duration).filter(|&d| d > 0),
        sample_count: 0,
        raw_stsd,
        entry,
    };

    Ok(Some((track, tables)))
}

fn parse_stbl_tables(stbl: &BoxNode) -> DemuxResult<StblTables> {
    let mut tables = StblTables::default();
    if let Some(b) = stbl.child(STTS) {
        tables.stts = parse_stts(b.body())?;
    }
    if let Some(b) = stbl.child(CTTS) {
        tables.ctts = parse_ctts(b.body())?;
    }
    if let Some(b) = stbl.child(STSC) {
        tables.stsc = parse_stsc(b.body())?;
    }
    if let Some(b) = stbl.child(STSZ) {
        tables.stsz = Some(parse_stsz(b.body())?);
    }
    if let Some(b) = stbl.child(STCO) {
        tables.chunk_offsets = parse_stco(b.body())?;
    } else if let Some(b) = stbl.child(CO64) {
        tables.chunk_offsets = parse_co64(b.body())?;
    }
    if let Some(b) = stbl.child(STSS) {
        tables.sync_samples = Some(parse_stss(b.body())?);
    }
    Ok(tables)
}

/// Per-track `trex` defaults from `moov/mvex`.
fn parse_trex_defaults(moov: &BoxNode) -> DemuxResult<HashMap<u32, TrexBox>> {
    let mut defaults = HashMap::new();
    if let Some(mvex) = moov.child(MVEX) {
        for node in mvex.children().iter().filter(|c| c.box_type() == TREX) {
            let trex = parse_trex(node.body())?;
            defaults.insert(trex.track_id, trex);
        }
    }
    Ok(defaults)
}
