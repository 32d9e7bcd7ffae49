//! Movie fragment (`moof`) interpretation.
//!
//! Resolves every `trun` of a fragment into absolute sample locations and
//! timestamps, applying the tfhd → trex default chain and the ISO 14496-12
//! base data offset rules:
//!
//! - explicit `base_data_offset` in tfhd wins
//! - otherwise `default-base-is-moof`, or the first traf, uses the moof start
//! - otherwise a traf continues where the previous traf's data ended
//!
//! Within a traf, a trun without `data_offset` continues after the previous run.

use std::collections::HashMap;

use crate::mp4::boxes::{
    find_all_sub_boxes, find_sub_box, box_body, is_sync_sample, parse_mfhd, parse_tfdt,
    parse_tfhd, parse_trun, BoxHeader, TrexBox, MFHD, TFDT, TFHD, TRAF, TRUN,
};
use dm_common::{DemuxError, DemuxResult};
use tracing::{debug, warn};

/// A fragment sample resolved to an absolute buffer range.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FragmentSample {
    pub offset: u64,
    pub size: u32,
    pub duration: u32,
    pub dts: u64,
    pub cts: i64,
    pub is_sync: bool,
}

/// One `trun` worth of samples for one track.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackRun {
    pub track_id: u32,
    pub sequence_number: u32,
    pub samples: Vec<FragmentSample>,
}

/// Per-track decode time carried from one fragment to the next, used when
/// a traf has no `tfdt`.
pub type DecodeClock = HashMap<u32, u64>;

/// Resolve all runs of the `moof` described by `header` inside `buf`.
pub fn parse_moof(
    buf: &[u8],
    header: &BoxHeader,
    trex: &HashMap<u32, TrexBox>,
    clock: &mut DecodeClock,
) -> DemuxResult<Vec<TrackRun>> {
    let moof = header.bytes(buf);
    let moof_start = header.offset;

    let sequence_number = match find_sub_box(moof, MFHD) {
        Some(mfhd) => parse_mfhd(box_body(mfhd))?,
        None => {
            warn!("moof at offset {} has no mfhd", moof_start);
            0
        }
    };

    let mut runs = Vec::new();
    let mut previous_traf_end: Option<u64> = None;

    for (traf_offset, traf) in find_all_sub_boxes(moof, TRAF) {
        let tfhd = find_sub_box(traf, TFHD).ok_or_else(|| DemuxError::InvalidStructure {
            offset: moof_start + traf_offset as u64,
            reason: "traf without tfhd".into(),
        })?;
        let tfhd = parse_tfhd(box_body(tfhd))?;
        let defaults = trex.get(&tfhd.track_id).cloned().unwrap_or_default();

        let base = match (tfhd.base_data_offset, previous_traf_end) {
            (Some(explicit), _) => explicit,
            (None, Some(end)) if !tfhd.default_base_is_moof() => end,
            _ => moof_start,
        };

        let mut dts = match find_sub_box(traf, TFDT) {
            Some(tfdt) => parse_tfdt(box_body(tfdt))?,
            None => clock.get(&tfhd.track_id).copied().unwrap_or(0),
        };

        let traf_start = moof_start + traf_offset as u64;
        let overflow = |what: &str| DemuxError::InvalidStructure {
            offset: traf_start,
            reason: format!("{what} overflows"),
        };

        let mut data_cursor = base;
        for (run_index, (_, trun)) in find_all_sub_boxes(traf, TRUN).into_iter().enumerate() {
            let trun = parse_trun(box_body(trun))?;

            // Every sample needs at least one byte of buffer behind it.
            if trun.sample_count as u64 > buf.len() as u64 {
                return Err(DemuxError::InvalidStructure {
                    offset: traf_start,
                    reason: format!(
                        "trun claims {} samples in a {}-byte buffer",
                        trun.sample_count,
                        buf.len()
                    ),
                });
            }

            if let Some(data_offset) = trun.data_offset {
                data_cursor = base.checked_add_signed(data_offset as i64).ok_or_else(|| {
                    DemuxError::InvalidStructure {
                        offset: traf_start,
                        reason: format!("trun data offset {} before buffer start", data_offset),
                    }
                })?;
            } else if run_index == 0 {
                data_cursor = base;
            }

            let mut samples = Vec::with_capacity((trun.sample_count as usize).min(4096));
            for i in 0..trun.sample_count as usize {
                let entry = trun.sample(i);
                let duration = entry
                    .duration
                    .or(tfhd.default_sample_duration)
                    .unwrap_or(defaults.default_sample_duration);
                let size = entry
                    .size
                    .or(tfhd.default_sample_size)
                    .unwrap_or(defaults.default_sample_size);
                let flags = match (i, trun.first_sample_flags) {
                    (0, Some(first)) => first,
                    _ => entry
                        .flags
                        .or(tfhd.default_sample_flags)
                        .unwrap_or(defaults.default_sample_flags),
                };
                let cts = i64::try_from(dts)
                    .ok()
                    .and_then(|d| d.checked_add(entry.composition_offset.unwrap_or(0) as i64))
                    .ok_or_else(|| overflow("composition time"))?;

                samples.push(FragmentSample {
                    offset: data_cursor,
                    size,
                    duration,
                    dts,
                    cts,
                    is_sync: is_sync_sample(flags),
                });

                data_cursor = data_cursor
                    .checked_add(size as u64)
                    .ok_or_else(|| overflow("sample data offset"))?;
                dts = dts
                    .checked_add(duration as u64)
                    .ok_or_else(|| overflow("decode time"))?;
            }

            runs.push(TrackRun {
                track_id: tfhd.track_id,
                sequence_number,
                samples,
            });
        }

        clock.insert(tfhd.track_id, dts);
        previous_traf_end = Some(data_cursor);
    }

    debug!(
        "moof #{} at offset {}: {} run(s)",
        sequence_number,
        moof_start,
        runs.len()
    );

    Ok(runs)
}
