//! Sample table interpretation: maps sample indices to buffer byte offsets,
//! sizes, timestamps, and sync status.
//!
//! Uses the parsed stsc, stsz, stco/co64, stts, ctts, and stss data
//! of a progressive track to build a flat index of samples.

use crate::mp4::boxes::{CttsEntry, StscEntry, StszBox, SttsEntry};
use dm_common::DemuxError;
use tracing::debug;

/// Flat entry for a single sample, pre-computed from the tables.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SampleRef {
    /// Byte offset in the buffer where this sample's data starts.
    pub offset: u64,
    pub size: u32,
    /// Duration in media timescale units.
    pub duration: u32,
    /// Decoding timestamp in media timescale units.
    pub dts: u64,
    /// Composition (presentation) timestamp in media timescale units.
    pub cts: i64,
    pub is_sync: bool,
}

/// Raw stbl tables of one track, as parsed from the moov.
#[derive(Clone, Debug, Default)]
pub struct StblTables {
    pub stts: Vec<SttsEntry>,
    pub ctts: Vec<CttsEntry>,
    pub stsc: Vec<StscEntry>,
    pub stsz: Option<StszBox>,
    pub chunk_offsets: Vec<u64>,
    /// `None` when the track has no stss box (every sample is sync).
    pub sync_samples: Option<Vec<u32>>,
}

impl StblTables {
    pub fn sample_count(&self) -> usize {
        self.stsz.as_ref().map_or(0, |s| s.sample_count as usize)
    }
}

/// Pre-computed sample table for a progressive track.
#[derive(Clone, Debug, Default)]
pub struct SampleTable {
    /// Flat list of all samples in decode order.
    pub samples: Vec<SampleRef>,
}

impl SampleTable {
    /// Build a `SampleTable` from parsed stbl tables of a `data_len`-byte file.
    pub fn build(tables: &StblTables, data_len: usize) -> Result<Self, DemuxError> {
        let sample_count = tables.sample_count();
        let stsz = match &tables.stsz {
            Some(stsz) if sample_count > 0 => stsz,
            _ => return Ok(SampleTable::default()),
        };
        // Uniform-size stsz counts are not backed by table entries.
        if sample_count > data_len {
            return Err(invalid(format!(
                "stsz declares {} samples in a {}-byte file",
                sample_count, data_len
            )));
        }

        // Step 1: sample-to-offset mapping from stsc + stco + stsz
        let offsets_and_sizes = build_sample_offsets(
            &tables.stsc,
            &tables.chunk_offsets,
            &stsz.sample_sizes,
            stsz.default_sample_size,
            sample_count,
        )?;

        // Step 2: DTS and duration arrays from stts
        let (dts_array, durations) = build_dts_array(&tables.stts, sample_count)?;

        // Step 3: composition offsets from ctts (if present)
        let cts_offsets = build_cts_offsets(&tables.ctts, sample_count);

        // Step 4: assemble flat sample entries
        let samples = (0..sample_count)
            .map(|i| {
                let (offset, size) = offsets_and_sizes[i];
                let dts = dts_array[i];
                let is_sync = match &tables.sync_samples {
                    None => true,
                    Some(sync) => sync.binary_search(&(i as u32 + 1)).is_ok(),
                };
                let cts = i64::try_from(dts)
                    .ok()
                    .and_then(|d| d.checked_add(cts_offsets[i] as i64))
                    .ok_or_else(|| invalid(format!("composition time of sample {} overflows", i)))?;
                Ok(SampleRef {
                    offset,
                    size,
                    duration: durations[i],
                    dts,
                    cts,
                    is_sync,
                })
            })
            .collect::<Result<Vec<_>, DemuxError>>()?;

        debug!("SampleTable: {} samples", samples.len());

        Ok(SampleTable { samples })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Build a vec of (buffer_offset, size) for each sample, using stsc + stco + stsz.
///
/// The stsc table maps chunk ranges to samples-per-chunk counts.
/// Combined with chunk offsets and sample sizes, we can compute
/// the exact byte offset for each sample.
fn build_sample_offsets(
    stsc: &[StscEntry],
    chunk_offsets: &[u64],
    sample_sizes: &[u32],
    default_sample_size: u32,
    sample_count: usize,
) -> Result<Vec<(u64, u32)>, DemuxError> {
    let mut result = Vec::with_capacity(sample_count);
    let mut sample_idx: usize = 0;

    for (chunk_idx, &chunk_offset) in chunk_offsets.iter().enumerate() {
        // chunk numbers are 1-based in stsc
        let samples_in_chunk = samples_per_chunk_for(stsc, chunk_idx as u32 + 1);
        let mut offset = chunk_offset;

        for _ in 0..samples_in_chunk {
            if sample_idx >= sample_count {
                break;
            }

            let size = if default_sample_size > 0 {
                default_sample_size
            } else {
                *sample_sizes
                    .get(sample_idx)
                    .ok_or_else(|| {
                        invalid(format!(
                            "Sample index {} exceeds stsz table length {}",
                            sample_idx,
                            sample_sizes.len()
                        ))
                    })?
            };

            result.push((offset, size));
            offset = offset
                .checked_add(size as u64)
                .ok_or_else(|| invalid(format!("offset of sample {} overflows", sample_idx)))?;
            sample_idx += 1;
        }
    }

    if result.len() != sample_count {
        return Err(DemuxError::InvalidStructure {
            offset: 0,
            reason: format!(
                "Built {} sample offsets but expected {} (stsc/stco/stsz mismatch)",
                result.len(),
                sample_count
            ),
        });
    }

    Ok(result)
}

/// Samples in the given chunk (1-based chunk number): the last stsc entry
/// whose first_chunk <= chunk_num applies.
fn samples_per_chunk_for(stsc: &[StscEntry], chunk_num: u32) -> u32 {
    let mut spc = 1;
    for entry in stsc {
        if entry.first_chunk <= chunk_num {
            spc = entry.samples_per_chunk;
        } else {
            break;
        }
    }
    spc
}

/// Build DTS and duration arrays from stts entries, one value per sample.
/// Samples beyond the table reuse the last delta.
fn build_dts_array(
    stts: &[SttsEntry],
    sample_count: usize,
) -> Result<(Vec<u64>, Vec<u32>), DemuxError> {
    let mut dts_array = Vec::with_capacity(sample_count);
    let mut durations = Vec::with_capacity(sample_count);
    let mut dts: u64 = 0;

    'outer: for entry in stts {
        for _ in 0..entry.sample_count {
            if dts_array.len() >= sample_count {
                break 'outer;
            }
            dts_array.push(dts);
            durations.push(entry.sample_delta);
            dts = advance(dts, entry.sample_delta)?;
        }
    }

    let last_delta = stts.last().map_or(0, |e| e.sample_delta);
    while dts_array.len() < sample_count {
        dts_array.push(dts);
        durations.push(last_delta);
        dts = advance(dts, last_delta)?;
    }

    Ok((dts_array, durations))
}

fn advance(dts: u64, delta: u32) -> Result<u64, DemuxError> {
    dts.checked_add(delta as u64)
        .ok_or_else(|| invalid("decode time overflows".into()))
}

fn invalid(reason: String) -> DemuxError {
    DemuxError::InvalidStructure { offset: 0, reason }
}

/// Composition offsets from ctts entries, one per sample (0 where uncovered).
fn build_cts_offsets(ctts: &[CttsEntry], sample_count: usize) -> Vec<i32> {
    let mut offsets: Vec<i32> = ctts
        .iter()
        .flat_map(|e| std::iter::repeat(e.sample_offset).take(e.sample_count as usize))
        .take(sample_count)
        .collect();
    offsets.resize(sample_count, 0);
    offsets
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_tables(
        stts: Vec<SttsEntry>,
        ctts: Vec<CttsEntry>,
        stsc: Vec<StscEntry>,
        sample_sizes: Vec<u32>,
        chunk_offsets: Vec<u64>,
        sync_samples: Option<Vec<u32>>,
    ) -> StblTables {
        let sample_count = sample_sizes.len() as u32;
        StblTables {
            stts,
            ctts,
            stsc,
            stsz: Some(StszBox {
                default_sample_size: 0,
                sample_sizes,
                sample_count,
            }),
            chunk_offsets,
            sync_samples,
        }
    }

    fn stsc(first_chunk: u32, samples_per_chunk: u32) -> StscEntry {
        StscEntry {
            first_chunk,
            samples_per_chunk,
            sample_description_index: 1,
        }
    }

    #[test]
    fn test_sample_table_basic() {
        // 1 chunk with 3 samples, chunk starts at offset 1000
        let tables = make_tables(
            vec![SttsEntry {
                sample_count: 3,
                sample_delta: 1001,
            }],
            vec![],
            vec![stsc(1, 3)],
            vec![100, 200, 150],
            vec![1000],
            Some(vec![1]),
        );

        let table = SampleTable::build(&tables, 4096).unwrap();
        assert_eq!(table.len(), 3);

        assert_eq!(table.samples[0].offset, 1000);
        assert_eq!(table.samples[0].size, 100);
        assert_eq!(table.samples[0].dts, 0);
        assert!(table.samples[0].is_sync);

        assert_eq!(table.samples[1].offset, 1100);
        assert_eq!(table.samples[1].dts, 1001);
        assert_eq!(table.samples[1].duration, 1001);
        assert!(!table.samples[1].is_sync);

        assert_eq!(table.samples[2].offset, 1300);
        assert_eq!(table.samples[2].dts, 2002);
    }

    #[test]
    fn test_sample_table_multiple_chunks() {
        // Chunks 1-2 hold 2 samples each, chunk 3 holds 1
        let tables = make_tables(
            vec![SttsEntry {
                sample_count: 5,
                sample_delta: 512,
            }],
            vec![],
            vec![stsc(1, 2), stsc(3, 1)],
            vec![10, 20, 30, 40, 50],
            vec![100, 500, 900],
            None,
        );

        let table = SampleTable::build(&tables, 4096).unwrap();
        let offsets: Vec<u64> = table.samples.iter().map(|s| s.offset).collect();
        assert_eq!(offsets, vec![100, 110, 500, 530, 900]);
        assert!(table.samples.iter().all(|s| s.is_sync));
    }

    #[test]
    fn test_sample_table_with_ctts() {
        let tables = make_tables(
            vec![SttsEntry {
                sample_count: 3,
                sample_delta: 100,
            }],
            vec![
                CttsEntry {
                    sample_count: 1,
                    sample_offset: 200,
                },
                CttsEntry {
                    sample_count: 2,
                    sample_offset: -100,
                },
            ],
            vec![stsc(1, 3)],
            vec![1, 1, 1],
            vec![0],
            None,
        );

        let table = SampleTable::build(&tables, 4096).unwrap();
        assert_eq!(table.samples[0].cts, 200);
        assert_eq!(table.samples[1].cts, 0);
        assert_eq!(table.samples[2].cts, 100);
    }

    #[test]
    fn test_short_stts_reuses_last_delta() {
        let tables = make_tables(
            vec![SttsEntry {
                sample_count: 1,
                sample_delta: 40,
            }],
            vec![],
            vec![stsc(1, 3)],
            vec![1, 1, 1],
            vec![0],
            None,
        );

        let table = SampleTable::build(&tables, 4096).unwrap();
        assert_eq!(table.samples[2].dts, 80);
        assert_eq!(table.samples[2].duration, 40);
    }

    #[test]
    fn test_empty_sample_table() {
        let table = SampleTable::build(&StblTables::default(), 0).unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn test_uniform_sample_size() {
        let tables = StblTables {
            stts: vec![SttsEntry {
                sample_count: 4,
                sample_delta: 1024,
            }],
            stsc: vec![stsc(1, 4)],
            stsz: Some(StszBox {
                default_sample_size: 6,
                sample_sizes: vec![],
                sample_count: 4,
            }),
            chunk_offsets: vec![48],
            ..Default::default()
        };

        let table = SampleTable::build(&tables, 4096).unwrap();
        let offsets: Vec<u64> = table.samples.iter().map(|s| s.offset).collect();
        assert_eq!(offsets, vec![48, 54, 60, 66]);
    }

    #[test]
    fn test_chunk_table_mismatch_errors() {
        // 3 samples declared but only one chunk holding 2
        let tables = make_tables(
            vec![],
            vec![],
            vec![stsc(1, 2)],
            vec![1, 1, 1],
            vec![0],
            None,
        );
        assert!(SampleTable::build(&tables, 4096).is_err());
    }

    #[test]
    fn test_uniform_count_beyond_file_errors() {
        let tables = StblTables {
            stsc: vec![stsc(1, u32::MAX)],
            stsz: Some(StszBox {
                default_sample_size: 1,
                sample_sizes: vec![],
                sample_count: 3_000_000_000,
            }),
            chunk_offsets: vec![0],
            ..Default::default()
        };
        assert!(matches!(
            SampleTable::build(&tables, 437),
            Err(DemuxError::InvalidStructure { .. })
        ));
    }

    #[test]
    fn test_offset_overflow_errors() {
        let tables = make_tables(
            vec![],
            vec![],
            vec![stsc(1, 2)],
            vec![8, 8],
            vec![u64::MAX - 4],
            None,
        );
        assert!(SampleTable::build(&tables, 4096).is_err());
    }

    #[test]
    fn test_large_deltas_accumulate() {
        let tables = make_tables(
            vec![SttsEntry {
                sample_count: 3,
                sample_delta: u32::MAX,
            }],
            vec![],
            vec![stsc(1, 3)],
            vec![1, 1, 1],
            vec![0],
            None,
        );
        let table = SampleTable::build(&tables, 4096).unwrap();
        assert_eq!(table.samples[2].dts, 2 * u32::MAX as u64);
        assert_eq!(table.samples[2].cts, 2 * u32::MAX as i64);
    }
}
