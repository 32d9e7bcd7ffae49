//! Progressive (non-fragmented) MP4 builder.
//!
//! Writes `ftyp`, a `moov` describing every collected sample, and one `mdat`
//! holding the payloads (video first, then audio). Each track is stored as a
//! single chunk, so `stsc` has one entry and `stco` one offset per track.
//!
//! Chunk offsets depend on the size of `moov`, which depends on whether the
//! offsets need 64-bit fields. The builder therefore writes `moov` once with
//! zero offsets to measure it, then again with the real offsets.

use byteorder::{BigEndian, WriteBytesExt};
use dm_common::{CollectedTrack, SampleDescription, TrackKind, TrackMedia, MOVIE_TIMESCALE};
use dm_demux::mp4::boxes::{read_box_header, STSD};
use std::io::{Cursor, Seek, Write};
use tracing::{debug, info, warn};

use crate::atoms::{
    box_size_placeholder, encode_language, fill_box_size, header_len_for, write_box_header,
    write_fixed_point_16_16, write_fixed_point_8_8, write_full_box_header,
    write_large_box_header, write_unity_matrix, write_zeros, LARGE_BOX_HEADER_LEN,
};
use crate::error::{MuxError, MuxResult};

/// Brands written in `ftyp`.
const COMPATIBLE_BRANDS: [&[u8; 4]; 4] = [b"isom", b"iso2", b"avc1", b"mp41"];

/// Result of a progressive build.
#[derive(Clone, Debug)]
pub struct ProgressiveOutput {
    pub bytes: Vec<u8>,
    /// Video samples left out because they could not be represented.
    pub skipped_samples: usize,
    /// Whether an audio track made it into the file.
    pub has_audio: bool,
}

/// Table row for one sample.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct SampleRow {
    size: u32,
    duration: u32,
    composition_offset: i32,
    is_sync: bool,
}

/// A track ready to be written.
struct TrackPlan<'a> {
    kind: TrackKind,
    track: &'a CollectedTrack,
    rows: Vec<SampleRow>,
    payload: Vec<&'a [u8]>,
    payload_len: u64,
}

impl TrackPlan<'_> {
    fn track_id(&self) -> u32 {
        self.kind.output_track_id()
    }
}

/// Convert a track's samples to table rows.
///
/// Returns the plan plus the reason of every sample that had to be left out.
fn plan_track(track: &CollectedTrack) -> (TrackPlan<'_>, Vec<String>) {
    let mut rows = Vec::with_capacity(track.samples.len());
    let mut payload = Vec::with_capacity(track.samples.len());
    let mut payload_len = 0u64;
    let mut rejected = Vec::new();

    for (index, sample) in track.samples.iter().enumerate() {
        let size = match u32::try_from(sample.data.len()) {
            Ok(size) => size,
            Err(_) => {
                rejected.push(format!("sample {index}: {} byte payload", sample.data.len()));
                continue;
            }
        };
        let composition_offset = match i32::try_from(sample.composition_offset()) {
            Ok(offset) => offset,
            Err(_) => {
                rejected.push(format!(
                    "sample {index}: composition offset {} out of range",
                    sample.composition_offset()
                ));
                continue;
            }
        };
        rows.push(SampleRow {
            size,
            duration: sample.duration,
            composition_offset,
            is_sync: sample.is_sync,
        });
        payload.push(sample.data.as_slice());
        payload_len += size as u64;
    }

    let plan = TrackPlan {
        kind: track.kind(),
        track,
        rows,
        payload,
        payload_len,
    };
    (plan, rejected)
}

/// Build a progressive MP4 from collected tracks.
///
/// A video track is required. Unrepresentable video samples are skipped and
/// counted; any problem with the audio track drops audio altogether.
pub fn build_progressive(tracks: &[CollectedTrack]) -> MuxResult<ProgressiveOutput> {
    let video = tracks
        .iter()
        .find(|t| t.kind() == TrackKind::Video)
        .ok_or_else(|| MuxError::TrackError("no video track to build from".into()))?;
    if video.timescale == 0 {
        return Err(MuxError::TrackError("video track has timescale 0".into()));
    }

    let (video_plan, rejected) = plan_track(video);
    if !rejected.is_empty() {
        warn!(
            skipped = rejected.len(),
            first = %rejected[0],
            "Skipping unrepresentable video samples"
        );
    }
    if video_plan.rows.is_empty() {
        return Err(MuxError::TrackError("video track has no usable samples".into()));
    }
    let skipped_samples = rejected.len();

    let mut plans = vec![video_plan];
    if let Some(audio) = tracks.iter().find(|t| t.kind() == TrackKind::Audio) {
        match plan_audio(audio) {
            Ok(plan) => plans.push(plan),
            Err(reason) => warn!(%reason, "Dropping audio track from progressive output"),
        }
    }

    let bytes = write_file(&plans)?;
    info!(
        bytes = bytes.len(),
        tracks = plans.len(),
        video_samples = plans[0].rows.len(),
        skipped_samples,
        "Progressive MP4 built"
    );

    Ok(ProgressiveOutput {
        bytes,
        skipped_samples,
        has_audio: plans.len() > 1,
    })
}

fn plan_audio(audio: &CollectedTrack) -> Result<TrackPlan<'_>, String> {
    if audio.timescale == 0 {
        return Err("audio timescale is 0".into());
    }
    let (plan, rejected) = plan_track(audio);
    if let Some(first) = rejected.first() {
        return Err(format!("{} unusable sample(s), {first}", rejected.len()));
    }
    if plan.rows.is_empty() {
        return Err("no audio samples".into());
    }
    Ok(plan)
}

/// Lay out and serialize the whole file.
fn write_file(plans: &[TrackPlan<'_>]) -> MuxResult<Vec<u8>> {
    let ftyp = ftyp_box()?;
    let payload_total: u64 = plans.iter().map(|p| p.payload_len).sum();
    let mdat_header = header_len_for(payload_total);

    // First pass: measure moov with placeholder offsets.
    let placeholder = vec![0u64; plans.len()];
    let mut wide = false;
    let mut moov_len = write_moov(plans, &placeholder, wide)?.len();
    let mut offsets = chunk_offsets(plans, ftyp.len() + moov_len + mdat_header);

    if offsets.iter().any(|&o| o > u32::MAX as u64) {
        wide = true;
        moov_len = write_moov(plans, &placeholder, wide)?.len();
        offsets = chunk_offsets(plans, ftyp.len() + moov_len + mdat_header);
        debug!(?offsets, "Chunk offsets exceed 32 bits, using co64");
    }

    // Second pass: real offsets. Field widths are unchanged, so is the size.
    let moov = write_moov(plans, &offsets, wide)?;
    if moov.len() != moov_len {
        return Err(MuxError::BufferFull(format!(
            "moov size changed between passes ({} then {})",
            moov_len,
            moov.len()
        )));
    }

    let total = ftyp.len() + moov.len() + mdat_header + payload_total as usize;
    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(&ftyp);
    out.extend_from_slice(&moov);
    let mdat_size = mdat_header as u64 + payload_total;
    if mdat_header == LARGE_BOX_HEADER_LEN {
        write_large_box_header(&mut out, b"mdat", mdat_size)?;
    } else {
        write_box_header(&mut out, b"mdat", mdat_size as u32)?;
    }
    for plan in plans {
        for data in &plan.payload {
            out.extend_from_slice(data);
        }
    }

    debug!(
        ftyp = ftyp.len(),
        moov = moov.len(),
        mdat = mdat_size,
        "Progressive layout"
    );
    Ok(out)
}

/// Absolute file offset of each track's single chunk.
fn chunk_offsets(plans: &[TrackPlan<'_>], mdat_start: usize) -> Vec<u64> {
    let mut next = mdat_start as u64;
    plans
        .iter()
        .map(|plan| {
            let offset = next;
            next += plan.payload_len;
            offset
        })
        .collect()
}

/// Write the ftyp (File Type) box.
fn ftyp_box() -> MuxResult<Vec<u8>> {
    let size = 8 + 4 + 4 + 4 * COMPATIBLE_BRANDS.len() as u32;
    let mut buf = Vec::with_capacity(size as usize);
    write_box_header(&mut buf, b"ftyp", size)?;
    buf.write_all(b"isom")?; // major brand
    buf.write_u32::<BigEndian>(0x200)?; // minor version
    for brand in COMPATIBLE_BRANDS {
        buf.write_all(brand)?;
    }
    Ok(buf)
}

/// Write the complete moov (Movie) box.
fn write_moov(plans: &[TrackPlan<'_>], offsets: &[u64], wide: bool) -> MuxResult<Vec<u8>> {
    let mut writer = Cursor::new(Vec::new());
    let size_pos = box_size_placeholder(&mut writer)?;
    writer.write_all(b"moov")?;

    let movie_duration = plans
        .iter()
        .map(|p| p.track.movie_duration())
        .max()
        .unwrap_or(0);
    let next_track_id = plans.iter().map(|p| p.track_id()).max().unwrap_or(0) + 1;
    write_mvhd(&mut writer, movie_duration, next_track_id)?;

    for (plan, &offset) in plans.iter().zip(offsets) {
        write_trak(&mut writer, plan, offset, wide)?;
    }

    fill_box_size(&mut writer, size_pos)?;
    Ok(writer.into_inner())
}

/// Write a 32-bit field, or a 64-bit one for version 1 boxes.
fn write_versioned<W: Write>(writer: &mut W, version: u8, value: u64) -> MuxResult<()> {
    if version == 1 {
        writer.write_u64::<BigEndian>(value)?;
    } else {
        writer.write_u32::<BigEndian>(value as u32)?;
    }
    Ok(())
}

fn version_for(duration: u64) -> u8 {
    if duration > u32::MAX as u64 {
        1
    } else {
        0
    }
}

/// Write the mvhd (Movie Header) box.
fn write_mvhd<W: Write + Seek>(writer: &mut W, duration: u64, next_track_id: u32) -> MuxResult<()> {
    let size_pos = box_size_placeholder(writer)?;
    writer.write_all(b"mvhd")?;

    let version = version_for(duration);
    writer.write_u32::<BigEndian>((version as u32) << 24)?; // version + flags
    write_versioned(writer, version, 0)?; // creation_time
    write_versioned(writer, version, 0)?; // modification_time
    writer.write_u32::<BigEndian>(MOVIE_TIMESCALE)?;
    write_versioned(writer, version, duration)?;

    write_fixed_point_16_16(writer, 1.0)?; // rate
    write_fixed_point_8_8(writer, 1.0)?; // volume
    write_zeros(writer, 10)?; // reserved
    write_unity_matrix(writer)?;
    write_zeros(writer, 24)?; // pre_defined (6 x u32)
    writer.write_u32::<BigEndian>(next_track_id)?;

    fill_box_size(writer, size_pos)?;
    Ok(())
}

/// Write the tkhd (Track Header) box.
fn write_tkhd<W: Write + Seek>(writer: &mut W, plan: &TrackPlan<'_>) -> MuxResult<()> {
    let size_pos = box_size_placeholder(writer)?;
    writer.write_all(b"tkhd")?;

    let duration = plan.track.movie_duration();
    let version = version_for(duration);
    // flags 0x000003: track_enabled | track_in_movie
    writer.write_u32::<BigEndian>(((version as u32) << 24) | 0x00_0003)?;
    write_versioned(writer, version, 0)?; // creation_time
    write_versioned(writer, version, 0)?; // modification_time
    writer.write_u32::<BigEndian>(plan.track_id())?;
    write_zeros(writer, 4)?; // reserved
    write_versioned(writer, version, duration)?;

    write_zeros(writer, 8)?; // reserved (2 x u32)
    writer.write_i16::<BigEndian>(0)?; // layer
    writer.write_i16::<BigEndian>(0)?; // alternate_group
    let (volume, width, height) = match plan.track.media {
        TrackMedia::Video { width, height } => (0.0, width, height),
        TrackMedia::Audio { .. } => (1.0, 0, 0),
    };
    write_fixed_point_8_8(writer, volume)?;
    write_zeros(writer, 2)?; // reserved
    write_unity_matrix(writer)?;
    write_fixed_point_16_16(writer, width as f64)?;
    write_fixed_point_16_16(writer, height as f64)?;

    fill_box_size(writer, size_pos)?;
    Ok(())
}

/// Write the mdhd (Media Header) box.
fn write_mdhd<W: Write + Seek>(writer: &mut W, timescale: u32, duration: u64) -> MuxResult<()> {
    let size_pos = box_size_placeholder(writer)?;
    writer.write_all(b"mdhd")?;

    let version = version_for(duration);
    writer.write_u32::<BigEndian>((version as u32) << 24)?;
    write_versioned(writer, version, 0)?;
    write_versioned(writer, version, 0)?;
    writer.write_u32::<BigEndian>(timescale)?;
    write_versioned(writer, version, duration)?;
    writer.write_u16::<BigEndian>(encode_language("und"))?;
    writer.write_u16::<BigEndian>(0)?; // pre_defined

    fill_box_size(writer, size_pos)?;
    Ok(())
}

/// Write the hdlr (Handler Reference) box.
fn write_hdlr<W: Write + Seek>(writer: &mut W, kind: TrackKind) -> MuxResult<()> {
    let name: &[u8] = match kind {
        TrackKind::Video => b"VideoHandler\0",
        TrackKind::Audio => b"SoundHandler\0",
    };

    let size_pos = box_size_placeholder(writer)?;
    writer.write_all(b"hdlr")?;
    writer.write_u32::<BigEndian>(0)?; // version + flags
    write_zeros(writer, 4)?; // pre_defined
    writer.write_all(&kind.handler_type())?;
    write_zeros(writer, 12)?; // reserved (3 x u32)
    writer.write_all(name)?;

    fill_box_size(writer, size_pos)?;
    Ok(())
}

/// Write a complete trak (Track) box.
fn write_trak<W: Write + Seek>(
    writer: &mut W,
    plan: &TrackPlan<'_>,
    chunk_offset: u64,
    wide: bool,
) -> MuxResult<()> {
    let size_pos = box_size_placeholder(writer)?;
    writer.write_all(b"trak")?;

    write_tkhd(writer, plan)?;

    let mdia_pos = box_size_placeholder(writer)?;
    writer.write_all(b"mdia")?;
    write_mdhd(writer, plan.track.timescale, plan.track.effective_duration())?;
    write_hdlr(writer, plan.kind)?;
    write_minf(writer, plan, chunk_offset, wide)?;
    fill_box_size(writer, mdia_pos)?;

    fill_box_size(writer, size_pos)?;
    Ok(())
}

/// Write the minf (Media Information) box.
fn write_minf<W: Write + Seek>(
    writer: &mut W,
    plan: &TrackPlan<'_>,
    chunk_offset: u64,
    wide: bool,
) -> MuxResult<()> {
    let size_pos = box_size_placeholder(writer)?;
    writer.write_all(b"minf")?;

    match plan.kind {
        TrackKind::Video => {
            write_full_box_header(writer, b"vmhd", 20, 0, 0x000001)?;
            writer.write_u16::<BigEndian>(0)?; // graphicsmode
            write_zeros(writer, 6)?; // opcolor
        }
        TrackKind::Audio => {
            write_full_box_header(writer, b"smhd", 16, 0, 0)?;
            writer.write_i16::<BigEndian>(0)?; // balance
            write_zeros(writer, 2)?; // reserved
        }
    }

    write_dinf(writer)?;
    write_stbl(writer, plan, chunk_offset, wide)?;

    fill_box_size(writer, size_pos)?;
    Ok(())
}

/// Write the dinf (Data Information) box with a self-contained `url ` reference.
fn write_dinf<W: Write + Seek>(writer: &mut W) -> MuxResult<()> {
    let size_pos = box_size_placeholder(writer)?;
    writer.write_all(b"dinf")?;

    let dref_pos = box_size_placeholder(writer)?;
    writer.write_all(b"dref")?;
    writer.write_u32::<BigEndian>(0)?; // version + flags
    writer.write_u32::<BigEndian>(1)?; // entry_count
    write_full_box_header(writer, b"url ", 12, 0, 0x000001)?;
    fill_box_size(writer, dref_pos)?;

    fill_box_size(writer, size_pos)?;
    Ok(())
}

/// Write the stbl (Sample Table) box.
fn write_stbl<W: Write + Seek>(
    writer: &mut W,
    plan: &TrackPlan<'_>,
    chunk_offset: u64,
    wide: bool,
) -> MuxResult<()> {
    let size_pos = box_size_placeholder(writer)?;
    writer.write_all(b"stbl")?;

    write_stsd(writer, plan)?;
    write_stts(writer, &plan.rows)?;
    if plan.rows.iter().any(|r| r.composition_offset != 0) {
        write_ctts(writer, &plan.rows)?;
    }
    write_stsc(writer, plan.rows.len() as u32)?;
    write_stsz(writer, &plan.rows)?;
    write_chunk_offset(writer, chunk_offset, wide)?;

    let sync_count = plan.rows.iter().filter(|r| r.is_sync).count();
    if sync_count > 0 && sync_count < plan.rows.len() {
        write_stss(writer, &plan.rows)?;
    }

    fill_box_size(writer, size_pos)?;
    Ok(())
}

/// Write the stsd (Sample Description) box.
fn write_stsd<W: Write + Seek>(writer: &mut W, plan: &TrackPlan<'_>) -> MuxResult<()> {
    match &plan.track.description {
        SampleDescription::Raw(raw) => {
            let valid = read_box_header(raw, 0)
                .map(|h| h.box_type == STSD && h.size as usize == raw.len())
                .unwrap_or(false);
            if valid {
                writer.write_all(raw)?;
                return Ok(());
            }
            warn!(
                track_id = plan.track_id(),
                len = raw.len(),
                "Source stsd is malformed, writing an empty one"
            );
            write_empty_stsd(writer)
        }
        SampleDescription::Structured(entry) => {
            let size_pos = box_size_placeholder(writer)?;
            writer.write_all(b"stsd")?;
            writer.write_u32::<BigEndian>(0)?; // version + flags
            writer.write_u32::<BigEndian>(1)?; // entry_count

            let entry_pos = box_size_placeholder(writer)?;
            writer.write_all(&entry.format)?;
            write_zeros(writer, 6)?; // reserved
            writer.write_u16::<BigEndian>(entry.data_reference_index)?;
            match plan.track.media {
                TrackMedia::Video { width, height } => {
                    write_visual_entry_fields(writer, width, height)?
                }
                TrackMedia::Audio {
                    channels,
                    sample_rate,
                } => write_audio_entry_fields(writer, channels, sample_rate)?,
            }
            writer.write_all(&entry.config_boxes)?;
            fill_box_size(writer, entry_pos)?;

            fill_box_size(writer, size_pos)?;
            Ok(())
        }
        SampleDescription::Missing => {
            warn!(
                track_id = plan.track_id(),
                "No sample description, output track will not be playable"
            );
            write_empty_stsd(writer)
        }
    }
}

fn write_empty_stsd<W: Write>(writer: &mut W) -> MuxResult<()> {
    write_full_box_header(writer, b"stsd", 16, 0, 0)?;
    writer.write_u32::<BigEndian>(0)?; // entry_count
    Ok(())
}

/// VisualSampleEntry fields after `data_reference_index`.
fn write_visual_entry_fields<W: Write>(writer: &mut W, width: u16, height: u16) -> MuxResult<()> {
    write_zeros(writer, 2)?; // pre_defined
    write_zeros(writer, 2)?; // reserved
    write_zeros(writer, 12)?; // pre_defined (3 x u32)
    writer.write_u16::<BigEndian>(width)?;
    writer.write_u16::<BigEndian>(height)?;
    writer.write_u32::<BigEndian>(0x0048_0000)?; // horizresolution (72 dpi)
    writer.write_u32::<BigEndian>(0x0048_0000)?; // vertresolution (72 dpi)
    write_zeros(writer, 4)?; // reserved
    writer.write_u16::<BigEndian>(1)?; // frame_count
    write_zeros(writer, 32)?; // compressorname
    writer.write_u16::<BigEndian>(0x0018)?; // depth
    writer.write_i16::<BigEndian>(-1)?; // pre_defined
    Ok(())
}

/// AudioSampleEntry fields after `data_reference_index`.
fn write_audio_entry_fields<W: Write>(
    writer: &mut W,
    channels: u16,
    sample_rate: u32,
) -> MuxResult<()> {
    write_zeros(writer, 8)?; // reserved (2 x u32)
    writer.write_u16::<BigEndian>(channels)?;
    writer.write_u16::<BigEndian>(16)?; // samplesize
    write_zeros(writer, 2)?; // pre_defined
    write_zeros(writer, 2)?; // reserved
    // 16.16 fixed point; rates above 65535 Hz do not fit and are written as 0
    let rate = if sample_rate <= 0xFFFF {
        sample_rate << 16
    } else {
        0
    };
    writer.write_u32::<BigEndian>(rate)?;
    Ok(())
}

/// Write stts (Decoding Time to Sample) box: run-length encoded durations.
fn write_stts<W: Write + Seek>(writer: &mut W, rows: &[SampleRow]) -> MuxResult<()> {
    let entries = run_length_encode(rows.iter().map(|r| r.duration));

    let size_pos = box_size_placeholder(writer)?;
    writer.write_all(b"stts")?;
    writer.write_u32::<BigEndian>(0)?; // version + flags
    writer.write_u32::<BigEndian>(entries.len() as u32)?;
    for (count, duration) in &entries {
        writer.write_u32::<BigEndian>(*count)?;
        writer.write_u32::<BigEndian>(*duration)?;
    }

    fill_box_size(writer, size_pos)?;
    Ok(())
}

/// Run-length encode a sequence into `(count, value)` pairs.
fn run_length_encode<T: PartialEq + Copy>(values: impl IntoIterator<Item = T>) -> Vec<(u32, T)> {
    let mut entries: Vec<(u32, T)> = Vec::new();
    for value in values {
        match entries.last_mut() {
            Some((count, current)) if *current == value => *count += 1,
            _ => entries.push((1, value)),
        }
    }
    entries
}

/// Write ctts (Composition Time to Sample) box: version 1 (signed offsets).
fn write_ctts<W: Write + Seek>(writer: &mut W, rows: &[SampleRow]) -> MuxResult<()> {
    let entries = run_length_encode(rows.iter().map(|r| r.composition_offset));

    let size_pos = box_size_placeholder(writer)?;
    writer.write_all(b"ctts")?;
    writer.write_u32::<BigEndian>(0x0100_0000)?; // version 1
    writer.write_u32::<BigEndian>(entries.len() as u32)?;
    for (count, offset) in &entries {
        writer.write_u32::<BigEndian>(*count)?;
        writer.write_i32::<BigEndian>(*offset)?;
    }

    fill_box_size(writer, size_pos)?;
    Ok(())
}

/// Write stsc (Sample to Chunk) box: every sample in chunk 1.
fn write_stsc<W: Write>(writer: &mut W, sample_count: u32) -> MuxResult<()> {
    write_full_box_header(writer, b"stsc", 28, 0, 0)?;
    writer.write_u32::<BigEndian>(1)?; // entry_count
    writer.write_u32::<BigEndian>(1)?; // first_chunk
    writer.write_u32::<BigEndian>(sample_count)?; // samples_per_chunk
    writer.write_u32::<BigEndian>(1)?; // sample_description_index
    Ok(())
}

/// Write stsz (Sample Size) box with one entry per sample.
fn write_stsz<W: Write + Seek>(writer: &mut W, rows: &[SampleRow]) -> MuxResult<()> {
    let size_pos = box_size_placeholder(writer)?;
    writer.write_all(b"stsz")?;
    writer.write_u32::<BigEndian>(0)?; // version + flags
    writer.write_u32::<BigEndian>(0)?; // sample_size = 0 (variable)
    writer.write_u32::<BigEndian>(rows.len() as u32)?;
    for row in rows {
        writer.write_u32::<BigEndian>(row.size)?;
    }

    fill_box_size(writer, size_pos)?;
    Ok(())
}

/// Write stco, or co64 when `wide`, holding the track's single chunk offset.
fn write_chunk_offset<W: Write>(writer: &mut W, offset: u64, wide: bool) -> MuxResult<()> {
    if wide {
        write_full_box_header(writer, b"co64", 24, 0, 0)?;
        writer.write_u32::<BigEndian>(1)?;
        writer.write_u64::<BigEndian>(offset)?;
    } else {
        write_full_box_header(writer, b"stco", 20, 0, 0)?;
        writer.write_u32::<BigEndian>(1)?;
        writer.write_u32::<BigEndian>(offset as u32)?;
    }
    Ok(())
}

/// Write stss (Sync Sample) box: 1-based sync sample numbers.
fn write_stss<W: Write + Seek>(writer: &mut W, rows: &[SampleRow]) -> MuxResult<()> {
    let sync_samples: Vec<u32> = rows
        .iter()
        .enumerate()
        .filter(|(_, r)| r.is_sync)
        .map(|(i, _)| (i + 1) as u32)
        .collect();

    let size_pos = box_size_placeholder(writer)?;
    writer.write_all(b"stss")?;
    writer.write_u32::<BigEndian>(0)?; // version + flags
    writer.write_u32::<BigEndian>(sync_samples.len() as u32)?;
    for sample_number in &sync_samples {
        writer.write_u32::<BigEndian>(*sample_number)?;
    }

    fill_box_size(writer, size_pos)?;
    Ok(())
}
