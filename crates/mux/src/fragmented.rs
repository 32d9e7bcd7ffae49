//! Fragmented output: one init segment for both tracks, followed by the
//! source fragments of each stream.

use dm_common::TrackKind;
use dm_demux::mp4::boxes::{
    box_body, child_boxes, find_all_sub_boxes, parse_boxes, parse_hdlr, parse_tkhd, parse_trex, BoxHeader,
    BoxNode, FTYP, HDLR, MDAT, MDIA, MOOF, MOOV, MVEX, SIDX, TKHD, TRAK, TREX,
};
use tracing::{debug, info, warn};

use crate::atoms::concat_boxes;
use crate::error::{MuxError, MuxResult};
use crate::merge::{merge_moov, AUDIO_TRACK_ID};
use crate::patch::{
    set_track_id, set_track_id_in_moof, set_track_id_in_sidx, set_track_id_in_trex,
};

/// Track ID the video track carries in merged output.
pub const VIDEO_TRACK_ID: u32 = 1;

/// A `trak` located inside a `moov`.
struct TrakInfo<'a> {
    /// Offset of the `trak` within the `moov`.
    offset: usize,
    bytes: &'a [u8],
    track_id: u32,
    kind: Option<TrackKind>,
}

fn inspect_trak(offset: usize, bytes: &[u8]) -> Option<TrakInfo<'_>> {
    let node = BoxNode::parse(bytes)?;
    let tkhd = parse_tkhd(node.child(TKHD)?.body()).ok()?;
    let kind = node
        .find_path(&[MDIA, HDLR])
        .and_then(|hdlr| parse_hdlr(hdlr.body()).ok())
        .and_then(|hdlr| TrackKind::from_handler(&hdlr.handler_type));
    Some(TrakInfo {
        offset,
        bytes,
        track_id: tkhd.track_id,
        kind,
    })
}

/// First track of `kind` in a `moov`; falls back to the first parsable track.
fn find_trak(moov: &[u8], kind: TrackKind) -> Option<TrakInfo<'_>> {
    let traks: Vec<TrakInfo<'_>> = find_all_sub_boxes(moov, TRAK)
        .into_iter()
        .filter_map(|(offset, bytes)| inspect_trak(offset, bytes))
        .collect();
    let wanted = traks.iter().position(|t| t.kind == Some(kind));
    match wanted {
        Some(i) => traks.into_iter().nth(i),
        None => traks.into_iter().next(),
    }
}

/// The `trex` for `track_id` inside the `moov`'s `mvex`, as `(offset in moov, bytes)`.
fn find_trex(moov: &[u8], track_id: u32) -> Option<(usize, &[u8])> {
    let mvex = child_boxes(moov).into_iter().find(|h| h.box_type == MVEX)?;
    let mvex_bytes = mvex.bytes(moov);
    find_all_sub_boxes(mvex_bytes, TREX)
        .into_iter()
        .find(|(_, trex)| {
            parse_trex(box_body(trex))
                .map(|t| t.track_id == track_id)
                .unwrap_or(false)
        })
        .map(|(offset, trex)| (mvex.offset as usize + offset, trex))
}

fn top_level<'a>(boxes: &'a [BoxHeader], box_type: u32) -> Option<&'a BoxHeader> {
    boxes.iter().find(|h| h.box_type == box_type)
}

/// Renumber the video track of a `moov` copy to `VIDEO_TRACK_ID`.
fn normalize_video_moov(moov: &[u8], trak: &TrakInfo<'_>) -> Vec<u8> {
    let mut out = moov.to_vec();
    let trak_range = trak.offset..trak.offset + trak.bytes.len();
    set_track_id(&mut out[trak_range], VIDEO_TRACK_ID);
    if let Some((offset, trex)) = find_trex(moov, trak.track_id) {
        set_track_id_in_trex(&mut out[offset..offset + trex.len()], VIDEO_TRACK_ID);
    }
    out
}

/// Copy the `sidx`/`moof`/`mdat` boxes of a stream, renumbering them to
/// `track_id` when given.
fn collect_fragments(buf: &[u8], boxes: &[BoxHeader], track_id: Option<u32>) -> (Vec<u8>, usize) {
    let mut out = Vec::new();
    let mut moof_count = 0;
    for header in boxes {
        match header.box_type {
            SIDX | MOOF | MDAT => {}
            _ => continue,
        }
        let start = out.len();
        out.extend_from_slice(header.bytes(buf));
        let Some(id) = track_id else {
            if header.box_type == MOOF {
                moof_count += 1;
            }
            continue;
        };
        let copied = &mut out[start..];
        match header.box_type {
            SIDX => {
                set_track_id_in_sidx(copied, id);
            }
            MOOF => {
                moof_count += 1;
                if set_track_id_in_moof(copied, id) == 0 {
                    warn!(offset = header.offset, "moof without a patchable tfhd");
                }
            }
            _ => {}
        }
    }
    (out, moof_count)
}

/// Combine a fragmented video stream and a fragmented audio stream.
///
/// Output layout: video `ftyp`, merged `moov`, the video `sidx`/`moof`/`mdat`
/// boxes, then the audio ones with every track reference renumbered to 2.
/// The caller is expected to check the result size against the input.
pub fn assemble_fragmented(video: &[u8], audio: &[u8]) -> MuxResult<Vec<u8>> {
    let video_boxes = parse_boxes(video);
    let audio_boxes = parse_boxes(audio);

    let ftyp = top_level(&video_boxes, FTYP)
        .ok_or_else(|| MuxError::Structural("video buffer has no ftyp".into()))?
        .bytes(video);
    let video_moov = top_level(&video_boxes, MOOV)
        .ok_or_else(|| MuxError::Structural("video buffer has no moov".into()))?
        .bytes(video);
    let audio_moov = top_level(&audio_boxes, MOOV)
        .ok_or_else(|| MuxError::Structural("audio buffer has no moov".into()))?
        .bytes(audio);

    let audio_trak = find_trak(audio_moov, TrackKind::Audio)
        .ok_or_else(|| MuxError::Structural("audio moov has no trak".into()))?;
    let audio_trex = find_trex(audio_moov, audio_trak.track_id).map(|(_, trex)| trex);

    let video_trak = find_trak(video_moov, TrackKind::Video);
    let renumber_video = video_trak
        .as_ref()
        .filter(|t| t.track_id != VIDEO_TRACK_ID)
        .map(|t| {
            info!(
                from = t.track_id,
                to = VIDEO_TRACK_ID,
                "Renumbering video track"
            );
            normalize_video_moov(video_moov, t)
        });
    let video_moov: &[u8] = renumber_video.as_deref().unwrap_or(video_moov);

    let merged_moov = merge_moov(video_moov, audio_trak.bytes, audio_trex)?;

    let video_id = renumber_video.as_ref().map(|_| VIDEO_TRACK_ID);
    let (video_fragments, video_moofs) = collect_fragments(video, &video_boxes, video_id);
    let (audio_fragments, audio_moofs) =
        collect_fragments(audio, &audio_boxes, Some(AUDIO_TRACK_ID));

    debug!(
        video_moofs,
        audio_moofs,
        has_audio_trex = audio_trex.is_some(),
        "Collected fragments"
    );

    let output = concat_boxes(&[ftyp, &merged_moov[..], &video_fragments[..], &audio_fragments[..]]);
    info!(
        bytes = output.len(),
        video_bytes = video.len(),
        audio_bytes = audio.len(),
        "Fragmented MP4 assembled"
    );
    Ok(output)
}
