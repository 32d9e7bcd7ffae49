//! Merge an audio track into a video `moov`.

use dm_demux::mp4::boxes::{
    child_boxes, fourcc_to_string, read_box_header, MOOV, MVEX,
};
use tracing::debug;

use crate::atoms::{concat_boxes, make_box};
use crate::error::{MuxError, MuxResult};
use crate::patch::{set_next_track_id, set_track_id, set_track_id_in_trex};

/// Track ID given to the audio track in merged output.
pub const AUDIO_TRACK_ID: u32 = 2;
/// `next_track_ID` of a merged movie (video 1, audio 2).
pub const MERGED_NEXT_TRACK_ID: u32 = 3;

/// Insert `audio_trak` (and its `trex`, if any) into a copy of `video_moov`.
///
/// The audio track is renumbered to 2. When the video movie has an `mvex`
/// and an audio `trex` is supplied, the `trak` goes in front of `mvex` and the
/// `trex` is appended inside it, so `mvex` stays the last child. Otherwise the
/// `trak` is appended at the end of the movie.
pub fn merge_moov(video_moov: &[u8], audio_trak: &[u8], audio_trex: Option<&[u8]>) -> MuxResult<Vec<u8>> {
    let header = read_box_header(video_moov, 0)
        .ok_or_else(|| MuxError::Structural("video moov is shorter than a box header".into()))?;
    if header.box_type != MOOV {
        return Err(MuxError::Structural(format!(
            "expected a moov box, found '{}'",
            fourcc_to_string(header.box_type)
        )));
    }

    if !header.fits(video_moov.len()) {
        return Err(MuxError::Structural(format!(
            "video moov size {} does not fit its {} bytes",
            header.size,
            video_moov.len()
        )));
    }

    let mut trak = audio_trak.to_vec();
    set_track_id(&mut trak, AUDIO_TRACK_ID);

    let moov_end = header.end_offset() as usize;
    let body_start = header.header_size as usize;
    let children = child_boxes(&video_moov[..moov_end]);
    let mvex = children.iter().find(|h| h.box_type == MVEX);

    let body = match (mvex, audio_trex) {
        (Some(mvex), Some(trex)) => {
            let mut trex = trex.to_vec();
            set_track_id_in_trex(&mut trex, AUDIO_TRACK_ID);

            let mvex_start = mvex.offset as usize;
            let mvex_end = mvex.end_offset() as usize;
            let new_mvex = make_box(b"mvex", &concat_boxes(&[mvex.body(video_moov), &trex[..]]));
            debug!(
                trak = trak.len(),
                trex = trex.len(),
                "Inserting audio trak before mvex"
            );
            concat_boxes(&[
                &video_moov[body_start..mvex_start],
                &video_moov[mvex_end..moov_end],
                &trak[..],
                &new_mvex[..],
            ])
        }
        _ => {
            debug!(trak = trak.len(), "Appending audio trak to moov");
            concat_boxes(&[&video_moov[body_start..moov_end], &trak[..]])
        }
    };

    let mut merged = make_box(b"moov", &body);
    set_next_track_id(&mut merged, MERGED_NEXT_TRACK_ID);
    Ok(merged)
}
