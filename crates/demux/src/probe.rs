//! Buffer probing: detect whether an input is an ISO BMFF file and how it is laid out.

use crate::mp4::boxes::{
    find_sub_box, parse_boxes, FREE, FTYP, MDAT, MOOF, MOOV, MVEX, SIDX, STYP,
};

/// Top-level layout of an MP4 buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Mp4Layout {
    /// `moov` with `mvex`, or any `moof` present.
    Fragmented,
    /// `moov` indexing an `mdat` through its sample tables.
    Progressive,
    /// Media segments without an init segment (no `moov`).
    SegmentsOnly,
}

/// Whether the buffer starts with a box type an MP4 file can start with.
pub fn looks_like_mp4(buf: &[u8]) -> bool {
    if buf.len() < 8 {
        return false;
    }
    let box_type = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
    [FTYP, STYP, MOOV, MDAT, FREE, SIDX, MOOF].contains(&box_type)
}

/// Classify the buffer's layout from its top-level boxes.
///
/// Returns `None` when no `moov` or `moof` box can be found.
pub fn probe_layout(buf: &[u8]) -> Option<Mp4Layout> {
    let boxes = parse_boxes(buf);
    let has_moof = boxes.iter().any(|h| h.box_type == MOOF);
    let moov = boxes.iter().find(|h| h.box_type == MOOV);

    match moov {
        Some(moov) => {
            let has_mvex = find_sub_box(moov.bytes(buf), MVEX).is_some();
            if has_moof || has_mvex {
                Some(Mp4Layout::Fragmented)
            } else {
                Some(Mp4Layout::Progressive)
            }
        }
        None if has_moof => Some(Mp4Layout::SegmentsOnly),
        None => None,
    }
}
