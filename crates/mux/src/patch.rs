//! In-place patching of track ID fields in boxes copied from a source file.
//!
//! Every patcher works on a caller-owned copy. A box too short to hold the
//! field is left untouched and reported as not patched.

use byteorder::{BigEndian, ByteOrder};
use dm_demux::mp4::boxes::{find_all_sub_boxes, find_sub_box_with_offset, MVHD, TFHD, TKHD, TRAF};
use tracing::trace;

/// Offset of the track/reference ID in `trex`, `tfhd` and `sidx` (header-relative).
const ID_AT_12: usize = 12;
const TKHD_ID_V0: usize = 20;
const TKHD_ID_V1: usize = 28;
const MVHD_NEXT_ID_V0: usize = 104;
const MVHD_NEXT_ID_V1: usize = 116;

/// Write `value` at `box_start + field` if the box is long enough.
fn write_field(buf: &mut [u8], box_start: usize, box_len: usize, field: usize, value: u32) -> bool {
    if box_len < field + 4 || box_start + field + 4 > buf.len() {
        return false;
    }
    BigEndian::write_u32(&mut buf[box_start + field..], value);
    true
}

/// Locate a child box and return `(offset, len, version)`.
fn locate_full_box(container: &[u8], box_type: u32) -> Option<(usize, usize, u8)> {
    let (offset, bytes) = find_sub_box_with_offset(container, box_type)?;
    let version = *bytes.get(8)?;
    Some((offset, bytes.len(), version))
}

/// Set the track ID of a `trak` by patching its `tkhd`.
pub fn set_track_id(trak: &mut [u8], track_id: u32) -> bool {
    let Some((offset, len, version)) = locate_full_box(trak, TKHD) else {
        return false;
    };
    let field = if version == 1 { TKHD_ID_V1 } else { TKHD_ID_V0 };
    write_field(trak, offset, len, field, track_id)
}

pub fn set_track_id_in_trex(trex: &mut [u8], track_id: u32) -> bool {
    let len = trex.len();
    write_field(trex, 0, len, ID_AT_12, track_id)
}

/// Set `reference_ID` of a segment index box.
pub fn set_track_id_in_sidx(sidx: &mut [u8], track_id: u32) -> bool {
    let len = sidx.len();
    write_field(sidx, 0, len, ID_AT_12, track_id)
}

pub fn set_track_id_in_tfhd(tfhd: &mut [u8], track_id: u32) -> bool {
    let len = tfhd.len();
    write_field(tfhd, 0, len, ID_AT_12, track_id)
}

/// Patch the `tfhd` of every `traf` in a movie fragment.
///
/// Returns the number of track fragments patched.
pub fn set_track_id_in_moof(moof: &mut [u8], track_id: u32) -> usize {
    let tfhd_positions: Vec<(usize, usize)> = find_all_sub_boxes(moof, TRAF)
        .into_iter()
        .filter_map(|(traf_offset, traf)| {
            find_sub_box_with_offset(traf, TFHD).map(|(off, tfhd)| (traf_offset + off, tfhd.len()))
        })
        .collect();

    let patched = tfhd_positions
        .into_iter()
        .filter(|&(offset, len)| write_field(moof, offset, len, ID_AT_12, track_id))
        .count();
    trace!(track_id, patched, "Patched tfhd track IDs in moof");
    patched
}

/// Set `mvhd.next_track_ID` inside a `moov`.
pub fn set_next_track_id(moov: &mut [u8], next_id: u32) -> bool {
    let Some((offset, len, version)) = locate_full_box(moov, MVHD) else {
        return false;
    };
    let field = if version == 1 {
        MVHD_NEXT_ID_V1
    } else {
        MVHD_NEXT_ID_V0
    };
    write_field(moov, offset, len, field, next_id)
}
