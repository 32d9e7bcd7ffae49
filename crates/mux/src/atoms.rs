//! Low-level MP4 atom/box writing primitives.
//!
//! Two styles are offered:
//! - owned builders (`make_box`, `make_full_box`, `concat_boxes`) used when
//!   splicing boxes copied out of existing files;
//! - streaming writers over `Write + Seek` with size placeholders, used by the
//!   progressive builder to emit `moov`.
//!
//! A box is a 4-byte big-endian size (header included) followed by a 4-byte
//! type. When the size does not fit in 32 bits the size field is 1 and a
//! 64-bit size follows the type. Full boxes add a version byte and 24 bits of
//! flags.

use byteorder::{BigEndian, WriteBytesExt};
use std::io::{Seek, SeekFrom, Write};

use crate::error::{MuxError, MuxResult};

/// Header length of a regular box.
pub const BOX_HEADER_LEN: usize = 8;
/// Header length of a box with a 64-bit size.
pub const LARGE_BOX_HEADER_LEN: usize = 16;

/// Header length needed for a box carrying `content_len` bytes.
pub fn header_len_for(content_len: u64) -> usize {
    if content_len + BOX_HEADER_LEN as u64 > u32::MAX as u64 {
        LARGE_BOX_HEADER_LEN
    } else {
        BOX_HEADER_LEN
    }
}

/// Build a complete box from its type and content.
pub fn make_box(box_type: &[u8; 4], content: &[u8]) -> Vec<u8> {
    let header_len = header_len_for(content.len() as u64);
    let total = header_len + content.len();
    let mut out = Vec::with_capacity(total);
    if header_len == LARGE_BOX_HEADER_LEN {
        out.extend_from_slice(&1u32.to_be_bytes());
        out.extend_from_slice(box_type);
        out.extend_from_slice(&(total as u64).to_be_bytes());
    } else {
        out.extend_from_slice(&(total as u32).to_be_bytes());
        out.extend_from_slice(box_type);
    }
    out.extend_from_slice(content);
    out
}

/// Build a full box: version and flags are prepended to `content`.
pub fn make_full_box(box_type: &[u8; 4], version: u8, flags: u32, content: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(4 + content.len());
    body.extend_from_slice(&version_flags(version, flags).to_be_bytes());
    body.extend_from_slice(content);
    make_box(box_type, &body)
}

/// Concatenate already serialized boxes.
pub fn concat_boxes<B: AsRef<[u8]>>(parts: &[B]) -> Vec<u8> {
    let total = parts.iter().map(|p| p.as_ref().len()).sum();
    let mut out = Vec::with_capacity(total);
    for part in parts {
        out.extend_from_slice(part.as_ref());
    }
    out
}

fn version_flags(version: u8, flags: u32) -> u32 {
    ((version as u32) << 24) | (flags & 0x00FF_FFFF)
}

/// Write a standard box header: 4-byte size + 4-byte type.
///
/// `size` is the total box size including the 8-byte header.
pub fn write_box_header<W: Write>(writer: &mut W, box_type: &[u8; 4], size: u32) -> MuxResult<()> {
    writer.write_u32::<BigEndian>(size)?;
    writer.write_all(box_type)?;
    Ok(())
}

/// Write a "full box" header: 4-byte size + 4-byte type + 1-byte version + 3-byte flags.
pub fn write_full_box_header<W: Write>(
    writer: &mut W,
    box_type: &[u8; 4],
    size: u32,
    version: u8,
    flags: u32,
) -> MuxResult<()> {
    writer.write_u32::<BigEndian>(size)?;
    writer.write_all(box_type)?;
    writer.write_u32::<BigEndian>(version_flags(version, flags))?;
    Ok(())
}

/// Write a box size placeholder (4 bytes of zeros) and return the stream position
/// where the size should be patched later.
///
/// Usage pattern:
/// ```ignore
/// let pos = box_size_placeholder(&mut writer)?;
/// writer.write_all(b"moov")?;
/// // ... write box content ...
/// fill_box_size(&mut writer, pos)?;
/// ```
pub fn box_size_placeholder<W: Write + Seek>(writer: &mut W) -> MuxResult<u64> {
    let pos = writer.stream_position()?;
    writer.write_u32::<BigEndian>(0)?;
    Ok(pos)
}

/// Patch the box size at the given position with the actual size
/// (from `pos` to current position).
pub fn fill_box_size<W: Write + Seek>(writer: &mut W, size_pos: u64) -> MuxResult<()> {
    let current = writer.stream_position()?;
    let size = current - size_pos;

    if size > u32::MAX as u64 {
        return Err(MuxError::BufferFull(format!(
            "Box size {} exceeds 32-bit limit",
            size
        )));
    }

    writer.seek(SeekFrom::Start(size_pos))?;
    writer.write_u32::<BigEndian>(size as u32)?;
    writer.seek(SeekFrom::Start(current))?;
    Ok(())
}

/// Write a 64-bit box header for large boxes (size == 1 signals extended size).
pub fn write_large_box_header<W: Write>(
    writer: &mut W,
    box_type: &[u8; 4],
    large_size: u64,
) -> MuxResult<()> {
    writer.write_u32::<BigEndian>(1)?;
    writer.write_all(box_type)?;
    writer.write_u64::<BigEndian>(large_size)?;
    Ok(())
}

/// Write a fixed-point 16.16 number.
pub fn write_fixed_point_16_16<W: Write>(writer: &mut W, value: f64) -> MuxResult<()> {
    let fixed = (value * 65536.0).round() as i32;
    writer.write_i32::<BigEndian>(fixed)?;
    Ok(())
}

/// Write a fixed-point 8.8 number.
pub fn write_fixed_point_8_8<W: Write>(writer: &mut W, value: f64) -> MuxResult<()> {
    let fixed = (value * 256.0).round() as i16;
    writer.write_i16::<BigEndian>(fixed)?;
    Ok(())
}

/// Write the 3x3 identity transformation matrix used by `mvhd` and `tkhd`.
pub fn write_unity_matrix<W: Write>(writer: &mut W) -> MuxResult<()> {
    for i in 0..8 {
        let value = if i == 0 || i == 4 { 1.0 } else { 0.0 };
        write_fixed_point_16_16(writer, value)?;
    }
    // [2][2] is 2.30 fixed point
    writer.write_u32::<BigEndian>(0x4000_0000)?;
    Ok(())
}

/// Write zero padding bytes.
pub fn write_zeros<W: Write>(writer: &mut W, count: usize) -> MuxResult<()> {
    let zeros = vec![0u8; count];
    writer.write_all(&zeros)?;
    Ok(())
}

/// ISO 639-2/T language code packed into 3x5 bits.
/// Falls back to "und" (undetermined) for anything that is not three lowercase letters.
pub fn encode_language(lang: &str) -> u16 {
    let bytes = lang.as_bytes();
    if bytes.len() != 3 || !bytes.iter().all(u8::is_ascii_lowercase) {
        return encode_language("und");
    }
    let a = (bytes[0] - 0x60) as u16;
    let b = (bytes[1] - 0x60) as u16;
    let c = (bytes[2] - 0x60) as u16;
    (a << 10) | (b << 5) | c
}
