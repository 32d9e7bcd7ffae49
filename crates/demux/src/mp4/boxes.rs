//! ISO BMFF box (atom) reader.
//!
//! Works on in-memory byte slices: DASH inputs arrive as whole buffers, so
//! every parser here takes a `&[u8]` and never copies payload bytes.
//!
//! - Box headers (32-bit, 64-bit extended, size 0 = "to end of buffer")
//! - Flat top-level scans and immediate-child lookups
//! - A tagged box tree with a fixed container allow-list
//! - Full-box parsers for the movie, sample table and fragment boxes
//!
//! Reference: ISO 14496-12 (ISO Base Media File Format).

use byteorder::{BigEndian, ReadBytesExt};
use dm_common::{DemuxError, DemuxResult};
use std::io::{Cursor, Read};
use tracing::{debug, trace};

// ─── Box FourCC constants ────────────────────────────────────────────

/// Convert 4 ASCII bytes to a u32 FourCC code.
pub const fn fourcc(a: u8, b: u8, c: u8, d: u8) -> u32 {
    ((a as u32) << 24) | ((b as u32) << 16) | ((c as u32) << 8) | (d as u32)
}

pub const FTYP: u32 = fourcc(b'f', b't', b'y', b'p');
pub const STYP: u32 = fourcc(b's', b't', b'y', b'p');
pub const MOOV: u32 = fourcc(b'm', b'o', b'o', b'v');
pub const MVHD: u32 = fourcc(b'm', b'v', b'h', b'd');
pub const TRAK: u32 = fourcc(b't', b'r', b'a', b'k');
pub const TKHD: u32 = fourcc(b't', b'k', b'h', b'd');
pub const EDTS: u32 = fourcc(b'e', b'd', b't', b's');
pub const MDIA: u32 = fourcc(b'm', b'd', b'i', b'a');
pub const MDHD: u32 = fourcc(b'm', b'd', b'h', b'd');
pub const HDLR: u32 = fourcc(b'h', b'd', b'l', b'r');
pub const MINF: u32 = fourcc(b'm', b'i', b'n', b'f');
pub const DINF: u32 = fourcc(b'd', b'i', b'n', b'f');
pub const STBL: u32 = fourcc(b's', b't', b'b', b'l');
pub const STSD: u32 = fourcc(b's', b't', b's', b'd');
pub const STTS: u32 = fourcc(b's', b't', b't', b's');
pub const STSC: u32 = fourcc(b's', b't', b's', b'c');
pub const STSZ: u32 = fourcc(b's', b't', b's', b'z');
pub const STCO: u32 = fourcc(b's', b't', b'c', b'o');
pub const CO64: u32 = fourcc(b'c', b'o', b'6', b'4');
pub const STSS: u32 = fourcc(b's', b't', b's', b's');
pub const CTTS: u32 = fourcc(b'c', b't', b't', b's');
pub const MVEX: u32 = fourcc(b'm', b'v', b'e', b'x');
pub const TREX: u32 = fourcc(b't', b'r', b'e', b'x');
pub const SIDX: u32 = fourcc(b's', b'i', b'd', b'x');
pub const MOOF: u32 = fourcc(b'm', b'o', b'o', b'f');
pub const MFHD: u32 = fourcc(b'm', b'f', b'h', b'd');
pub const TRAF: u32 = fourcc(b't', b'r', b'a', b'f');
pub const TFHD: u32 = fourcc(b't', b'f', b'h', b'd');
pub const TFDT: u32 = fourcc(b't', b'f', b'd', b't');
pub const TRUN: u32 = fourcc(b't', b'r', b'u', b'n');
pub const MDAT: u32 = fourcc(b'm', b'd', b'a', b't');
pub const FREE: u32 = fourcc(b'f', b'r', b'e', b'e');

/// Boxes whose payload is a sequence of child boxes. Everything else is an opaque leaf.
pub const CONTAINER_TYPES: [u32; 10] = [MOOV, TRAK, MDIA, MINF, STBL, MVEX, MOOF, TRAF, DINF, EDTS];

/// Whether the tree walker may descend into this box type.
pub fn is_container(box_type: u32) -> bool {
    CONTAINER_TYPES.contains(&box_type)
}

/// Convert a FourCC u32 to a human-readable string for logging.
pub fn fourcc_to_string(cc: u32) -> String {
    let bytes = cc.to_be_bytes();
    bytes
        .iter()
        .map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '?'
            }
        })
        .collect()
}

// ─── Box Header ─────────────────────────────────────────────────────

/// A parsed ISO BMFF box header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoxHeader {
    /// FourCC type code.
    pub box_type: u32,
    /// Total box size (including header). A size field of 0 is already
    /// resolved to "rest of buffer".
    pub size: u64,
    /// Offset of the box start in the buffer.
    pub offset: u64,
    /// Size of the header itself (8 or 16 bytes).
    pub header_size: u8,
}

impl BoxHeader {
    /// Byte offset where the box content (payload) starts.
    pub fn content_offset(&self) -> u64 {
        self.offset + self.header_size as u64
    }

    /// Byte size of the content (payload), excluding the header.
    pub fn content_size(&self) -> u64 {
        self.size.saturating_sub(self.header_size as u64)
    }

    /// Byte offset of the first byte after this box.
    pub fn end_offset(&self) -> u64 {
        self.offset.saturating_add(self.size)
    }

    /// Whether the header is self-consistent and the box fits in `buf_len` bytes.
    pub fn fits(&self, buf_len: usize) -> bool {
        self.size >= self.header_size as u64 && self.end_offset() <= buf_len as u64
    }

    /// The whole box (header included) inside `buf`.
    pub fn bytes<'a>(&self, buf: &'a [u8]) -> &'a [u8] {
        &buf[self.offset as usize..self.end_offset() as usize]
    }

    /// The payload inside `buf`.
    pub fn body<'a>(&self, buf: &'a [u8]) -> &'a [u8] {
        &buf[self.content_offset() as usize..self.end_offset() as usize]
    }
}

/// Read the box header at `offset`.
///
/// Returns `None` when fewer than 8 bytes remain, or fewer than 16 for an
/// extended (size field 1) header. The returned size is not checked against
/// the buffer; see [`BoxHeader::fits`].
pub fn read_box_header(buf: &[u8], offset: usize) -> Option<BoxHeader> {
    let head = buf.get(offset..offset.checked_add(8)?)?;
    let size32 = u32::from_be_bytes([head[0], head[1], head[2], head[3]]);
    let box_type = u32::from_be_bytes([head[4], head[5], head[6], head[7]]);

    let (size, header_size) = match size32 {
        // Box extends to the end of the buffer
        0 => ((buf.len() - offset) as u64, 8u8),
        1 => {
            let ext = buf.get(offset + 8..offset + 16)?;
            let mut size64 = [0u8; 8];
            size64.copy_from_slice(ext);
            (u64::from_be_bytes(size64), 16u8)
        }
        _ => (size32 as u64, 8u8),
    };

    trace!(
        "Box '{}' at offset {}, size {}",
        fourcc_to_string(box_type),
        offset,
        size
    );

    Some(BoxHeader {
        box_type,
        size,
        offset: offset as u64,
        header_size,
    })
}

/// Scan `buf[start..end]` as a flat sequence of boxes.
///
/// Stops silently at a box whose size is below its header size or which
/// overruns `end`; the boxes read before it are returned.
fn scan_boxes(buf: &[u8], start: usize, end: usize) -> Vec<BoxHeader> {
    let region = &buf[..end.min(buf.len())];
    let mut boxes = Vec::new();
    let mut offset = start;

    while let Some(header) = read_box_header(region, offset) {
        if !header.fits(region.len()) {
            debug!(
                "Stopping box scan at offset {}: '{}' size {} does not fit in {} bytes",
                offset,
                fourcc_to_string(header.box_type),
                header.size,
                region.len()
            );
            break;
        }
        offset = header.end_offset() as usize;
        boxes.push(header);
    }

    boxes
}

/// Parse a buffer into its top-level boxes. Never errors.
pub fn parse_boxes(buf: &[u8]) -> Vec<BoxHeader> {
    scan_boxes(buf, 0, buf.len())
}

/// Immediate children of a container box, with offsets relative to `container`.
///
/// `container` is the whole box including its own header.
pub fn child_boxes(container: &[u8]) -> Vec<BoxHeader> {
    match read_box_header(container, 0) {
        Some(outer) => {
            let end = (outer.size as usize).min(container.len());
            scan_boxes(container, outer.header_size as usize, end)
        }
        None => Vec::new(),
    }
}

/// First immediate child of `container` with the given type.
pub fn find_sub_box(container: &[u8], box_type: u32) -> Option<&[u8]> {
    find_sub_box_with_offset(container, box_type).map(|(_, bytes)| bytes)
}

/// Like [`find_sub_box`], also returning the child's offset inside `container`.
pub fn find_sub_box_with_offset(container: &[u8], box_type: u32) -> Option<(usize, &[u8])> {
    child_boxes(container)
        .into_iter()
        .find(|h| h.box_type == box_type)
        .map(|h| (h.offset as usize, h.bytes(container)))
}

/// All immediate children of `container` with the given type, in order.
pub fn find_all_sub_boxes(container: &[u8], box_type: u32) -> Vec<(usize, &[u8])> {
    child_boxes(container)
        .into_iter()
        .filter(|h| h.box_type == box_type)
        .map(|h| (h.offset as usize, h.bytes(container)))
        .collect()
}

/// Payload of a box given as a whole-box slice.
pub fn box_body(bytes: &[u8]) -> &[u8] {
    match read_box_header(bytes, 0) {
        Some(h) if h.fits(bytes.len()) => h.body(bytes),
        _ => &[],
    }
}

// ─── Box Tree ───────────────────────────────────────────────────────

/// A box and, for allow-listed containers, its parsed children.
#[derive(Clone, Debug)]
pub enum BoxNode<'a> {
    Leaf {
        header: BoxHeader,
        bytes: &'a [u8],
    },
    Container {
        header: BoxHeader,
        bytes: &'a [u8],
        children: Vec<BoxNode<'a>>,
    },
}

impl<'a> BoxNode<'a> {
    /// Build the tree for every top-level box in `buf`.
    pub fn parse_tree(buf: &'a [u8]) -> Vec<BoxNode<'a>> {
        parse_boxes(buf)
            .into_iter()
            .map(|h| Self::from_header(buf, h))
            .collect()
    }

    /// Build the tree for a single whole-box slice.
    pub fn parse(bytes: &'a [u8]) -> Option<BoxNode<'a>> {
        let header = read_box_header(bytes, 0)?;
        if !header.fits(bytes.len()) {
            return None;
        }
        Some(Self::from_header(bytes, header))
    }

    fn from_header(buf: &'a [u8], header: BoxHeader) -> BoxNode<'a> {
        let bytes = header.bytes(buf);
        if is_container(header.box_type) {
            let children = scan_boxes(bytes, header.header_size as usize, bytes.len())
                .into_iter()
                .map(|h| Self::from_header(bytes, h))
                .collect();
            BoxNode::Container {
                header,
                bytes,
                children,
            }
        } else {
            BoxNode::Leaf { header, bytes }
        }
    }

    pub fn header(&self) -> &BoxHeader {
        match self {
            BoxNode::Leaf { header, .. } | BoxNode::Container { header, .. } => header,
        }
    }

    pub fn box_type(&self) -> u32 {
        self.header().box_type
    }

    /// Whole box bytes, header included.
    pub fn bytes(&self) -> &'a [u8] {
        match self {
            BoxNode::Leaf { bytes, .. } | BoxNode::Container { bytes, .. } => bytes,
        }
    }

    /// Payload bytes.
    pub fn body(&self) -> &'a [u8] {
        &self.bytes()[self.header().header_size as usize..]
    }

    /// Children of a container; empty for leaves.
    pub fn children(&self) -> &[BoxNode<'a>] {
        match self {
            BoxNode::Leaf { .. } => &[],
            BoxNode::Container { children, .. } => children,
        }
    }

    /// First immediate child of the given type.
    pub fn child(&self, box_type: u32) -> Option<&BoxNode<'a>> {
        self.children().iter().find(|c| c.box_type() == box_type)
    }

    /// Follow `path` from this node's children, e.g. `[MDIA, MINF, STBL, STSD]`.
    pub fn find_path(&self, path: &[u32]) -> Option<&BoxNode<'a>> {
        find_path(self.children(), path)
    }
}

/// Follow a type path through a list of sibling nodes.
pub fn find_path<'n, 'a>(nodes: &'n [BoxNode<'a>], path: &[u32]) -> Option<&'n BoxNode<'a>> {
    let (first, rest) = path.split_first()?;
    let node = nodes.iter().find(|n| n.box_type() == *first)?;
    if rest.is_empty() {
        Some(node)
    } else {
        find_path(node.children(), rest)
    }
}

// ─── Full Box ───────────────────────────────────────────────────────

/// Read the version byte and 24-bit flags that open every full box.
fn read_version_flags(reader: &mut Cursor<&[u8]>) -> DemuxResult<(u8, u32)> {
    let version = reader.read_u8()?;
    let flags = reader.read_u24::<BigEndian>()?;
    Ok((version, flags))
}

/// Skip `n` bytes, failing if the body is too short.
fn skip(reader: &mut Cursor<&[u8]>, n: u64) -> DemuxResult<()> {
    let target = reader.position() + n;
    let len = reader.get_ref().len() as u64;
    if target > len {
        return Err(DemuxError::TruncatedData {
            expected: target as usize,
            got: len as usize,
        });
    }
    reader.set_position(target);
    Ok(())
}

/// Capacity hint bounded by what the body can actually hold.
fn bounded_capacity(entry_count: u32, body: &[u8], entry_size: usize) -> usize {
    (entry_count as usize).min(body.len() / entry_size.max(1))
}

// ─── mvhd Box ───────────────────────────────────────────────────────

/// Parsed mvhd (Movie Header) box.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MvhdBox {
    pub timescale: u32,
    pub duration: u64,
    pub next_track_id: u32,
}

/// Parse an mvhd payload.
pub fn parse_mvhd(body: &[u8]) -> DemuxResult<MvhdBox> {
    let mut reader = Cursor::new(body);
    let (version, _) = read_version_flags(&mut reader)?;

    let (timescale, duration) = if version == 1 {
        skip(&mut reader, 16)?;
        let timescale = reader.read_u32::<BigEndian>()?;
        let duration = reader.read_u64::<BigEndian>()?;
        (timescale, duration)
    } else {
        skip(&mut reader, 8)?;
        let timescale = reader.read_u32::<BigEndian>()?;
        let duration = reader.read_u32::<BigEndian>()? as u64;
        (timescale, duration)
    };

    // rate (4), volume (2), reserved (10), matrix (36), pre_defined (24)
    skip(&mut reader, 76)?;
    let next_track_id = reader.read_u32::<BigEndian>()?;

    debug!("mvhd: timescale={}, duration={}", timescale, duration);

    Ok(MvhdBox {
        timescale,
        duration,
        next_track_id,
    })
}

// ─── mdhd Box ───────────────────────────────────────────────────────

/// Parsed mdhd (Media Header) box: per-track timescale and duration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MdhdBox {
    pub timescale: u32,
    pub duration: u64,
}

pub fn parse_mdhd(body: &[u8]) -> DemuxResult<MdhdBox> {
    let mut reader = Cursor::new(body);
    let (version, _) = read_version_flags(&mut reader)?;

    let (timescale, duration) = if version == 1 {
        skip(&mut reader, 16)?;
        let timescale = reader.read_u32::<BigEndian>()?;
        let duration = reader.read_u64::<BigEndian>()?;
        (timescale, duration)
    } else {
        skip(&mut reader, 8)?;
        let timescale = reader.read_u32::<BigEndian>()?;
        let duration = reader.read_u32::<BigEndian>()?;
        // All-ones means "unknown" in version 0
        let duration = if duration == u32::MAX { 0 } else { duration as u64 };
        (timescale, duration)
    };

    debug!("mdhd: timescale={}, duration={}", timescale, duration);

    Ok(MdhdBox {
        timescale,
        duration,
    })
}

// ─── hdlr Box ───────────────────────────────────────────────────────

/// Parsed hdlr (Handler Reference) box: identifies track type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HdlrBox {
    /// Handler type: 'vide', 'soun', etc.
    pub handler_type: [u8; 4],
    pub name: String,
}

pub fn parse_hdlr(body: &[u8]) -> DemuxResult<HdlrBox> {
    let mut reader = Cursor::new(body);
    read_version_flags(&mut reader)?;

    // pre_defined
    skip(&mut reader, 4)?;
    let mut handler_type = [0u8; 4];
    reader.read_exact(&mut handler_type)?;
    // reserved (3 * 4)
    skip(&mut reader, 12)?;

    let rest = &body[reader.position() as usize..];
    let name_end = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
    let name = String::from_utf8_lossy(&rest[..name_end]).to_string();

    debug!(
        "hdlr: handler_type='{}', name='{}'",
        String::from_utf8_lossy(&handler_type),
        name
    );

    Ok(HdlrBox { handler_type, name })
}

// ─── tkhd Box ───────────────────────────────────────────────────────

/// Parsed tkhd (Track Header) box: track id, dimensions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TkhdBox {
    pub version: u8,
    pub track_id: u32,
    pub width: u32,
    pub height: u32,
    pub duration: u64,
}

pub fn parse_tkhd(body: &[u8]) -> DemuxResult<TkhdBox> {
    let mut reader = Cursor::new(body);
    let (version, _) = read_version_flags(&mut reader)?;

    let (track_id, duration) = if version == 1 {
        skip(&mut reader, 16)?;
        let track_id = reader.read_u32::<BigEndian>()?;
        skip(&mut reader, 4)?;
        let duration = reader.read_u64::<BigEndian>()?;
        (track_id, duration)
    } else {
        skip(&mut reader, 8)?;
        let track_id = reader.read_u32::<BigEndian>()?;
        skip(&mut reader, 4)?;
        let duration = reader.read_u32::<BigEndian>()? as u64;
        (track_id, duration)
    };

    // reserved (8), layer (2), alt_group (2), volume (2), reserved (2), matrix (36)
    skip(&mut reader, 52)?;

    // width and height are 16.16 fixed-point
    let width = reader.read_u32::<BigEndian>()? >> 16;
    let height = reader.read_u32::<BigEndian>()? >> 16;

    debug!(
        "tkhd: track_id={}, duration={}, {}x{}",
        track_id, duration, width, height
    );

    Ok(TkhdBox {
        version,
        track_id,
        width,
        height,
        duration,
    })
}

// ─── stsd Box ───────────────────────────────────────────────────────

/// First sample entry of an stsd box, with the fields the engine needs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StsdEntry {
    pub format: [u8; 4],
    pub data_reference_index: u16,
    /// Video only.
    pub width: u16,
    pub height: u16,
    /// Audio only.
    pub channels: u16,
    pub sample_rate: u32,
    /// Serialized child boxes after the fixed entry fields (avcC, esds, ...).
    pub config_boxes: Vec<u8>,
}

/// VisualSampleEntry fixed fields after the 8-byte entry header.
const VISUAL_ENTRY_FIELDS: usize = 78;
/// AudioSampleEntry (version 0) fixed fields after the 8-byte entry header.
const AUDIO_ENTRY_FIELDS: usize = 28;

/// Parse the first entry of an stsd payload. `is_video` selects the entry layout.
pub fn parse_stsd(body: &[u8], is_video: bool) -> DemuxResult<Option<StsdEntry>> {
    let mut reader = Cursor::new(body);
    read_version_flags(&mut reader)?;
    let entry_count = reader.read_u32::<BigEndian>()?;
    if entry_count == 0 {
        debug!("stsd: no entries");
        return Ok(None);
    }

    let entries = &body[8..];
    let header = match read_box_header(entries, 0) {
        Some(h) if h.fits(entries.len()) => h,
        _ => {
            return Err(DemuxError::InvalidStructure {
                offset: 8,
                reason: "stsd entry overruns its box".into(),
            })
        }
    };
    let entry_body = header.body(entries);
    let mut reader = Cursor::new(entry_body);

    // reserved (6)
    skip(&mut reader, 6)?;
    let data_reference_index = reader.read_u16::<BigEndian>()?;

    let mut entry = StsdEntry {
        format: header.box_type.to_be_bytes(),
        data_reference_index,
        width: 0,
        height: 0,
        channels: 0,
        sample_rate: 0,
        config_boxes: Vec::new(),
    };

    let fixed = if is_video {
        // pre_defined (2), reserved (2), pre_defined (12)
        skip(&mut reader, 16)?;
        entry.width = reader.read_u16::<BigEndian>()?;
        entry.height = reader.read_u16::<BigEndian>()?;
        VISUAL_ENTRY_FIELDS
    } else {
        // reserved (8)
        skip(&mut reader, 8)?;
        entry.channels = reader.read_u16::<BigEndian>()?;
        // samplesize (2), pre_defined (2), reserved (2)
        skip(&mut reader, 6)?;
        entry.sample_rate = reader.read_u32::<BigEndian>()? >> 16;
        AUDIO_ENTRY_FIELDS
    };

    if entry_body.len() > fixed {
        entry.config_boxes = entry_body[fixed..].to_vec();
    }

    debug!(
        "stsd: format='{}', {} config bytes",
        String::from_utf8_lossy(&entry.format),
        entry.config_boxes.len()
    );

    Ok(Some(entry))
}

// ─── Sample Table Boxes (stbl children) ─────────────────────────────

/// stts (Decoding Time to Sample) entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SttsEntry {
    pub sample_count: u32,
    pub sample_delta: u32,
}

/// Parse an stts payload. Returns the entry list.
pub fn parse_stts(body: &[u8]) -> DemuxResult<Vec<SttsEntry>> {
    let mut reader = Cursor::new(body);
    read_version_flags(&mut reader)?;

    let entry_count = reader.read_u32::<BigEndian>()?;
    let mut entries = Vec::with_capacity(bounded_capacity(entry_count, body, 8));

    for _ in 0..entry_count {
        let sample_count = reader.read_u32::<BigEndian>()?;
        let sample_delta = reader.read_u32::<BigEndian>()?;
        entries.push(SttsEntry {
            sample_count,
            sample_delta,
        });
    }

    debug!("stts: {} entries", entries.len());
    Ok(entries)
}

/// Expand stts runs into one duration per sample.
pub fn expand_stts(entries: &[SttsEntry]) -> Vec<u32> {
    entries
        .iter()
        .flat_map(|e| std::iter::repeat(e.sample_delta).take(e.sample_count as usize))
        .collect()
}

/// ctts (Composition Time to Sample) entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CttsEntry {
    pub sample_count: u32,
    /// Composition offset (can be negative in version 1).
    pub sample_offset: i32,
}

/// Parse a ctts payload. Returns the entry list.
pub fn parse_ctts(body: &[u8]) -> DemuxResult<Vec<CttsEntry>> {
    let mut reader = Cursor::new(body);
    let (version, _) = read_version_flags(&mut reader)?;

    let entry_count = reader.read_u32::<BigEndian>()?;
    let mut entries = Vec::with_capacity(bounded_capacity(entry_count, body, 8));

    for _ in 0..entry_count {
        let sample_count = reader.read_u32::<BigEndian>()?;
        let sample_offset = if version == 0 {
            // Unsigned in version 0
            reader.read_u32::<BigEndian>()? as i32
        } else {
            reader.read_i32::<BigEndian>()?
        };
        entries.push(CttsEntry {
            sample_count,
            sample_offset,
        });
    }

    debug!("ctts: {} entries (version {})", entries.len(), version);
    Ok(entries)
}

/// stsc (Sample to Chunk) entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StscEntry {
    /// First chunk number (1-based).
    pub first_chunk: u32,
    pub samples_per_chunk: u32,
    pub sample_description_index: u32,
}

pub fn parse_stsc(body: &[u8]) -> DemuxResult<Vec<StscEntry>> {
    let mut reader = Cursor::new(body);
    read_version_flags(&mut reader)?;

    let entry_count = reader.read_u32::<BigEndian>()?;
    let mut entries = Vec::with_capacity(bounded_capacity(entry_count, body, 12));

    for _ in 0..entry_count {
        let first_chunk = reader.read_u32::<BigEndian>()?;
        let samples_per_chunk = reader.read_u32::<BigEndian>()?;
        let sample_description_index = reader.read_u32::<BigEndian>()?;
        entries.push(StscEntry {
            first_chunk,
            samples_per_chunk,
            sample_description_index,
        });
    }

    debug!("stsc: {} entries", entries.len());
    Ok(entries)
}

/// Parsed stsz (Sample Size) box.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StszBox {
    /// If non-zero, all samples have this uniform size.
    pub default_sample_size: u32,
    /// Individual sample sizes (empty if default_sample_size > 0).
    pub sample_sizes: Vec<u32>,
    pub sample_count: u32,
}

pub fn parse_stsz(body: &[u8]) -> DemuxResult<StszBox> {
    let mut reader = Cursor::new(body);
    read_version_flags(&mut reader)?;

    let default_sample_size = reader.read_u32::<BigEndian>()?;
    let sample_count = reader.read_u32::<BigEndian>()?;

    let sample_sizes = if default_sample_size == 0 {
        let mut sizes = Vec::with_capacity(bounded_capacity(sample_count, body, 4));
        for _ in 0..sample_count {
            sizes.push(reader.read_u32::<BigEndian>()?);
        }
        sizes
    } else {
        Vec::new()
    };

    debug!(
        "stsz: {} samples, default_size={}",
        sample_count, default_sample_size
    );

    Ok(StszBox {
        default_sample_size,
        sample_sizes,
        sample_count,
    })
}

/// Parse an stco (32-bit chunk offset) payload.
pub fn parse_stco(body: &[u8]) -> DemuxResult<Vec<u64>> {
    let mut reader = Cursor::new(body);
    read_version_flags(&mut reader)?;

    let entry_count = reader.read_u32::<BigEndian>()?;
    let mut offsets = Vec::with_capacity(bounded_capacity(entry_count, body, 4));

    for _ in 0..entry_count {
        offsets.push(reader.read_u32::<BigEndian>()? as u64);
    }

    debug!("stco: {} chunk offsets", offsets.len());
    Ok(offsets)
}

/// Parse a co64 (64-bit chunk offset) payload.
pub fn parse_co64(body: &[u8]) -> DemuxResult<Vec<u64>> {
    let mut reader = Cursor::new(body);
    read_version_flags(&mut reader)?;

    let entry_count = reader.read_u32::<BigEndian>()?;
    let mut offsets = Vec::with_capacity(bounded_capacity(entry_count, body, 8));

    for _ in 0..entry_count {
        offsets.push(reader.read_u64::<BigEndian>()?);
    }

    debug!("co64: {} chunk offsets", offsets.len());
    Ok(offsets)
}

/// Parse an stss (sync sample) payload. Returns 1-based sample numbers.
pub fn parse_stss(body: &[u8]) -> DemuxResult<Vec<u32>> {
    let mut reader = Cursor::new(body);
    read_version_flags(&mut reader)?;

    let entry_count = reader.read_u32::<BigEndian>()?;
    let mut sync_samples = Vec::with_capacity(bounded_capacity(entry_count, body, 4));

    for _ in 0..entry_count {
        sync_samples.push(reader.read_u32::<BigEndian>()?);
    }

    debug!("stss: {} sync samples", sync_samples.len());
    Ok(sync_samples)
}

// ─── Fragment Boxes (mvex / moof children) ──────────────────────────

/// Parsed trex (Track Extends) box: per-track fragment defaults.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TrexBox {
    pub track_id: u32,
    pub default_sample_description_index: u32,
    pub default_sample_duration: u32,
    pub default_sample_size: u32,
    pub default_sample_flags: u32,
}

pub fn parse_trex(body: &[u8]) -> DemuxResult<TrexBox> {
    let mut reader = Cursor::new(body);
    read_version_flags(&mut reader)?;

    Ok(TrexBox {
        track_id: reader.read_u32::<BigEndian>()?,
        default_sample_description_index: reader.read_u32::<BigEndian>()?,
        default_sample_duration: reader.read_u32::<BigEndian>()?,
        default_sample_size: reader.read_u32::<BigEndian>()?,
        default_sample_flags: reader.read_u32::<BigEndian>()?,
    })
}

/// Parse an mfhd payload. Returns the fragment sequence number.
pub fn parse_mfhd(body: &[u8]) -> DemuxResult<u32> {
    let mut reader = Cursor::new(body);
    read_version_flags(&mut reader)?;
    Ok(reader.read_u32::<BigEndian>()?)
}

pub const TFHD_BASE_DATA_OFFSET: u32 = 0x0000_0001;
pub const TFHD_SAMPLE_DESCRIPTION_INDEX: u32 = 0x0000_0002;
pub const TFHD_DEFAULT_DURATION: u32 = 0x0000_0008;
pub const TFHD_DEFAULT_SIZE: u32 = 0x0000_0010;
pub const TFHD_DEFAULT_FLAGS: u32 = 0x0000_0020;
pub const TFHD_DURATION_IS_EMPTY: u32 = 0x0001_0000;
pub const TFHD_DEFAULT_BASE_IS_MOOF: u32 = 0x0002_0000;

/// Parsed tfhd (Track Fragment Header) box.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TfhdBox {
    pub flags: u32,
    pub track_id: u32,
    pub base_data_offset: Option<u64>,
    pub sample_description_index: Option<u32>,
    pub default_sample_duration: Option<u32>,
    pub default_sample_size: Option<u32>,
    pub default_sample_flags: Option<u32>,
}

impl TfhdBox {
    pub fn default_base_is_moof(&self) -> bool {
        self.flags & TFHD_DEFAULT_BASE_IS_MOOF != 0
    }
}

pub fn parse_tfhd(body: &[u8]) -> DemuxResult<TfhdBox> {
    let mut reader = Cursor::new(body);
    let (_, flags) = read_version_flags(&mut reader)?;

    let mut tfhd = TfhdBox {
        flags,
        track_id: reader.read_u32::<BigEndian>()?,
        ..Default::default()
    };
    if flags & TFHD_BASE_DATA_OFFSET != 0 {
        tfhd.base_data_offset = Some(reader.read_u64::<BigEndian>()?);
    }
    if flags & TFHD_SAMPLE_DESCRIPTION_INDEX != 0 {
        tfhd.sample_description_index = Some(reader.read_u32::<BigEndian>()?);
    }
    if flags & TFHD_DEFAULT_DURATION != 0 {
        tfhd.default_sample_duration = Some(reader.read_u32::<BigEndian>()?);
    }
    if flags & TFHD_DEFAULT_SIZE != 0 {
        tfhd.default_sample_size = Some(reader.read_u32::<BigEndian>()?);
    }
    if flags & TFHD_DEFAULT_FLAGS != 0 {
        tfhd.default_sample_flags = Some(reader.read_u32::<BigEndian>()?);
    }

    trace!("tfhd: track_id={}, flags={:#08x}", tfhd.track_id, flags);
    Ok(tfhd)
}

/// Parse a tfdt payload. Returns the base media decode time.
pub fn parse_tfdt(body: &[u8]) -> DemuxResult<u64> {
    let mut reader = Cursor::new(body);
    let (version, _) = read_version_flags(&mut reader)?;
    if version == 1 {
        Ok(reader.read_u64::<BigEndian>()?)
    } else {
        Ok(reader.read_u32::<BigEndian>()? as u64)
    }
}

pub const TRUN_DATA_OFFSET: u32 = 0x0000_0001;
pub const TRUN_FIRST_SAMPLE_FLAGS: u32 = 0x0000_0004;
pub const TRUN_SAMPLE_DURATION: u32 = 0x0000_0100;
pub const TRUN_SAMPLE_SIZE: u32 = 0x0000_0200;
pub const TRUN_SAMPLE_FLAGS: u32 = 0x0000_0400;
pub const TRUN_SAMPLE_COMPOSITION_OFFSET: u32 = 0x0000_0800;

/// One trun sample record. Absent fields fall back to tfhd/trex defaults.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct TrunSample {
    pub duration: Option<u32>,
    pub size: Option<u32>,
    pub flags: Option<u32>,
    pub composition_offset: Option<i32>,
}

/// Parsed trun (Track Fragment Run) box.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TrunBox {
    pub data_offset: Option<i32>,
    pub first_sample_flags: Option<u32>,
    /// Declared sample count.
    pub sample_count: u32,
    /// Per-sample records; empty when the flags carry no per-sample fields.
    pub samples: Vec<TrunSample>,
}

impl TrunBox {
    /// Record for sample `index`, or an all-defaults record when none is stored.
    pub fn sample(&self, index: usize) -> TrunSample {
        self.samples.get(index).copied().unwrap_or_default()
    }
}

pub fn parse_trun(body: &[u8]) -> DemuxResult<TrunBox> {
    let mut reader = Cursor::new(body);
    let (version, flags) = read_version_flags(&mut reader)?;
    let sample_count = reader.read_u32::<BigEndian>()?;

    let mut trun = TrunBox::default();
    if flags & TRUN_DATA_OFFSET != 0 {
        trun.data_offset = Some(reader.read_i32::<BigEndian>()?);
    }
    if flags & TRUN_FIRST_SAMPLE_FLAGS != 0 {
        trun.first_sample_flags = Some(reader.read_u32::<BigEndian>()?);
    }

    let record_size = [
        TRUN_SAMPLE_DURATION,
        TRUN_SAMPLE_SIZE,
        TRUN_SAMPLE_FLAGS,
        TRUN_SAMPLE_COMPOSITION_OFFSET,
    ]
    .iter()
    .filter(|&&f| flags & f != 0)
    .count()
        * 4;

    trun.sample_count = sample_count;
    if record_size == 0 {
        trace!("trun: {} samples, no per-sample fields", sample_count);
        return Ok(trun);
    }

    trun.samples.reserve(bounded_capacity(sample_count, body, record_size));
    for _ in 0..sample_count {
        let mut sample = TrunSample::default();
        if flags & TRUN_SAMPLE_DURATION != 0 {
            sample.duration = Some(reader.read_u32::<BigEndian>()?);
        }
        if flags & TRUN_SAMPLE_SIZE != 0 {
            sample.size = Some(reader.read_u32::<BigEndian>()?);
        }
        if flags & TRUN_SAMPLE_FLAGS != 0 {
            sample.flags = Some(reader.read_u32::<BigEndian>()?);
        }
        if flags & TRUN_SAMPLE_COMPOSITION_OFFSET != 0 {
            // Version 0 stores the offset unsigned; values above i32::MAX do not occur in practice.
            sample.composition_offset = Some(if version == 0 {
                reader.read_u32::<BigEndian>()? as i32
            } else {
                reader.read_i32::<BigEndian>()?
            });
        }
        trun.samples.push(sample);
    }

    trace!("trun: {} samples, flags={:#08x}", trun.samples.len(), flags);
    Ok(trun)
}

/// `sample_is_non_sync_sample` bit of the sample flags word.
pub const SAMPLE_FLAG_NON_SYNC: u32 = 0x0001_0000;

/// Whether a sample with these flags is a sync sample.
pub fn is_sync_sample(flags: u32) -> bool {
    flags & SAMPLE_FLAG_NON_SYNC == 0
}

// ─── Tests ──────────────────────────────────────────────────────────
