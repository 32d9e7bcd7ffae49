//! Synthetic DASH streams for integration tests.
//!
//! Each stream is an init segment (`ftyp` + `moov` with `mvex`) followed by
//! `moof`/`mdat` pairs using default-base-is-moof addressing, as produced by
//! common DASH packagers.

#![allow(dead_code)]

use dm_common::TrackKind;

pub const SYNC: u32 = 0x0200_0000;
pub const NON_SYNC: u32 = 0x0101_0000;

#[derive(Clone, Debug)]
pub struct FixtureSample {
    pub data: Vec<u8>,
    pub duration: u32,
    pub composition_offset: i32,
    pub is_sync: bool,
}

/// Description of one single-track DASH stream.
#[derive(Clone, Debug)]
pub struct StreamSpec {
    pub track_id: u32,
    pub kind: TrackKind,
    pub timescale: u32,
    pub fragments: Vec<Vec<FixtureSample>>,
    pub with_sidx: bool,
}

pub fn make_box(box_type: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut buf = ((payload.len() + 8) as u32).to_be_bytes().to_vec();
    buf.extend_from_slice(box_type);
    buf.extend_from_slice(payload);
    buf
}

pub fn make_full_box(box_type: &[u8; 4], version: u8, flags: u32, fields: &[u8]) -> Vec<u8> {
    let mut payload = vec![version];
    payload.extend_from_slice(&flags.to_be_bytes()[1..]);
    payload.extend_from_slice(fields);
    make_box(box_type, &payload)
}

pub fn u32s(values: &[u32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_be_bytes()).collect()
}

/// `count` video samples of `size` bytes; every `gop`-th is a keyframe.
pub fn video_samples(count: usize, size: usize, gop: usize, fill: u8) -> Vec<FixtureSample> {
    (0..count)
        .map(|i| FixtureSample {
            data: vec![fill.wrapping_add(i as u8); size],
            duration: 3000,
            composition_offset: if i % 2 == 1 { 6000 } else { 0 },
            is_sync: i % gop == 0,
        })
        .collect()
}

pub fn audio_samples(count: usize, size: usize, fill: u8) -> Vec<FixtureSample> {
    (0..count)
        .map(|i| FixtureSample {
            data: vec![fill.wrapping_add(i as u8); size],
            duration: 1024,
            composition_offset: 0,
            is_sync: true,
        })
        .collect()
}

/// Video stream: track `track_id`, 90 kHz, one fragment per entry of `fragments`.
pub fn video_spec(track_id: u32, fragments: Vec<Vec<FixtureSample>>) -> StreamSpec {
    StreamSpec {
        track_id,
        kind: TrackKind::Video,
        timescale: 90_000,
        fragments,
        with_sidx: true,
    }
}

/// Audio stream: track `track_id`, 48 kHz.
pub fn audio_spec(track_id: u32, fragments: Vec<Vec<FixtureSample>>) -> StreamSpec {
    StreamSpec {
        track_id,
        kind: TrackKind::Audio,
        timescale: 48_000,
        fragments,
        with_sidx: true,
    }
}

fn stsd(kind: TrackKind) -> Vec<u8> {
    let entry = match kind {
        TrackKind::Video => {
            let mut fields = vec![0u8; 6];
            fields.extend_from_slice(&1u16.to_be_bytes()); // data_reference_index
            fields.extend_from_slice(&[0u8; 16]);
            fields.extend_from_slice(&640u16.to_be_bytes());
            fields.extend_from_slice(&360u16.to_be_bytes());
            fields.extend_from_slice(&u32s(&[0x0048_0000, 0x0048_0000, 0]));
            fields.extend_from_slice(&1u16.to_be_bytes());
            fields.extend_from_slice(&[0u8; 32]);
            fields.extend_from_slice(&[0x00, 0x18, 0xFF, 0xFF]);
            fields.extend_from_slice(&make_box(b"avcC", &[1, 0x64, 0x00, 0x1F, 0xFF, 0xE0, 0x00]));
            make_box(b"avc1", &fields)
        }
        TrackKind::Audio => {
            let mut fields = vec![0u8; 6];
            fields.extend_from_slice(&1u16.to_be_bytes());
            fields.extend_from_slice(&[0u8; 8]);
            fields.extend_from_slice(&2u16.to_be_bytes()); // channelcount
            fields.extend_from_slice(&16u16.to_be_bytes()); // samplesize
            fields.extend_from_slice(&[0u8; 4]);
            fields.extend_from_slice(&(48_000u32 << 16).to_be_bytes());
            fields.extend_from_slice(&make_full_box(b"esds", 0, 0, &[0x03, 0x00]));
            make_box(b"mp4a", &fields)
        }
    };
    let mut body = u32s(&[1]);
    body.extend_from_slice(&entry);
    make_full_box(b"stsd", 0, 0, &body)
}

fn trak(spec: &StreamSpec) -> Vec<u8> {
    let (width, height) = match spec.kind {
        TrackKind::Video => (640u32 << 16, 360u32 << 16),
        TrackKind::Audio => (0, 0),
    };
    let mut tkhd = u32s(&[0, 0, spec.track_id, 0, 0]);
    tkhd.extend_from_slice(&[0u8; 52]);
    tkhd.extend_from_slice(&u32s(&[width, height]));
    let tkhd = make_full_box(b"tkhd", 0, 3, &tkhd);

    let mdhd = make_full_box(b"mdhd", 0, 0, &u32s(&[0, 0, spec.timescale, 0, 0x55C4_0000]));
    let mut hdlr = vec![0u8; 4];
    hdlr.extend_from_slice(&spec.kind.handler_type());
    hdlr.extend_from_slice(&[0u8; 12]);
    hdlr.extend_from_slice(b"fixture\0");
    let hdlr = make_full_box(b"hdlr", 0, 0, &hdlr);

    let empty = u32s(&[0]);
    let stbl = [
        stsd(spec.kind),
        make_full_box(b"stts", 0, 0, &empty),
        make_full_box(b"stsc", 0, 0, &empty),
        make_full_box(b"stsz", 0, 0, &u32s(&[0, 0])),
        make_full_box(b"stco", 0, 0, &empty),
    ]
    .concat();
    let minf = make_box(b"minf", &make_box(b"stbl", &stbl));
    let mdia = make_box(b"mdia", &[mdhd, hdlr, minf].concat());
    make_box(b"trak", &[tkhd, mdia].concat())
}

fn moov(spec: &StreamSpec) -> Vec<u8> {
    let mut mvhd = u32s(&[0, 0, 1000, 0]);
    mvhd.extend_from_slice(&[0u8; 76]);
    mvhd.extend_from_slice(&u32s(&[spec.track_id + 1]));
    let mvhd = make_full_box(b"mvhd", 0, 0, &mvhd);
    let trex = make_full_box(b"trex", 0, 0, &u32s(&[spec.track_id, 1, 0, 0, 0]));
    let mvex = make_box(b"mvex", &trex);
    make_box(b"moov", &[mvhd, trak(spec), mvex].concat())
}

fn moof(spec: &StreamSpec, sequence: u32, decode_time: u64, samples: &[FixtureSample]) -> Vec<u8> {
    let build = |data_offset: u32| {
        let tfhd = make_full_box(b"tfhd", 0, 0x02_0000, &u32s(&[spec.track_id]));
        let tfdt = make_full_box(b"tfdt", 1, 0, &decode_time.to_be_bytes());
        let mut trun = u32s(&[samples.len() as u32, data_offset]);
        for s in samples {
            let flags = if s.is_sync { SYNC } else { NON_SYNC };
            trun.extend_from_slice(&u32s(&[s.duration, s.data.len() as u32, flags]));
            trun.extend_from_slice(&s.composition_offset.to_be_bytes());
        }
        let trun = make_full_box(b"trun", 1, 0x000F01, &trun);
        let traf = make_box(b"traf", &[tfhd, tfdt, trun].concat());
        let mfhd = make_full_box(b"mfhd", 0, 0, &u32s(&[sequence]));
        make_box(b"moof", &[mfhd, traf].concat())
    };
    let moof_len = build(0).len() as u32;
    build(moof_len + 8)
}

fn sidx(spec: &StreamSpec) -> Vec<u8> {
    // reference_ID, timescale, earliest_presentation_time, first_offset, reserved, reference_count
    let mut fields = u32s(&[spec.track_id, spec.timescale, 0, 0]);
    fields.extend_from_slice(&[0, 0, 0, 0]);
    make_full_box(b"sidx", 0, 0, &fields)
}

/// `ftyp` + `moov` of a stream, without any fragments.
pub fn init_segment(spec: &StreamSpec) -> Vec<u8> {
    let ftyp = make_box(b"ftyp", &[b"iso6".as_slice(), &[0, 0, 0, 0], b"iso6dash"].concat());
    [ftyp, moov(spec)].concat()
}

/// Serialize a complete single-track stream.
pub fn dash_stream(spec: &StreamSpec) -> Vec<u8> {
    let mut out = init_segment(spec);
    if spec.with_sidx {
        out.extend_from_slice(&sidx(spec));
    }
    let mut decode_time = 0u64;
    for (i, samples) in spec.fragments.iter().enumerate() {
        out.extend_from_slice(&moof(spec, i as u32 + 1, decode_time, samples));
        let payload: Vec<u8> = samples.iter().flat_map(|s| s.data.iter().copied()).collect();
        out.extend_from_slice(&make_box(b"mdat", &payload));
        decode_time += samples.iter().map(|s| s.duration as u64).sum::<u64>();
    }
    out
}

/// All sample payloads of a stream, in order.
pub fn payloads(spec: &StreamSpec) -> Vec<Vec<u8>> {
    spec.fragments
        .iter()
        .flatten()
        .map(|s| s.data.clone())
        .collect()
}
