mod common;

use std::thread;
use std::time::Duration;

use byteorder::{BigEndian, ByteOrder};
use common::{
    audio_samples, audio_spec, dash_stream, init_segment, make_box, make_full_box, payloads, u32s,
    video_samples, video_spec,
};
use dm_common::{
    CollectedTrack, DemuxResult, MuxConfig, MuxProgress, MuxStrategy, OutputKind, TrackKind,
};
use dm_demux::mp4::boxes::{
    box_body, child_boxes, find_all_sub_boxes, find_sub_box, parse_boxes, parse_mdhd,
    parse_mvhd, parse_tkhd, parse_trex, BoxNode, HDLR, MDAT, MDHD, MDIA, MOOF, MOOV, MVEX,
    MVHD, SIDX, TKHD, TRAK, TREX,
};
use dm_demux::{
    collect_samples, CollectOutcome, Collection, Mp4Demuxer, SampleBatch, SampleSource,
    SourceTrack,
};
use dm_mux::{assemble_fragmented, build_progressive, Remuxer};

fn two_fragment_video() -> common::StreamSpec {
    video_spec(
        1,
        vec![
            video_samples(6, 300, 3, 0x10),
            video_samples(6, 300, 3, 0x40),
        ],
    )
}

fn one_fragment_audio() -> common::StreamSpec {
    audio_spec(1, vec![audio_samples(20, 50, 0x80)])
}

fn collect_all(buf: Vec<u8>) -> Collection {
    let demuxer = Mp4Demuxer::open(buf).unwrap();
    let collection = collect_samples(demuxer, Duration::from_secs(10)).unwrap();
    assert_eq!(collection.outcome, CollectOutcome::Complete);
    collection
}

fn track_payloads(track: &CollectedTrack) -> Vec<Vec<u8>> {
    track.samples.iter().map(|s| s.data.clone()).collect()
}

fn moov_of(buf: &[u8]) -> &[u8] {
    parse_boxes(buf)
        .into_iter()
        .find(|h| h.box_type == MOOV)
        .expect("moov")
        .bytes(buf)
}

#[test]
fn merged_moov_has_both_tracks_and_trex() {
    let video = dash_stream(&two_fragment_video());
    let audio = dash_stream(&one_fragment_audio());
    let out = assemble_fragmented(&video, &audio).unwrap();

    let moov = moov_of(&out);
    let track_ids: Vec<u32> = find_all_sub_boxes(moov, TRAK)
        .into_iter()
        .map(|(_, trak)| parse_tkhd(box_body(find_sub_box(trak, TKHD).unwrap())).unwrap().track_id)
        .collect();
    assert_eq!(track_ids, vec![1, 2]);

    let children = child_boxes(moov);
    assert_eq!(children.last().map(|h| h.box_type), Some(MVEX));
    let last_trak = children.iter().rposition(|h| h.box_type == TRAK).unwrap();
    assert_eq!(last_trak, children.len() - 2);

    let mvex = find_sub_box(moov, MVEX).unwrap();
    let trex_ids: Vec<u32> = find_all_sub_boxes(mvex, TREX)
        .into_iter()
        .map(|(_, trex)| parse_trex(box_body(trex)).unwrap().track_id)
        .collect();
    assert_eq!(trex_ids, vec![1, 2]);

    let mvhd = parse_mvhd(box_body(find_sub_box(moov, MVHD).unwrap())).unwrap();
    assert_eq!(mvhd.next_track_id, 3);
}

#[test]
fn fragmented_output_layout_and_size() {
    let video = dash_stream(&two_fragment_video());
    let audio = dash_stream(&one_fragment_audio());
    let out = assemble_fragmented(&video, &audio).unwrap();

    let types: Vec<u32> = parse_boxes(&out).iter().map(|h| h.box_type).collect();
    assert_eq!(
        types[2..],
        [SIDX, MOOF, MDAT, MOOF, MDAT, SIDX, MOOF, MDAT]
    );
    assert!(out.len() as f64 > 0.9 * video.len() as f64);

    let reference_ids: Vec<u32> = parse_boxes(&out)
        .iter()
        .filter(|h| h.box_type == SIDX)
        .map(|h| BigEndian::read_u32(&h.bytes(&out)[12..16]))
        .collect();
    assert_eq!(reference_ids, vec![1, 2]);

    fn check(node: &BoxNode<'_>) {
        assert_eq!(
            node.header().size as usize,
            node.bytes().len(),
            "box size matches its bytes"
        );
        node.children().iter().for_each(check);
    }
    BoxNode::parse_tree(&out).iter().for_each(check);
}

#[test]
fn fragmented_output_demuxes_to_source_samples() {
    let video_spec = two_fragment_video();
    let audio_spec = one_fragment_audio();
    let out = assemble_fragmented(&dash_stream(&video_spec), &dash_stream(&audio_spec)).unwrap();

    let mut collection = collect_all(out);
    let video = collection.take_track(TrackKind::Video).unwrap();
    let audio = collection.take_track(TrackKind::Audio).unwrap();
    assert_eq!(video.id, 1);
    assert_eq!(audio.id, 2);
    assert_eq!(track_payloads(&video), payloads(&video_spec));
    assert_eq!(track_payloads(&audio), payloads(&audio_spec));
}

#[test]
fn video_track_two_is_renumbered() {
    let video_spec = video_spec(2, vec![video_samples(4, 200, 2, 1)]);
    let audio_spec = audio_spec(2, vec![audio_samples(8, 40, 9)]);
    let out = assemble_fragmented(&dash_stream(&video_spec), &dash_stream(&audio_spec)).unwrap();

    let mut collection = collect_all(out);
    let video = collection.take_track(TrackKind::Video).unwrap();
    let audio = collection.take_track(TrackKind::Audio).unwrap();
    assert_eq!((video.id, audio.id), (1, 2));
    assert_eq!(video.samples.len(), 4);
    assert_eq!(audio.samples.len(), 8);
}

#[test]
fn remux_prefers_progressive() {
    let video_spec = two_fragment_video();
    let audio_spec = one_fragment_audio();
    let video = dash_stream(&video_spec);
    let audio = dash_stream(&audio_spec);

    let mut events = Vec::new();
    let mut record = |p: &MuxProgress| events.push(p.clone());
    let out = Remuxer::new(MuxConfig::default()).remux(&video, Some(&audio), Some(&mut record));

    assert_eq!(out.strategy, OutputKind::Progressive);
    assert_eq!(
        events,
        vec![
            MuxProgress::Collecting { tracks: 2 },
            MuxProgress::Collected {
                samples: 32,
                complete: true
            },
            MuxProgress::BuildingProgressive,
            MuxProgress::Done {
                strategy: OutputKind::Progressive,
                bytes: out.bytes.len()
            },
        ]
    );

    assert!(parse_boxes(&out.bytes).iter().all(|h| h.box_type != MOOF));
    let mut collection = collect_all(out.bytes.clone());
    let video_track = collection.take_track(TrackKind::Video).unwrap();
    let audio_track = collection.take_track(TrackKind::Audio).unwrap();
    assert_eq!(track_payloads(&video_track), payloads(&video_spec));
    assert_eq!(track_payloads(&audio_track), payloads(&audio_spec));

    let sync: Vec<bool> = video_track.samples.iter().map(|s| s.is_sync).collect();
    assert_eq!(sync, (0..12).map(|i| i % 3 == 0).collect::<Vec<_>>());
    let offsets: Vec<i64> = video_track
        .samples
        .iter()
        .map(|s| s.composition_offset())
        .collect();
    assert_eq!(offsets[..4], [0, 6000, 0, 6000]);
}

#[test]
fn progressive_durations_use_movie_timescale() {
    let video = dash_stream(&two_fragment_video());
    let audio = dash_stream(&one_fragment_audio());
    let bytes = Remuxer::new(MuxConfig::default())
        .try_progressive(&video, Some(&audio))
        .unwrap();

    let moov = moov_of(&bytes);
    let mvhd = parse_mvhd(box_body(find_sub_box(moov, MVHD).unwrap())).unwrap();
    assert_eq!(mvhd.timescale, 1000);
    // video 12 * 3000 / 90000 s = 400 ms, audio 20 * 1024 / 48000 s = 426 ms
    assert_eq!(mvhd.duration, 426);

    let node = BoxNode::parse(moov).unwrap();
    let durations: Vec<(u32, u64)> = node
        .children()
        .iter()
        .filter(|c| c.box_type() == TRAK)
        .map(|trak| {
            let tkhd = parse_tkhd(trak.child(TKHD).unwrap().body()).unwrap();
            let mdhd = parse_mdhd(trak.find_path(&[MDIA, MDHD]).unwrap().body()).unwrap();
            assert!(trak.find_path(&[MDIA, HDLR]).is_some());
            (tkhd.track_id, mdhd.duration)
        })
        .collect();
    assert_eq!(durations, vec![(1, 36_000), (2, 20_480)]);
}

#[test]
fn video_only_remux_is_progressive() {
    let video_spec = two_fragment_video();
    let out = Remuxer::new(MuxConfig::default()).remux(&dash_stream(&video_spec), None, None);
    assert_eq!(out.strategy, OutputKind::Progressive);

    let demuxer = Mp4Demuxer::open(out.bytes).unwrap();
    assert_eq!(demuxer.tracks().len(), 1);
    assert!(!demuxer.is_fragmented());
}

#[test]
fn strategy_can_pin_fragmented() {
    let video = dash_stream(&two_fragment_video());
    let audio = dash_stream(&one_fragment_audio());
    let config = MuxConfig {
        strategy: MuxStrategy::Fragmented,
        ..MuxConfig::default()
    };
    let out = Remuxer::new(config).remux(&video, Some(&audio), None);
    assert_eq!(out.strategy, OutputKind::Fragmented);
    assert!(parse_boxes(&out.bytes).iter().any(|h| h.box_type == MOOF));
}

#[test]
fn too_small_progressive_falls_back_to_fragmented() {
    let video = dash_stream(&two_fragment_video());
    let audio = dash_stream(&one_fragment_audio());
    let config = MuxConfig {
        min_progressive_bytes: usize::MAX,
        ..MuxConfig::default()
    };

    let mut events = Vec::new();
    let mut record = |p: &MuxProgress| events.push(p.clone());
    let out = Remuxer::new(config).remux(&video, Some(&audio), Some(&mut record));

    assert_eq!(out.strategy, OutputKind::Fragmented);
    let fell_back = events.iter().any(|e| {
        matches!(
            e,
            MuxProgress::FallingBack { from: OutputKind::Progressive, reason } if reason.contains("too small")
        )
    });
    assert!(fell_back, "events: {events:?}");
}

#[test]
fn video_without_audio_cannot_fall_back_to_fragmented() {
    let video = dash_stream(&two_fragment_video());
    let config = MuxConfig {
        min_progressive_bytes: usize::MAX,
        ..MuxConfig::default()
    };
    let out = Remuxer::new(config).remux(&video, None, None);
    assert_eq!(out.strategy, OutputKind::RawVideo);
    assert_eq!(out.bytes, video);
}

#[test]
fn huge_collect_timeout_still_remuxes() {
    let video = dash_stream(&two_fragment_video());
    let audio = dash_stream(&one_fragment_audio());
    let config = MuxConfig {
        collect_timeout_secs: 1e20,
        ..MuxConfig::default()
    };
    let out = Remuxer::new(config).remux(&video, Some(&audio), None);
    assert_eq!(out.strategy, OutputKind::Progressive);
}

/// Init segment of track 1 followed by one moof holding `traf` and a small mdat.
fn video_with_traf(traf: &[u8]) -> Vec<u8> {
    let mut video = init_segment(&video_spec(1, vec![]));
    let mfhd = make_full_box(b"mfhd", 0, 0, &u32s(&[1]));
    video.extend_from_slice(&make_box(b"moof", &[mfhd, make_box(b"traf", traf)].concat()));
    video.extend_from_slice(&make_box(b"mdat", &[0u8; 64]));
    video
}

#[test]
fn overflowing_base_data_offset_falls_back_to_raw_video() {
    let mut fields = u32s(&[1]);
    fields.extend_from_slice(&(u64::MAX - 5).to_be_bytes());
    let mut traf = make_full_box(b"tfhd", 0, 0x00_0001, &fields);
    traf.extend_from_slice(&make_full_box(b"trun", 0, 0x00_0200, &u32s(&[2, 4, 4])));
    let video = video_with_traf(&traf);

    let out = Remuxer::new(MuxConfig::default()).remux(&video, None, None);
    assert_eq!(out.strategy, OutputKind::RawVideo);
    assert_eq!(out.bytes, video);
}

#[test]
fn oversized_sample_count_falls_back_to_raw_video() {
    let mut traf = make_full_box(b"tfhd", 0, 0x02_0000, &u32s(&[1]));
    traf.extend_from_slice(&make_full_box(b"trun", 0, 0, &u32s(&[200_000_000])));
    let video = video_with_traf(&traf);

    let out = Remuxer::new(MuxConfig::default()).remux(&video, None, None);
    assert_eq!(out.strategy, OutputKind::RawVideo);
    assert_eq!(out.bytes, video);
}

#[test]
fn truncated_buffer_keeps_complete_boxes() {
    let video = dash_stream(&two_fragment_video());
    let full: Vec<u32> = parse_boxes(&video).iter().map(|h| h.box_type).collect();
    let cut = &video[..video.len() - 100];
    let partial: Vec<u32> = parse_boxes(cut).iter().map(|h| h.box_type).collect();
    assert_eq!(partial, full[..full.len() - 1]);

    let audio = dash_stream(&one_fragment_audio());
    let out = Remuxer::new(MuxConfig::default()).remux(cut, Some(&audio), None);
    assert_ne!(out.strategy, OutputKind::Progressive);
    assert!(!out.bytes.is_empty());
}

/// Hands out `batches_before_stall` batches, then blocks for `stall` on every call.
struct StallingSource {
    inner: Mp4Demuxer,
    batches_before_stall: usize,
    stall: Duration,
}

impl SampleSource for StallingSource {
    fn tracks(&self) -> &[SourceTrack] {
        self.inner.tracks()
    }

    fn select_track(&mut self, id: u32) -> DemuxResult<()> {
        self.inner.select_track(id)
    }

    fn next_batch(&mut self) -> DemuxResult<Option<SampleBatch>> {
        if self.batches_before_stall == 0 {
            thread::sleep(self.stall);
        } else {
            self.batches_before_stall -= 1;
        }
        self.inner.next_batch()
    }
}

#[test]
fn timed_out_collection_builds_shorter_valid_file() {
    let fragments = (0..5).map(|i| video_samples(2, 250, 2, i * 10)).collect();
    let video = dash_stream(&video_spec(1, fragments));
    let source = StallingSource {
        inner: Mp4Demuxer::open(video).unwrap(),
        batches_before_stall: 4,
        stall: Duration::from_secs(2),
    };

    let collection = collect_samples(source, Duration::from_millis(300)).unwrap();
    assert_eq!(collection.outcome, CollectOutcome::TimedOut);
    let track = collection.track(TrackKind::Video).unwrap();
    assert_eq!(track.samples.len(), 8);
    assert_eq!(track.duration, None);

    let output = build_progressive(&collection.tracks).unwrap();
    assert_eq!(output.skipped_samples, 0);

    let rebuilt = collect_all(output.bytes.clone());
    let video = rebuilt.track(TrackKind::Video).unwrap();
    assert_eq!(video.samples.len(), 8);
    assert_eq!(video.duration, Some(8 * 3000));

    let mvhd = parse_mvhd(box_body(find_sub_box(moov_of(&output.bytes), MVHD).unwrap())).unwrap();
    assert_eq!(mvhd.duration, 266);
}
