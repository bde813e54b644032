//! Integration tests for the video and audio ingest servers.
//!
//! Each test plays a phone: it connects to the stream port, sends the
//! handshake and then a sequence of timestamped packets.  The recording
//! decoder factory shows which extradata each decoder was opened with, and
//! the recording sink shows the presentation timestamps of emitted frames.
//!
//! Device timestamps are microseconds; the frozen clock reads
//! [`NOW_NS`](common::NOW_NS), so the anchoring packet is always presented at
//! exactly that instant.

mod common;

use std::io::Write;
use std::net::TcpStream;

use common::{wait_until, Harness, NOW_NS};
use ocam_core::protocol::{
    encode_media_header, encode_media_packet, encode_video_handshake, MediaPacketHeader,
    VideoHandshake, AUDIO_MAGIC_AAC, VIDEO_CODEC_H264,
};
use ocam_core::{Resolution, StreamKind};
use ocam_receiver::Channel;

fn video_phone(harness: &Harness) -> TcpStream {
    let mut stream = harness.connect(Channel::Video);
    let hs = VideoHandshake {
        device_name: "Pixel 8".to_string(),
        codec_tag: VIDEO_CODEC_H264,
        width: 1920,
        height: 1080,
    };
    stream.write_all(&encode_video_handshake(&hs)).expect("handshake");
    stream
}

fn audio_phone(harness: &Harness) -> TcpStream {
    let mut stream = harness.connect(Channel::Audio);
    stream
        .write_all(&AUDIO_MAGIC_AAC.to_be_bytes())
        .expect("handshake");
    stream
}

fn send(stream: &mut TcpStream, timestamp: u64, payload: &[u8]) {
    stream
        .write_all(&encode_media_packet(timestamp, payload))
        .expect("write packet");
}

// ── Video ─────────────────────────────────────────────────────────────────────

#[test]
fn test_video_config_packet_becomes_extradata_and_frames_are_anchored() {
    // Arrange
    let harness = Harness::start();
    let mut phone = video_phone(&harness);

    // Act
    send(&mut phone, 0, b"SPSPPS");
    send(&mut phone, 1_000, b"idr");
    send(&mut phone, 2_000, b"p");

    // Assert
    assert!(wait_until(|| harness.sink.video.lock().len() == 2));
    assert_eq!(
        *harness.factory.opens.lock(),
        vec![(StreamKind::Video, b"SPSPPS".to_vec())]
    );
    assert_eq!(
        harness.sink.video_timestamps(),
        vec![NOW_NS, NOW_NS + 1_000_000]
    );
}

#[test]
fn test_video_size_follows_decoded_frames() {
    let harness = Harness::start();
    assert_eq!(harness.source.video_size(), Resolution::new(1280, 720));

    let mut phone = video_phone(&harness);
    send(&mut phone, 0, b"cfg");
    send(&mut phone, 40, b"idr");

    assert!(wait_until(|| harness.source.video_size() == Resolution::new(4, 2)));
    assert!(harness.source.status().to_string().contains("size=4x2"));
}

#[test]
fn test_video_reconnect_starts_a_fresh_session() {
    // Arrange: a first session that anchored and collected extradata
    let harness = Harness::start();
    let mut first = video_phone(&harness);
    send(&mut first, 0, b"OLD");
    send(&mut first, 9_000_000, b"idr");
    assert!(wait_until(|| harness.sink.video.lock().len() == 1));
    drop(first);
    assert!(wait_until(|| !harness.source.state().is_connected(Channel::Video)));

    // Act: a new connection that skips the config packet
    let mut second = video_phone(&harness);
    send(&mut second, 500, b"idr");

    // Assert: empty extradata and a fresh anchor
    assert!(wait_until(|| harness.sink.video.lock().len() == 2));
    let opens = harness.factory.opens.lock().clone();
    assert_eq!(opens.len(), 2);
    assert_eq!(opens[1], (StreamKind::Video, Vec::new()));
    assert_eq!(harness.sink.video_timestamps()[1], NOW_NS);
}

#[test]
fn test_oversized_packet_drops_the_connection() {
    // Arrange
    let harness = Harness::start_with(|opts| opts.transport.max_packet_bytes = 64);
    let mut phone = video_phone(&harness);

    // Act: declare 1000 bytes against a 64-byte limit
    let header = encode_media_header(&MediaPacketHeader {
        timestamp: 10,
        size: 1000,
    });
    phone.write_all(&header).expect("write header");

    // Assert
    assert!(wait_until(|| !harness.source.state().is_connected(Channel::Video)));
    assert!(harness.factory.opens.lock().is_empty());
}

#[test]
fn test_truncated_packet_then_disconnect_emits_nothing() {
    let harness = Harness::start();
    let mut phone = video_phone(&harness);

    let header = encode_media_header(&MediaPacketHeader {
        timestamp: 10,
        size: 100,
    });
    phone.write_all(&header).expect("write header");
    phone.write_all(&[0u8; 40]).expect("write partial payload");
    drop(phone);

    assert!(wait_until(|| !harness.source.state().is_connected(Channel::Video)));
    assert!(harness.sink.video.lock().is_empty());
}

// ── Audio ─────────────────────────────────────────────────────────────────────

#[test]
fn test_audio_first_packet_seeds_extradata_and_anchors_on_zero() {
    // Arrange
    let harness = Harness::start();
    let mut phone = audio_phone(&harness);

    // Act
    send(&mut phone, 0, b"ASC!");
    send(&mut phone, 21_333, b"aac");

    // Assert
    assert!(wait_until(|| harness.sink.audio.lock().len() == 2));
    assert_eq!(
        *harness.factory.opens.lock(),
        vec![(StreamKind::Audio, b"ASC!".to_vec())]
    );
    assert_eq!(
        harness.sink.audio_timestamps(),
        vec![NOW_NS, NOW_NS + 21_333_000]
    );
}

#[test]
fn test_audio_and_video_run_side_by_side() {
    let harness = Harness::start();
    let mut video = video_phone(&harness);
    let mut audio = audio_phone(&harness);

    send(&mut video, 0, b"cfg");
    send(&mut video, 100, b"idr");
    send(&mut audio, 7, b"ASC!");

    assert!(wait_until(|| harness.sink.video.lock().len() == 1
        && harness.sink.audio.lock().len() == 1));
    let status = harness.source.status();
    assert!(status.video_connected);
    assert!(status.audio_connected);
    assert!(!status.control_connected);
}
