//! Criterion benchmarks for the OCam wire codec.
//!
//! The media header is decoded once per video and audio packet, so it sits on
//! the hot path; the capability report is decoded once per control session.
//!
//! Run with:
//! ```bash
//! cargo bench --package ocam-core --bench codec_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ocam_core::protocol::codec::{
    decode_capabilities, decode_command, decode_media_header, encode_capabilities,
    encode_command, encode_media_header,
};
use ocam_core::protocol::messages::{ControlCommand, MediaPacketHeader};
use ocam_core::{DeviceCapabilities, Resolution};

// ── Fixtures ──────────────────────────────────────────────────────────────────

fn make_capabilities(count: u32) -> DeviceCapabilities {
    DeviceCapabilities {
        resolutions: (1..=count).map(|i| Resolution::new(160 * i, 90 * i)).collect(),
        iso_range: (50, 6400),
        exposure_range_us: (10, 500_000),
        focus_min: 10.0,
        flash_available: true,
        received: true,
    }
}

// ── Benchmark groups ──────────────────────────────────────────────────────────

fn bench_media_header(c: &mut Criterion) {
    let header = MediaPacketHeader {
        timestamp: 1_234_567_890,
        size: 65_536,
    };
    let bytes = encode_media_header(&header);

    let mut group = c.benchmark_group("media_header");
    group.bench_function("encode", |b| b.iter(|| encode_media_header(black_box(&header))));
    group.bench_function("decode", |b| b.iter(|| decode_media_header(black_box(&bytes))));
    group.finish();
}

fn bench_command(c: &mut Criterion) {
    let raw = ControlCommand::SetBitrate(8_000_000).to_raw();
    let bytes = encode_command(&raw);

    let mut group = c.benchmark_group("control_command");
    group.bench_function("encode", |b| b.iter(|| encode_command(black_box(&raw))));
    group.bench_function("decode", |b| b.iter(|| decode_command(black_box(&bytes))));
    group.finish();
}

fn bench_capabilities(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_capabilities");
    for count in [2u32, 16, 255] {
        let payload = encode_capabilities(&make_capabilities(count));
        group.bench_with_input(BenchmarkId::new("resolutions", count), &payload, |b, p| {
            b.iter(|| decode_capabilities(black_box(p)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_media_header, bench_command, bench_capabilities);
criterion_main!(benches);
