//! Headless collaborators used by the `ocam-receiver` binary.
//!
//! The binary has no codec library.  [`PacketCounterFactory`] hands out
//! decoders that accept every packet, count it and never produce a frame,
//! which is enough to watch a phone connect, stream and reconnect.
//! [`LoggingSink`] counts whatever frames a real decoder would emit.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ocam_core::StreamKind;
use tracing::{debug, trace};

use crate::application::media::{
    DecodedFrame, Decoder, DecoderError, DecoderFactory, MediaPorts, MediaSink, OutputAudioFrame,
    OutputVideoFrame,
};
use crate::infrastructure::clock::MonotonicClock;

/// Log a packet count summary every this many packets.
const COUNTER_LOG_EVERY: u64 = 300;

/// Totals shared by every counting decoder of one factory.
#[derive(Debug, Default)]
pub struct CounterStats {
    pub decoders_opened: AtomicU64,
    pub packets: AtomicU64,
    pub bytes: AtomicU64,
    pub flushes: AtomicU64,
}

/// Creates [`PacketCounter`] decoders.
#[derive(Debug, Default, Clone)]
pub struct PacketCounterFactory {
    stats: Arc<CounterStats>,
}

impl PacketCounterFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> &CounterStats {
        &self.stats
    }
}

impl DecoderFactory for PacketCounterFactory {
    fn open(&self, kind: StreamKind, extradata: &[u8]) -> Result<Box<dyn Decoder>, DecoderError> {
        self.stats.decoders_opened.fetch_add(1, Ordering::Relaxed);
        debug!(stream = %kind, extradata = extradata.len(), "counting decoder opened");
        Ok(Box::new(PacketCounter {
            kind,
            packets: 0,
            stats: Arc::clone(&self.stats),
        }))
    }
}

/// A decoder that only counts packets.
#[derive(Debug)]
pub struct PacketCounter {
    kind: StreamKind,
    packets: u64,
    stats: Arc<CounterStats>,
}

impl Decoder for PacketCounter {
    fn send_packet(&mut self, data: &[u8], pts: i64) -> Result<(), DecoderError> {
        self.packets += 1;
        self.stats.packets.fetch_add(1, Ordering::Relaxed);
        self.stats.bytes.fetch_add(data.len() as u64, Ordering::Relaxed);
        if self.packets % COUNTER_LOG_EVERY == 0 {
            debug!(stream = %self.kind, packets = self.packets, pts, "packet count progress");
        }
        Ok(())
    }

    fn receive_frame(&mut self) -> Option<DecodedFrame> {
        None
    }

    fn flush(&mut self) {
        self.stats.flushes.fetch_add(1, Ordering::Relaxed);
    }
}

/// A media sink that counts and traces frames.
#[derive(Debug, Default)]
pub struct LoggingSink {
    video_frames: AtomicU64,
    audio_frames: AtomicU64,
}

impl LoggingSink {
    pub fn video_frames(&self) -> u64 {
        self.video_frames.load(Ordering::Relaxed)
    }

    pub fn audio_frames(&self) -> u64 {
        self.audio_frames.load(Ordering::Relaxed)
    }
}

impl MediaSink for LoggingSink {
    fn emit_video_frame(&self, frame: &OutputVideoFrame) {
        self.video_frames.fetch_add(1, Ordering::Relaxed);
        trace!(
            width = frame.width,
            height = frame.height,
            format = ?frame.format,
            ts = frame.timestamp_ns,
            "video frame"
        );
    }

    fn emit_audio_frame(&self, frame: &OutputAudioFrame) {
        self.audio_frames.fetch_add(1, Ordering::Relaxed);
        trace!(
            samples = frame.frame_count,
            rate = frame.sample_rate,
            layout = ?frame.layout,
            ts = frame.timestamp_ns,
            "audio frame"
        );
    }
}

/// Media collaborators for a receiver without a codec library.
pub fn headless_media() -> MediaPorts {
    MediaPorts {
        decoders: Arc::new(PacketCounterFactory::new()),
        sink: Arc::new(LoggingSink::default()),
        clock: Arc::new(MonotonicClock),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_counts_packets_and_emits_nothing() {
        // Arrange
        let factory = PacketCounterFactory::new();
        let mut decoder = factory.open(StreamKind::Video, b"cfg").unwrap();

        // Act
        decoder.send_packet(b"abcd", 1).unwrap();
        decoder.send_packet(b"ef", 2).unwrap();
        decoder.flush();

        // Assert
        assert!(decoder.receive_frame().is_none());
        assert_eq!(factory.stats().packets.load(Ordering::Relaxed), 2);
        assert_eq!(factory.stats().bytes.load(Ordering::Relaxed), 6);
        assert_eq!(factory.stats().flushes.load(Ordering::Relaxed), 1);
        assert_eq!(factory.stats().decoders_opened.load(Ordering::Relaxed), 1);
    }
}
