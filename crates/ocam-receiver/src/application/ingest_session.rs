//! Per-connection state of a video or audio stream.
//!
//! A [`StreamSession`] lives for one client connection.  It owns the decoder
//! (created lazily on the first packet), the codec configuration bytes
//! collected so far, and the stream's timestamp reconciler.  Video and audio
//! share this type; the few differences are asked of [`StreamKind`].
//!
//! # Per-packet algorithm
//!
//! 1. A zero timestamp on a stream with a restart sentinel (video) is a
//!    configuration packet: its payload is appended to the extradata, the
//!    decoder is flushed and the clock anchor is dropped.
//! 2. Without a decoder one is opened from the extradata.  Audio seeds the
//!    extradata from the current packet when none has been collected.
//! 3. The reconciler maps the device timestamp onto the local clock.
//! 4. The packet is decoded and every produced frame is translated and
//!    emitted.

use ocam_core::{Resolution, StreamKind, TimestampReconciler};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::application::media::{
    translate_audio, translate_video, Clock, DecodedFrame, Decoder, DecoderError, DecoderFactory,
    MediaSink,
};

/// Errors that end a streaming loop.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("could not open {kind} decoder: {source}")]
    DecoderInit {
        kind: StreamKind,
        #[source]
        source: DecoderError,
    },

    #[error("{kind} decoder failed: {source}")]
    DecoderSend {
        kind: StreamKind,
        #[source]
        source: DecoderError,
    },
}

/// What one packet produced.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PacketOutcome {
    pub frames_emitted: usize,
    /// Size of the last emitted video frame, when the packet produced one.
    pub video_size: Option<Resolution>,
}

/// State of one stream for the lifetime of one client connection.
pub struct StreamSession {
    kind: StreamKind,
    id: Uuid,
    decoder: Option<Box<dyn Decoder>>,
    extradata: Vec<u8>,
    reconciler: TimestampReconciler,
    packets: u64,
}

impl StreamSession {
    pub fn new(kind: StreamKind) -> Self {
        Self {
            kind,
            id: Uuid::new_v4(),
            decoder: None,
            extradata: Vec::new(),
            reconciler: TimestampReconciler::new(kind.into()),
            packets: 0,
        }
    }

    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    /// Identifier used in log lines; regenerated on every reset.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Tears the decoder down and clears all accumulated state.
    pub fn reset(&mut self) {
        self.decoder = None;
        self.extradata.clear();
        self.reconciler.reset();
        self.packets = 0;
        self.id = Uuid::new_v4();
    }

    pub fn first_packet_seen(&self) -> bool {
        self.reconciler.is_anchored()
    }

    pub fn extradata(&self) -> &[u8] {
        &self.extradata
    }

    pub fn decoder_ready(&self) -> bool {
        self.decoder.is_some()
    }

    pub fn packets(&self) -> u64 {
        self.packets
    }

    /// Runs one received packet through the session.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError`] when the decoder cannot be opened or rejects
    /// the packet; the caller ends the streaming loop.
    pub fn handle_packet(
        &mut self,
        timestamp: u64,
        payload: &[u8],
        factory: &dyn DecoderFactory,
        clock: &dyn Clock,
        sink: &dyn MediaSink,
    ) -> Result<PacketOutcome, IngestError> {
        self.packets += 1;

        if timestamp == 0 && self.kind.has_restart_sentinel() {
            info!(
                session = %self.id,
                stream = %self.kind,
                bytes = payload.len(),
                "configuration packet, restarting stream"
            );
            self.extradata.extend_from_slice(payload);
            if let Some(decoder) = self.decoder.as_mut() {
                decoder.flush();
            }
            self.reconciler.reset();
        }

        if self.decoder.is_none() {
            if self.extradata.is_empty() && self.kind.seeds_extradata_from_first_packet() {
                self.extradata.extend_from_slice(payload);
            }
            let decoder = factory
                .open(self.kind, &self.extradata)
                .map_err(|source| IngestError::DecoderInit {
                    kind: self.kind,
                    source,
                })?;
            debug!(
                session = %self.id,
                stream = %self.kind,
                extradata = self.extradata.len(),
                "decoder opened"
            );
            self.decoder = Some(decoder);
        }

        let pts_ns = self.reconciler.observe(timestamp, clock.now_ns());

        let mut outcome = PacketOutcome::default();
        let Some(decoder) = self.decoder.as_mut() else {
            return Ok(outcome);
        };

        decoder
            .send_packet(payload, i64::try_from(timestamp).unwrap_or(i64::MAX))
            .map_err(|source| IngestError::DecoderSend {
                kind: self.kind,
                source,
            })?;

        while let Some(frame) = decoder.receive_frame() {
            match frame {
                DecodedFrame::Video(picture) => {
                    let size = Resolution::new(picture.width, picture.height);
                    outcome.video_size = Some(size);
                    match translate_video(picture, pts_ns) {
                        Some(out) => {
                            sink.emit_video_frame(&out);
                            outcome.frames_emitted += 1;
                        }
                        None => debug!(session = %self.id, "skipping frame in unsupported pixel format"),
                    }
                }
                DecodedFrame::Audio(samples) => {
                    sink.emit_audio_frame(&translate_audio(samples, pts_ns));
                    outcome.frames_emitted += 1;
                }
            }
        }

        Ok(outcome)
    }
}

impl std::fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSession")
            .field("kind", &self.kind)
            .field("id", &self.id)
            .field("decoder_ready", &self.decoder.is_some())
            .field("extradata_len", &self.extradata.len())
            .field("reconciler", &self.reconciler)
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::media::{
        ColorRange, ColorSpace, MockClock, MockDecoder, MockDecoderFactory, MockMediaSink,
        OutputVideoFrame, PixelFormat, VideoFrame,
    };
    use std::sync::{Arc, Mutex};

    fn clock_at(ns: i64) -> MockClock {
        let mut clock = MockClock::new();
        clock.expect_now_ns().return_const(ns);
        clock
    }

    fn quiet_decoder() -> MockDecoder {
        let mut dec = MockDecoder::new();
        dec.expect_send_packet().returning(|_, _| Ok(()));
        dec.expect_receive_frame().returning(|| None);
        dec.expect_flush().return_const(());
        dec
    }

    fn factory_of_quiet_decoders() -> MockDecoderFactory {
        let mut factory = MockDecoderFactory::new();
        factory
            .expect_open()
            .returning(|_, _| Ok(Box::new(quiet_decoder()) as Box<dyn Decoder>));
        factory
    }

    fn picture() -> DecodedFrame {
        DecodedFrame::Video(VideoFrame {
            planes: vec![vec![0; 4]],
            linesizes: vec![2],
            width: 640,
            height: 480,
            format: PixelFormat::Yuv420p,
            color_range: ColorRange::Limited,
            color_space: ColorSpace::Bt709,
        })
    }

    #[test]
    fn test_video_config_packet_accumulates_extradata() {
        // Arrange
        let mut session = StreamSession::new(StreamKind::Video);
        let factory = factory_of_quiet_decoders();
        let sink = MockMediaSink::new();

        // Act
        session
            .handle_packet(0, b"SPS", &factory, &clock_at(1), &sink)
            .unwrap();
        session
            .handle_packet(0, b"PPS", &factory, &clock_at(1), &sink)
            .unwrap();

        // Assert
        assert_eq!(session.extradata(), b"SPSPPS");
        assert!(!session.first_packet_seen());
        assert!(session.decoder_ready());
    }

    #[test]
    fn test_restart_packet_flushes_open_decoder() {
        // Arrange
        let mut decoder = MockDecoder::new();
        decoder.expect_send_packet().returning(|_, _| Ok(()));
        decoder.expect_receive_frame().returning(|| None);
        decoder.expect_flush().times(1).return_const(());
        let slot = Arc::new(Mutex::new(Some(decoder)));
        let mut factory = MockDecoderFactory::new();
        factory.expect_open().times(1).returning(move |_, _| {
            let dec = slot.lock().unwrap().take().unwrap();
            Ok(Box::new(dec) as Box<dyn Decoder>)
        });
        let mut session = StreamSession::new(StreamKind::Video);
        let sink = MockMediaSink::new();

        // Act: a media packet opens the decoder, then a restart arrives
        session
            .handle_packet(1000, b"frame", &factory, &clock_at(5), &sink)
            .unwrap();
        assert!(session.first_packet_seen());
        session
            .handle_packet(0, b"cfg", &factory, &clock_at(5), &sink)
            .unwrap();

        // Assert
        assert!(!session.first_packet_seen());
    }

    #[test]
    fn test_decoder_init_failure_ends_loop() {
        let mut factory = MockDecoderFactory::new();
        factory
            .expect_open()
            .returning(|_, _| Err(DecoderError::Init("no h264".to_string())));
        let mut session = StreamSession::new(StreamKind::Video);

        let result = session.handle_packet(0, b"cfg", &factory, &clock_at(0), &MockMediaSink::new());

        assert!(matches!(result, Err(IngestError::DecoderInit { .. })));
    }

    #[test]
    fn test_decoder_send_failure_ends_loop() {
        let mut factory = MockDecoderFactory::new();
        factory.expect_open().returning(|_, _| {
            let mut dec = MockDecoder::new();
            dec.expect_send_packet()
                .returning(|_, _| Err(DecoderError::Send("corrupt".to_string())));
            Ok(Box::new(dec) as Box<dyn Decoder>)
        });
        let mut session = StreamSession::new(StreamKind::Video);

        let result =
            session.handle_packet(10, b"junk", &factory, &clock_at(0), &MockMediaSink::new());

        assert!(matches!(result, Err(IngestError::DecoderSend { .. })));
    }

    #[test]
    fn test_audio_first_packet_seeds_extradata() {
        // Arrange
        let mut factory = MockDecoderFactory::new();
        factory
            .expect_open()
            .withf(|kind, extradata| *kind == StreamKind::Audio && extradata == b"ASC!")
            .times(1)
            .returning(|_, _| Ok(Box::new(quiet_decoder()) as Box<dyn Decoder>));
        let mut session = StreamSession::new(StreamKind::Audio);

        // Act
        session
            .handle_packet(0, b"ASC!", &factory, &clock_at(77), &MockMediaSink::new())
            .unwrap();

        // Assert: audio has no sentinel, so timestamp zero anchors
        assert_eq!(session.extradata(), b"ASC!");
        assert!(session.first_packet_seen());
    }

    #[test]
    fn test_emitted_frame_carries_reconciled_timestamp() {
        // Arrange
        let mut factory = MockDecoderFactory::new();
        factory.expect_open().returning(|_, _| {
            let mut dec = MockDecoder::new();
            dec.expect_send_packet().returning(|_, _| Ok(()));
            let mut pending = vec![picture()];
            dec.expect_receive_frame().returning(move || pending.pop());
            Ok(Box::new(dec) as Box<dyn Decoder>)
        });
        let seen: Arc<Mutex<Vec<OutputVideoFrame>>> = Arc::default();
        let seen_by_sink = Arc::clone(&seen);
        let mut sink = MockMediaSink::new();
        sink.expect_emit_video_frame()
            .returning(move |f| seen_by_sink.lock().unwrap().push(f.clone()));
        let mut session = StreamSession::new(StreamKind::Video);

        // Act
        let outcome = session
            .handle_packet(1000, b"idr", &factory, &clock_at(9_000_000), &sink)
            .unwrap();

        // Assert
        assert_eq!(outcome.frames_emitted, 1);
        assert_eq!(outcome.video_size, Some(Resolution::new(640, 480)));
        assert_eq!(seen.lock().unwrap()[0].timestamp_ns, 9_000_000);
    }

    #[test]
    fn test_reset_clears_session_state_and_rotates_id() {
        // Arrange
        let mut session = StreamSession::new(StreamKind::Video);
        let factory = factory_of_quiet_decoders();
        session
            .handle_packet(0, b"cfg", &factory, &clock_at(0), &MockMediaSink::new())
            .unwrap();
        session
            .handle_packet(5, b"p", &factory, &clock_at(0), &MockMediaSink::new())
            .unwrap();
        let old_id = session.id();

        // Act
        session.reset();

        // Assert
        assert!(session.extradata().is_empty());
        assert!(!session.first_packet_seen());
        assert!(!session.decoder_ready());
        assert_eq!(session.packets(), 0);
        assert_ne!(session.id(), old_id);
    }
}
