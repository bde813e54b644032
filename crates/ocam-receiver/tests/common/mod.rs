//! Shared fixtures for the receiver integration tests.
//!
//! The servers are started on loopback with OS-assigned ports and a short
//! poll interval.  Media collaborators are simple recording fakes: the
//! decoder turns every packet with a non-zero timestamp into one frame, the
//! sink keeps the presentation timestamps it was handed and the clock is
//! frozen.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::Read;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ocam_core::StreamKind;
use ocam_receiver::application::media::{
    AudioFrame, Clock, ColorRange, ColorSpace, DecodedFrame, Decoder, DecoderError,
    DecoderFactory, MediaPorts, MediaSink, OutputAudioFrame, OutputVideoFrame, PixelFormat,
    SampleFormat, VideoFrame,
};
use ocam_receiver::{Channel, OcamSource, SourceOptions};
use parking_lot::Mutex;

/// Frozen local clock value (5 s).
pub const NOW_NS: i64 = 5_000_000_000;

pub const POLL: Duration = Duration::from_millis(20);

pub const WAIT: Duration = Duration::from_secs(3);

// ── Fakes ─────────────────────────────────────────────────────────────────────

pub struct FrozenClock(pub i64);

impl Clock for FrozenClock {
    fn now_ns(&self) -> i64 {
        self.0
    }
}

/// Records every `open` call with the extradata it was given.
#[derive(Default)]
pub struct RecordingFactory {
    pub opens: Mutex<Vec<(StreamKind, Vec<u8>)>>,
}

impl DecoderFactory for RecordingFactory {
    fn open(&self, kind: StreamKind, extradata: &[u8]) -> Result<Box<dyn Decoder>, DecoderError> {
        self.opens.lock().push((kind, extradata.to_vec()));
        Ok(Box::new(EchoDecoder {
            kind,
            pending: VecDeque::new(),
        }))
    }
}

struct EchoDecoder {
    kind: StreamKind,
    pending: VecDeque<DecodedFrame>,
}

impl Decoder for EchoDecoder {
    fn send_packet(&mut self, _data: &[u8], pts: i64) -> Result<(), DecoderError> {
        if pts == 0 && self.kind == StreamKind::Video {
            return Ok(());
        }
        let frame = match self.kind {
            StreamKind::Video => DecodedFrame::Video(VideoFrame {
                planes: vec![vec![16; 8], vec![128; 2], vec![128; 2]],
                linesizes: vec![4, 2, 2],
                width: 4,
                height: 2,
                format: PixelFormat::Yuv420p,
                color_range: ColorRange::Limited,
                color_space: ColorSpace::Bt709,
            }),
            StreamKind::Audio => DecodedFrame::Audio(AudioFrame {
                planes: vec![vec![0; 4096], vec![0; 4096]],
                format: SampleFormat::Fltp,
                sample_rate: 48_000,
                channels: 2,
                sample_count: 1024,
            }),
        };
        self.pending.push_back(frame);
        Ok(())
    }

    fn receive_frame(&mut self) -> Option<DecodedFrame> {
        self.pending.pop_front()
    }

    fn flush(&mut self) {
        self.pending.clear();
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub video: Mutex<Vec<OutputVideoFrame>>,
    pub audio: Mutex<Vec<OutputAudioFrame>>,
}

impl RecordingSink {
    pub fn video_timestamps(&self) -> Vec<i64> {
        self.video.lock().iter().map(|f| f.timestamp_ns).collect()
    }

    pub fn audio_timestamps(&self) -> Vec<i64> {
        self.audio.lock().iter().map(|f| f.timestamp_ns).collect()
    }
}

impl MediaSink for RecordingSink {
    fn emit_video_frame(&self, frame: &OutputVideoFrame) {
        self.video.lock().push(frame.clone());
    }

    fn emit_audio_frame(&self, frame: &OutputAudioFrame) {
        self.audio.lock().push(frame.clone());
    }
}

// ── Harness ───────────────────────────────────────────────────────────────────

pub struct Harness {
    pub source: OcamSource,
    pub factory: Arc<RecordingFactory>,
    pub sink: Arc<RecordingSink>,
}

impl Harness {
    /// Starts a receiver on loopback and waits until all three ports are bound.
    pub fn start() -> Self {
        Self::start_with(|_| {})
    }

    pub fn start_with(tweak: impl FnOnce(&mut SourceOptions)) -> Self {
        let factory = Arc::new(RecordingFactory::default());
        let sink = Arc::new(RecordingSink::default());
        let media = MediaPorts {
            decoders: factory.clone(),
            sink: sink.clone(),
            clock: Arc::new(FrozenClock(NOW_NS)),
        };

        let mut options = SourceOptions::ephemeral(IpAddr::V4(Ipv4Addr::LOCALHOST));
        options.transport.poll_interval = POLL;
        options.transport.bind_retries = 1;
        options.resolution_settle = Duration::ZERO;
        tweak(&mut options);

        let mut source = OcamSource::new(options, media);
        source.start();
        assert!(
            wait_until(|| {
                [Channel::Video, Channel::Control, Channel::Audio]
                    .into_iter()
                    .all(|c| source.bound_addr(c).is_some())
            }),
            "servers did not bind"
        );

        Self {
            source,
            factory,
            sink,
        }
    }

    pub fn addr(&self, channel: Channel) -> SocketAddr {
        self.source
            .bound_addr(channel)
            .expect("channel must be bound")
    }

    /// Connects a fake phone to `channel` and waits until the server sees it.
    pub fn connect(&self, channel: Channel) -> TcpStream {
        let stream = TcpStream::connect(self.addr(channel)).expect("connect");
        stream
            .set_read_timeout(Some(WAIT))
            .expect("set read timeout");
        stream.set_nodelay(true).expect("set nodelay");
        assert!(
            wait_until(|| self.source.state().is_connected(channel)),
            "{channel} client was not attached"
        );
        stream
    }
}

/// Polls `cond` every few milliseconds until it holds or [`WAIT`] elapses.
pub fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}

/// Reads one 9-byte control command.
pub fn read_command(stream: &mut TcpStream) -> [u8; 9] {
    let mut buf = [0u8; 9];
    stream.read_exact(&mut buf).expect("read control command");
    buf
}

/// Reads commands until (and including) `SettingsSyncComplete`; returns their ids.
pub fn read_sync_ids(stream: &mut TcpStream) -> Vec<u8> {
    let mut ids = Vec::new();
    loop {
        let cmd = read_command(stream);
        ids.push(cmd[0]);
        if cmd[0] == 0x05 || ids.len() > 32 {
            return ids;
        }
    }
}
