//! Boundaries to the decoder and to the downstream media pipeline.
//!
//! The receiver never decodes H.264 or AAC itself.  It hands compressed
//! packets to a [`Decoder`] obtained from a [`DecoderFactory`] and forwards
//! whatever frames come back to a [`MediaSink`], after translating the
//! decoder's formats into the pipeline's.  Both sides are traits so the
//! ingest loop can be tested without a codec library.
//!
//! # Frame translation
//!
//! | decoder                | pipeline            |
//! |------------------------|---------------------|
//! | YUV420P, YUVJ420P      | I420                |
//! | NV12                   | NV12                |
//! | anything else          | frame skipped       |
//! | FLTP / FLT / S16P      | float planar / float / 16-bit planar |
//! | any other sample fmt   | 16-bit interleaved  |

use std::sync::Arc;

use ocam_core::StreamKind;
use thiserror::Error;

/// Errors reported by the decoder collaborator.
#[derive(Debug, Error)]
pub enum DecoderError {
    /// The decoder could not be created from the accumulated extradata.
    #[error("decoder initialisation failed: {0}")]
    Init(String),

    /// The decoder refused a compressed packet.
    #[error("decoder rejected packet: {0}")]
    Send(String),
}

// ── Decoder-side frames ───────────────────────────────────────────────────────

/// Pixel layouts a video decoder may produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Yuv420p,
    /// YUV 4:2:0 with JPEG (full) range baked into the format.
    Yuvj420p,
    Nv12,
    /// Any other layout, identified by the decoder's own tag.
    Other(i32),
}

/// Colour range flag attached to a decoded picture.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ColorRange {
    #[default]
    Unspecified,
    /// MPEG / limited range.
    Limited,
    /// JPEG / full range.
    Full,
}

/// Colour matrix attached to a decoded picture.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ColorSpace {
    Bt709,
    Smpte170m,
    #[default]
    Unspecified,
    Other(i32),
}

/// One decoded picture.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    pub planes: Vec<Vec<u8>>,
    /// Bytes per row for each plane.  Negative values denote bottom-up rows.
    pub linesizes: Vec<i32>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub color_range: ColorRange,
    pub color_space: ColorSpace,
}

/// Sample layouts an audio decoder may produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    /// 32-bit float, one plane per channel.
    Fltp,
    /// 32-bit float, interleaved.
    Flt,
    /// 16-bit signed, one plane per channel.
    S16p,
    /// 16-bit signed, interleaved.
    S16,
    Other(i32),
}

/// One decoded block of audio samples.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    pub planes: Vec<Vec<u8>>,
    pub format: SampleFormat,
    pub sample_rate: u32,
    pub channels: u16,
    /// Samples per channel.
    pub sample_count: u32,
}

/// Anything a decoder can hand back.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedFrame {
    Video(VideoFrame),
    Audio(AudioFrame),
}

// ── Decoder boundary ──────────────────────────────────────────────────────────

/// An initialised decoder for one stream session.
///
/// Dropping the decoder destroys it.
#[cfg_attr(test, mockall::automock)]
pub trait Decoder: Send {
    /// Feeds one compressed packet.  `pts` is the device timestamp.
    fn send_packet(&mut self, data: &[u8], pts: i64) -> Result<(), DecoderError>;

    /// Pops the next decoded frame, if any is ready.
    fn receive_frame(&mut self) -> Option<DecodedFrame>;

    /// Discards buffered state so decoding restarts at the next keyframe.
    fn flush(&mut self);
}

/// Creates decoders for a stream kind from its codec configuration bytes.
#[cfg_attr(test, mockall::automock)]
pub trait DecoderFactory: Send + Sync {
    /// Initialises a decoder.  `extradata` may be empty.
    fn open(&self, kind: StreamKind, extradata: &[u8]) -> Result<Box<dyn Decoder>, DecoderError>;
}

// ── Pipeline-side frames ──────────────────────────────────────────────────────

/// Pixel layouts the media pipeline accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputPixelFormat {
    I420,
    Nv12,
}

/// Colour matrix understood by the media pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputColorSpace {
    Default,
    Bt601,
    Bt709,
}

/// A video frame ready for the media pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputVideoFrame {
    pub planes: Vec<Vec<u8>>,
    pub linesizes: Vec<u32>,
    pub format: OutputPixelFormat,
    pub width: u32,
    pub height: u32,
    pub full_range: bool,
    pub color_space: OutputColorSpace,
    /// Presentation time on the local monotonic clock.
    pub timestamp_ns: i64,
}

/// Sample layouts the media pipeline accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputSampleFormat {
    FloatPlanar,
    Float,
    S16Planar,
    S16,
}

/// Speaker arrangement reported to the media pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakerLayout {
    Mono,
    Stereo,
}

/// An audio frame ready for the media pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputAudioFrame {
    pub planes: Vec<Vec<u8>>,
    pub format: OutputSampleFormat,
    pub sample_rate: u32,
    pub layout: SpeakerLayout,
    pub frame_count: u32,
    pub timestamp_ns: i64,
}

/// The downstream consumer of decoded media.
#[cfg_attr(test, mockall::automock)]
pub trait MediaSink: Send + Sync {
    fn emit_video_frame(&self, frame: &OutputVideoFrame);
    fn emit_audio_frame(&self, frame: &OutputAudioFrame);
}

/// Local monotonic clock used to anchor presentation timestamps.
#[cfg_attr(test, mockall::automock)]
pub trait Clock: Send + Sync {
    fn now_ns(&self) -> i64;
}

/// The three media collaborators an ingest server needs, bundled so they can
/// be cloned into each server thread.
#[derive(Clone)]
pub struct MediaPorts {
    pub decoders: Arc<dyn DecoderFactory>,
    pub sink: Arc<dyn MediaSink>,
    pub clock: Arc<dyn Clock>,
}

// ── Translation ───────────────────────────────────────────────────────────────

/// Maps a decoder pixel format, or `None` when the pipeline cannot take it.
pub fn map_pixel_format(format: PixelFormat) -> Option<OutputPixelFormat> {
    match format {
        PixelFormat::Yuv420p | PixelFormat::Yuvj420p => Some(OutputPixelFormat::I420),
        PixelFormat::Nv12 => Some(OutputPixelFormat::Nv12),
        PixelFormat::Other(_) => None,
    }
}

pub fn map_color_space(space: ColorSpace) -> OutputColorSpace {
    match space {
        ColorSpace::Bt709 => OutputColorSpace::Bt709,
        ColorSpace::Smpte170m => OutputColorSpace::Bt601,
        _ => OutputColorSpace::Default,
    }
}

pub fn map_sample_format(format: SampleFormat) -> OutputSampleFormat {
    match format {
        SampleFormat::Fltp => OutputSampleFormat::FloatPlanar,
        SampleFormat::Flt => OutputSampleFormat::Float,
        SampleFormat::S16p => OutputSampleFormat::S16Planar,
        SampleFormat::S16 | SampleFormat::Other(_) => OutputSampleFormat::S16,
    }
}

pub fn speaker_layout(channels: u16) -> SpeakerLayout {
    if channels == 2 {
        SpeakerLayout::Stereo
    } else {
        SpeakerLayout::Mono
    }
}

/// Converts a decoded picture into a pipeline frame stamped `timestamp_ns`.
///
/// Returns `None` for pixel formats the pipeline does not accept.
pub fn translate_video(frame: VideoFrame, timestamp_ns: i64) -> Option<OutputVideoFrame> {
    let format = map_pixel_format(frame.format)?;
    Some(OutputVideoFrame {
        linesizes: frame.linesizes.iter().map(|l| l.unsigned_abs()).collect(),
        planes: frame.planes,
        format,
        width: frame.width,
        height: frame.height,
        full_range: frame.color_range == ColorRange::Full,
        color_space: map_color_space(frame.color_space),
        timestamp_ns,
    })
}

/// Converts a decoded sample block into a pipeline frame stamped `timestamp_ns`.
pub fn translate_audio(frame: AudioFrame, timestamp_ns: i64) -> OutputAudioFrame {
    OutputAudioFrame {
        format: map_sample_format(frame.format),
        layout: speaker_layout(frame.channels),
        sample_rate: frame.sample_rate,
        frame_count: frame.sample_count,
        planes: frame.planes,
        timestamp_ns,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
