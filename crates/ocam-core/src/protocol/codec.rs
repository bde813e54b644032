//! Binary codec for every OCam wire message.
//!
//! Wire formats (all multi-byte integers big-endian):
//! ```text
//! media packet     [timestamp:8][size:4][payload:size]
//! control command  [cmd_id:1][arg1:4][arg2:4]                      host → device
//! control packet   [type:1][length:4][payload:length]              device → host
//! capabilities     [count:1]{[w:4][h:4]}*count
//!                  [iso_min:4][iso_max:4][exp_min:4][exp_max:4][focus_min:f32][flash:1]
//! video handshake  [name:64][codec_tag:4][width:4][height:4]
//! audio handshake  [magic:4]
//! ```
//!
//! These functions are pure: they never perform I/O.  Callers read exactly
//! the number of bytes a header announces before handing the buffer over, so
//! a short buffer here always means a malformed message.

use crate::domain::capabilities::{DeviceCapabilities, Resolution};
use crate::protocol::messages::{
    ControlPacketHeader, ControlPacketType, MediaPacketHeader, RawCommand, VideoHandshake,
    AUDIO_HANDSHAKE_SIZE, COMMAND_SIZE, CONTROL_HEADER_SIZE, MEDIA_HEADER_SIZE,
    VIDEO_HANDSHAKE_SIZE, VIDEO_NAME_SIZE,
};
use thiserror::Error;

/// Size of the fixed tail of a capability report that follows the resolutions.
const CAPABILITIES_TAIL_SIZE: usize = 4 * 4 + 4 + 1;

/// Errors that can occur while decoding a wire message.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// The byte slice is shorter than the message requires.
    #[error("insufficient data for {context}: need {needed} bytes, got {available}")]
    InsufficientData {
        context: &'static str,
        needed: usize,
        available: usize,
    },

    /// A length field announces more bytes than this host accepts.
    #[error("payload of {declared} bytes exceeds limit of {limit} bytes")]
    PayloadTooLarge { declared: usize, limit: usize },

    /// A field value could not be interpreted.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

// ── Control commands ──────────────────────────────────────────────────────────

/// Encodes a host→device command into its 9-byte wire form.
///
/// # Examples
///
/// ```rust
/// use ocam_core::protocol::{decode_command, encode_command, RawCommand};
///
/// let cmd = RawCommand { cmd_id: 0x01, arg1: 1920, arg2: 1080 };
/// let bytes = encode_command(&cmd);
/// assert_eq!(decode_command(&bytes).unwrap(), cmd);
/// ```
pub fn encode_command(cmd: &RawCommand) -> [u8; COMMAND_SIZE] {
    let mut buf = [0u8; COMMAND_SIZE];
    buf[0] = cmd.cmd_id;
    buf[1..5].copy_from_slice(&cmd.arg1.to_be_bytes());
    buf[5..9].copy_from_slice(&cmd.arg2.to_be_bytes());
    buf
}

/// Decodes a 9-byte host→device command.
///
/// # Errors
///
/// Returns [`ProtocolError::InsufficientData`] if fewer than 9 bytes are given.
pub fn decode_command(bytes: &[u8]) -> Result<RawCommand, ProtocolError> {
    require_len(bytes, COMMAND_SIZE, "control command")?;
    Ok(RawCommand {
        cmd_id: bytes[0],
        arg1: read_u32(bytes, 1)?,
        arg2: read_u32(bytes, 5)?,
    })
}

// ── Control packets (device → host) ───────────────────────────────────────────

/// Encodes the 5-byte header of a device→host control packet.
pub fn encode_control_header(header: &ControlPacketHeader) -> [u8; CONTROL_HEADER_SIZE] {
    let mut buf = [0u8; CONTROL_HEADER_SIZE];
    buf[0] = header.packet_type.into();
    buf[1..5].copy_from_slice(&header.length.to_be_bytes());
    buf
}

/// Decodes the 5-byte header of a device→host control packet.
///
/// # Errors
///
/// Returns [`ProtocolError::InsufficientData`] if fewer than 5 bytes are given.
pub fn decode_control_header(bytes: &[u8]) -> Result<ControlPacketHeader, ProtocolError> {
    require_len(bytes, CONTROL_HEADER_SIZE, "control header")?;
    Ok(ControlPacketHeader {
        packet_type: ControlPacketType::from(bytes[0]),
        length: read_u32(bytes, 1)?,
    })
}

/// Builds a complete control packet (header + payload), as the device sends it.
pub fn encode_control_packet(packet_type: ControlPacketType, payload: &[u8]) -> Vec<u8> {
    let header = ControlPacketHeader {
        packet_type,
        length: payload.len() as u32,
    };
    let mut buf = Vec::with_capacity(CONTROL_HEADER_SIZE + payload.len());
    buf.extend_from_slice(&encode_control_header(&header));
    buf.extend_from_slice(payload);
    buf
}

/// Encodes a capability report payload (without the control header).
///
/// At most 255 resolutions fit the one-byte count; any beyond that are dropped.
pub fn encode_capabilities(caps: &DeviceCapabilities) -> Vec<u8> {
    let count = caps.resolutions.len().min(u8::MAX as usize);
    let mut buf = Vec::with_capacity(1 + count * 8 + CAPABILITIES_TAIL_SIZE);
    buf.push(count as u8);
    for res in caps.resolutions.iter().take(count) {
        buf.extend_from_slice(&res.width.to_be_bytes());
        buf.extend_from_slice(&res.height.to_be_bytes());
    }
    buf.extend_from_slice(&caps.iso_range.0.to_be_bytes());
    buf.extend_from_slice(&caps.iso_range.1.to_be_bytes());
    buf.extend_from_slice(&caps.exposure_range_us.0.to_be_bytes());
    buf.extend_from_slice(&caps.exposure_range_us.1.to_be_bytes());
    buf.extend_from_slice(&caps.focus_min.to_be_bytes());
    buf.push(u8::from(caps.flash_available));
    buf
}

/// Decodes a capability report payload.
///
/// The result always has `received == true`.  Trailing bytes beyond the
/// known fields are ignored.
///
/// # Errors
///
/// Returns [`ProtocolError::InsufficientData`] if the payload is shorter than
/// its resolution count implies.
pub fn decode_capabilities(p: &[u8]) -> Result<DeviceCapabilities, ProtocolError> {
    require_len(p, 1, "capabilities.count")?;
    let count = p[0] as usize;
    let needed = 1 + count * 8 + CAPABILITIES_TAIL_SIZE;
    require_len(p, needed, "capabilities")?;

    let mut offset = 1;
    let mut resolutions = Vec::with_capacity(count);
    for _ in 0..count {
        let width = read_u32(p, offset)?;
        let height = read_u32(p, offset + 4)?;
        resolutions.push(Resolution { width, height });
        offset += 8;
    }

    let iso_min = read_i32(p, offset)?;
    let iso_max = read_i32(p, offset + 4)?;
    let exp_min = read_i32(p, offset + 8)?;
    let exp_max = read_i32(p, offset + 12)?;
    let focus_min = f32::from_bits(read_u32(p, offset + 16)?);
    let flash_available = p[offset + 20] != 0;

    Ok(DeviceCapabilities {
        resolutions,
        iso_range: (iso_min, iso_max),
        exposure_range_us: (exp_min, exp_max),
        focus_min,
        flash_available,
        received: true,
    })
}

// ── Media packets ─────────────────────────────────────────────────────────────

/// Encodes the 12-byte media packet header.
pub fn encode_media_header(header: &MediaPacketHeader) -> [u8; MEDIA_HEADER_SIZE] {
    let mut buf = [0u8; MEDIA_HEADER_SIZE];
    buf[0..8].copy_from_slice(&header.timestamp.to_be_bytes());
    buf[8..12].copy_from_slice(&header.size.to_be_bytes());
    buf
}

/// Decodes the 12-byte media packet header.
///
/// # Errors
///
/// Returns [`ProtocolError::InsufficientData`] if fewer than 12 bytes are given.
pub fn decode_media_header(bytes: &[u8]) -> Result<MediaPacketHeader, ProtocolError> {
    require_len(bytes, MEDIA_HEADER_SIZE, "media header")?;
    Ok(MediaPacketHeader {
        timestamp: read_u64(bytes, 0)?,
        size: read_u32(bytes, 8)?,
    })
}

/// Builds a complete media packet (header + payload), as the device sends it.
pub fn encode_media_packet(timestamp: u64, payload: &[u8]) -> Vec<u8> {
    let header = MediaPacketHeader {
        timestamp,
        size: payload.len() as u32,
    };
    let mut buf = Vec::with_capacity(MEDIA_HEADER_SIZE + payload.len());
    buf.extend_from_slice(&encode_media_header(&header));
    buf.extend_from_slice(payload);
    buf
}

/// Checks an announced payload length against `limit` before anything is
/// allocated for it.
///
/// # Errors
///
/// Returns [`ProtocolError::PayloadTooLarge`] when `declared > limit`.
pub fn check_payload_len(declared: u32, limit: usize) -> Result<usize, ProtocolError> {
    let declared = declared as usize;
    if declared > limit {
        return Err(ProtocolError::PayloadTooLarge { declared, limit });
    }
    Ok(declared)
}

// ── Handshakes ────────────────────────────────────────────────────────────────

/// Encodes the video handshake.  Names longer than 64 bytes are truncated.
pub fn encode_video_handshake(hs: &VideoHandshake) -> [u8; VIDEO_HANDSHAKE_SIZE] {
    let mut buf = [0u8; VIDEO_HANDSHAKE_SIZE];
    let name = hs.device_name.as_bytes();
    let n = name.len().min(VIDEO_NAME_SIZE);
    buf[..n].copy_from_slice(&name[..n]);
    buf[64..68].copy_from_slice(&hs.codec_tag.to_be_bytes());
    buf[68..72].copy_from_slice(&hs.width.to_be_bytes());
    buf[72..76].copy_from_slice(&hs.height.to_be_bytes());
    buf
}

/// Decodes the video handshake.
///
/// The name is read up to the first NUL and converted lossily, since the
/// device truncates it at a byte boundary that may split a UTF-8 sequence.
///
/// # Errors
///
/// Returns [`ProtocolError::InsufficientData`] if fewer than 76 bytes are given.
pub fn decode_video_handshake(bytes: &[u8]) -> Result<VideoHandshake, ProtocolError> {
    require_len(bytes, VIDEO_HANDSHAKE_SIZE, "video handshake")?;
    let name_field = &bytes[..VIDEO_NAME_SIZE];
    let name_end = name_field
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(VIDEO_NAME_SIZE);
    Ok(VideoHandshake {
        device_name: String::from_utf8_lossy(&name_field[..name_end]).into_owned(),
        codec_tag: read_u32(bytes, 64)?,
        width: read_u32(bytes, 68)?,
        height: read_u32(bytes, 72)?,
    })
}

/// Decodes the audio handshake magic.
///
/// # Errors
///
/// Returns [`ProtocolError::InsufficientData`] if fewer than 4 bytes are given.
pub fn decode_audio_handshake(bytes: &[u8]) -> Result<u32, ProtocolError> {
    require_len(bytes, AUDIO_HANDSHAKE_SIZE, "audio handshake")?;
    read_u32(bytes, 0)
}

// ── Primitive readers ─────────────────────────────────────────────────────────

fn require_len(buf: &[u8], needed: usize, context: &'static str) -> Result<(), ProtocolError> {
    if buf.len() < needed {
        return Err(ProtocolError::InsufficientData {
            context,
            needed,
            available: buf.len(),
        });
    }
    Ok(())
}

fn read_u32(buf: &[u8], offset: usize) -> Result<u32, ProtocolError> {
    let bytes: [u8; 4] = buf
        .get(offset..offset + 4)
        .and_then(|s| s.try_into().ok())
        .ok_or(ProtocolError::InsufficientData {
            context: "u32 field",
            needed: offset + 4,
            available: buf.len(),
        })?;
    Ok(u32::from_be_bytes(bytes))
}

fn read_i32(buf: &[u8], offset: usize) -> Result<i32, ProtocolError> {
    read_u32(buf, offset).map(|v| v as i32)
}

fn read_u64(buf: &[u8], offset: usize) -> Result<u64, ProtocolError> {
    let bytes: [u8; 8] = buf
        .get(offset..offset + 8)
        .and_then(|s| s.try_into().ok())
        .ok_or(ProtocolError::InsufficientData {
            context: "u64 field",
            needed: offset + 8,
            available: buf.len(),
        })?;
    Ok(u64::from_be_bytes(bytes))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
