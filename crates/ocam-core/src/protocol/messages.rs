//! All OCam wire message types.
//!
//! Every multi-byte integer on the wire is big-endian.  There is no version
//! byte and no resynchronisation marker: a framing error on any connection can
//! only be recovered by dropping it and waiting for the device to reconnect.

use serde::{Deserialize, Serialize};

// ── Protocol constants ────────────────────────────────────────────────────────

/// Default TCP port of the video ingest server.
pub const DEFAULT_VIDEO_PORT: u16 = 27183;

/// Default TCP port of the control server.
pub const DEFAULT_CONTROL_PORT: u16 = 27184;

/// Default TCP port of the audio ingest server.
pub const DEFAULT_AUDIO_PORT: u16 = 27185;

/// Size of a media packet header: `timestamp:u64 | size:u32`.
pub const MEDIA_HEADER_SIZE: usize = 12;

/// Size of an encoded host→device control command: `cmd_id:u8 | arg1:u32 | arg2:u32`.
pub const COMMAND_SIZE: usize = 9;

/// Size of a device→host control packet header: `type:u8 | length:u32`.
pub const CONTROL_HEADER_SIZE: usize = 5;

/// Length of the fixed, NUL-padded device name field of the video handshake.
pub const VIDEO_NAME_SIZE: usize = 64;

/// Total size of the video handshake: name + codec tag + width + height.
pub const VIDEO_HANDSHAKE_SIZE: usize = VIDEO_NAME_SIZE + 3 * 4;

/// Total size of the audio handshake: a single 4-byte magic value.
pub const AUDIO_HANDSHAKE_SIZE: usize = 4;

/// Codec tag the device writes into the video handshake (`"h264"`).
pub const VIDEO_CODEC_H264: u32 = 0x6832_3634;

/// Magic value the device writes as the audio handshake (`"AAC "`).
pub const AUDIO_MAGIC_AAC: u32 = 0x4141_4320;

/// Upper bound on a capability report payload.
///
/// A full report with 255 resolutions is 2 062 bytes; anything larger than
/// this limit is treated as a decode failure.
pub const MAX_CAPABILITIES_PAYLOAD: usize = 64 * 1024;

/// Default upper bound on a single media packet payload (16 MiB).
pub const DEFAULT_MAX_PACKET_SIZE: usize = 16 * 1024 * 1024;

// ── Stream kinds ──────────────────────────────────────────────────────────────

/// The two media streams the device pushes.
///
/// Both streams share one ingest state machine; the variations are captured
/// by the methods below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamKind {
    Video,
    Audio,
}

impl StreamKind {
    /// Number of handshake bytes the device sends right after connecting.
    pub fn handshake_size(self) -> usize {
        match self {
            StreamKind::Video => VIDEO_HANDSHAKE_SIZE,
            StreamKind::Audio => AUDIO_HANDSHAKE_SIZE,
        }
    }

    /// Whether a zero timestamp marks a configuration / restart packet.
    pub fn has_restart_sentinel(self) -> bool {
        matches!(self, StreamKind::Video)
    }

    /// Whether the first packet seeds the decoder configuration when no
    /// extradata has been accumulated yet.
    pub fn seeds_extradata_from_first_packet(self) -> bool {
        matches!(self, StreamKind::Audio)
    }

    /// The port this stream listens on unless configured otherwise.
    pub fn default_port(self) -> u16 {
        match self {
            StreamKind::Video => DEFAULT_VIDEO_PORT,
            StreamKind::Audio => DEFAULT_AUDIO_PORT,
        }
    }

    /// Short lowercase name, used for thread names and log fields.
    pub fn as_str(self) -> &'static str {
        match self {
            StreamKind::Video => "video",
            StreamKind::Audio => "audio",
        }
    }
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Host → device commands ────────────────────────────────────────────────────

/// Command identifiers understood by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum CommandId {
    SetResolution = 0x01,
    SetFps = 0x02,
    SetBitrate = 0x03,
    RequestKeyframe = 0x04,
    SettingsSyncComplete = 0x05,
    SetIso = 0x06,
    SetExposure = 0x07,
    SetFocus = 0x08,
    SetFlash = 0x09,
}

impl TryFrom<u8> for CommandId {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(CommandId::SetResolution),
            0x02 => Ok(CommandId::SetFps),
            0x03 => Ok(CommandId::SetBitrate),
            0x04 => Ok(CommandId::RequestKeyframe),
            0x05 => Ok(CommandId::SettingsSyncComplete),
            0x06 => Ok(CommandId::SetIso),
            0x07 => Ok(CommandId::SetExposure),
            0x08 => Ok(CommandId::SetFocus),
            0x09 => Ok(CommandId::SetFlash),
            _ => Err(()),
        }
    }
}

/// A control command exactly as it appears on the wire.
///
/// Any `u8` id is representable so the codec can round-trip bytes it does not
/// understand; [`ControlCommand`] is the typed view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCommand {
    pub cmd_id: u8,
    pub arg1: u32,
    pub arg2: u32,
}

/// A typed host→device control command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlCommand {
    /// Capture size in pixels.
    SetResolution { width: u32, height: u32 },
    /// Frames per second.
    SetFps(u32),
    /// Encoder bitrate in bits per second.
    SetBitrate(u32),
    /// Ask the encoder for an IDR frame.
    RequestKeyframe,
    /// Marks the end of the settings replay; the device answers with a
    /// capability report.
    SettingsSyncComplete,
    /// Sensor sensitivity, 0 = auto.
    SetIso(u32),
    /// Exposure time in microseconds, 0 = auto.
    SetExposureUs(u32),
    /// Focus position: -1 = auto, 0..=1000 manual.
    SetFocus(i32),
    /// Torch on/off.
    SetFlash(bool),
}

impl ControlCommand {
    /// Returns the wire id of this command.
    pub fn id(&self) -> CommandId {
        match self {
            ControlCommand::SetResolution { .. } => CommandId::SetResolution,
            ControlCommand::SetFps(_) => CommandId::SetFps,
            ControlCommand::SetBitrate(_) => CommandId::SetBitrate,
            ControlCommand::RequestKeyframe => CommandId::RequestKeyframe,
            ControlCommand::SettingsSyncComplete => CommandId::SettingsSyncComplete,
            ControlCommand::SetIso(_) => CommandId::SetIso,
            ControlCommand::SetExposureUs(_) => CommandId::SetExposure,
            ControlCommand::SetFocus(_) => CommandId::SetFocus,
            ControlCommand::SetFlash(_) => CommandId::SetFlash,
        }
    }

    /// Lowers the command to its `(cmd_id, arg1, arg2)` wire form.
    pub fn to_raw(&self) -> RawCommand {
        let (arg1, arg2) = match *self {
            ControlCommand::SetResolution { width, height } => (width, height),
            ControlCommand::SetFps(fps) => (fps, 0),
            ControlCommand::SetBitrate(bps) => (bps, 0),
            ControlCommand::RequestKeyframe | ControlCommand::SettingsSyncComplete => (0, 0),
            ControlCommand::SetIso(iso) => (iso, 0),
            ControlCommand::SetExposureUs(us) => (us, 0),
            // Negative focus travels as its two's-complement bit pattern.
            ControlCommand::SetFocus(focus) => (focus as u32, 0),
            ControlCommand::SetFlash(on) => (u32::from(on), 0),
        };
        RawCommand {
            cmd_id: self.id() as u8,
            arg1,
            arg2,
        }
    }
}

impl TryFrom<RawCommand> for ControlCommand {
    type Error = u8;

    /// Lifts a raw command into its typed form; returns the unknown id on failure.
    fn try_from(raw: RawCommand) -> Result<Self, Self::Error> {
        let id = CommandId::try_from(raw.cmd_id).map_err(|_| raw.cmd_id)?;
        Ok(match id {
            CommandId::SetResolution => ControlCommand::SetResolution {
                width: raw.arg1,
                height: raw.arg2,
            },
            CommandId::SetFps => ControlCommand::SetFps(raw.arg1),
            CommandId::SetBitrate => ControlCommand::SetBitrate(raw.arg1),
            CommandId::RequestKeyframe => ControlCommand::RequestKeyframe,
            CommandId::SettingsSyncComplete => ControlCommand::SettingsSyncComplete,
            CommandId::SetIso => ControlCommand::SetIso(raw.arg1),
            CommandId::SetExposure => ControlCommand::SetExposureUs(raw.arg1),
            CommandId::SetFocus => ControlCommand::SetFocus(raw.arg1 as i32),
            CommandId::SetFlash => ControlCommand::SetFlash(raw.arg1 == 1),
        })
    }
}

// ── Device → host control packets ─────────────────────────────────────────────

/// Packet type byte of the device's capability report.
pub const PACKET_TYPE_CAPABILITIES: u8 = 0x10;

/// Known device→host control packet types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlPacketType {
    Capabilities,
    /// Any type this host does not understand; its payload is drained.
    Unknown(u8),
}

impl From<u8> for ControlPacketType {
    fn from(value: u8) -> Self {
        match value {
            PACKET_TYPE_CAPABILITIES => ControlPacketType::Capabilities,
            other => ControlPacketType::Unknown(other),
        }
    }
}

impl From<ControlPacketType> for u8 {
    fn from(value: ControlPacketType) -> Self {
        match value {
            ControlPacketType::Capabilities => PACKET_TYPE_CAPABILITIES,
            ControlPacketType::Unknown(other) => other,
        }
    }
}

/// The 5-byte header preceding every device→host control payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlPacketHeader {
    pub packet_type: ControlPacketType,
    /// Number of payload bytes that follow the header.
    pub length: u32,
}

// ── Media packets ─────────────────────────────────────────────────────────────

/// The 12-byte header preceding every compressed video or audio packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaPacketHeader {
    /// Capture time in device units (microseconds).  Zero on the video stream
    /// marks a configuration / restart packet.
    pub timestamp: u64,
    /// Number of payload bytes that follow the header.
    pub size: u32,
}

// ── Handshakes ────────────────────────────────────────────────────────────────

/// The fixed-size handshake sent once per video connection.
///
/// Its contents are informational only: the receiver logs them but never acts
/// on them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoHandshake {
    /// Human-readable device name (NUL padding stripped).
    pub device_name: String,
    /// Four-character codec tag, normally [`VIDEO_CODEC_H264`].
    pub codec_tag: u32,
    /// Width the encoder was started with.
    pub width: u32,
    /// Height the encoder was started with.
    pub height: u32,
}

impl VideoHandshake {
    /// Renders the codec tag as text when it is printable ASCII.
    pub fn codec_name(&self) -> String {
        let bytes = self.codec_tag.to_be_bytes();
        if bytes.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
            String::from_utf8_lossy(&bytes).trim_end().to_string()
        } else {
            format!("0x{:08X}", self.codec_tag)
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
