//! Protocol module containing wire message types and the binary codec.

pub mod codec;
pub mod messages;

pub use codec::{
    check_payload_len, decode_audio_handshake, decode_capabilities, decode_command,
    decode_control_header, decode_media_header, decode_video_handshake, encode_capabilities,
    encode_command, encode_control_header, encode_control_packet, encode_media_header,
    encode_media_packet, encode_video_handshake, ProtocolError,
};
pub use messages::*;
