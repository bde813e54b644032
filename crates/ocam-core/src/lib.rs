//! # ocam-core
//!
//! Shared library for the OCam receiver containing the wire protocol spoken by
//! the phone-side encoder, the binary codec for every message, and the domain
//! types that describe the camera (capabilities, settings) and the stream clock.
//!
//! It has zero dependencies on sockets, threads, or decoders.
//!
//! # Architecture overview
//!
//! The phone pushes compressed video and audio over two dedicated TCP
//! connections and exchanges control traffic over a third one.  This crate
//! defines:
//!
//! - **`protocol`** – How bytes travel over the three connections: the
//!   timestamped media packet, the 9-byte control command sent to the device,
//!   the 5-byte-header control packet sent back by the device, the capability
//!   report, and the per-stream handshakes.
//!
//! - **`domain`** – Pure logic with no I/O: the capability record, the camera
//!   settings and the "last value sent" cache that suppresses redundant
//!   commands, and the timestamp reconciler that re-anchors each stream onto
//!   the local monotonic clock after every (re)connect.

pub mod domain;
pub mod protocol;

pub use domain::capabilities::{DeviceCapabilities, Resolution, SettingOptions};
pub use domain::settings::{CameraSettings, FocusMode, SettingField, SettingsCache};
pub use domain::timestamp::{AnchorPolicy, TimestampReconciler};
pub use protocol::codec::ProtocolError;
pub use protocol::messages::{ControlCommand, RawCommand, StreamKind};
