//! ocam-receiver library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does the receiver do?
//!
//! A phone running the OCam app streams its camera to this host.  It opens
//! three TCP connections to the receiver:
//!
//! 1. **Control** (port 27184) – the receiver pushes the camera settings
//!    (resolution, fps, bitrate, ISO, exposure, focus, torch) and the phone
//!    answers with a capability report.
//! 2. **Video** (port 27183) – H.264 packets, each stamped with the phone's
//!    capture clock.  A packet with timestamp zero carries codec
//!    configuration and restarts the stream.
//! 3. **Audio** (port 27185) – AAC packets with the same framing.
//!
//! The receiver decodes the media through a pluggable decoder, re-stamps the
//! frames onto the local monotonic clock and hands them to a media sink.
//! Every connection may drop and come back at any time; the servers simply
//! return to listening.

/// Application layer: shared state, settings replay, media boundaries.
pub mod application;

/// Infrastructure layer: sockets, servers, clock, configuration, lifecycle.
pub mod infrastructure;

pub use application::device_state::{Channel, DeviceState, ReceiverStatus};
pub use infrastructure::source::{OcamSource, SourceOptions};
