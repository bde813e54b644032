//! Domain layer: pure camera and clock logic with no I/O.
//!
//! - **`capabilities`** – the device's capability report and the fallback
//!   values shown before it arrives.
//! - **`settings`** – camera settings and the "last value sent" cache that
//!   turns setting changes into control commands.
//! - **`timestamp`** – per-stream re-anchoring of device timestamps onto the
//!   local monotonic clock.

pub mod capabilities;
pub mod settings;
pub mod timestamp;
