//! Device capabilities as advertised by the phone on the control channel.
//!
//! The device sends one capability report after every settings sync.  Each
//! report replaces the previous one wholesale; the record is never merged
//! field-by-field.  Until the first report arrives (and again after the
//! control connection drops) `received` is `false` and readers fall back to
//! a fixed set of defaults.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Resolutions offered before the device has reported its own list.
pub const FALLBACK_RESOLUTIONS: [Resolution; 2] = [
    Resolution {
        width: 1280,
        height: 720,
    },
    Resolution {
        width: 1920,
        height: 1080,
    },
];

/// ISO range assumed before the device reports one.
pub const FALLBACK_ISO_RANGE: (i32, i32) = (0, 3200);

/// Exposure range (microseconds) assumed before the device reports one.
pub const FALLBACK_EXPOSURE_RANGE_US: (i32, i32) = (0, 100_000);

/// Frame rates a settings UI offers.
pub const FPS_CHOICES: [u32; 4] = [60, 30, 24, 15];

/// Bitrates (Mbps) a settings UI offers.
pub const BITRATE_CHOICES_MBPS: [u32; 8] = [1, 2, 4, 6, 8, 12, 20, 50];

/// One capture size supported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Error returned when a `"<w>x<h>"` string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid resolution {0:?}: expected \"<width>x<height>\"")]
pub struct ParseResolutionError(pub String);

impl FromStr for Resolution {
    type Err = ParseResolutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseResolutionError(s.to_string());
        let (w, h) = s.trim().split_once(['x', 'X']).ok_or_else(err)?;
        let width: u32 = w.trim().parse().map_err(|_| err())?;
        let height: u32 = h.trim().parse().map_err(|_| err())?;
        if width == 0 || height == 0 {
            return Err(err());
        }
        Ok(Resolution { width, height })
    }
}

/// The full capability record reported by the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceCapabilities {
    /// Supported capture sizes in the order the device listed them.
    pub resolutions: Vec<Resolution>,
    /// Sensor sensitivity range `(min, max)`.
    pub iso_range: (i32, i32),
    /// Exposure time range `(min, max)` in microseconds.
    pub exposure_range_us: (i32, i32),
    /// Minimum focus distance reported by the lens.
    pub focus_min: f32,
    /// Whether the device has a torch.
    pub flash_available: bool,
    /// `true` once a report has been received on the current control connection.
    pub received: bool,
}

impl Default for DeviceCapabilities {
    fn default() -> Self {
        Self {
            resolutions: Vec::new(),
            iso_range: (0, 0),
            exposure_range_us: (0, 0),
            focus_min: 0.0,
            flash_available: false,
            received: false,
        }
    }
}

impl DeviceCapabilities {
    /// Returns this record if it was received, otherwise a copy carrying the
    /// fallback resolution list and ranges.
    ///
    /// `received` is preserved so callers can still tell the two apart.
    pub fn with_fallbacks(&self) -> DeviceCapabilities {
        if self.received {
            return self.clone();
        }
        DeviceCapabilities {
            resolutions: FALLBACK_RESOLUTIONS.to_vec(),
            iso_range: FALLBACK_ISO_RANGE,
            exposure_range_us: FALLBACK_EXPOSURE_RANGE_US,
            focus_min: 0.0,
            flash_available: false,
            received: false,
        }
    }
}

/// Choices a settings UI should offer for the current capability state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingOptions {
    pub resolutions: Vec<Resolution>,
    pub fps: Vec<u32>,
    pub bitrates_mbps: Vec<u32>,
    pub iso_max: i32,
    pub exposure_max_us: i32,
    pub focus_range: (i32, i32),
    pub flash_available: bool,
    /// `false` while the UI is showing fallback values.
    pub device_reported: bool,
}

impl SettingOptions {
    /// Builds the option lists from a capability snapshot.
    pub fn from_capabilities(caps: &DeviceCapabilities) -> Self {
        let resolutions = if caps.received && !caps.resolutions.is_empty() {
            caps.resolutions.clone()
        } else {
            FALLBACK_RESOLUTIONS.to_vec()
        };
        let iso_max = if caps.received && caps.iso_range.1 > 0 {
            caps.iso_range.1
        } else {
            FALLBACK_ISO_RANGE.1
        };
        let exposure_max_us = if caps.received && caps.exposure_range_us.1 > 0 {
            caps.exposure_range_us.1
        } else {
            FALLBACK_EXPOSURE_RANGE_US.1
        };
        Self {
            resolutions,
            fps: FPS_CHOICES.to_vec(),
            bitrates_mbps: BITRATE_CHOICES_MBPS.to_vec(),
            iso_max,
            exposure_max_us,
            focus_range: (-1, 1000),
            flash_available: caps.received && caps.flash_available,
            device_reported: caps.received,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
