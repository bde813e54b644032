//! Camera settings and the cache of values already sent to the device.
//!
//! The host never reads settings back from the device.  Instead it remembers
//! the last value it sent for every field in a [`SettingsCache`]; applying a
//! new [`CameraSettings`] produces commands only for fields that differ from
//! the cache, and a reconnecting device gets the whole cache replayed.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::capabilities::Resolution;
use crate::protocol::messages::ControlCommand;

/// Highest manual focus position.
pub const MAX_MANUAL_FOCUS: u16 = 1000;

/// Focus control: `-1` on the wire is auto-focus, `0..=1000` is manual.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FocusMode {
    #[default]
    Auto,
    Manual(u16),
}

/// Error returned for focus values outside `-1..=1000`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("focus {0} out of range: expected -1 (auto) or 0..=1000")]
pub struct InvalidFocus(pub i32);

impl FocusMode {
    /// Interprets a raw focus value.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidFocus`] for anything other than `-1` or `0..=1000`.
    pub fn from_raw(value: i32) -> Result<Self, InvalidFocus> {
        match value {
            -1 => Ok(FocusMode::Auto),
            0..=1000 => Ok(FocusMode::Manual(value as u16)),
            other => Err(InvalidFocus(other)),
        }
    }

    /// The value sent to the device.
    pub fn to_raw(self) -> i32 {
        match self {
            FocusMode::Auto => -1,
            FocusMode::Manual(pos) => i32::from(pos.min(MAX_MANUAL_FOCUS)),
        }
    }
}

/// The settings a host-side UI applies to the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraSettings {
    /// `None` leaves the resolution untouched (e.g. an unparseable UI value).
    pub resolution: Option<Resolution>,
    pub fps: u32,
    pub bitrate_mbps: u32,
    pub flash: bool,
    /// 0 = auto.
    pub iso: u32,
    /// 0 = auto.
    pub exposure_us: u32,
    pub focus: FocusMode,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            resolution: Some(Resolution::new(1280, 720)),
            fps: 30,
            bitrate_mbps: 2,
            flash: false,
            iso: 0,
            exposure_us: 0,
            focus: FocusMode::Auto,
        }
    }
}

/// Converts a bitrate in Mbps to the bits-per-second argument of `SetBitrate`.
pub fn bitrate_bps(mbps: u32) -> u32 {
    mbps.saturating_mul(1_000_000)
}

/// One cached setting, in the order a replay sends them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingField {
    Resolution,
    Fps,
    Bitrate,
    Flash,
    Iso,
    Exposure,
    Focus,
}

impl SettingField {
    pub const REPLAY_ORDER: [SettingField; 7] = [
        SettingField::Resolution,
        SettingField::Fps,
        SettingField::Bitrate,
        SettingField::Flash,
        SettingField::Iso,
        SettingField::Exposure,
        SettingField::Focus,
    ];
}

/// The last value sent to the device for every setting.
///
/// `None` means the field has never been sent.  Flash starts as `false`
/// because the device also starts with the torch off.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettingsCache {
    pub resolution: Option<Resolution>,
    pub fps: Option<u32>,
    pub bitrate_mbps: Option<u32>,
    pub flash: bool,
    pub iso: Option<u32>,
    pub exposure_us: Option<u32>,
    pub focus: Option<FocusMode>,
}

impl SettingsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compares `desired` against the cache, records every changed field and
    /// returns the commands that must be sent, in wire order.
    ///
    /// Calling this twice with the same settings returns an empty list the
    /// second time.
    pub fn diff_and_record(&mut self, desired: &CameraSettings) -> Vec<ControlCommand> {
        let mut commands = Vec::new();

        if let Some(res) = desired.resolution {
            if self.resolution != Some(res) {
                commands.push(ControlCommand::SetResolution {
                    width: res.width,
                    height: res.height,
                });
                self.resolution = Some(res);
            }
        }
        if self.fps != Some(desired.fps) {
            commands.push(ControlCommand::SetFps(desired.fps));
            self.fps = Some(desired.fps);
        }
        if self.bitrate_mbps != Some(desired.bitrate_mbps) {
            commands.push(ControlCommand::SetBitrate(bitrate_bps(desired.bitrate_mbps)));
            self.bitrate_mbps = Some(desired.bitrate_mbps);
        }
        if self.flash != desired.flash {
            commands.push(ControlCommand::SetFlash(desired.flash));
            self.flash = desired.flash;
        }
        if self.iso != Some(desired.iso) {
            commands.push(ControlCommand::SetIso(desired.iso));
            self.iso = Some(desired.iso);
        }
        if self.exposure_us != Some(desired.exposure_us) {
            commands.push(ControlCommand::SetExposureUs(desired.exposure_us));
            self.exposure_us = Some(desired.exposure_us);
        }
        if self.focus != Some(desired.focus) {
            commands.push(ControlCommand::SetFocus(desired.focus.to_raw()));
            self.focus = Some(desired.focus);
        }

        commands
    }

    /// The commands that bring a freshly connected device up to date.
    ///
    /// Order is fixed: resolution, fps, bitrate, flash, iso, exposure, focus.
    /// Fields never sent are skipped, as are zero resolution/fps/bitrate.
    /// Flash is always included.  The trailing `SettingsSyncComplete` is not
    /// part of this list.
    pub fn replay_commands(&self) -> Vec<ControlCommand> {
        SettingField::REPLAY_ORDER
            .iter()
            .filter_map(|&field| self.replay_command(field))
            .collect()
    }

    /// The replay command for one field, built from its current value.
    ///
    /// `None` when the field has never been sent or holds a zero
    /// resolution/fps/bitrate.
    pub fn replay_command(&self, field: SettingField) -> Option<ControlCommand> {
        match field {
            SettingField::Resolution => self
                .resolution
                .filter(|r| r.width > 0 && r.height > 0)
                .map(|res| ControlCommand::SetResolution {
                    width: res.width,
                    height: res.height,
                }),
            SettingField::Fps => self.fps.filter(|&f| f > 0).map(ControlCommand::SetFps),
            SettingField::Bitrate => self
                .bitrate_mbps
                .filter(|&b| b > 0)
                .map(|mbps| ControlCommand::SetBitrate(bitrate_bps(mbps))),
            SettingField::Flash => Some(ControlCommand::SetFlash(self.flash)),
            SettingField::Iso => self.iso.map(ControlCommand::SetIso),
            SettingField::Exposure => self.exposure_us.map(ControlCommand::SetExposureUs),
            SettingField::Focus => self.focus.map(|f| ControlCommand::SetFocus(f.to_raw())),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
