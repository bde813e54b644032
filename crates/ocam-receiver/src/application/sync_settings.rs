//! Settings replay for a freshly connected control client.
//!
//! The device forgets everything between connections, so on every control
//! connect the host re-sends the cached settings in a fixed order and closes
//! the sequence with `SettingsSyncComplete`.  The device answers that with a
//! capability report.
//!
//! Each field is read from the cache and sent under one lock acquisition
//! ([`DeviceState::send_cached`]), so a setting applied while the replay is
//! in progress is never followed by its stale cached value.  The lock is
//! released between fields and during the settle delay.

use std::time::Duration;

use ocam_core::{ControlCommand, SettingField};
use tracing::info;

use crate::application::device_state::DeviceState;

/// Pause after a resolution change so the device reconfigures its encoder
/// before dependent settings arrive.
pub const RESOLUTION_SETTLE_DELAY: Duration = Duration::from_millis(50);

/// Replays the settings cache to the control client and finishes with
/// `SettingsSyncComplete`.
///
/// Returns the number of commands actually written.
pub fn sync_settings(state: &DeviceState, resolution_settle: Duration) -> usize {
    info!("syncing settings to device");

    let mut written = 0;
    for field in SettingField::REPLAY_ORDER {
        let Some(sent) = state.send_cached(field) else {
            continue;
        };
        if sent {
            written += 1;
        }
        if field == SettingField::Resolution && !resolution_settle.is_zero() {
            std::thread::sleep(resolution_settle);
        }
    }
    if state.send_control_command(ControlCommand::SettingsSyncComplete) {
        written += 1;
    }
    written
}

// ── Tests ─────────────────────────────────────────────────────────────────────
