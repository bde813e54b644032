//! Shared device state: the only object touched by more than one thread.
//!
//! Holds the three client links, the last capability report, the settings
//! cache and the last decoded video size behind a single
//! [`parking_lot::Mutex`].  Every accessor takes the lock, does its work and
//! releases it; no reference to the inner record ever escapes.
//!
//! # Lock discipline
//!
//! Reads from a socket never happen under this lock.  Control commands are
//! written under it, which makes "send if connected, else do nothing" race
//! free against a concurrent disconnect.  Command writes are 9 bytes on a
//! socket with a write timeout, so the critical section stays short.

use std::fmt;
use std::io;

use ocam_core::protocol::encode_command;
use ocam_core::{
    CameraSettings, ControlCommand, DeviceCapabilities, Resolution, SettingField, SettingsCache,
    StreamKind,
};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Video size reported before the first frame is decoded.
pub const DEFAULT_VIDEO_SIZE: Resolution = Resolution::new(1280, 720);

/// The three connections the device opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Channel {
    Video,
    Control,
    Audio,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Channel::Video => "video",
            Channel::Control => "control",
            Channel::Audio => "audio",
        })
    }
}

impl From<StreamKind> for Channel {
    fn from(kind: StreamKind) -> Self {
        match kind {
            StreamKind::Video => Channel::Video,
            StreamKind::Audio => Channel::Audio,
        }
    }
}

/// Write side of an accepted client connection.
///
/// The server thread keeps its own handle for reading; the shared state holds
/// this one so that commands can be sent and the connection force-closed from
/// other threads.
pub trait ClientLink: Send {
    fn send(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Shuts the connection down, unblocking any reader.
    fn close(&mut self);
}

/// Snapshot of what is connected, for logs and UIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReceiverStatus {
    pub video_connected: bool,
    pub control_connected: bool,
    pub audio_connected: bool,
    pub capabilities_received: bool,
    pub video_size: Resolution,
}

impl fmt::Display for ReceiverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = |on: bool| if on { "up" } else { "down" };
        write!(
            f,
            "video={} control={} audio={} caps={} size={}",
            mark(self.video_connected),
            mark(self.control_connected),
            mark(self.audio_connected),
            self.capabilities_received,
            self.video_size
        )
    }
}

struct Inner {
    video: Option<Box<dyn ClientLink>>,
    control: Option<Box<dyn ClientLink>>,
    audio: Option<Box<dyn ClientLink>>,
    capabilities: DeviceCapabilities,
    cache: SettingsCache,
    video_size: Resolution,
}

impl Inner {
    fn slot(&mut self, channel: Channel) -> &mut Option<Box<dyn ClientLink>> {
        match channel {
            Channel::Video => &mut self.video,
            Channel::Control => &mut self.control,
            Channel::Audio => &mut self.audio,
        }
    }

    /// Sends on the control link if one is attached.
    ///
    /// A failed write may have left part of the command on the wire, so the
    /// link is shut down and dropped; the device reconnects and gets a
    /// clean replay.
    fn send_control(&mut self, cmd: ControlCommand) -> bool {
        let Some(link) = self.control.as_mut() else {
            debug!(?cmd, "control client absent, command not sent");
            return false;
        };
        match link.send(&encode_command(&cmd.to_raw())) {
            Ok(()) => {
                debug!(?cmd, "control command sent");
                true
            }
            Err(e) => {
                warn!(?cmd, "control send failed, dropping control client: {e}");
                if let Some(mut link) = self.control.take() {
                    link.close();
                }
                false
            }
        }
    }
}

/// Mutex-protected record shared by the three servers and the settings API.
pub struct DeviceState {
    inner: Mutex<Inner>,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceState {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                video: None,
                control: None,
                audio: None,
                capabilities: DeviceCapabilities::default(),
                cache: SettingsCache::new(),
                video_size: DEFAULT_VIDEO_SIZE,
            }),
        }
    }

    // ── Client links ──────────────────────────────────────────────────────────

    /// Registers the write side of a freshly accepted client, closing any
    /// link the channel still held.
    pub fn attach_client(&self, channel: Channel, link: Box<dyn ClientLink>) {
        let mut inner = self.inner.lock();
        if let Some(mut old) = inner.slot(channel).replace(link) {
            old.close();
        }
    }

    /// Closes and forgets the channel's link.  No-op when none is attached.
    pub fn detach_client(&self, channel: Channel) {
        let mut inner = self.inner.lock();
        if let Some(mut link) = inner.slot(channel).take() {
            link.close();
        }
    }

    pub fn is_connected(&self, channel: Channel) -> bool {
        self.inner.lock().slot(channel).is_some()
    }

    /// Force-closes every client link so blocked readers return promptly.
    pub fn close_all_clients(&self) {
        let mut inner = self.inner.lock();
        for channel in [Channel::Video, Channel::Control, Channel::Audio] {
            if let Some(mut link) = inner.slot(channel).take() {
                link.close();
            }
        }
    }

    /// Handles the end of a control connection: the link is closed and the
    /// capability report is marked stale.
    pub fn control_disconnected(&self) {
        let mut inner = self.inner.lock();
        if let Some(mut link) = inner.control.take() {
            link.close();
        }
        inner.capabilities.received = false;
    }

    // ── Control commands and settings ─────────────────────────────────────────

    /// Sends one command if a control client is connected.
    ///
    /// Returns `true` when the bytes were written.
    pub fn send_control_command(&self, cmd: ControlCommand) -> bool {
        self.inner.lock().send_control(cmd)
    }

    /// Sends the commands needed to move the device from the cached settings
    /// to `desired`, and records them as sent.
    ///
    /// The cache is updated even with no client connected; the values are
    /// delivered by the replay on the next connect.  Returns the commands
    /// that differed from the cache.
    pub fn apply_settings(&self, desired: &CameraSettings) -> Vec<ControlCommand> {
        let mut inner = self.inner.lock();
        let commands = inner.cache.diff_and_record(desired);
        for cmd in &commands {
            inner.send_control(*cmd);
        }
        if !commands.is_empty() {
            info!(count = commands.len(), "camera settings updated");
        }
        commands
    }

    /// Sends the cached value of `field`, read and written under one lock.
    ///
    /// Returns `None` when the field has nothing to replay, otherwise whether
    /// the command was written.
    pub fn send_cached(&self, field: SettingField) -> Option<bool> {
        let mut inner = self.inner.lock();
        let cmd = inner.cache.replay_command(field)?;
        Some(inner.send_control(cmd))
    }

    /// The replay list for a freshly connected control client.
    pub fn replay_commands(&self) -> Vec<ControlCommand> {
        self.inner.lock().cache.replay_commands()
    }

    pub fn settings_cache(&self) -> SettingsCache {
        self.inner.lock().cache
    }

    // ── Capabilities ──────────────────────────────────────────────────────────

    /// Replaces the whole capability record.
    pub fn update_capabilities(&self, caps: DeviceCapabilities) {
        self.inner.lock().capabilities = caps;
    }

    /// Snapshot for UIs, with fallback values until a report arrives.
    pub fn capabilities(&self) -> DeviceCapabilities {
        self.inner.lock().capabilities.with_fallbacks()
    }

    pub fn capabilities_received(&self) -> bool {
        self.inner.lock().capabilities.received
    }

    /// Drops any stored report.
    pub fn reset_capabilities(&self) {
        self.inner.lock().capabilities = DeviceCapabilities::default();
    }

    // ── Video size and status ─────────────────────────────────────────────────

    pub fn video_size(&self) -> Resolution {
        self.inner.lock().video_size
    }

    /// Records the size of the latest decoded picture.  Returns `true` when
    /// it differs from the previous one.
    pub fn set_video_size(&self, size: Resolution) -> bool {
        let mut inner = self.inner.lock();
        if inner.video_size == size {
            return false;
        }
        inner.video_size = size;
        true
    }

    pub fn status(&self) -> ReceiverStatus {
        let inner = self.inner.lock();
        ReceiverStatus {
            video_connected: inner.video.is_some(),
            control_connected: inner.control.is_some(),
            audio_connected: inner.audio.is_some(),
            capabilities_received: inner.capabilities.received,
            video_size: inner.video_size,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
