//! Lifecycle of the receiver: three server threads around one shared state.
//!
//! [`OcamSource`] is what a host embeds.  `start` spawns the video, control
//! and audio threads; each binds its own listener, so a port that cannot be
//! bound disables only that stream.  `stop` clears the run signal, force-closes
//! every client socket, joins the threads and forgets the capability report.
//! Dropping a started source stops it.
//!
//! The settings API (`apply_settings`, `capabilities`, `request_keyframe`, ...)
//! works whether or not the servers are running; settings applied while no
//! phone is connected are replayed when it connects.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use ocam_core::{
    CameraSettings, ControlCommand, DeviceCapabilities, Resolution, SettingOptions, StreamKind,
};
use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::application::device_state::{Channel, DeviceState, ReceiverStatus};
use crate::application::media::MediaPorts;
use crate::application::sync_settings::RESOLUTION_SETTLE_DELAY;
use crate::infrastructure::network::control_server::ControlServer;
use crate::infrastructure::network::ingest_server::IngestServer;
use crate::infrastructure::network::transport::{RunSignal, TransportError, TransportOptions};

/// Where the servers listen and how they time their waits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceOptions {
    pub video_addr: SocketAddr,
    pub control_addr: SocketAddr,
    pub audio_addr: SocketAddr,
    pub transport: TransportOptions,
    /// Pause after a replayed resolution command.
    pub resolution_settle: Duration,
}

impl Default for SourceOptions {
    fn default() -> Self {
        let any = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
        Self {
            video_addr: SocketAddr::new(any, StreamKind::Video.default_port()),
            control_addr: SocketAddr::new(any, ocam_core::protocol::DEFAULT_CONTROL_PORT),
            audio_addr: SocketAddr::new(any, StreamKind::Audio.default_port()),
            transport: TransportOptions::default(),
            resolution_settle: RESOLUTION_SETTLE_DELAY,
        }
    }
}

impl SourceOptions {
    /// All three servers on `ip` with OS-assigned ports.
    pub fn ephemeral(ip: IpAddr) -> Self {
        Self {
            video_addr: SocketAddr::new(ip, 0),
            control_addr: SocketAddr::new(ip, 0),
            audio_addr: SocketAddr::new(ip, 0),
            ..Self::default()
        }
    }
}

type BoundAddrs = Arc<Mutex<[Option<SocketAddr>; 3]>>;

fn slot(channel: Channel) -> usize {
    match channel {
        Channel::Video => 0,
        Channel::Control => 1,
        Channel::Audio => 2,
    }
}

/// The receiver: shared device state plus the three server threads.
pub struct OcamSource {
    options: SourceOptions,
    media: MediaPorts,
    state: Arc<DeviceState>,
    running: RunSignal,
    threads: Vec<JoinHandle<()>>,
    bound: BoundAddrs,
}

impl OcamSource {
    /// Creates a stopped source.
    pub fn new(options: SourceOptions, media: MediaPorts) -> Self {
        let running = RunSignal::new();
        running.stop();
        Self {
            options,
            media,
            state: Arc::new(DeviceState::new()),
            running,
            threads: Vec::new(),
            bound: Arc::default(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.is_running()
    }

    /// Spawns the three server threads.  Does nothing if already running.
    pub fn start(&mut self) {
        if self.is_running() {
            return;
        }
        self.running = RunSignal::new();
        info!("starting OCam receiver");

        self.spawn_control();
        self.spawn_ingest(StreamKind::Video, self.options.video_addr);
        self.spawn_ingest(StreamKind::Audio, self.options.audio_addr);
    }

    /// Stops every server and releases all per-connection state.
    ///
    /// Returns once all threads have exited.
    pub fn stop(&mut self) {
        if self.threads.is_empty() && !self.is_running() {
            return;
        }
        info!("stopping OCam receiver");
        self.running.stop();
        self.state.close_all_clients();
        for handle in self.threads.drain(..) {
            let name = handle.thread().name().unwrap_or("ocam").to_string();
            if handle.join().is_err() {
                error!("{name} thread panicked");
            }
        }
        self.state.reset_capabilities();
        *self.bound.lock() = [None; 3];
        info!("OCam receiver stopped");
    }

    /// Address the channel's listener is bound to, once its thread bound it.
    pub fn bound_addr(&self, channel: Channel) -> Option<SocketAddr> {
        self.bound.lock()[slot(channel)]
    }

    // ── Settings API ──────────────────────────────────────────────────────────

    /// Sends the settings that changed since the last call.
    pub fn apply_settings(&self, settings: &CameraSettings) -> Vec<ControlCommand> {
        self.state.apply_settings(settings)
    }

    /// Capability snapshot, with fallbacks until the device reports.
    pub fn capabilities(&self) -> DeviceCapabilities {
        self.state.capabilities()
    }

    pub fn setting_options(&self) -> SettingOptions {
        SettingOptions::from_capabilities(&self.state.capabilities())
    }

    /// Asks the encoder for an IDR frame.  Returns `false` with no control client.
    pub fn request_keyframe(&self) -> bool {
        self.state.send_control_command(ControlCommand::RequestKeyframe)
    }

    pub fn status(&self) -> ReceiverStatus {
        self.state.status()
    }

    /// Size of the last decoded picture (1280x720 before the first one).
    pub fn video_size(&self) -> Resolution {
        self.state.video_size()
    }

    pub fn state(&self) -> &Arc<DeviceState> {
        &self.state
    }

    // ── Thread spawning ───────────────────────────────────────────────────────

    fn spawn_control(&mut self) {
        let addr = self.options.control_addr;
        let state = Arc::clone(&self.state);
        let transport = self.options.transport;
        let settle = self.options.resolution_settle;
        let running = self.running.clone();
        let bound = Arc::clone(&self.bound);

        self.spawn("ocam-control", move || {
            match ControlServer::bind(addr, state, transport, running) {
                Ok(server) => {
                    record_bound(&bound, Channel::Control, server.local_addr().ok());
                    server.with_resolution_settle(settle).run();
                }
                Err(e) => report_bind_failure("control", e),
            }
        });
    }

    fn spawn_ingest(&mut self, kind: StreamKind, addr: SocketAddr) {
        let state = Arc::clone(&self.state);
        let media = self.media.clone();
        let transport = self.options.transport;
        let running = self.running.clone();
        let bound = Arc::clone(&self.bound);
        let name = format!("ocam-{kind}");

        self.spawn(&name, move || {
            match IngestServer::bind(kind, addr, state, media, transport, running) {
                Ok(server) => {
                    record_bound(&bound, Channel::from(kind), server.local_addr().ok());
                    server.run();
                }
                Err(e) => report_bind_failure(kind.as_str(), e),
            }
        });
    }

    fn spawn<F>(&mut self, name: &str, body: F)
    where
        F: FnOnce() + Send + 'static,
    {
        match std::thread::Builder::new().name(name.to_string()).spawn(body) {
            Ok(handle) => self.threads.push(handle),
            Err(e) => error!("failed to spawn {name} thread, stream disabled: {e}"),
        }
    }
}

impl Drop for OcamSource {
    fn drop(&mut self) {
        self.stop();
    }
}

fn record_bound(bound: &BoundAddrs, channel: Channel, addr: Option<SocketAddr>) {
    bound.lock()[slot(channel)] = addr;
}

fn report_bind_failure(stream: &str, e: TransportError) {
    match e {
        TransportError::Cancelled => info!("{stream} server cancelled before binding"),
        other => warn!("{stream} server disabled: {other}"),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::media::{MockClock, MockDecoderFactory, MockMediaSink};
    use std::time::Instant;

    fn idle_media() -> MediaPorts {
        let mut clock = MockClock::new();
        clock.expect_now_ns().return_const(0i64);
        MediaPorts {
            decoders: Arc::new(MockDecoderFactory::new()),
            sink: Arc::new(MockMediaSink::new()),
            clock: Arc::new(clock),
        }
    }

    fn fast_options() -> SourceOptions {
        let mut opts = SourceOptions::ephemeral(IpAddr::V4(Ipv4Addr::LOCALHOST));
        opts.transport.poll_interval = Duration::from_millis(20);
        opts
    }

    fn wait_bound(source: &OcamSource) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if [Channel::Video, Channel::Control, Channel::Audio]
                .iter()
                .all(|c| source.bound_addr(*c).is_some())
            {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_new_source_is_stopped_with_defaults() {
        let source = OcamSource::new(fast_options(), idle_media());
        assert!(!source.is_running());
        assert_eq!(source.video_size(), Resolution::new(1280, 720));
        assert!(!source.capabilities().received);
        assert!(!source.request_keyframe());
    }

    #[test]
    fn test_start_binds_all_three_servers_and_stop_joins_them() {
        // Arrange
        let mut source = OcamSource::new(fast_options(), idle_media());

        // Act
        source.start();
        let bound = wait_bound(&source);
        let started = Instant::now();
        source.stop();

        // Assert
        assert!(bound);
        assert!(!source.is_running());
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(source.bound_addr(Channel::Control).is_none());
    }

    #[test]
    fn test_source_can_restart_after_stop() {
        let mut source = OcamSource::new(fast_options(), idle_media());
        source.start();
        assert!(wait_bound(&source));
        source.stop();

        source.start();
        assert!(wait_bound(&source));
        assert!(source.is_running());
    }

    #[test]
    fn test_settings_applied_before_start_are_cached() {
        let source = OcamSource::new(fast_options(), idle_media());
        let cmds = source.apply_settings(&CameraSettings::default());
        assert!(!cmds.is_empty());
        assert!(source.apply_settings(&CameraSettings::default()).is_empty());
    }

    #[test]
    fn test_setting_options_fall_back_before_report() {
        let source = OcamSource::new(fast_options(), idle_media());
        let opts = source.setting_options();
        assert!(!opts.device_reported);
        assert_eq!(opts.iso_max, 3200);
    }
}
