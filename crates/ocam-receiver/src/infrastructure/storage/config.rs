//! TOML-based configuration for the receiver.
//!
//! Default locations:
//! - Windows:  `%APPDATA%\OCam\receiver.toml`
//! - Linux:    `$XDG_CONFIG_HOME/ocam/receiver.toml` (or `~/.config/...`)
//! - macOS:    `~/Library/Application Support/OCam/receiver.toml`
//!
//! ```toml
//! [receiver]
//! log_level = "info"
//! status_interval_secs = 10
//!
//! [network]
//! bind_address = "0.0.0.0"
//! video_port = 27183
//! control_port = 27184
//! audio_port = 27185
//! poll_interval_ms = 100
//!
//! [camera]
//! resolution = "1280x720"
//! fps = 30
//! bitrate_mbps = 2
//! focus = -1
//! ```
//!
//! Every field carries `#[serde(default = "...")]`, so a partial file (or an
//! old one missing newer keys) loads with the remaining values defaulted.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use ocam_core::domain::capabilities::ParseResolutionError;
use ocam_core::domain::settings::InvalidFocus;
use ocam_core::protocol::{
    DEFAULT_AUDIO_PORT, DEFAULT_CONTROL_PORT, DEFAULT_MAX_PACKET_SIZE, DEFAULT_VIDEO_PORT,
};
use ocam_core::{CameraSettings, FocusMode, Resolution};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::infrastructure::network::transport::TransportOptions;
use crate::infrastructure::source::SourceOptions;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid bind address {0:?}")]
    InvalidBindAddress(String),

    #[error(transparent)]
    InvalidResolution(#[from] ParseResolutionError),

    #[error(transparent)]
    InvalidFocus(#[from] InvalidFocus),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level receiver configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ReceiverConfig {
    #[serde(default)]
    pub receiver: GeneralConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub camera: CameraConfig,
}

/// Process-level behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneralConfig {
    /// `tracing` filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// How often the binary logs a status line.
    #[serde(default = "default_status_interval")]
    pub status_interval_secs: u64,
}

/// Listening sockets and transport timing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_video_port")]
    pub video_port: u16,
    #[serde(default = "default_control_port")]
    pub control_port: u16,
    #[serde(default = "default_audio_port")]
    pub audio_port: u16,
    /// Upper bound on every blocking wait; also the shutdown latency.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_bind_retries")]
    pub bind_retries: u32,
    #[serde(default = "default_bind_retry_delay")]
    pub bind_retry_delay_ms: u64,
    #[serde(default = "default_write_timeout")]
    pub write_timeout_ms: u64,
    /// Media packets above this size drop the connection.
    #[serde(default = "default_max_packet_bytes")]
    pub max_packet_bytes: usize,
}

/// Camera settings applied when the receiver starts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CameraConfig {
    /// `"<width>x<height>"`.
    #[serde(default = "default_resolution")]
    pub resolution: String,
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_bitrate")]
    pub bitrate_mbps: u32,
    #[serde(default)]
    pub flash: bool,
    /// 0 = auto.
    #[serde(default)]
    pub iso: u32,
    /// 0 = auto.
    #[serde(default)]
    pub exposure_us: u32,
    /// -1 = auto, 0..=1000 manual.
    #[serde(default = "default_focus")]
    pub focus: i32,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_status_interval() -> u64 {
    10
}
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_video_port() -> u16 {
    DEFAULT_VIDEO_PORT
}
fn default_control_port() -> u16 {
    DEFAULT_CONTROL_PORT
}
fn default_audio_port() -> u16 {
    DEFAULT_AUDIO_PORT
}
fn default_poll_interval() -> u64 {
    100
}
fn default_bind_retries() -> u32 {
    5
}
fn default_bind_retry_delay() -> u64 {
    1000
}
fn default_write_timeout() -> u64 {
    500
}
fn default_max_packet_bytes() -> usize {
    DEFAULT_MAX_PACKET_SIZE
}
fn default_resolution() -> String {
    "1280x720".to_string()
}
fn default_fps() -> u32 {
    30
}
fn default_bitrate() -> u32 {
    2
}
fn default_focus() -> i32 {
    -1
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            status_interval_secs: default_status_interval(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            video_port: default_video_port(),
            control_port: default_control_port(),
            audio_port: default_audio_port(),
            poll_interval_ms: default_poll_interval(),
            bind_retries: default_bind_retries(),
            bind_retry_delay_ms: default_bind_retry_delay(),
            write_timeout_ms: default_write_timeout(),
            max_packet_bytes: default_max_packet_bytes(),
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            resolution: default_resolution(),
            fps: default_fps(),
            bitrate_mbps: default_bitrate(),
            flash: false,
            iso: 0,
            exposure_us: 0,
            focus: default_focus(),
        }
    }
}

// ── Conversions ───────────────────────────────────────────────────────────────

impl NetworkConfig {
    pub fn transport_options(&self) -> TransportOptions {
        TransportOptions {
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            write_timeout: Duration::from_millis(self.write_timeout_ms.max(1)),
            bind_retries: self.bind_retries.max(1),
            bind_retry_delay: Duration::from_millis(self.bind_retry_delay_ms),
            max_packet_bytes: self.max_packet_bytes,
        }
    }

    fn bind_ip(&self) -> Result<IpAddr, ConfigError> {
        self.bind_address
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidBindAddress(self.bind_address.clone()))
    }
}

impl CameraConfig {
    /// Validates the section and converts it to [`CameraSettings`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidResolution`] or
    /// [`ConfigError::InvalidFocus`] for out-of-range values.
    pub fn to_settings(&self) -> Result<CameraSettings, ConfigError> {
        let resolution: Resolution = self.resolution.parse()?;
        Ok(CameraSettings {
            resolution: Some(resolution),
            fps: self.fps,
            bitrate_mbps: self.bitrate_mbps,
            flash: self.flash,
            iso: self.iso,
            exposure_us: self.exposure_us,
            focus: FocusMode::from_raw(self.focus)?,
        })
    }
}

impl ReceiverConfig {
    /// Builds the lifecycle options from the `[network]` section.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidBindAddress`] when the address is not an
    /// IP literal.
    pub fn source_options(&self) -> Result<SourceOptions, ConfigError> {
        let ip = self.network.bind_ip()?;
        Ok(SourceOptions {
            video_addr: SocketAddr::new(ip, self.network.video_port),
            control_addr: SocketAddr::new(ip, self.network.control_port),
            audio_addr: SocketAddr::new(ip, self.network.audio_port),
            transport: self.network.transport_options(),
            ..SourceOptions::default()
        })
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Resolves the platform default path of the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the base directory cannot
/// be determined from the environment.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    platform_config_dir()
        .map(|dir| dir.join("receiver.toml"))
        .ok_or(ConfigError::NoPlatformConfigDir)
}

/// Loads the config at `path`, returning defaults when the file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<ReceiverConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ReceiverConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Writes `config` to `path`, creating the parent directory if needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(path: &Path, config: &ReceiverConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("OCam"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("ocam"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("OCam")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("ocam-config-{name}-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_default_config_uses_device_ports() {
        let cfg = ReceiverConfig::default();
        assert_eq!(cfg.network.video_port, 27183);
        assert_eq!(cfg.network.control_port, 27184);
        assert_eq!(cfg.network.audio_port, 27185);
        assert_eq!(cfg.network.poll_interval_ms, 100);
    }

    #[test]
    fn test_default_camera_section_matches_camera_defaults() {
        let settings = CameraConfig::default().to_settings().unwrap();
        assert_eq!(settings, CameraSettings::default());
    }

    #[test]
    fn test_partial_toml_fills_missing_fields() {
        // Arrange
        let text = "[network]\ncontrol_port = 9000\n\n[camera]\nfps = 60\n";

        // Act
        let cfg: ReceiverConfig = toml::from_str(text).unwrap();

        // Assert
        assert_eq!(cfg.network.control_port, 9000);
        assert_eq!(cfg.network.video_port, 27183);
        assert_eq!(cfg.camera.fps, 60);
        assert_eq!(cfg.camera.resolution, "1280x720");
        assert_eq!(cfg.receiver.log_level, "info");
    }

    #[test]
    fn test_empty_toml_is_default() {
        let cfg: ReceiverConfig = toml::from_str("").unwrap();
        assert_eq!(cfg, ReceiverConfig::default());
    }

    #[test]
    fn test_camera_section_rejects_bad_focus() {
        let camera = CameraConfig {
            focus: 5000,
            ..CameraConfig::default()
        };
        assert!(matches!(camera.to_settings(), Err(ConfigError::InvalidFocus(_))));
    }

    #[test]
    fn test_camera_section_rejects_bad_resolution() {
        let camera = CameraConfig {
            resolution: "wide".to_string(),
            ..CameraConfig::default()
        };
        assert!(matches!(
            camera.to_settings(),
            Err(ConfigError::InvalidResolution(_))
        ));
    }

    #[test]
    fn test_source_options_combine_address_and_ports() {
        // Arrange
        let mut cfg = ReceiverConfig::default();
        cfg.network.bind_address = "127.0.0.1".to_string();
        cfg.network.poll_interval_ms = 20;

        // Act
        let opts = cfg.source_options().unwrap();

        // Assert
        assert_eq!(opts.control_addr, "127.0.0.1:27184".parse().unwrap());
        assert_eq!(opts.transport.poll_interval, Duration::from_millis(20));
    }

    #[test]
    fn test_source_options_reject_hostname() {
        let mut cfg = ReceiverConfig::default();
        cfg.network.bind_address = "localhost".to_string();
        assert!(matches!(
            cfg.source_options(),
            Err(ConfigError::InvalidBindAddress(_))
        ));
    }

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let dir = scratch_dir("missing");
        let cfg = load_config(&dir.join("nope.toml")).unwrap();
        assert_eq!(cfg, ReceiverConfig::default());
    }

    #[test]
    fn test_save_then_load_round_trips() {
        // Arrange
        let path = scratch_dir("roundtrip").join("nested").join("receiver.toml");
        let mut cfg = ReceiverConfig::default();
        cfg.camera.flash = true;
        cfg.network.max_packet_bytes = 1024;

        // Act
        save_config(&path, &cfg).unwrap();
        let restored = load_config(&path).unwrap();

        // Assert
        assert_eq!(restored, cfg);
    }

    #[test]
    fn test_load_reports_malformed_toml() {
        let path = scratch_dir("bad").join("receiver.toml");
        std::fs::write(&path, "[network\nvideo_port = ").unwrap();
        assert!(matches!(load_config(&path), Err(ConfigError::Parse(_))));
    }
}
