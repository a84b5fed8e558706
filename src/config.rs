//! Configuration loading and types for recstream
//!
//! Configuration is loaded in layers:
//! 1. Built-in defaults
//! 2. Config file (~/.config/recstream/config.toml)
//! 3. Environment variables (RECSTREAM_*)
//! 4. CLI arguments (highest priority)

use crate::error::RecstreamError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file content
pub const DEFAULT_CONFIG: &str = r#"# Recstream Configuration
#
# Location: ~/.config/recstream/config.toml
# All settings can be overridden via CLI flags

# State file for external integrations (Waybar, polybar, etc.)
# Use "auto" for default location ($XDG_RUNTIME_DIR/recstream/state),
# a custom path, or "disabled" to turn off. The runner writes a JSON
# snapshot of the session to this file whenever it changes.
# Required for the `recstream status` command.
state_file = "auto"

[server]
# Base URL of the upload server. Saved recordings are played back from
# <base_url>/static/uploads/<session id>.webm
base_url = "https://localhost:3000"

# Websocket endpoint used to announce the session and stream chunks
socket_url = "wss://localhost:3000/websocket"

[capture]
# Media source to record from. A path replays a pre-encoded media file
# as if it were a live device; "test-pattern" emits synthetic chunks.
# source = "/path/to/recording.webm"

# How often the capture device emits a chunk, in milliseconds
interval_ms = 1000

# Container/codec of the captured media
mime_type = "video/webm;codecs=vp8,opus"

# Bitrate targets (bits per second)
audio_bits_per_second = 128000
video_bits_per_second = 2500000

# Capture constraints
video = true
audio = true
echo_cancellation = true

[session]
# Length of the generated session id
id_length = 30

# How often a queued chunk is handed to the channel (ms)
flush_interval_ms = 100

# Wait this long after Save for the server's completion notice before
# treating an empty queue as completion
fallback_timeout_secs = 5

# Re-check interval when the fallback condition is not yet met
fallback_retry_secs = 1

[channel]
# Delay before reconnecting after the socket drops
reconnect_delay_secs = 5

# "fixed" (default) or "exponential" (doubles up to reconnect_max_delay_secs)
reconnect_backoff = "fixed"
reconnect_max_delay_secs = 60

[notification]
# Desktop notification when the capture device cannot be acquired
on_device_error = true

# Desktop notification when the recording is saved on the server
on_saved = false
"#;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub capture: CaptureConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub channel: ChannelConfig,

    #[serde(default)]
    pub notification: NotificationConfig,

    /// Optional path to state file for external integrations (e.g., Waybar)
    /// When set, the runner writes a JSON session snapshot to this file
    /// whenever it changes. Use "auto" for the default location.
    #[serde(default)]
    pub state_file: Option<String>,
}

/// Upload server endpoints
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Base URL for playback of stored recordings
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Websocket URL of the control channel
    #[serde(default = "default_socket_url")]
    pub socket_url: String,
}

/// Capture device configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CaptureConfig {
    /// Path of the media file replayed by the file capture source,
    /// or "test-pattern" for synthetic data
    #[serde(default)]
    pub source: Option<String>,

    /// Chunk emission interval in milliseconds
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Container/codec MIME type
    #[serde(default = "default_mime_type")]
    pub mime_type: String,

    #[serde(default = "default_audio_bps")]
    pub audio_bits_per_second: u32,

    #[serde(default = "default_video_bps")]
    pub video_bits_per_second: u32,

    #[serde(default = "default_true")]
    pub video: bool,

    #[serde(default = "default_true")]
    pub audio: bool,

    #[serde(default = "default_true")]
    pub echo_cancellation: bool,
}

/// Session timing configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    #[serde(default = "default_id_length")]
    pub id_length: usize,

    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    /// Period of the elapsed-time counter. Only tests change this.
    #[serde(default = "default_elapsed_tick_ms")]
    pub elapsed_tick_ms: u64,

    #[serde(default = "default_fallback_timeout_secs")]
    pub fallback_timeout_secs: u64,

    #[serde(default = "default_fallback_retry_secs")]
    pub fallback_retry_secs: u64,
}

/// Reconnect strategy for the control channel
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReconnectBackoff {
    /// Same delay before every attempt (default)
    #[default]
    Fixed,
    /// Delay doubles per failed attempt, capped at `reconnect_max_delay_secs`
    Exponential,
}

/// Control channel configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChannelConfig {
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,

    #[serde(default)]
    pub reconnect_backoff: ReconnectBackoff,

    #[serde(default = "default_reconnect_max_delay_secs")]
    pub reconnect_max_delay_secs: u64,
}

/// Notification configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotificationConfig {
    /// Notify when the capture device cannot be acquired
    #[serde(default = "default_true")]
    pub on_device_error: bool,

    /// Notify when the recording has been saved on the server
    #[serde(default)]
    pub on_saved: bool,
}

fn default_base_url() -> String {
    "https://localhost:3000".to_string()
}

fn default_socket_url() -> String {
    "wss://localhost:3000/websocket".to_string()
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_mime_type() -> String {
    "video/webm;codecs=vp8,opus".to_string()
}

fn default_audio_bps() -> u32 {
    128_000
}

fn default_video_bps() -> u32 {
    2_500_000
}

fn default_id_length() -> usize {
    30
}

fn default_flush_interval_ms() -> u64 {
    100
}

fn default_elapsed_tick_ms() -> u64 {
    1000
}

fn default_fallback_timeout_secs() -> u64 {
    5
}

fn default_fallback_retry_secs() -> u64 {
    1
}

fn default_reconnect_delay_secs() -> u64 {
    5
}

fn default_reconnect_max_delay_secs() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            socket_url: default_socket_url(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            source: None,
            interval_ms: default_interval_ms(),
            mime_type: default_mime_type(),
            audio_bits_per_second: default_audio_bps(),
            video_bits_per_second: default_video_bps(),
            video: true,
            audio: true,
            echo_cancellation: true,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            id_length: default_id_length(),
            flush_interval_ms: default_flush_interval_ms(),
            elapsed_tick_ms: default_elapsed_tick_ms(),
            fallback_timeout_secs: default_fallback_timeout_secs(),
            fallback_retry_secs: default_fallback_retry_secs(),
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_secs: default_reconnect_delay_secs(),
            reconnect_backoff: ReconnectBackoff::default(),
            reconnect_max_delay_secs: default_reconnect_max_delay_secs(),
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            on_device_error: true,
            on_saved: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            capture: CaptureConfig::default(),
            session: SessionConfig::default(),
            channel: ChannelConfig::default(),
            notification: NotificationConfig::default(),
            state_file: Some("auto".to_string()),
        }
    }
}

impl CaptureConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl SessionConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn elapsed_tick(&self) -> Duration {
        Duration::from_millis(self.elapsed_tick_ms)
    }

    pub fn fallback_timeout(&self) -> Duration {
        Duration::from_secs(self.fallback_timeout_secs)
    }

    pub fn fallback_retry(&self) -> Duration {
        Duration::from_secs(self.fallback_retry_secs)
    }
}

impl Config {
    /// Get the default config file path
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "recstream")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Get the runtime directory for ephemeral files (state, pid)
    pub fn runtime_dir() -> PathBuf {
        // Use XDG_RUNTIME_DIR if available, otherwise fall back to /tmp
        std::env::var("XDG_RUNTIME_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
            .join("recstream")
    }

    /// Resolve the state file path from config
    /// Returns None if state_file is not configured or explicitly disabled
    pub fn resolve_state_file(&self) -> Option<PathBuf> {
        self.state_file.as_ref().and_then(|path| {
            match path.to_lowercase().as_str() {
                "disabled" | "none" | "off" | "false" => None,
                "auto" => Some(Self::runtime_dir().join("state")),
                _ => Some(PathBuf::from(path)),
            }
        })
    }

    /// Check values that would make the session loops spin or never fire
    pub fn validate(&self) -> Result<(), RecstreamError> {
        if self.session.id_length == 0 {
            return Err(RecstreamError::Config("session.id_length must be > 0".into()));
        }
        if self.capture.interval_ms == 0 {
            return Err(RecstreamError::Config("capture.interval_ms must be > 0".into()));
        }
        if self.session.flush_interval_ms == 0 || self.session.elapsed_tick_ms == 0 {
            return Err(RecstreamError::Config(
                "session tick intervals must be > 0".into(),
            ));
        }
        if self.session.fallback_retry_secs == 0 {
            return Err(RecstreamError::Config(
                "session.fallback_retry_secs must be > 0".into(),
            ));
        }
        url::Url::parse(&self.server.base_url).map_err(|e| {
            RecstreamError::Config(format!("Invalid server.base_url '{}': {}", self.server.base_url, e))
        })?;
        Ok(())
    }
}

/// Load configuration from file, with defaults for missing values
pub fn load_config(path: Option<&Path>) -> Result<Config, RecstreamError> {
    // Start with defaults
    let mut config = Config::default();

    // Determine config file path
    let config_path = path.map(PathBuf::from).or_else(Config::default_path);

    // Load from file if it exists
    if let Some(ref path) = config_path {
        if path.exists() {
            tracing::debug!("Loading config from {:?}", path);
            let contents = std::fs::read_to_string(path)
                .map_err(|e| RecstreamError::Config(format!("Failed to read config: {}", e)))?;

            config = toml::from_str(&contents)
                .map_err(|e| RecstreamError::Config(format!("Invalid config: {}", e)))?;
        } else {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
        }
    }

    // Override from environment variables
    if let Ok(url) = std::env::var("RECSTREAM_SERVER_URL") {
        config.server.base_url = url;
    }
    if let Ok(url) = std::env::var("RECSTREAM_SOCKET_URL") {
        config.server.socket_url = url;
    }
    if let Ok(source) = std::env::var("RECSTREAM_SOURCE") {
        config.capture.source = Some(source);
    }

    Ok(config)
}

/// Write the commented default config to `path`.
/// An existing file is left alone unless `force` is set; returns whether
/// the file was written.
pub fn write_default_config(path: &Path, force: bool) -> Result<bool, RecstreamError> {
    if path.exists() && !force {
        return Ok(false);
    }

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| RecstreamError::Config(format!("Failed to create config dir: {}", e)))?;
    }

    std::fs::write(path, DEFAULT_CONFIG)
        .map_err(|e| RecstreamError::Config(format!("Failed to write config: {}", e)))?;

    Ok(true)
}
