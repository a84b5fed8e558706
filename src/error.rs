//! Error types for recstream
//!
//! Uses thiserror for ergonomic error definitions with clear messages
//! that guide users toward fixing common issues.

use thiserror::Error;

/// Top-level error type for the recstream application
#[derive(Error, Debug)]
pub enum RecstreamError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while acquiring or driving the capture device.
///
/// Any of these during acquisition is fatal to the session: the device
/// stays unavailable and `Record` is never accepted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("Media type '{0}' is not supported by this capture source")]
    NotSupported(String),

    #[error("Permission denied for capture device: {0}")]
    PermissionDenied(String),

    #[error("Capture device unavailable: {0}\n  Set [capture] source in config.toml or pass --source FILE")]
    DeviceUnavailable(String),

    #[error("Capture device has not been acquired")]
    NotAcquired,

    #[error("Capture stream error: {0}")]
    Stream(String),
}

/// Errors on the control channel.
///
/// These never interrupt a session; the channel task logs them and
/// schedules a reconnect.
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Invalid socket URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Send failed: {0}")]
    Send(String),

    #[error("Connection closed by server")]
    Closed,
}

/// Result type alias using RecstreamError
pub type Result<T> = std::result::Result<T, RecstreamError>;

impl From<tokio_tungstenite::tungstenite::Error> for ChannelError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match e {
            WsError::ConnectionClosed | WsError::AlreadyClosed => ChannelError::Closed,
            other => ChannelError::Connect(other.to_string()),
        }
    }
}

impl From<std::io::Error> for CaptureError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => CaptureError::DeviceUnavailable(e.to_string()),
            std::io::ErrorKind::PermissionDenied => CaptureError::PermissionDenied(e.to_string()),
            _ => CaptureError::Stream(e.to_string()),
        }
    }
}
