//! State enums for a recording session
//!
//! Session lifecycle: Idle → Recording → Saving → Saved
//!
//! The connection state of the control channel is tracked separately;
//! a session can be recording while the channel is down.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a recording session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Waiting for the Record action (device may or may not be ready)
    #[default]
    Idle,
    /// Capture device is emitting chunks
    Recording,
    /// Capture stopped, waiting for the server to confirm the upload
    Saving,
    /// Upload confirmed (or assumed); terminal
    Saved,
}

impl SessionState {
    pub fn is_idle(&self) -> bool {
        matches!(self, SessionState::Idle)
    }

    pub fn is_recording(&self) -> bool {
        matches!(self, SessionState::Recording)
    }

    pub fn is_saving(&self) -> bool {
        matches!(self, SessionState::Saving)
    }

    pub fn is_saved(&self) -> bool {
        matches!(self, SessionState::Saved)
    }

    /// Whether queued chunks are still drained to the channel
    pub fn is_flushing(&self) -> bool {
        matches!(self, SessionState::Recording | SessionState::Saving)
    }

    /// Short status label for status bars
    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Idle => "None",
            SessionState::Recording => "Recording",
            SessionState::Saving => "Saving...",
            SessionState::Saved => "Saved",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Recording => write!(f, "recording"),
            SessionState::Saving => write!(f, "saving"),
            SessionState::Saved => write!(f, "saved"),
        }
    }
}

/// State of the control channel connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    pub fn label(&self) -> &'static str {
        if self.is_connected() {
            "Ok"
        } else {
            "Failed"
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}

/// Format whole seconds as `HH:MM:SS`
pub fn format_elapsed(total_secs: u64) -> String {
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_is_idle() {
        assert!(SessionState::default().is_idle());
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_flushing_states() {
        assert!(!SessionState::Idle.is_flushing());
        assert!(SessionState::Recording.is_flushing());
        assert!(SessionState::Saving.is_flushing());
        assert!(!SessionState::Saved.is_flushing());
    }

    #[test]
    fn test_labels() {
        assert_eq!(SessionState::Idle.label(), "None");
        assert_eq!(SessionState::Saving.label(), "Saving...");
        assert_eq!(ConnectionState::Connected.label(), "Ok");
        assert_eq!(ConnectionState::Connecting.label(), "Failed");
    }

    #[test]
    fn test_state_display() {
        assert_eq!(format!("{}", SessionState::Recording), "recording");
        assert_eq!(format!("{}", ConnectionState::Connected), "connected");
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(0), "00:00:00");
        assert_eq!(format_elapsed(3), "00:00:03");
        assert_eq!(format_elapsed(61), "00:01:01");
        assert_eq!(format_elapsed(3600 + 23 * 60 + 45), "01:23:45");
        assert_eq!(format_elapsed(100 * 3600), "100:00:00");
    }
}
