//! Session status for external integrations (status bars, scripts)
//!
//! The runner publishes a [`SessionSnapshot`] after every event and
//! mirrors it as JSON into the state file, which `recstream status` reads.

use crate::playback::PlaybackView;
use crate::session::Session;
use crate::state::{format_elapsed, ConnectionState, SessionState};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Point-in-time view of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub id: String,
    pub state: SessionState,
    pub connection: ConnectionState,
    pub device_ready: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_error: Option<String>,
    pub elapsed_seconds: u64,
    /// `HH:MM:SS`
    pub elapsed: String,
    pub pending_chunks: usize,
    pub pending_bytes: usize,
    pub chunks_sent: u64,
    pub bytes_sent: u64,
    pub playback: PlaybackView,
}

impl SessionSnapshot {
    pub fn capture(session: &Session, playback: &PlaybackView) -> Self {
        Self {
            id: session.id().to_string(),
            state: session.state(),
            connection: session.connection(),
            device_ready: session.device_ready(),
            device_error: session.device_error().map(|e| e.to_string()),
            elapsed_seconds: session.elapsed_seconds(),
            elapsed: format_elapsed(session.elapsed_seconds()),
            pending_chunks: session.pending_chunks(),
            pending_bytes: session.pending_bytes(),
            chunks_sent: session.chunks_sent(),
            bytes_sent: session.bytes_sent(),
            playback: playback.clone(),
        }
    }

    /// `Ok`/`Failed` for the capture device
    pub fn device_label(&self) -> &'static str {
        if self.device_ready {
            "Ok"
        } else {
            "Failed"
        }
    }

    /// Human-readable multi-line status
    pub fn render_text(&self) -> String {
        let mut out = format!(
            "Session:    {}\n\
             Status:     {}\n\
             Connection: {}\n\
             Device:     {}\n\
             Elapsed:    {}\n\
             Chunks:     {} sent, {} queued ({} bytes)",
            self.id,
            self.state.label(),
            self.connection.label(),
            self.device_label(),
            self.elapsed,
            self.chunks_sent,
            self.pending_chunks,
            self.pending_bytes,
        );
        if let Some(ref err) = self.device_error {
            out.push_str(&format!("\nError:      {}", err));
        }
        if let Some(url) = self.playback.remote_url() {
            out.push_str(&format!("\nPlayback:   {}", url));
        }
        out
    }
}

/// Write the snapshot as JSON. Failures are logged, not returned.
pub fn write_state_file(path: &Path, snapshot: &SessionSnapshot) {
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            tracing::warn!("Failed to create state file directory: {}", e);
            return;
        }
    }

    let json = match serde_json::to_string_pretty(snapshot) {
        Ok(json) => json,
        Err(e) => {
            tracing::warn!("Failed to serialize session state: {}", e);
            return;
        }
    };

    if let Err(e) = std::fs::write(path, json) {
        tracing::warn!("Failed to write state file: {}", e);
    } else {
        tracing::trace!("State file updated: {}", snapshot.state);
    }
}

/// Remove the state file on shutdown
pub fn cleanup_state_file(path: &Path) {
    if path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            tracing::warn!("Failed to remove state file: {}", e);
        }
    }
}

/// Read a snapshot written by a running (or finished) session
pub fn read_state_file(path: &Path) -> std::io::Result<SessionSnapshot> {
    let json = std::fs::read_to_string(path)?;
    serde_json::from_str(&json)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback;
    use crate::session::{Event, SessionTiming};
    use bytes::Bytes;

    fn session() -> Session {
        let url = playback::artifact_url("https://example.com", "snap").unwrap();
        Session::new("snap".to_string(), url, SessionTiming::default())
    }

    #[test]
    fn test_snapshot_of_new_session() {
        let snapshot = SessionSnapshot::capture(&session(), &PlaybackView::default());
        assert_eq!(snapshot.state, SessionState::Idle);
        assert_eq!(snapshot.elapsed, "00:00:00");
        assert_eq!(snapshot.device_label(), "Failed");
        assert!(snapshot.render_text().contains("Status:     None"));
        assert!(snapshot.render_text().contains("Connection: Failed"));
    }

    #[test]
    fn test_snapshot_while_recording() {
        let mut s = session();
        s.handle(Event::DeviceAcquired);
        s.handle(Event::Record);
        for _ in 0..61 {
            s.handle(Event::ElapsedTick);
        }
        s.handle(Event::ChunkCaptured(Bytes::from_static(b"abc")));

        let snapshot = SessionSnapshot::capture(&s, &PlaybackView::default());
        assert_eq!(snapshot.elapsed, "00:01:01");
        assert_eq!(snapshot.pending_chunks, 1);
        assert_eq!(snapshot.pending_bytes, 3);
        let text = snapshot.render_text();
        assert!(text.contains("0 sent, 1 queued (3 bytes)"));
        assert!(text.contains("Status:     Recording"));
        assert!(text.contains("Device:     Ok"));
        assert!(!text.contains("Playback"));
    }

    #[test]
    fn test_json_uses_camel_case() {
        let mut view = PlaybackView::default();
        view.show_remote(session().playback_url());
        let snapshot = SessionSnapshot::capture(&session(), &view);
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["deviceReady"], false);
        assert_eq!(json["elapsedSeconds"], 0);
        assert_eq!(json["state"], "idle");
        assert_eq!(json["playback"]["kind"], "remote");
        assert!(json.get("deviceError").is_none());
    }

    #[test]
    fn test_state_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state");
        let snapshot = SessionSnapshot::capture(&session(), &PlaybackView::default());

        write_state_file(&path, &snapshot);
        assert_eq!(read_state_file(&path).unwrap(), snapshot);

        cleanup_state_file(&path);
        assert!(!path.exists());
        assert!(read_state_file(&path).is_err());
    }
}
