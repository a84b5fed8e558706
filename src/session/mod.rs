//! Recording session state machine
//!
//! Every input to a session (device callbacks, user actions, timer ticks,
//! channel events) arrives as an [`Event`]. [`Session::handle`] applies it
//! and returns the [`Effect`]s the caller must carry out. No I/O happens
//! here, which keeps the machine testable without a socket or a device.
//!
//! ```text
//!   Idle ──Record (device ready)──▶ Recording ──Save──▶ Saving ──completion──▶ Saved
//!                                                          │  ▲
//!                                                          └──┘ fallback re-armed
//! ```

pub mod chunk;

pub use chunk::{Chunk, ChunkQueue};

use crate::config::Config;
use crate::error::{CaptureError, RecstreamError};
use crate::playback;
use crate::state::{ConnectionState, SessionState};
use bytes::Bytes;
use std::time::Duration;
use url::Url;

/// Inputs to the state machine
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Capture device acquired successfully
    DeviceAcquired,
    /// Capture device could not be acquired
    DeviceFailed(CaptureError),
    /// User asked to start recording
    Record,
    /// User asked to stop and save
    Save,
    /// Elapsed-time timer fired
    ElapsedTick,
    /// Flush loop timer fired
    FlushTick,
    /// Capture device emitted data
    ChunkCaptured(Bytes),
    /// Capture device delivered its last chunk
    CaptureFinished,
    /// Control channel changed state
    ConnectionChanged(ConnectionState),
    /// Text message from the server
    ServerMessage(String),
    /// Completion fallback timer fired
    FallbackFired,
}

/// Side effects requested by the state machine
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Begin emitting chunks every `interval`
    StartCapture { interval: Duration },
    /// Stop the device; it flushes one final chunk
    StopCapture,
    StartElapsedTimer,
    StopElapsedTimer,
    StartFlushLoop,
    StopFlushLoop,
    /// Fire [`Event::FallbackFired`] after the delay
    ArmFallback(Duration),
    /// Hand a chunk to the control channel (fire-and-forget)
    SendChunk(Chunk),
    /// Point the display at the stored artifact
    ShowPlayback(Url),
    /// Tell the user the device cannot be used
    NotifyDeviceFailure(CaptureError),
}

/// Timing parameters of a session
#[derive(Debug, Clone)]
pub struct SessionTiming {
    pub capture_interval: Duration,
    pub fallback_timeout: Duration,
    pub fallback_retry: Duration,
}

impl Default for SessionTiming {
    fn default() -> Self {
        Self {
            capture_interval: Duration::from_millis(1000),
            fallback_timeout: Duration::from_secs(5),
            fallback_retry: Duration::from_secs(1),
        }
    }
}

/// One recording-to-playback lifecycle
#[derive(Debug)]
pub struct Session {
    id: String,
    state: SessionState,
    elapsed_seconds: u64,
    pending: ChunkQueue,
    connection: ConnectionState,
    device_ready: bool,
    device_error: Option<CaptureError>,
    /// Set once the device has flushed its last chunk; later output is dropped
    intake_closed: bool,
    chunks_sent: u64,
    bytes_sent: u64,
    playback_url: Url,
    timing: SessionTiming,
}

impl Session {
    /// Create a session in Idle. `id` is fixed for the session's lifetime.
    pub fn new(id: String, playback_url: Url, timing: SessionTiming) -> Self {
        tracing::debug!("Session {} created", id);
        Self {
            id,
            state: SessionState::Idle,
            elapsed_seconds: 0,
            pending: ChunkQueue::new(),
            connection: ConnectionState::Disconnected,
            device_ready: false,
            device_error: None,
            intake_closed: false,
            chunks_sent: 0,
            bytes_sent: 0,
            playback_url,
            timing,
        }
    }

    /// Create a session whose artifact lives under `config.server.base_url`
    pub fn from_config(id: String, config: &Config) -> Result<Self, RecstreamError> {
        let playback_url = playback::artifact_url(&config.server.base_url, &id).map_err(|e| {
            RecstreamError::Config(format!(
                "Invalid server.base_url '{}': {}",
                config.server.base_url, e
            ))
        })?;
        let timing = SessionTiming {
            capture_interval: config.capture.interval(),
            fallback_timeout: config.session.fallback_timeout(),
            fallback_retry: config.session.fallback_retry(),
        };
        Ok(Self::new(id, playback_url, timing))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.elapsed_seconds
    }

    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    pub fn device_ready(&self) -> bool {
        self.device_ready
    }

    pub fn device_error(&self) -> Option<&CaptureError> {
        self.device_error.as_ref()
    }

    pub fn pending_chunks(&self) -> usize {
        self.pending.len()
    }

    pub fn pending_bytes(&self) -> usize {
        self.pending.queued_bytes()
    }

    pub fn chunks_sent(&self) -> u64 {
        self.chunks_sent
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    pub fn playback_url(&self) -> &Url {
        &self.playback_url
    }

    /// Text the server sends once the upload for this session is stored
    pub fn completion_notice(&self) -> String {
        playback::artifact_name(&self.id)
    }

    /// Whether `Record` would currently be accepted
    pub fn can_record(&self) -> bool {
        self.state.is_idle() && self.device_ready
    }

    /// Apply one event and return the effects to perform
    pub fn handle(&mut self, event: Event) -> Vec<Effect> {
        match event {
            Event::DeviceAcquired => self.on_device_acquired(),
            Event::DeviceFailed(err) => self.on_device_failed(err),
            Event::Record => self.on_record(),
            Event::Save => self.on_save(),
            Event::ElapsedTick => {
                if self.state.is_recording() {
                    self.elapsed_seconds += 1;
                    tracing::trace!("Elapsed: {}s", self.elapsed_seconds);
                }
                vec![]
            }
            Event::FlushTick => self.on_flush_tick(),
            Event::ChunkCaptured(data) => {
                self.on_chunk(data);
                vec![]
            }
            Event::CaptureFinished => {
                if !self.intake_closed {
                    tracing::debug!("Capture finished, {} chunk(s) still queued", self.pending.len());
                }
                self.intake_closed = true;
                vec![]
            }
            Event::ConnectionChanged(connection) => {
                if self.connection != connection {
                    tracing::debug!("Connection: {} -> {}", self.connection, connection);
                }
                self.connection = connection;
                vec![]
            }
            Event::ServerMessage(text) => self.on_server_message(&text),
            Event::FallbackFired => self.on_fallback(),
        }
    }

    fn on_device_acquired(&mut self) -> Vec<Effect> {
        if self.device_error.is_some() {
            tracing::warn!("Ignoring device acquisition after a fatal device error");
            return vec![];
        }
        if self.state.is_idle() {
            self.device_ready = true;
        }
        vec![]
    }

    fn on_device_failed(&mut self, err: CaptureError) -> Vec<Effect> {
        if !self.state.is_idle() {
            tracing::warn!("Device error outside Idle ignored: {}", err);
            return vec![];
        }
        self.device_ready = false;
        self.device_error = Some(err.clone());
        vec![Effect::NotifyDeviceFailure(err)]
    }

    fn on_record(&mut self) -> Vec<Effect> {
        if !self.state.is_idle() {
            tracing::debug!("Record ignored in state {}", self.state);
            return vec![];
        }
        if !self.device_ready {
            tracing::warn!("Record rejected: capture device not ready");
            return vec![];
        }

        self.state = SessionState::Recording;
        tracing::info!("Session {} recording", self.id);
        vec![
            Effect::StartElapsedTimer,
            Effect::StartFlushLoop,
            Effect::StartCapture {
                interval: self.timing.capture_interval,
            },
        ]
    }

    fn on_save(&mut self) -> Vec<Effect> {
        if !self.state.is_recording() {
            tracing::debug!("Save ignored in state {}", self.state);
            return vec![];
        }

        self.state = SessionState::Saving;
        tracing::info!(
            "Session {} saving after {}s ({} chunk(s) queued)",
            self.id,
            self.elapsed_seconds,
            self.pending.len()
        );
        vec![
            Effect::StopElapsedTimer,
            Effect::StopCapture,
            Effect::ArmFallback(self.timing.fallback_timeout),
        ]
    }

    fn on_flush_tick(&mut self) -> Vec<Effect> {
        if !self.state.is_flushing() || !self.connection.is_connected() {
            return vec![];
        }
        match self.pending.pop() {
            Some(chunk) => {
                self.chunks_sent += 1;
                self.bytes_sent += chunk.len() as u64;
                tracing::debug!("Sending chunk #{} ({} bytes)", chunk.seq, chunk.len());
                vec![Effect::SendChunk(chunk)]
            }
            None => vec![],
        }
    }

    fn on_chunk(&mut self, data: Bytes) {
        if data.is_empty() {
            return;
        }
        let accepting = match self.state {
            SessionState::Recording => true,
            SessionState::Saving => !self.intake_closed,
            SessionState::Idle | SessionState::Saved => false,
        };
        if !accepting {
            tracing::debug!("Dropping {} byte chunk in state {}", data.len(), self.state);
            return;
        }
        let len = data.len();
        let seq = self.pending.push(data);
        tracing::trace!("Queued chunk #{} ({} bytes)", seq, len);
    }

    fn on_server_message(&mut self, text: &str) -> Vec<Effect> {
        if text != self.completion_notice() {
            tracing::trace!("Ignoring server message: {:?}", text);
            return vec![];
        }
        if !self.state.is_saving() {
            tracing::debug!("Completion notice ignored in state {}", self.state);
            return vec![];
        }
        tracing::info!("Server confirmed upload of {}", text);
        self.complete()
    }

    fn on_fallback(&mut self) -> Vec<Effect> {
        if !self.state.is_saving() {
            return vec![];
        }
        if self.pending.is_empty() && self.connection.is_connected() {
            tracing::info!("No completion notice received, assuming upload finished");
            return self.complete();
        }
        tracing::debug!(
            "Fallback not satisfied ({} chunk(s) queued, {}), re-arming",
            self.pending.len(),
            self.connection
        );
        vec![Effect::ArmFallback(self.timing.fallback_retry)]
    }

    fn complete(&mut self) -> Vec<Effect> {
        self.state = SessionState::Saved;
        vec![
            Effect::StopFlushLoop,
            Effect::ShowPlayback(self.playback_url.clone()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        let url = playback::artifact_url("https://example.com", "abc").unwrap();
        Session::new("abc".to_string(), url, SessionTiming::default())
    }

    fn recording() -> Session {
        let mut s = session();
        s.handle(Event::DeviceAcquired);
        s.handle(Event::ConnectionChanged(ConnectionState::Connected));
        s.handle(Event::Record);
        s
    }

    fn chunk(bytes: &'static [u8]) -> Event {
        Event::ChunkCaptured(Bytes::from_static(bytes))
    }

    fn sent(effects: &[Effect]) -> Vec<u64> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::SendChunk(c) => Some(c.seq),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_new_session_is_idle() {
        let s = session();
        assert_eq!(s.state(), SessionState::Idle);
        assert_eq!(s.id(), "abc");
        assert!(!s.device_ready());
        assert!(!s.can_record());
        assert_eq!(s.connection(), ConnectionState::Disconnected);
        assert_eq!(s.completion_notice(), "abc.webm");
    }

    #[test]
    fn test_record_without_device_is_rejected() {
        let mut s = session();
        let effects = s.handle(Event::Record);
        assert!(effects.is_empty());
        assert_eq!(s.state(), SessionState::Idle);
    }

    #[test]
    fn test_record_starts_timers_and_capture() {
        let mut s = session();
        s.handle(Event::DeviceAcquired);
        assert!(s.can_record());

        let effects = s.handle(Event::Record);
        assert_eq!(s.state(), SessionState::Recording);
        assert_eq!(
            effects,
            vec![
                Effect::StartElapsedTimer,
                Effect::StartFlushLoop,
                Effect::StartCapture {
                    interval: Duration::from_millis(1000)
                },
            ]
        );
    }

    #[test]
    fn test_record_does_not_require_connection() {
        let mut s = session();
        s.handle(Event::DeviceAcquired);
        s.handle(Event::Record);
        assert_eq!(s.state(), SessionState::Recording);
    }

    #[test]
    fn test_device_failure_is_permanent() {
        let mut s = session();
        let err = CaptureError::NotSupported("video/x-test".into());
        let effects = s.handle(Event::DeviceFailed(err.clone()));
        assert_eq!(effects, vec![Effect::NotifyDeviceFailure(err.clone())]);
        assert_eq!(s.device_error(), Some(&err));

        s.handle(Event::DeviceAcquired);
        assert!(!s.device_ready());
        assert!(s.handle(Event::Record).is_empty());
        assert_eq!(s.state(), SessionState::Idle);
    }

    #[test]
    fn test_elapsed_only_advances_while_recording() {
        let mut s = session();
        s.handle(Event::ElapsedTick);
        assert_eq!(s.elapsed_seconds(), 0);

        s.handle(Event::DeviceAcquired);
        s.handle(Event::Record);
        s.handle(Event::ElapsedTick);
        s.handle(Event::ElapsedTick);
        s.handle(Event::ElapsedTick);
        assert_eq!(s.elapsed_seconds(), 3);

        s.handle(Event::Save);
        s.handle(Event::ElapsedTick);
        assert_eq!(s.elapsed_seconds(), 3);
    }

    #[test]
    fn test_save_only_from_recording() {
        let mut s = session();
        assert!(s.handle(Event::Save).is_empty());
        assert_eq!(s.state(), SessionState::Idle);

        let mut s = recording();
        let effects = s.handle(Event::Save);
        assert_eq!(s.state(), SessionState::Saving);
        assert_eq!(
            effects,
            vec![
                Effect::StopElapsedTimer,
                Effect::StopCapture,
                Effect::ArmFallback(Duration::from_secs(5)),
            ]
        );

        // A second Save is a no-op
        assert!(s.handle(Event::Save).is_empty());
        assert_eq!(s.state(), SessionState::Saving);
    }

    #[test]
    fn test_flush_sends_one_chunk_per_tick_in_order() {
        let mut s = recording();
        s.handle(chunk(b"one"));
        s.handle(chunk(b"two"));
        s.handle(chunk(b"three"));

        let mut order = Vec::new();
        for _ in 0..5 {
            order.extend(sent(&s.handle(Event::FlushTick)));
        }
        assert_eq!(order, vec![0, 1, 2]);
        assert_eq!(s.chunks_sent(), 3);
        assert_eq!(s.bytes_sent(), 11);
        assert_eq!(s.pending_chunks(), 0);
    }

    #[test]
    fn test_flush_waits_for_connection() {
        let mut s = recording();
        s.handle(Event::ConnectionChanged(ConnectionState::Disconnected));
        s.handle(chunk(b"a"));
        s.handle(chunk(b"b"));

        assert!(s.handle(Event::FlushTick).is_empty());
        assert_eq!(s.state(), SessionState::Recording);
        assert_eq!(s.pending_chunks(), 2);

        s.handle(Event::ConnectionChanged(ConnectionState::Connecting));
        assert!(s.handle(Event::FlushTick).is_empty());

        s.handle(Event::ConnectionChanged(ConnectionState::Connected));
        assert_eq!(sent(&s.handle(Event::FlushTick)), vec![0]);
        assert_eq!(sent(&s.handle(Event::FlushTick)), vec![1]);
    }

    #[test]
    fn test_empty_chunks_are_not_queued() {
        let mut s = recording();
        s.handle(Event::ChunkCaptured(Bytes::new()));
        assert_eq!(s.pending_chunks(), 0);
    }

    #[test]
    fn test_chunks_outside_capture_are_dropped() {
        let mut s = session();
        s.handle(chunk(b"early"));
        assert_eq!(s.pending_chunks(), 0);
    }

    #[test]
    fn test_final_chunk_accepted_until_capture_finished() {
        let mut s = recording();
        s.handle(Event::Save);
        s.handle(chunk(b"final"));
        assert_eq!(s.pending_chunks(), 1);

        s.handle(Event::CaptureFinished);
        s.handle(chunk(b"late"));
        assert_eq!(s.pending_chunks(), 1);

        // Queued chunks keep draining while saving
        assert_eq!(sent(&s.handle(Event::FlushTick)), vec![0]);
    }

    #[test]
    fn test_completion_notice_saves() {
        let mut s = recording();
        s.handle(Event::Save);

        assert!(s.handle(Event::ServerMessage("someone joined.".into())).is_empty());
        assert!(s.handle(Event::ServerMessage("other.webm".into())).is_empty());
        assert_eq!(s.state(), SessionState::Saving);

        let effects = s.handle(Event::ServerMessage("abc.webm".into()));
        assert_eq!(s.state(), SessionState::Saved);
        assert_eq!(
            effects,
            vec![
                Effect::StopFlushLoop,
                Effect::ShowPlayback(
                    Url::parse("https://example.com/static/uploads/abc.webm").unwrap()
                ),
            ]
        );
    }

    #[test]
    fn test_completion_notice_ignored_before_save() {
        let mut s = recording();
        assert!(s.handle(Event::ServerMessage("abc.webm".into())).is_empty());
        assert_eq!(s.state(), SessionState::Recording);
    }

    #[test]
    fn test_fallback_saves_when_drained_and_connected() {
        let mut s = recording();
        s.handle(Event::Save);
        let effects = s.handle(Event::FallbackFired);
        assert_eq!(s.state(), SessionState::Saved);
        assert!(matches!(effects.last(), Some(Effect::ShowPlayback(_))));
    }

    #[test]
    fn test_fallback_rearms_while_chunks_pending() {
        let mut s = recording();
        s.handle(chunk(b"pending"));
        s.handle(Event::Save);

        let effects = s.handle(Event::FallbackFired);
        assert_eq!(effects, vec![Effect::ArmFallback(Duration::from_secs(1))]);
        assert_eq!(s.state(), SessionState::Saving);

        s.handle(Event::FlushTick);
        s.handle(Event::FallbackFired);
        assert_eq!(s.state(), SessionState::Saved);
    }

    #[test]
    fn test_fallback_rearms_while_disconnected() {
        let mut s = recording();
        s.handle(Event::Save);
        s.handle(Event::ConnectionChanged(ConnectionState::Disconnected));

        for _ in 0..10 {
            assert_eq!(
                s.handle(Event::FallbackFired),
                vec![Effect::ArmFallback(Duration::from_secs(1))]
            );
        }
        s.handle(Event::ConnectionChanged(ConnectionState::Connected));
        s.handle(Event::FallbackFired);
        assert_eq!(s.state(), SessionState::Saved);
    }

    #[test]
    fn test_saved_is_terminal() {
        let mut s = recording();
        s.handle(Event::Save);
        s.handle(Event::ServerMessage("abc.webm".into()));
        assert_eq!(s.state(), SessionState::Saved);

        s.handle(chunk(b"after"));
        assert_eq!(s.pending_chunks(), 0);
        for event in [
            Event::Record,
            Event::Save,
            Event::ElapsedTick,
            Event::FlushTick,
            Event::FallbackFired,
            Event::ServerMessage("abc.webm".into()),
        ] {
            assert!(s.handle(event).is_empty());
        }
        assert_eq!(s.state(), SessionState::Saved);
    }

    #[test]
    fn test_no_sends_after_saved_even_with_queue() {
        let mut s = recording();
        s.handle(chunk(b"x"));
        s.handle(Event::Save);
        // Server confirms before the local queue drained
        s.handle(Event::ServerMessage("abc.webm".into()));
        assert_eq!(s.pending_chunks(), 1);
        assert!(s.handle(Event::FlushTick).is_empty());
        assert_eq!(s.chunks_sent(), 0);
    }

    #[test]
    fn test_disconnect_does_not_change_state() {
        let mut s = recording();
        s.handle(Event::ConnectionChanged(ConnectionState::Disconnected));
        assert_eq!(s.state(), SessionState::Recording);
        s.handle(chunk(b"a"));
        s.handle(chunk(b"b"));
        s.handle(Event::FlushTick);
        assert_eq!(s.pending_chunks(), 2);
    }

    #[test]
    fn test_from_config_builds_playback_url() {
        let mut config = Config::default();
        config.server.base_url = "https://media.example.com:3000".to_string();
        config.session.fallback_timeout_secs = 7;
        let mut s = Session::from_config("id1".to_string(), &config).unwrap();
        assert_eq!(
            s.playback_url().as_str(),
            "https://media.example.com:3000/static/uploads/id1.webm"
        );

        s.handle(Event::DeviceAcquired);
        s.handle(Event::Record);
        let effects = s.handle(Event::Save);
        assert!(effects.contains(&Effect::ArmFallback(Duration::from_secs(7))));
    }

    #[test]
    fn test_from_config_rejects_bad_base_url() {
        let mut config = Config::default();
        config.server.base_url = "no scheme".to_string();
        assert!(Session::from_config("id".to_string(), &config).is_err());
    }
}
