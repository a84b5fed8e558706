//! Session runner - the event loop around a [`Session`]
//!
//! Owns the session, the capture source and the control channel handle.
//! Every input (user commands, captured chunks, channel events, timers)
//! is turned into a session [`Event`] on this one task, and the resulting
//! [`Effect`]s are carried out here. Nothing else mutates the session.

use crate::capture::{self, CaptureConstraints, CaptureSource, DeviceInfo};
use crate::channel::{self, ChannelEvent, ChannelHandle, ReconnectPolicy};
use crate::config::{Config, NotificationConfig};
use crate::error::{CaptureError, Result};
use crate::notification;
use crate::playback::PlaybackView;
use crate::session::{Effect, Event, Session};
use crate::state::SessionState;
use crate::status::{self, SessionSnapshot};
use bytes::Bytes;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior, Sleep};
use url::Url;

/// User actions delivered to a running session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    Record,
    Save,
    /// Abandon the session wherever it is
    Shutdown,
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Upload confirmed or assumed; the artifact lives at this URL
    Saved(Url),
    /// Stopped by [`SessionCommand::Shutdown`] in the given state
    Interrupted(SessionState),
}

/// Source handed back by a finished acquisition, with its result
type Acquired = (Box<dyn CaptureSource>, std::result::Result<DeviceInfo, CaptureError>);
type Acquisition = Pin<Box<dyn Future<Output = Acquired> + Send>>;

/// Drives one session to completion
pub struct SessionRunner {
    session: Session,
    /// `None` while the device is being acquired
    capture: Option<Box<dyn CaptureSource>>,
    constraints: CaptureConstraints,
    channel: ChannelHandle,
    channel_rx: Option<mpsc::UnboundedReceiver<ChannelEvent>>,
    playback: PlaybackView,
    notifications: NotificationConfig,
    state_file: Option<PathBuf>,
    flush_interval: Duration,
    elapsed_tick: Duration,
    snapshot_tx: watch::Sender<SessionSnapshot>,

    capture_rx: Option<mpsc::Receiver<Bytes>>,
    elapsed_timer: Option<Interval>,
    flush_timer: Option<Interval>,
    fallback: Option<Pin<Box<Sleep>>>,
}

impl SessionRunner {
    /// Assemble a runner from parts. Intervals and notifications start at
    /// their configured defaults.
    pub fn new(
        session: Session,
        capture: Box<dyn CaptureSource>,
        constraints: CaptureConstraints,
        channel: ChannelHandle,
        channel_rx: mpsc::UnboundedReceiver<ChannelEvent>,
    ) -> Self {
        let defaults = Config::default();
        let playback = PlaybackView::default();
        let (snapshot_tx, _) = watch::channel(SessionSnapshot::capture(&session, &playback));
        Self {
            session,
            capture: Some(capture),
            constraints,
            channel,
            channel_rx: Some(channel_rx),
            playback,
            notifications: defaults.notification,
            state_file: None,
            flush_interval: defaults.session.flush_interval(),
            elapsed_tick: defaults.session.elapsed_tick(),
            snapshot_tx,
            capture_rx: None,
            elapsed_timer: None,
            flush_timer: None,
            fallback: None,
        }
    }

    /// Build the session, capture source and control channel from config.
    /// Must be called inside a tokio runtime.
    pub fn from_config(config: &Config, session_id: String) -> Result<Self> {
        let session = Session::from_config(session_id.clone(), config)?;
        let capture = capture::create_capture(&config.capture);
        let (channel, channel_rx) = channel::spawn(
            &config.server.socket_url,
            session_id,
            ReconnectPolicy::from_config(&config.channel),
        )?;

        Ok(Self::new(
            session,
            capture,
            CaptureConstraints::from(&config.capture),
            channel,
            channel_rx,
        )
        .with_intervals(
            config.session.flush_interval(),
            config.session.elapsed_tick(),
        )
        .with_notifications(config.notification.clone())
        .with_state_file(config.resolve_state_file()))
    }

    pub fn with_intervals(mut self, flush_interval: Duration, elapsed_tick: Duration) -> Self {
        self.flush_interval = flush_interval;
        self.elapsed_tick = elapsed_tick;
        self
    }

    pub fn with_notifications(mut self, notifications: NotificationConfig) -> Self {
        self.notifications = notifications;
        self
    }

    pub fn with_state_file(mut self, state_file: Option<PathBuf>) -> Self {
        self.state_file = state_file;
        self
    }

    /// Watch the session's snapshot as it changes
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Process events until the session is saved or a shutdown is
    /// requested. A closed command channel counts as shutdown.
    ///
    /// The device is acquired inside the loop, so commands and channel
    /// events are handled while it is pending. `Record` is rejected until
    /// the device is ready.
    pub async fn run(mut self, mut commands: mpsc::Receiver<SessionCommand>) -> RunOutcome {
        tracing::info!("Starting session {}", self.session.id());
        if let Some(ref path) = self.state_file {
            tracing::info!("State file: {:?}", path);
        }
        self.publish();

        let mut acquiring = self
            .capture
            .take()
            .map(|capture| acquire(capture, self.constraints.clone()));

        loop {
            tokio::select! {
                (capture, result) = settle(&mut acquiring) => {
                    acquiring = None;
                    self.capture = Some(capture);
                    let event = match result {
                        Ok(info) => {
                            tracing::info!("Capture device ready: {} ({})", info.name, info.mime_type);
                            Event::DeviceAcquired
                        }
                        Err(e) => {
                            tracing::error!("Capture device unavailable: {}", e);
                            Event::DeviceFailed(e)
                        }
                    };
                    self.dispatch(event).await;
                }

                cmd = commands.recv() => {
                    let event = match cmd {
                        Some(SessionCommand::Record) => Event::Record,
                        Some(SessionCommand::Save) => Event::Save,
                        Some(SessionCommand::Shutdown) | None => {
                            return self.shutdown().await;
                        }
                    };
                    self.dispatch(event).await;
                }

                chunk = recv_bounded(&mut self.capture_rx) => {
                    match chunk {
                        Some(data) => self.dispatch(Event::ChunkCaptured(data)).await,
                        None => {
                            self.capture_rx = None;
                            self.dispatch(Event::CaptureFinished).await;
                        }
                    }
                }

                event = recv_unbounded(&mut self.channel_rx) => {
                    match event {
                        Some(ChannelEvent::Connection(state)) => {
                            self.dispatch(Event::ConnectionChanged(state)).await;
                        }
                        Some(ChannelEvent::Message(text)) => {
                            self.dispatch(Event::ServerMessage(text)).await;
                        }
                        None => {
                            tracing::warn!("Control channel task ended");
                            self.channel_rx = None;
                            self.dispatch(Event::ConnectionChanged(
                                crate::state::ConnectionState::Disconnected,
                            ))
                            .await;
                        }
                    }
                }

                _ = tick(&mut self.elapsed_timer) => {
                    self.dispatch(Event::ElapsedTick).await;
                }

                _ = tick(&mut self.flush_timer) => {
                    self.dispatch(Event::FlushTick).await;
                }

                _ = fire(&mut self.fallback) => {
                    self.fallback = None;
                    self.dispatch(Event::FallbackFired).await;
                }
            }

            if self.session.state().is_saved() {
                return self.finish();
            }
        }
    }

    /// Apply an event and carry out its effects
    async fn dispatch(&mut self, event: Event) {
        for effect in self.session.handle(event) {
            self.apply(effect).await;
        }
        self.publish();
    }

    async fn apply(&mut self, effect: Effect) {
        match effect {
            Effect::StartCapture { interval } => {
                let Some(capture) = self.capture.as_mut() else {
                    tracing::error!("Capture start requested before the device was acquired");
                    return;
                };
                match capture.start(interval).await {
                    Ok(rx) => {
                        tracing::debug!("Capture started ({}ms interval)", interval.as_millis());
                        self.capture_rx = Some(rx);
                    }
                    Err(e) => tracing::error!("Failed to start capture: {}", e),
                }
            }
            Effect::StopCapture => {
                if let Some(capture) = self.capture.as_mut() {
                    if let Err(e) = capture.stop().await {
                        tracing::warn!("Failed to stop capture: {}", e);
                    }
                }
            }
            Effect::StartElapsedTimer => {
                self.elapsed_timer = Some(timer(self.elapsed_tick, false));
            }
            Effect::StopElapsedTimer => self.elapsed_timer = None,
            Effect::StartFlushLoop => {
                self.flush_timer = Some(timer(self.flush_interval, true));
            }
            Effect::StopFlushLoop => self.flush_timer = None,
            Effect::ArmFallback(delay) => {
                tracing::debug!("Completion fallback armed ({:.1}s)", delay.as_secs_f64());
                self.fallback = Some(Box::pin(tokio::time::sleep(delay)));
            }
            Effect::SendChunk(chunk) => self.channel.send_chunk(chunk),
            Effect::ShowPlayback(url) => {
                self.playback.show_remote(&url);
                if self.notifications.on_saved {
                    let (title, body) = notification::saved(&url);
                    tokio::spawn(async move { notification::send(&title, &body).await });
                }
            }
            Effect::NotifyDeviceFailure(err) => {
                if self.notifications.on_device_error {
                    let (title, body) = notification::device_failure(&err);
                    tokio::spawn(async move { notification::send(&title, &body).await });
                }
            }
        }
    }

    fn publish(&self) {
        let snapshot = SessionSnapshot::capture(&self.session, &self.playback);
        let changed = self.snapshot_tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot.clone();
                true
            }
        });
        if changed {
            if let Some(ref path) = self.state_file {
                status::write_state_file(path, &snapshot);
            }
        }
    }

    fn finish(self) -> RunOutcome {
        tracing::info!(
            "Session {} saved: {} chunk(s), {} bytes sent",
            self.session.id(),
            self.session.chunks_sent(),
            self.session.bytes_sent()
        );
        self.channel.shutdown();
        RunOutcome::Saved(self.session.playback_url().clone())
    }

    async fn shutdown(mut self) -> RunOutcome {
        let state = self.session.state();
        tracing::info!("Session {} interrupted while {}", self.session.id(), state);
        if self.capture_rx.is_some() {
            if let Some(capture) = self.capture.as_mut() {
                if let Err(e) = capture.stop().await {
                    tracing::debug!("Capture stop on shutdown: {}", e);
                }
            }
        }
        self.channel.shutdown();
        if let Some(ref path) = self.state_file {
            status::cleanup_state_file(path);
        }
        RunOutcome::Interrupted(state)
    }
}

fn acquire(mut capture: Box<dyn CaptureSource>, constraints: CaptureConstraints) -> Acquisition {
    Box::pin(async move {
        let result = capture.acquire(&constraints).await;
        (capture, result)
    })
}

async fn settle(acquiring: &mut Option<Acquisition>) -> Acquired {
    match acquiring {
        Some(acquisition) => acquisition.as_mut().await,
        None => std::future::pending().await,
    }
}

/// Periodic timer whose first tick is one period out, or immediate
fn timer(period: Duration, immediate: bool) -> Interval {
    let start = if immediate {
        Instant::now()
    } else {
        Instant::now() + period
    };
    let mut interval = tokio::time::interval_at(start, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn recv_bounded<T>(rx: &mut Option<mpsc::Receiver<T>>) -> Option<T> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn recv_unbounded<T>(rx: &mut Option<mpsc::UnboundedReceiver<T>>) -> Option<T> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn fire(sleep: &mut Option<Pin<Box<Sleep>>>) {
    match sleep {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}
