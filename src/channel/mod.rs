//! Control channel to the upload server
//!
//! A background task owns the websocket. It announces the session id as
//! the first text frame of every connection, forwards chunks as binary
//! frames, reports inbound text frames, and reconnects on any failure.
//!
//! The session side only sees a [`ChannelHandle`] for outbound chunks and
//! a stream of [`ChannelEvent`]s.

pub mod backoff;
mod socket;

pub use backoff::ReconnectPolicy;

use crate::error::ChannelError;
use crate::session::Chunk;
use crate::state::ConnectionState;
use tokio::sync::mpsc;
use url::Url;

/// Notifications from the channel task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// Connection state changed
    Connection(ConnectionState),
    /// Text frame received from the server
    Message(String),
}

/// Requests to the channel task
#[derive(Debug)]
pub enum ChannelCommand {
    /// Write a chunk as a binary frame
    Send(Chunk),
    /// Close the socket and end the task
    Shutdown,
}

/// Outbound side of a control channel. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ChannelHandle {
    tx: mpsc::UnboundedSender<ChannelCommand>,
}

impl ChannelHandle {
    /// Wrap a command sender. Lets callers drive something other than the
    /// websocket task, e.g. an in-process test server.
    pub fn new(tx: mpsc::UnboundedSender<ChannelCommand>) -> Self {
        Self { tx }
    }

    /// Hand a chunk to the channel without waiting for it to be written.
    /// Once handed over it counts as sent.
    pub fn send_chunk(&self, chunk: Chunk) {
        let seq = chunk.seq;
        if self.tx.send(ChannelCommand::Send(chunk)).is_err() {
            tracing::warn!("Control channel closed, chunk #{} dropped", seq);
        }
    }

    /// Ask the channel task to close the socket and exit
    pub fn shutdown(&self) {
        let _ = self.tx.send(ChannelCommand::Shutdown);
    }
}

/// Validate a websocket URL (`ws://` or `wss://`)
pub fn parse_socket_url(socket_url: &str) -> Result<Url, ChannelError> {
    let url = Url::parse(socket_url).map_err(|e| ChannelError::InvalidUrl {
        url: socket_url.to_string(),
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(ChannelError::InvalidUrl {
            url: socket_url.to_string(),
            reason: format!("unsupported scheme '{}', expected ws or wss", other),
        }),
    }
}

/// Start the channel task for `session_id`.
///
/// The event receiver closes once the task has exited after
/// [`ChannelHandle::shutdown`].
pub fn spawn(
    socket_url: &str,
    session_id: String,
    policy: ReconnectPolicy,
) -> Result<(ChannelHandle, mpsc::UnboundedReceiver<ChannelEvent>), ChannelError> {
    let url = parse_socket_url(socket_url)?;
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();

    tracing::info!("Control channel: {}", url);
    tokio::spawn(socket::run(url, session_id, policy, cmd_rx, event_tx));

    Ok((ChannelHandle::new(cmd_tx), event_rx))
}
