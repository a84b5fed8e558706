//! Websocket task behind [`super::ChannelHandle`]

use super::{ChannelCommand, ChannelEvent, ReconnectPolicy};
use crate::error::ChannelError;
use crate::state::ConnectionState;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How a live connection ended
enum Ended {
    /// Shutdown requested or the session went away
    Shutdown,
    /// Socket failed or the server closed it
    Dropped(ChannelError),
}

pub(super) async fn run(
    url: Url,
    session_id: String,
    policy: ReconnectPolicy,
    mut cmd_rx: mpsc::UnboundedReceiver<ChannelCommand>,
    event_tx: mpsc::UnboundedSender<ChannelEvent>,
) {
    let emit = |event: ChannelEvent| event_tx.send(event).is_ok();
    let mut failures: u32 = 0;

    loop {
        if !emit(ChannelEvent::Connection(ConnectionState::Connecting)) {
            return;
        }

        match tokio_tungstenite::connect_async(url.as_str()).await {
            Ok((socket, _response)) => {
                tracing::debug!("Control channel connected");
                failures = 0;
                match serve(socket, &session_id, &mut cmd_rx, &event_tx).await {
                    Ended::Shutdown => {
                        tracing::debug!("Control channel shut down");
                        let _ = emit(ChannelEvent::Connection(ConnectionState::Disconnected));
                        return;
                    }
                    Ended::Dropped(e) => tracing::warn!("Control channel lost: {}", e),
                }
            }
            Err(e) => {
                failures = failures.saturating_add(1);
                tracing::warn!("Control channel connect failed: {}", ChannelError::from(e));
            }
        }

        if !emit(ChannelEvent::Connection(ConnectionState::Disconnected)) {
            return;
        }

        let delay = policy.delay_for(failures);
        tracing::info!("Reconnecting in {:.1}s", delay.as_secs_f64());
        if !wait_to_reconnect(delay, &mut cmd_rx).await {
            return;
        }
    }
}

/// Sleep out the reconnect delay. Chunks handed over meanwhile are lost.
/// Returns false if shutdown was requested.
async fn wait_to_reconnect(
    delay: std::time::Duration,
    cmd_rx: &mut mpsc::UnboundedReceiver<ChannelCommand>,
) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            cmd = cmd_rx.recv() => match cmd {
                Some(ChannelCommand::Send(chunk)) => {
                    tracing::warn!(
                        "Control channel disconnected, chunk #{} ({} bytes) dropped",
                        chunk.seq,
                        chunk.len()
                    );
                }
                Some(ChannelCommand::Shutdown) | None => return false,
            },
        }
    }
}

async fn serve(
    socket: Socket,
    session_id: &str,
    cmd_rx: &mut mpsc::UnboundedReceiver<ChannelCommand>,
    event_tx: &mpsc::UnboundedSender<ChannelEvent>,
) -> Ended {
    let (mut sink, mut stream) = socket.split();

    // The server keys the upload on the first text frame
    if let Err(e) = sink.send(Message::Text(session_id.to_string())).await {
        return Ended::Dropped(e.into());
    }
    if event_tx
        .send(ChannelEvent::Connection(ConnectionState::Connected))
        .is_err()
    {
        return Ended::Shutdown;
    }

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(ChannelCommand::Send(chunk)) => {
                    tracing::trace!("Sending chunk #{} ({} bytes)", chunk.seq, chunk.len());
                    if let Err(e) = sink.send(Message::Binary(chunk.data.to_vec())).await {
                        return Ended::Dropped(ChannelError::Send(e.to_string()));
                    }
                }
                Some(ChannelCommand::Shutdown) | None => {
                    let _ = sink.send(Message::Close(None)).await;
                    let _ = sink.close().await;
                    return Ended::Shutdown;
                }
            },
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    tracing::debug!("Server message: {}", text);
                    if event_tx.send(ChannelEvent::Message(text)).is_err() {
                        return Ended::Shutdown;
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::debug!("Server closed control channel: {:?}", frame);
                    return Ended::Dropped(ChannelError::Closed);
                }
                // Binary frames carry nothing for us; pings are answered by tungstenite
                Some(Ok(_)) => {}
                Some(Err(e)) => return Ended::Dropped(e.into()),
                None => return Ended::Dropped(ChannelError::Closed),
            },
        }
    }
}
