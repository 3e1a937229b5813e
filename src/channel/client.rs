//! WebSocket client for the interview backend
//!
//! Owns the connection lifecycle: connect (bounded retries for the initial
//! handshake only), a background task that parses inbound events and hands
//! them to the orchestrator in receipt order, and the write half for
//! dispatching questions and stop signals. A session that drops mid-flight
//! stays down; reconnection is deliberately not modeled here.

use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::{
    connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream,
};

use super::protocol::{ClientEvent, ServerEvent};
use super::ChannelError;

/// Timeout for the initial WebSocket handshake
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum attempts for the initial connection
const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff (doubles each retry)
const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

/// Receiver for inbound backend events
pub type ServerEventReceiver = mpsc::Receiver<ServerEvent>;

/// Handle to an open session channel.
///
/// The channel owns the WebSocket write half; inbound events flow through
/// the receiver obtained from [`SessionChannel::take_incoming_receiver`].
pub struct SessionChannel {
    write: futures_util::stream::SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>,
    /// Wrapped in Option so it can be taken for concurrent processing
    incoming_rx: Option<ServerEventReceiver>,
    /// Handle to the receiver task (aborted on disconnect/drop)
    receiver_task: tokio::task::JoinHandle<()>,
}

impl SessionChannel {
    /// Connect to the backend session endpoint.
    ///
    /// Retries the initial handshake with exponential backoff; an
    /// established connection that later drops is not re-established.
    pub async fn connect(url: &str) -> Result<Self, ChannelError> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let delay = RETRY_BASE_DELAY * 2u32.pow(attempt - 1);
                log::info!(
                    "Retrying session channel connection in {:?} (attempt {}/{})",
                    delay,
                    attempt + 1,
                    MAX_RETRIES
                );
                tokio::time::sleep(delay).await;
            }

            match Self::try_connect(url).await {
                Ok(channel) => return Ok(channel),
                Err(e) => {
                    log::warn!("Session channel attempt {} failed: {}", attempt + 1, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| ChannelError::ConnectionFailed("Max retries exceeded".to_string())))
    }

    /// Single connection attempt (no retries)
    async fn try_connect(url: &str) -> Result<Self, ChannelError> {
        log::info!("Connecting to interview backend: {}", url);

        let (ws_stream, _response) = timeout(CONNECT_TIMEOUT, connect_async(url))
            .await
            .map_err(|_| ChannelError::ConnectionFailed("Connection timeout".to_string()))?
            .map_err(|e| ChannelError::ConnectionFailed(e.to_string()))?;

        let (write, mut read) = ws_stream.split();

        // Channel for inbound events, drained by the orchestrator
        let (incoming_tx, incoming_rx) = mpsc::channel(100);

        // Deliver events in receipt order; no buffering or reordering here
        let receiver_task = tokio::spawn(async move {
            while let Some(msg_result) = read.next().await {
                match msg_result {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ServerEvent>(&text) {
                        Ok(event) => {
                            if incoming_tx.send(event).await.is_err() {
                                log::debug!("Session event receiver closed");
                                break;
                            }
                        }
                        Err(e) => {
                            log::warn!("Failed to parse backend event: {}", e);
                        }
                    },
                    Ok(Message::Close(_)) => {
                        log::info!("Session channel closed by backend");
                        break;
                    }
                    Err(e) => {
                        log::warn!("Session channel error: {}", e);
                        break;
                    }
                    _ => {} // Ignore ping/pong/binary
                }
            }
            log::debug!("Session channel receiver task exiting");
        });

        Ok(Self {
            write,
            incoming_rx: Some(incoming_rx),
            receiver_task,
        })
    }

    /// Dispatch one queued question to the backend.
    pub async fn send_question(&mut self, text: &str) -> Result<(), ChannelError> {
        self.send_event(&ClientEvent::question(text)).await
    }

    /// Interrupt the in-progress answer.
    pub async fn send_stop(&mut self) -> Result<(), ChannelError> {
        self.send_event(&ClientEvent::stop()).await
    }

    async fn send_event(&mut self, event: &ClientEvent) -> Result<(), ChannelError> {
        let json = serde_json::to_string(event)
            .map_err(|e| ChannelError::ProtocolError(e.to_string()))?;

        self.write
            .send(Message::Text(json))
            .await
            .map_err(|e| ChannelError::SendFailed(e.to_string()))?;

        Ok(())
    }

    /// Take ownership of the inbound event receiver so the orchestrator
    /// can drain it concurrently with outbound sends. After this call the
    /// channel is send-only.
    pub fn take_incoming_receiver(&mut self) -> Option<ServerEventReceiver> {
        self.incoming_rx.take()
    }

    /// Close the channel: abort the receiver task and send a close frame.
    pub async fn disconnect(mut self) {
        log::info!("Disconnecting session channel...");
        self.receiver_task.abort();
        if let Err(e) = self.write.close().await {
            log::warn!("Error closing session channel: {}", e);
        }
    }
}

impl Drop for SessionChannel {
    fn drop(&mut self) {
        // Ensure the receiver task dies if the channel is dropped without disconnect()
        self.receiver_task.abort();
    }
}
