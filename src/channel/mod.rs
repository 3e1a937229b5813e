//! Bidirectional session channel to the interview backend
//!
//! A WebSocket transport carrying JSON-tagged events. Outbound traffic is
//! the dispatch of queued questions and the stop (interrupt) signal;
//! inbound traffic is the question echo, streamed answer chunks, and
//! completion markers. The channel performs no buffering or reordering:
//! events reach the orchestrator in receipt order. There is no mid-session
//! reconnection; sending after the socket closed is a caller error that is
//! dropped with a local diagnostic.

mod client;
mod protocol;

pub use client::{SessionChannel, ServerEventReceiver, CONNECT_TIMEOUT};
pub use protocol::{ws_url, ClientEvent, ServerEvent};

/// Errors on the backend session channel
#[derive(Debug, Clone)]
pub enum ChannelError {
    /// Failed to establish the WebSocket connection
    ConnectionFailed(String),
    /// The connection closed (send attempted on a dead socket)
    Disconnected(String),
    /// Malformed outbound payload
    ProtocolError(String),
    /// Failed to send an event
    SendFailed(String),
}

impl std::fmt::Display for ChannelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelError::ConnectionFailed(e) => {
                write!(f, "Failed to connect to interview backend: {}", e)
            }
            ChannelError::Disconnected(e) => write!(f, "Session channel disconnected: {}", e),
            ChannelError::ProtocolError(e) => write!(f, "Session channel protocol error: {}", e),
            ChannelError::SendFailed(e) => write!(f, "Failed to send event: {}", e),
        }
    }
}

impl std::error::Error for ChannelError {}
