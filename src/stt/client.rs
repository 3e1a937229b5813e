//! WebSocket client for the live transcription provider
//!
//! Connect once per capture session, stream PCM16 binary frames out,
//! receive parsed transcript segments through the taken receiver. Closing
//! sends `CloseStream` so the provider flushes its final result before the
//! socket goes down.

use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::{
    connect_async_with_config,
    tungstenite::{
        client::IntoClientRequest,
        http::HeaderValue,
        Message,
    },
    MaybeTlsStream, WebSocketStream,
};

use super::protocol::{SttCommand, SttConfig, SttMessage};
use super::SttError;
use crate::transcript::TranscriptSegment;

/// Timeout for the WebSocket handshake
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Receiver for parsed transcript segments
pub type SegmentReceiver = mpsc::Receiver<TranscriptSegment>;

/// Handle to an open transcription stream
pub struct SttStream {
    write: futures_util::stream::SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>,
    /// Wrapped in Option so it can be taken for concurrent processing
    incoming_rx: Option<SegmentReceiver>,
    /// Handle to the receiver task (aborted on close/drop)
    receiver_task: tokio::task::JoinHandle<()>,
}

impl SttStream {
    /// Connect to the provider with the negotiated audio parameters.
    /// Single attempt: a capture session either gets its bridge or reports
    /// the failure and aborts the start.
    pub async fn connect(api_key: &str, config: &SttConfig) -> Result<Self, SttError> {
        if api_key.is_empty() {
            return Err(SttError::MissingApiKey);
        }

        let url = config.url();
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| SttError::ConnectionFailed(e.to_string()))?;

        request.headers_mut().insert(
            "Authorization",
            HeaderValue::from_str(&format!("Token {}", api_key))
                .map_err(|e| SttError::AuthenticationFailed(e.to_string()))?,
        );

        log::info!(
            "Connecting to transcription provider ({} Hz, language {})...",
            config.sample_rate,
            config.language
        );

        let (ws_stream, _response) = timeout(
            CONNECT_TIMEOUT,
            connect_async_with_config(request, None, false),
        )
        .await
        .map_err(|_| SttError::ConnectionFailed("Connection timeout".to_string()))?
        .map_err(|e| SttError::ConnectionFailed(e.to_string()))?;

        let (write, mut read) = ws_stream.split();

        // Parsed segments flow to the capture controller's forwarding task
        let (incoming_tx, incoming_rx) = mpsc::channel(100);

        let receiver_task = tokio::spawn(async move {
            while let Some(msg_result) = read.next().await {
                match msg_result {
                    Ok(Message::Text(text)) => match serde_json::from_str::<SttMessage>(&text) {
                        Ok(msg) => {
                            if let Some(segment) = msg.into_segment() {
                                if incoming_tx.send(segment).await.is_err() {
                                    log::debug!("Transcript receiver closed");
                                    break;
                                }
                            }
                        }
                        Err(e) => {
                            log::warn!("Failed to parse transcription message: {}", e);
                        }
                    },
                    Ok(Message::Close(_)) => {
                        log::info!("Transcription stream closed by provider");
                        break;
                    }
                    Err(e) => {
                        log::warn!("Transcription stream error: {}", e);
                        break;
                    }
                    _ => {} // Ignore ping/pong/binary
                }
            }
            log::debug!("Transcription receiver task exiting");
        });

        log::info!("Transcription stream connected");

        Ok(Self {
            write,
            incoming_rx: Some(incoming_rx),
            receiver_task,
        })
    }

    /// Send PCM16 samples as one binary frame (little-endian).
    pub async fn send_audio(&mut self, samples: &[i16]) -> Result<(), SttError> {
        let bytes: Vec<u8> = samples.iter().flat_map(|&s| s.to_le_bytes()).collect();
        self.write
            .send(Message::Binary(bytes))
            .await
            .map_err(|e| SttError::SendFailed(e.to_string()))
    }

    /// Take ownership of the parsed segment receiver.
    pub fn take_incoming_receiver(&mut self) -> Option<SegmentReceiver> {
        self.incoming_rx.take()
    }

    /// Flush and close the stream: ask the provider to finalize, then
    /// tear the socket down. Teardown proceeds even if the flush fails.
    pub async fn close(mut self) {
        log::info!("Closing transcription stream...");

        match serde_json::to_string(&SttCommand::CloseStream) {
            Ok(json) => {
                if let Err(e) = self.write.send(Message::Text(json)).await {
                    log::warn!("Failed to send CloseStream: {}", e);
                }
            }
            Err(e) => log::warn!("Failed to encode CloseStream: {}", e),
        }

        self.receiver_task.abort();
        if let Err(e) = self.write.close().await {
            log::warn!("Error closing transcription stream: {}", e);
        }
    }
}

impl Drop for SttStream {
    fn drop(&mut self) {
        // Ensure the receiver task dies if the stream is dropped without close()
        self.receiver_task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_requires_api_key() {
        let result = SttStream::connect("", &SttConfig::default()).await;
        assert!(matches!(result, Err(SttError::MissingApiKey)));
    }

    #[tokio::test]
    #[ignore] // Requires a valid provider API key
    async fn connect_with_real_key() {
        let api_key = super::super::get_api_key().expect("DEEPGRAM_API_KEY required");
        let stream = SttStream::connect(&api_key, &SttConfig::default()).await;
        assert!(stream.is_ok(), "Connection failed: {:?}", stream.err());
        stream.unwrap().close().await;
    }
}
