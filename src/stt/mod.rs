//! Streaming speech-to-text provider bridge
//!
//! WebSocket client for a Deepgram-style live transcription endpoint:
//! raw PCM16 audio goes out as binary frames, interim/final transcript
//! results come back as JSON and are converted into
//! [`crate::transcript::TranscriptSegment`]s for the transcription buffer.
//!
//! The bridge lives exactly as long as a capture session. There is no
//! retry once streaming has started; a provider or transport failure
//! surfaces through the session status and the user re-initiates capture.

mod client;
mod protocol;

pub use client::{SegmentReceiver, SttStream};
pub use protocol::{SttCommand, SttConfig, SttMessage};

/// Errors on the transcription provider bridge
#[derive(Debug, Clone)]
pub enum SttError {
    /// Provider API key not configured
    MissingApiKey,
    /// Failed to establish the WebSocket connection
    ConnectionFailed(String),
    /// Authentication with the provider failed
    AuthenticationFailed(String),
    /// Failed to send audio data
    SendFailed(String),
    /// Connection closed unexpectedly
    Disconnected(String),
}

impl std::fmt::Display for SttError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SttError::MissingApiKey => {
                write!(
                    f,
                    "Transcription API key not configured. Set DEEPGRAM_API_KEY environment variable."
                )
            }
            SttError::ConnectionFailed(e) => {
                write!(f, "Failed to connect to transcription provider: {}", e)
            }
            SttError::AuthenticationFailed(e) => write!(f, "Authentication failed: {}", e),
            SttError::SendFailed(e) => write!(f, "Failed to send audio: {}", e),
            SttError::Disconnected(e) => write!(f, "Transcription stream disconnected: {}", e),
        }
    }
}

impl std::error::Error for SttError {}

/// Get the transcription provider API key from environment
pub fn get_api_key() -> Option<String> {
    std::env::var("DEEPGRAM_API_KEY")
        .ok()
        .filter(|k| !k.is_empty())
}
