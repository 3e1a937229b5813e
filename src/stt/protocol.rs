//! Deepgram live transcription protocol types
//!
//! The live endpoint takes its configuration as query parameters on the
//! WebSocket URL, accepts raw PCM16 audio as binary frames, and emits
//! JSON result messages tagged by a `type` field. Only the fields the
//! transcription buffer consumes are modeled.

use serde::{Deserialize, Serialize};

use crate::transcript::TranscriptSegment;

/// Default live transcription endpoint
pub const DEFAULT_STT_ENDPOINT: &str = "wss://api.deepgram.com/v1/listen";

/// Configuration for a live transcription stream
#[derive(Debug, Clone)]
pub struct SttConfig {
    /// Endpoint base URL (overridable for self-hosted deployments)
    pub endpoint: String,
    /// BCP-47 language tag passed to the provider
    pub language: String,
    /// Sample rate of the outgoing PCM16 audio
    pub sample_rate: u32,
    /// Request interim (non-final) results for live display
    pub interim_results: bool,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_STT_ENDPOINT.to_string(),
            language: "en".to_string(),
            sample_rate: 48_000,
            interim_results: true,
        }
    }
}

impl SttConfig {
    /// Build the WebSocket URL with the negotiated audio parameters.
    pub fn url(&self) -> String {
        format!(
            "{}?model=nova-2&language={}&encoding=linear16&sample_rate={}&interim_results={}",
            self.endpoint, self.language, self.sample_rate, self.interim_results
        )
    }
}

/// Messages received from the provider
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum SttMessage {
    /// A transcription result, interim or final
    #[serde(rename = "Results")]
    Results {
        #[serde(default)]
        channel: ResultChannel,
        #[serde(default)]
        is_final: bool,
    },

    /// Stream metadata sent on open/close; not consumed
    #[serde(rename = "Metadata")]
    Metadata,

    /// Catch-all for message types we don't handle
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResultChannel {
    #[serde(default)]
    pub alternatives: Vec<ResultAlternative>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResultAlternative {
    #[serde(default)]
    pub transcript: String,
}

impl SttMessage {
    /// Convert a result into a transcript segment for the buffer.
    /// Non-result messages and empty transcripts yield `None`.
    pub fn into_segment(self) -> Option<TranscriptSegment> {
        match self {
            SttMessage::Results { channel, is_final } => {
                let transcript = channel
                    .alternatives
                    .into_iter()
                    .next()
                    .map(|alt| alt.transcript)
                    .unwrap_or_default();
                if transcript.is_empty() {
                    None
                } else {
                    Some(TranscriptSegment::new(transcript, is_final))
                }
            }
            _ => None,
        }
    }
}

/// Control messages sent to the provider as text frames
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum SttCommand {
    /// Flush and close the stream
    CloseStream,
    /// Keep the socket alive during silence
    KeepAlive,
}
