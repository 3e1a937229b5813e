//! Interview backend wire protocol
//!
//! JSON events tagged by a `type` field. Inbound events carry an
//! `%H:%M:%S` timestamp string set by the backend; unrecognized types
//! deserialize to [`ServerEvent::Unknown`] and are ignored instead of
//! failing the stream.

use serde::{Deserialize, Serialize};

/// Events received from the interview backend
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Session context sent once after connecting
    #[serde(rename = "initialization")]
    Initialization {
        #[serde(default)]
        resume_summary: String,
    },

    /// The backend accepted a question and will stream an answer
    #[serde(rename = "question")]
    Question {
        text: String,
        #[serde(default)]
        timestamp: String,
    },

    /// Incremental answer text
    #[serde(rename = "answer_chunk")]
    AnswerChunk {
        text: String,
        #[serde(default)]
        timestamp: String,
    },

    /// The answer finished normally
    #[serde(rename = "answer_complete")]
    AnswerComplete {
        #[serde(default)]
        timestamp: String,
    },

    /// The answer was terminated by an interruption
    #[serde(rename = "answer_stopped")]
    AnswerStopped {
        message: String,
        #[serde(default)]
        timestamp: String,
    },

    /// Catch-all for event types we don't handle
    #[serde(other)]
    Unknown,
}

/// Events sent to the interview backend
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Dispatch a queued question. The backend names this message after
    /// its original speech source, hence the `transcription` tag even for
    /// manually typed questions.
    #[serde(rename = "transcription")]
    Transcription { text: String },

    /// Interrupt the in-progress answer
    #[serde(rename = "stop")]
    Stop,
}

impl ClientEvent {
    pub fn question(text: impl Into<String>) -> Self {
        Self::Transcription { text: text.into() }
    }

    pub fn stop() -> Self {
        Self::Stop
    }
}

/// Derive the WebSocket endpoint from the backend's HTTP base URL,
/// mirroring how the served page derives it from its own origin.
pub fn ws_url(base_url: &str, path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let ws_base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        base.to_string()
    };
    format!("{}{}", ws_base, path)
}
