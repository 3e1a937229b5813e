//! Pause-based transcript finalization
//!
//! Accumulates interim/final speech-to-text fragments into finalized
//! question text. Interim fragments only update a live display view;
//! final fragments append to the accumulator. Once no new fragment has
//! arrived for [`PAUSE_THRESHOLD`], whatever has accumulated is treated
//! as one complete question.
//!
//! The buffer does not own a timer. Every `feed` bumps a generation
//! counter and the caller restarts the pause timer with that generation;
//! an elapse carrying an older generation is stale and must be ignored.
//! This is the same stale-id guard the rest of the session uses for
//! delayed events.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Silence gap after which accumulated speech is treated as a complete question.
pub const PAUSE_THRESHOLD: Duration = Duration::from_millis(2000);

/// One fragment from the streaming speech-to-text provider.
#[derive(Debug, Clone)]
pub struct TranscriptSegment {
    pub text: String,
    pub is_final: bool,
    pub received_at: DateTime<Utc>,
}

impl TranscriptSegment {
    pub fn new(text: impl Into<String>, is_final: bool) -> Self {
        Self {
            text: text.into(),
            is_final,
            received_at: Utc::now(),
        }
    }
}

/// Accumulates transcript fragments until a pause finalizes them.
#[derive(Debug, Default)]
pub struct TranscriptBuffer {
    /// Final-fragment text accumulated since the last flush
    accumulated: String,
    /// Latest interim text, live display only; never finalized by itself
    interim: String,
    /// Bumped on every feed/discard so stale timer elapses can be detected
    generation: u64,
}

impl TranscriptBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one fragment. Interim text replaces the live view; final text
    /// appends to the accumulator, so several final fragments before a
    /// pause compose into one question.
    ///
    /// Returns the generation the pause timer must be restarted with.
    pub fn feed(&mut self, segment: &TranscriptSegment) -> u64 {
        if segment.is_final {
            if !segment.text.is_empty() {
                self.accumulated.push_str(&segment.text);
                self.accumulated.push(' ');
            }
            self.interim.clear();
        } else {
            self.interim.clear();
            self.interim.push_str(&segment.text);
        }
        self.generation += 1;
        self.generation
    }

    /// True when a timer elapse belongs to the most recent feed.
    pub fn is_current(&self, generation: u64) -> bool {
        generation == self.generation
    }

    /// Flush the accumulated text as a finalized question and clear the
    /// buffer. Returns `None` when nothing has accumulated (a pause over
    /// an empty buffer, or over interim-only text, finalizes nothing).
    pub fn take_finalized(&mut self) -> Option<String> {
        let text = self.accumulated.trim_end().to_string();
        self.accumulated.clear();
        self.interim.clear();
        if text.is_empty() {
            None
        } else {
            log::debug!("Transcript finalized: {} chars", text.len());
            Some(text)
        }
    }

    /// Live interim view for display.
    pub fn interim(&self) -> &str {
        &self.interim
    }

    pub fn has_text(&self) -> bool {
        !self.accumulated.is_empty()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Drop unflushed text and invalidate any pending pause timer.
    /// Called on capture stop; nothing is finalized.
    pub fn discard(&mut self) {
        if !self.accumulated.is_empty() || !self.interim.is_empty() {
            log::debug!(
                "Discarding unflushed transcript ({} accumulated, {} interim chars)",
                self.accumulated.len(),
                self.interim.len()
            );
        }
        self.accumulated.clear();
        self.interim.clear();
        self.generation += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_buffer_is_empty() {
        let mut buf = TranscriptBuffer::new();
        assert!(!buf.has_text());
        assert_eq!(buf.interim(), "");
        assert_eq!(buf.take_finalized(), None);
    }

    #[test]
    fn interim_replaces_live_view_without_accumulating() {
        let mut buf = TranscriptBuffer::new();
        buf.feed(&TranscriptSegment::new("I", false));
        buf.feed(&TranscriptSegment::new("I think", false));
        assert_eq!(buf.interim(), "I think");
        assert!(!buf.has_text());
        // Interim-only text never finalizes
        assert_eq!(buf.take_finalized(), None);
    }

    #[test]
    fn final_fragments_compose_into_one_question() {
        let mut buf = TranscriptBuffer::new();
        buf.feed(&TranscriptSegment::new("What is", true));
        buf.feed(&TranscriptSegment::new("your experience?", true));
        assert_eq!(
            buf.take_finalized(),
            Some("What is your experience?".to_string())
        );
        // Flush clears the buffer
        assert!(!buf.has_text());
        assert_eq!(buf.take_finalized(), None);
    }

    #[test]
    fn final_fragment_clears_interim_view() {
        let mut buf = TranscriptBuffer::new();
        buf.feed(&TranscriptSegment::new("what is", false));
        buf.feed(&TranscriptSegment::new("what is rust", true));
        assert_eq!(buf.interim(), "");
        assert_eq!(buf.take_finalized(), Some("what is rust".to_string()));
    }

    #[test]
    fn each_feed_supersedes_earlier_timer_generations() {
        let mut buf = TranscriptBuffer::new();
        let g1 = buf.feed(&TranscriptSegment::new("hello", true));
        let g2 = buf.feed(&TranscriptSegment::new("world", false));
        assert!(!buf.is_current(g1));
        assert!(buf.is_current(g2));
    }

    #[test]
    fn discard_drops_text_and_stales_pending_timer() {
        let mut buf = TranscriptBuffer::new();
        let gen = buf.feed(&TranscriptSegment::new("I think", false));
        buf.discard();
        assert!(!buf.is_current(gen));
        assert_eq!(buf.interim(), "");
        assert_eq!(buf.take_finalized(), None);
    }

    #[test]
    fn groups_separated_by_flush_finalize_independently() {
        let mut buf = TranscriptBuffer::new();
        buf.feed(&TranscriptSegment::new("first group", true));
        assert_eq!(buf.take_finalized(), Some("first group".to_string()));

        buf.feed(&TranscriptSegment::new("second", true));
        buf.feed(&TranscriptSegment::new("group", true));
        assert_eq!(buf.take_finalized(), Some("second group".to_string()));
    }

    #[test]
    fn empty_final_fragment_is_ignored() {
        let mut buf = TranscriptBuffer::new();
        buf.feed(&TranscriptSegment::new("", true));
        assert!(!buf.has_text());
        assert_eq!(buf.take_finalized(), None);
    }
}
