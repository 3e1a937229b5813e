//! FIFO queue of finalized questions awaiting dispatch.
//!
//! Spoken (pause-finalized) and manually typed questions share one queue,
//! so ordering between the two sources is by arrival time. The orchestrator
//! dequeues only when no answer is in flight.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;

/// Where a question came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionSource {
    Speech,
    Manual,
}

impl QuestionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionSource::Speech => "speech",
            QuestionSource::Manual => "manual",
        }
    }
}

/// A finalized question waiting for dispatch. Immutable after creation;
/// consumed exactly once by `dequeue_next`.
#[derive(Debug, Clone)]
pub struct PendingQuestion {
    pub text: String,
    pub source: QuestionSource,
    pub enqueued_at: DateTime<Utc>,
}

/// Plain FIFO. No deduplication, no size bound.
#[derive(Debug, Default)]
pub struct QuestionQueue {
    items: VecDeque<PendingQuestion>,
}

impl QuestionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, text: String, source: QuestionSource) {
        log::debug!(
            "Enqueued {} question ({} chars, {} now pending)",
            source.as_str(),
            text.len(),
            self.items.len() + 1
        );
        self.items.push_back(PendingQuestion {
            text,
            source,
            enqueued_at: Utc::now(),
        });
    }

    pub fn dequeue_next(&mut self) -> Option<PendingQuestion> {
        self.items.pop_front()
    }

    pub fn has_pending(&self) -> bool {
        !self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dequeues_in_exact_arrival_order() {
        let mut queue = QuestionQueue::new();
        for i in 0..10 {
            queue.enqueue(format!("sentinel-{}", i), QuestionSource::Speech);
        }
        for i in 0..10 {
            let q = queue.dequeue_next().expect("question missing");
            assert_eq!(q.text, format!("sentinel-{}", i));
        }
        assert!(queue.dequeue_next().is_none());
    }

    #[test]
    fn speech_and_manual_interleave_by_arrival_time() {
        let mut queue = QuestionQueue::new();
        queue.enqueue("spoken one".into(), QuestionSource::Speech);
        queue.enqueue("typed one".into(), QuestionSource::Manual);
        queue.enqueue("spoken two".into(), QuestionSource::Speech);

        let first = queue.dequeue_next().unwrap();
        assert_eq!(first.text, "spoken one");
        assert_eq!(first.source, QuestionSource::Speech);

        let second = queue.dequeue_next().unwrap();
        assert_eq!(second.text, "typed one");
        assert_eq!(second.source, QuestionSource::Manual);

        assert_eq!(queue.dequeue_next().unwrap().text, "spoken two");
    }

    #[test]
    fn no_deduplication() {
        let mut queue = QuestionQueue::new();
        queue.enqueue("same".into(), QuestionSource::Manual);
        queue.enqueue("same".into(), QuestionSource::Manual);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn has_pending_tracks_contents() {
        let mut queue = QuestionQueue::new();
        assert!(!queue.has_pending());
        queue.enqueue("q".into(), QuestionSource::Speech);
        assert!(queue.has_pending());
        queue.dequeue_next();
        assert!(!queue.has_pending());
    }
}
