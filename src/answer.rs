//! Streaming answer accumulation
//!
//! Assembles `answer_chunk` text into a single growing markdown document.
//! Every append returns the FULL accumulated text for re-rendering rather
//! than an incremental diff; answers are short-to-medium text, so the
//! renderer stays trivial at the cost of re-parsing on each chunk.
//!
//! At most one answer is active at a time. `finalize` marks the status and
//! detaches the current document handle so a later `start` produces an
//! independent document; the rendered content itself stays in the
//! transcript log owned by the presentation layer.

use uuid::Uuid;

/// Why an answer stopped growing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeReason {
    /// The backend finished streaming normally
    Complete,
    /// The answer was interrupted (locally or by the backend)
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerStatus {
    Streaming,
    Complete,
    Stopped,
}

/// The answer currently being streamed.
#[derive(Debug, Clone)]
pub struct ActiveAnswer {
    raw: String,
    document: Uuid,
    status: AnswerStatus,
}

impl ActiveAnswer {
    pub fn text(&self) -> &str {
        &self.raw
    }

    /// Opaque handle naming the rendered document this answer targets.
    pub fn document(&self) -> Uuid {
        self.document
    }

    pub fn status(&self) -> AnswerStatus {
        self.status
    }
}

/// Owns the zero-or-one [`ActiveAnswer`].
#[derive(Debug, Default)]
pub struct AnswerAccumulator {
    current: Option<ActiveAnswer>,
}

impl AnswerAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a fresh answer with `initial_chunk` as its content.
    /// Returns the new document handle and the full markdown to render.
    pub fn start(&mut self, initial_chunk: &str) -> (Uuid, String) {
        let answer = ActiveAnswer {
            raw: initial_chunk.to_string(),
            document: Uuid::new_v4(),
            status: AnswerStatus::Streaming,
        };
        let document = answer.document;
        log::debug!("Answer started: document {}", document);
        self.current = Some(answer);
        (document, initial_chunk.to_string())
    }

    /// Concatenate a chunk onto the active answer. Returns the document
    /// handle and the full re-rendered markdown, or `None` when no answer
    /// is active (logged, not fatal).
    pub fn append(&mut self, chunk: &str) -> Option<(Uuid, String)> {
        match self.current.as_mut() {
            Some(answer) => {
                answer.raw.push_str(chunk);
                Some((answer.document, answer.raw.clone()))
            }
            None => {
                log::warn!("Answer append with no active answer; ignoring chunk");
                None
            }
        }
    }

    /// What the orchestrator uses for `answer_chunk` events: start if no
    /// answer is active yet, append otherwise.
    pub fn start_or_append(&mut self, chunk: &str) -> (Uuid, String) {
        if self.current.is_some() {
            // Just checked, append cannot miss
            self.append(chunk).unwrap_or_else(|| self.start(chunk))
        } else {
            self.start(chunk)
        }
    }

    /// Mark the active answer and detach its handle. Idempotent: a second
    /// finalize finds no active answer and is a logged no-op, so duplicate
    /// completion events never touch the rendered content twice.
    pub fn finalize(&mut self, reason: FinalizeReason) -> Option<ActiveAnswer> {
        match self.current.take() {
            Some(mut answer) => {
                answer.status = match reason {
                    FinalizeReason::Complete => AnswerStatus::Complete,
                    FinalizeReason::Stopped => AnswerStatus::Stopped,
                };
                log::debug!(
                    "Answer finalized ({:?}): document {}, {} chars",
                    answer.status,
                    answer.document,
                    answer.raw.len()
                );
                Some(answer)
            }
            None => {
                log::warn!("Answer finalize with no active answer; ignoring");
                None
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.current.is_some()
    }

    pub fn current_text(&self) -> Option<&str> {
        self.current.as_ref().map(|a| a.raw.as_str())
    }

    pub fn current_document(&self) -> Option<Uuid> {
        self.current.as_ref().map(|a| a.document)
    }
}
