//! Session orchestrator
//!
//! Single-writer state machine for the live interview session. All
//! mutations of the transcription buffer, the question queue, and the
//! active answer happen inside [`Session::handle`], one event at a time;
//! the surrounding loop executes the returned effects, so each handler
//! runs to completion before the next event is processed.
//!
//! Key rules:
//! - Questions dispatch strictly in enqueue order, at most one in flight.
//! - Zero or one answer is active at any instant.
//! - Stale pause-timer elapses (older generation) are dropped silently.

use uuid::Uuid;

use crate::answer::{AnswerAccumulator, FinalizeReason};
use crate::capture::CaptureSource;
use crate::channel::ServerEvent;
use crate::queue::{QuestionQueue, QuestionSource};
use crate::transcript::{TranscriptBuffer, TranscriptSegment};

/// Answer axis of the session. The capture flag is an independent axis;
/// capturing and answering evolve separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No answer active or in flight; free to dispatch
    Idle,
    /// A question has been dispatched (or echoed by the backend) and its
    /// answer has not finished yet
    AwaitingAnswer,
}

/// Events from all external sources, delivered through one inbox.
#[derive(Debug, Clone)]
pub enum Event {
    /// A transcript fragment arrived from the speech-to-text stream
    Transcript(TranscriptSegment),
    /// The silence timer started for `generation` elapsed
    PauseElapsed { generation: u64 },
    /// User typed a question
    SubmitQuestion { text: String },
    /// User pressed the interrupt control
    StopAnswer,
    /// User asked to start capturing from `source`
    StartCapture { source: CaptureSource },
    /// User asked to stop capturing
    StopCapture,

    // Capture controller results
    CaptureStarted { source: CaptureSource },
    CaptureStopped,
    CaptureFailed { err: String },

    /// An event arrived on the backend session channel
    Server(ServerEvent),
    /// The backend session channel went down
    ChannelClosed,

    /// Shut the session loop down
    Exit,
}

/// Effects to be executed after a state transition. The session loop
/// handles Render*/EmitView inline; everything else goes to the effect
/// runner.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Dispatch a question over the session channel
    SendQuestion { text: String },
    /// Send the interrupt signal over the session channel
    SendStop,
    /// Restart the silence timer; an elapse with a stale generation is ignored
    StartPauseTimer { generation: u64 },
    /// Acquire the audio source and open the transcription bridge
    StartCapture { source: CaptureSource },
    /// Release the audio source and close the transcription bridge
    StopCapture,
    /// Log an accepted question into the conversation transcript
    RenderQuestion { text: String, timestamp: String },
    /// Re-render the full answer document
    RenderAnswer { document: Uuid, markdown: String },
    /// Append a locally-sourced system notice to the answer log
    RenderNotice { text: String },
    /// Signal to emit the session view to the presentation layer
    EmitView,
}

/// The live session. Owns all mutable session state; created per session
/// and torn down with it, never a process-wide singleton.
#[derive(Debug, Default)]
pub struct Session {
    state: SessionState,
    capturing: bool,
    transcript: TranscriptBuffer,
    queue: QuestionQueue,
    answer: AnswerAccumulator,
    resume_summary: Option<String>,
    status: String,
    /// Set by a local interrupt; absorbs the backend's later
    /// `answer_stopped` echo so it cannot double-advance the queue
    stop_echo_pending: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        SessionState::Idle
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            status: "Connecting...".to_string(),
            ..Self::default()
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_capturing(&self) -> bool {
        self.capturing
    }

    /// Whether an answer is in progress; gates the interrupt control.
    pub fn is_answering(&self) -> bool {
        self.state == SessionState::AwaitingAnswer
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn resume_summary(&self) -> Option<&str> {
        self.resume_summary.as_deref()
    }

    pub fn interim_transcript(&self) -> &str {
        self.transcript.interim()
    }

    pub fn queued_questions(&self) -> usize {
        self.queue.len()
    }

    pub fn answer_markdown(&self) -> Option<&str> {
        self.answer.current_text()
    }

    /// Process one event, run-to-completion. Returns the effects the loop
    /// must execute.
    pub fn handle(&mut self, event: Event) -> Vec<Effect> {
        match event {
            Event::Transcript(segment) => self.on_transcript(segment),
            Event::PauseElapsed { generation } => self.on_pause_elapsed(generation),
            Event::SubmitQuestion { text } => self.on_submit_question(text),
            Event::StopAnswer => self.on_stop_answer(),
            Event::StartCapture { source } => self.on_start_capture(source),
            Event::StopCapture => self.on_stop_capture(),
            Event::CaptureStarted { source } => self.on_capture_started(source),
            Event::CaptureStopped => self.on_capture_stopped(),
            Event::CaptureFailed { err } => self.on_capture_failed(err),
            Event::Server(server_event) => self.on_server_event(server_event),
            Event::ChannelClosed => self.on_channel_closed(),
            // Handled at the loop edge; nothing to do here
            Event::Exit => vec![],
        }
    }

    fn on_transcript(&mut self, segment: TranscriptSegment) -> Vec<Effect> {
        if !self.capturing {
            // Late fragment after stop; the buffer was already discarded
            log::debug!("Transcript fragment ignored (not capturing)");
            return vec![];
        }
        let generation = self.transcript.feed(&segment);
        vec![Effect::StartPauseTimer { generation }, Effect::EmitView]
    }

    fn on_pause_elapsed(&mut self, generation: u64) -> Vec<Effect> {
        if !self.transcript.is_current(generation) {
            // Superseded by a newer fragment or by a capture stop
            return vec![];
        }
        match self.transcript.take_finalized() {
            Some(text) => {
                self.queue.enqueue(text, QuestionSource::Speech);
                let mut effects = self.maybe_dispatch();
                effects.push(Effect::EmitView);
                effects
            }
            None => vec![],
        }
    }

    fn on_submit_question(&mut self, text: String) -> Vec<Effect> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return vec![];
        }
        self.queue
            .enqueue(trimmed.to_string(), QuestionSource::Manual);
        let mut effects = self.maybe_dispatch();
        effects.push(Effect::EmitView);
        effects
    }

    fn on_stop_answer(&mut self) -> Vec<Effect> {
        if self.state != SessionState::AwaitingAnswer {
            log::debug!("Stop requested with no answer in progress; ignoring");
            return vec![];
        }
        // Local-first: finalize immediately and advance, without waiting
        // for the backend's answer_stopped acknowledgment. The echo is
        // absorbed when it arrives.
        self.answer.finalize(FinalizeReason::Stopped);
        self.state = SessionState::Idle;
        self.stop_echo_pending = true;

        let mut effects = vec![Effect::SendStop];
        effects.extend(self.maybe_dispatch());
        effects.push(Effect::EmitView);
        effects
    }

    fn on_start_capture(&mut self, source: CaptureSource) -> Vec<Effect> {
        if self.capturing {
            log::debug!("Capture already active; ignoring start");
            return vec![];
        }
        self.status = format!("Starting {} capture...", source.as_str());
        vec![Effect::StartCapture { source }, Effect::EmitView]
    }

    fn on_stop_capture(&mut self) -> Vec<Effect> {
        if !self.capturing {
            return vec![];
        }
        // Local-first, like the answer stop: nothing may finalize in the
        // window between this request and the runner's confirmation, so
        // partial text is dropped and the pause timer staled right here.
        self.capturing = false;
        self.transcript.discard();
        vec![Effect::StopCapture, Effect::EmitView]
    }

    fn on_capture_started(&mut self, source: CaptureSource) -> Vec<Effect> {
        self.capturing = true;
        self.status = format!("Capturing {}", source.as_str());
        vec![Effect::EmitView]
    }

    fn on_capture_stopped(&mut self) -> Vec<Effect> {
        self.capturing = false;
        // Unflushed partial text is dropped, never finalized, and the
        // discard stales any pending pause timer.
        self.transcript.discard();
        self.status = "Capture stopped".to_string();
        vec![Effect::EmitView]
    }

    fn on_capture_failed(&mut self, err: String) -> Vec<Effect> {
        self.capturing = false;
        self.transcript.discard();
        self.status = format!("Error: {}", err);
        log::error!("Capture failed: {}", err);
        vec![Effect::EmitView]
    }

    fn on_server_event(&mut self, event: ServerEvent) -> Vec<Effect> {
        match event {
            ServerEvent::Initialization { resume_summary } => {
                self.resume_summary = Some(resume_summary);
                self.status = "Connected to server".to_string();
                vec![Effect::EmitView]
            }

            ServerEvent::Question { text, timestamp } => {
                // The backend accepted a dispatched (or externally
                // originated) question; interruption becomes available.
                self.state = SessionState::AwaitingAnswer;
                vec![
                    Effect::RenderQuestion { text, timestamp },
                    Effect::EmitView,
                ]
            }

            ServerEvent::AnswerChunk { text, .. } => {
                let (document, markdown) = self.answer.start_or_append(&text);
                vec![
                    Effect::RenderAnswer { document, markdown },
                    Effect::EmitView,
                ]
            }

            ServerEvent::AnswerComplete { .. } => {
                self.answer.finalize(FinalizeReason::Complete);
                self.state = SessionState::Idle;
                self.stop_echo_pending = false;
                let mut effects = self.maybe_dispatch();
                effects.push(Effect::EmitView);
                effects
            }

            ServerEvent::AnswerStopped { message, .. } => {
                if self.stop_echo_pending {
                    // Acknowledgment of our own interrupt: the answer was
                    // already finalized locally and the queue advanced.
                    self.stop_echo_pending = false;
                    log::debug!("Absorbed answer_stopped echo after local stop");
                    return vec![Effect::RenderNotice { text: message }, Effect::EmitView];
                }
                self.answer.finalize(FinalizeReason::Stopped);
                self.state = SessionState::Idle;
                let mut effects = vec![Effect::RenderNotice { text: message }];
                effects.extend(self.maybe_dispatch());
                effects.push(Effect::EmitView);
                effects
            }

            // Unrecognized event types are ignored, never fatal
            ServerEvent::Unknown => vec![],
        }
    }

    fn on_channel_closed(&mut self) -> Vec<Effect> {
        self.status = "Disconnected".to_string();
        vec![Effect::EmitView]
    }

    /// Dispatch exactly one queued question when idle. The session enters
    /// `AwaitingAnswer` at dispatch time, before the backend echoes the
    /// question, so a burst of enqueues can never put two questions in
    /// flight.
    fn maybe_dispatch(&mut self) -> Vec<Effect> {
        if self.state != SessionState::Idle {
            return vec![];
        }
        match self.queue.dequeue_next() {
            Some(question) => {
                self.state = SessionState::AwaitingAnswer;
                log::info!(
                    "Dispatching {} question ({} still queued)",
                    question.source.as_str(),
                    self.queue.len()
                );
                vec![Effect::SendQuestion {
                    text: question.text,
                }]
            }
            None => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::TranscriptSegment;

    fn final_segment(text: &str) -> Event {
        Event::Transcript(TranscriptSegment::new(text, true))
    }

    fn interim_segment(text: &str) -> Event {
        Event::Transcript(TranscriptSegment::new(text, false))
    }

    /// Pull the generation out of the StartPauseTimer effect
    fn timer_generation(effects: &[Effect]) -> u64 {
        effects
            .iter()
            .find_map(|e| match e {
                Effect::StartPauseTimer { generation } => Some(*generation),
                _ => None,
            })
            .expect("StartPauseTimer effect missing")
    }

    fn sent_questions(effects: &[Effect]) -> Vec<String> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::SendQuestion { text } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    fn capturing_session() -> Session {
        let mut session = Session::new();
        session.handle(Event::CaptureStarted {
            source: CaptureSource::Microphone,
        });
        session
    }

    #[test]
    fn transcript_fragment_restarts_pause_timer() {
        let mut session = capturing_session();
        let effects = session.handle(final_segment("hello"));
        let g1 = timer_generation(&effects);
        let effects = session.handle(interim_segment("more"));
        let g2 = timer_generation(&effects);
        assert!(g2 > g1);
    }

    #[test]
    fn pause_after_finals_enqueues_and_dispatches_one_question() {
        let mut session = capturing_session();
        session.handle(final_segment("What is"));
        let effects = session.handle(final_segment("your experience?"));
        let generation = timer_generation(&effects);

        let effects = session.handle(Event::PauseElapsed { generation });
        assert_eq!(sent_questions(&effects), vec!["What is your experience?"]);
        assert_eq!(session.state(), SessionState::AwaitingAnswer);
    }

    #[test]
    fn stale_pause_elapse_is_ignored() {
        let mut session = capturing_session();
        let effects = session.handle(final_segment("hello"));
        let stale = timer_generation(&effects);
        session.handle(final_segment("world"));

        let effects = session.handle(Event::PauseElapsed { generation: stale });
        assert!(effects.is_empty());
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn pause_over_empty_buffer_finalizes_nothing() {
        let mut session = capturing_session();
        let effects = session.handle(interim_segment("I think"));
        let generation = timer_generation(&effects);
        // Interim-only text never becomes a question
        let effects = session.handle(Event::PauseElapsed { generation });
        assert!(sent_questions(&effects).is_empty());
        assert_eq!(session.queued_questions(), 0);
    }

    #[test]
    fn capture_stop_discards_unflushed_interim_text() {
        let mut session = capturing_session();
        let effects = session.handle(interim_segment("I think"));
        let generation = timer_generation(&effects);

        session.handle(Event::CaptureStopped);
        assert!(!session.is_capturing());
        assert_eq!(session.interim_transcript(), "");

        // The timer fires anyway; its generation is stale now
        let effects = session.handle(Event::PauseElapsed { generation });
        assert!(effects.is_empty());
        assert_eq!(session.queued_questions(), 0);
    }

    #[test]
    fn pause_elapsing_after_stop_request_finalizes_nothing() {
        let mut session = capturing_session();
        let effects = session.handle(final_segment("secret thought"));
        let generation = timer_generation(&effects);

        // Stop requested; the runner has not confirmed yet
        session.handle(Event::StopCapture);

        // The armed timer fires inside the request/confirmation window
        let effects = session.handle(Event::PauseElapsed { generation });
        assert!(sent_questions(&effects).is_empty());
        assert_eq!(session.queued_questions(), 0);

        // Late fragments in the same window are ignored too
        let effects = session.handle(final_segment("more audio"));
        assert!(effects.is_empty());

        session.handle(Event::CaptureStopped);
        assert!(!session.is_capturing());
        assert_eq!(session.queued_questions(), 0);
    }

    #[test]
    fn manual_submission_enqueues_and_dispatches() {
        let mut session = Session::new();
        let effects = session.handle(Event::SubmitQuestion {
            text: "  Tell me about yourself  ".to_string(),
        });
        assert_eq!(sent_questions(&effects), vec!["Tell me about yourself"]);
    }

    #[test]
    fn blank_manual_submission_is_ignored() {
        let mut session = Session::new();
        let effects = session.handle(Event::SubmitQuestion {
            text: "   ".to_string(),
        });
        assert!(effects.is_empty());
        assert_eq!(session.queued_questions(), 0);
    }

    #[test]
    fn questions_dispatch_in_fifo_order_one_at_a_time() {
        let mut session = Session::new();
        let effects = session.handle(Event::SubmitQuestion {
            text: "Q1".to_string(),
        });
        assert_eq!(sent_questions(&effects), vec!["Q1"]);

        // Q2 and Q3 queue behind the in-flight Q1
        let effects = session.handle(Event::SubmitQuestion {
            text: "Q2".to_string(),
        });
        assert!(sent_questions(&effects).is_empty());
        let effects = session.handle(Event::SubmitQuestion {
            text: "Q3".to_string(),
        });
        assert!(sent_questions(&effects).is_empty());
        assert_eq!(session.queued_questions(), 2);

        // Completing Q1 auto-dispatches exactly Q2
        let effects = session.handle(Event::Server(ServerEvent::AnswerComplete {
            timestamp: String::new(),
        }));
        assert_eq!(sent_questions(&effects), vec!["Q2"]);
        assert_eq!(session.queued_questions(), 1);

        let effects = session.handle(Event::Server(ServerEvent::AnswerComplete {
            timestamp: String::new(),
        }));
        assert_eq!(sent_questions(&effects), vec!["Q3"]);
        assert_eq!(session.queued_questions(), 0);
    }

    #[test]
    fn answer_chunks_accumulate_and_complete_returns_to_idle() {
        let mut session = Session::new();
        session.handle(Event::SubmitQuestion {
            text: "What is your experience?".to_string(),
        });
        session.handle(Event::Server(ServerEvent::Question {
            text: "What is your experience?".to_string(),
            timestamp: "14:00:00".to_string(),
        }));
        assert!(session.is_answering());

        session.handle(Event::Server(ServerEvent::AnswerChunk {
            text: "I have ".to_string(),
            timestamp: String::new(),
        }));
        let effects = session.handle(Event::Server(ServerEvent::AnswerChunk {
            text: "5 years.".to_string(),
            timestamp: String::new(),
        }));
        // Whole-document re-render carries the full accumulated text
        let markdown = effects
            .iter()
            .find_map(|e| match e {
                Effect::RenderAnswer { markdown, .. } => Some(markdown.clone()),
                _ => None,
            })
            .expect("RenderAnswer effect missing");
        assert_eq!(markdown, "I have 5 years.");
        assert_eq!(session.answer_markdown(), Some("I have 5 years."));

        session.handle(Event::Server(ServerEvent::AnswerComplete {
            timestamp: String::new(),
        }));
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.answer_markdown().is_none());
    }

    #[test]
    fn at_most_one_active_answer_across_arbitrary_interleavings() {
        let mut session = Session::new();
        let events = [
            Event::Server(ServerEvent::Question {
                text: "Q".to_string(),
                timestamp: String::new(),
            }),
            Event::Server(ServerEvent::AnswerChunk {
                text: "a".to_string(),
                timestamp: String::new(),
            }),
            Event::Server(ServerEvent::AnswerChunk {
                text: "b".to_string(),
                timestamp: String::new(),
            }),
            Event::Server(ServerEvent::AnswerComplete {
                timestamp: String::new(),
            }),
            Event::Server(ServerEvent::AnswerStopped {
                message: "stopped".to_string(),
                timestamp: String::new(),
            }),
            Event::Server(ServerEvent::AnswerChunk {
                text: "c".to_string(),
                timestamp: String::new(),
            }),
            Event::Server(ServerEvent::AnswerComplete {
                timestamp: String::new(),
            }),
        ];
        for event in events {
            session.handle(event);
        }
        // The stray stop was a no-op, the orphan chunk started a fresh
        // answer, and the final completion detached it again
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.answer_markdown().is_none());
    }

    #[test]
    fn duplicate_completion_events_do_not_rerender_content() {
        let mut session = Session::new();
        session.handle(Event::Server(ServerEvent::AnswerChunk {
            text: "answer".to_string(),
            timestamp: String::new(),
        }));
        session.handle(Event::Server(ServerEvent::AnswerComplete {
            timestamp: String::new(),
        }));
        let effects = session.handle(Event::Server(ServerEvent::AnswerComplete {
            timestamp: String::new(),
        }));
        // Second finalize: no render, no dispatch, no panic
        assert!(!effects
            .iter()
            .any(|e| matches!(e, Effect::RenderAnswer { .. })));
        assert!(sent_questions(&effects).is_empty());
    }

    #[test]
    fn local_stop_sends_stop_and_advances_immediately() {
        let mut session = Session::new();
        session.handle(Event::SubmitQuestion {
            text: "Q1".to_string(),
        });
        session.handle(Event::SubmitQuestion {
            text: "Q2".to_string(),
        });
        session.handle(Event::Server(ServerEvent::Question {
            text: "Q1".to_string(),
            timestamp: String::new(),
        }));
        session.handle(Event::Server(ServerEvent::AnswerChunk {
            text: "partial".to_string(),
            timestamp: String::new(),
        }));

        let effects = session.handle(Event::StopAnswer);
        assert!(effects.contains(&Effect::SendStop));
        // Optimistic local finalize: Q2 goes out without waiting for the ack
        assert_eq!(sent_questions(&effects), vec!["Q2"]);
    }

    #[test]
    fn answer_stopped_echo_after_local_stop_does_not_double_dispatch() {
        let mut session = Session::new();
        session.handle(Event::SubmitQuestion {
            text: "Q1".to_string(),
        });
        session.handle(Event::SubmitQuestion {
            text: "Q2".to_string(),
        });
        session.handle(Event::SubmitQuestion {
            text: "Q3".to_string(),
        });
        session.handle(Event::Server(ServerEvent::Question {
            text: "Q1".to_string(),
            timestamp: String::new(),
        }));
        session.handle(Event::Server(ServerEvent::AnswerChunk {
            text: "partial".to_string(),
            timestamp: String::new(),
        }));

        // Local stop dispatches Q2
        let effects = session.handle(Event::StopAnswer);
        assert_eq!(sent_questions(&effects), vec!["Q2"]);

        // The backend's acknowledgment arrives later: notice only, Q3 stays queued
        let effects = session.handle(Event::Server(ServerEvent::AnswerStopped {
            message: "Answer stopped by user action".to_string(),
            timestamp: String::new(),
        }));
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::RenderNotice { .. })));
        assert!(sent_questions(&effects).is_empty());
        assert_eq!(session.queued_questions(), 1);
        assert_eq!(session.state(), SessionState::AwaitingAnswer);
    }

    #[test]
    fn backend_initiated_stop_renders_notice_and_advances() {
        let mut session = Session::new();
        session.handle(Event::SubmitQuestion {
            text: "Q1".to_string(),
        });
        session.handle(Event::SubmitQuestion {
            text: "Q2".to_string(),
        });
        session.handle(Event::Server(ServerEvent::AnswerChunk {
            text: "partial".to_string(),
            timestamp: String::new(),
        }));

        let effects = session.handle(Event::Server(ServerEvent::AnswerStopped {
            message: "stopped".to_string(),
            timestamp: String::new(),
        }));
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::RenderNotice { .. })));
        assert_eq!(sent_questions(&effects), vec!["Q2"]);
    }

    #[test]
    fn stop_with_no_answer_in_progress_is_ignored() {
        let mut session = Session::new();
        let effects = session.handle(Event::StopAnswer);
        assert!(effects.is_empty());
    }

    #[test]
    fn initialization_stores_resume_summary() {
        let mut session = Session::new();
        session.handle(Event::Server(ServerEvent::Initialization {
            resume_summary: "10 years of Rust".to_string(),
        }));
        assert_eq!(session.resume_summary(), Some("10 years of Rust"));
        assert_eq!(session.status(), "Connected to server");
    }

    #[test]
    fn unknown_server_event_is_ignored() {
        let mut session = Session::new();
        let effects = session.handle(Event::Server(ServerEvent::Unknown));
        assert!(effects.is_empty());
    }

    #[test]
    fn transcript_fragments_ignored_when_not_capturing() {
        let mut session = Session::new();
        let effects = session.handle(final_segment("late fragment"));
        assert!(effects.is_empty());
    }

    #[test]
    fn capture_failure_reports_status_without_fatal_state() {
        let mut session = Session::new();
        session.handle(Event::StartCapture {
            source: CaptureSource::SystemAudio,
        });
        session.handle(Event::CaptureFailed {
            err: "No system audio track available".to_string(),
        });
        assert!(!session.is_capturing());
        assert!(session.status().starts_with("Error:"));

        // The user can simply retry
        let effects = session.handle(Event::StartCapture {
            source: CaptureSource::Microphone,
        });
        assert!(effects.iter().any(|e| matches!(
            e,
            Effect::StartCapture {
                source: CaptureSource::Microphone
            }
        )));
    }
}
