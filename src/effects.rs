//! Effect execution
//!
//! Executes the effects produced by the session orchestrator: capture
//! start/stop, the silence timer, and outbound traffic on the backend
//! session channel. Completion and failure flow back into the session
//! loop as events over the provided channel.

use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

use crate::capture::{start_capture, CaptureHandle};
use crate::channel::SessionChannel;
use crate::orchestrator::{Effect, Event};
use crate::stt::{SttConfig, SttStream};
use crate::transcript::PAUSE_THRESHOLD;

/// Trait for running effects asynchronously.
/// Completion events are sent back via the provided channel.
pub trait EffectRunner: Send + Sync + 'static {
    fn spawn(&self, effect: Effect, tx: mpsc::Sender<Event>);
}

/// Real effect runner: CPAL capture bridged into the live transcription
/// stream, plus the backend session channel for questions and stops.
pub struct LiveEffectRunner {
    channel: Arc<Mutex<SessionChannel>>,
    active_capture: Arc<Mutex<Option<CaptureHandle>>>,
    stt_api_key: String,
    stt_config: SttConfig,
}

impl LiveEffectRunner {
    pub fn new(
        channel: Arc<Mutex<SessionChannel>>,
        stt_api_key: String,
        language: String,
    ) -> Arc<Self> {
        Arc::new(Self {
            channel,
            active_capture: Arc::new(Mutex::new(None)),
            stt_api_key,
            stt_config: SttConfig {
                language,
                ..SttConfig::default()
            },
        })
    }
}

impl EffectRunner for LiveEffectRunner {
    fn spawn(&self, effect: Effect, tx: mpsc::Sender<Event>) {
        match effect {
            Effect::StartCapture { source } => {
                let active = self.active_capture.clone();
                let api_key = self.stt_api_key.clone();
                let base_config = self.stt_config.clone();

                tokio::spawn(async move {
                    // The slot stays locked for the whole acquisition, so
                    // overlapping starts cannot both pass this check and
                    // clobber each other's handle
                    let mut slot = active.lock().await;
                    if slot.is_some() {
                        log::warn!("StartCapture: capture already active, ignoring");
                        return;
                    }

                    // Audio frames flow from the device callback to the
                    // transcription pump over this bridge
                    let (frames_tx, mut frames_rx) = mpsc::channel::<Vec<i16>>(100);

                    // Device acquisition is blocking
                    let started =
                        tokio::task::spawn_blocking(move || start_capture(source, frames_tx))
                            .await;

                    let handle = match started {
                        Ok(Ok(handle)) => handle,
                        Ok(Err(e)) => {
                            let _ = tx
                                .send(Event::CaptureFailed { err: e.to_string() })
                                .await;
                            return;
                        }
                        Err(e) => {
                            let _ = tx
                                .send(Event::CaptureFailed {
                                    err: format!("Capture task failed: {}", e),
                                })
                                .await;
                            return;
                        }
                    };

                    let config = SttConfig {
                        sample_rate: handle.sample_rate(),
                        ..base_config
                    };

                    let mut stt = match SttStream::connect(&api_key, &config).await {
                        Ok(stream) => stream,
                        Err(e) => {
                            // Release the device before reporting failure
                            let _ = tokio::task::spawn_blocking(move || handle.stop()).await;
                            let _ = tx
                                .send(Event::CaptureFailed { err: e.to_string() })
                                .await;
                            return;
                        }
                    };

                    let Some(mut segments) = stt.take_incoming_receiver() else {
                        let _ = tokio::task::spawn_blocking(move || handle.stop()).await;
                        let _ = tx
                            .send(Event::CaptureFailed {
                                err: "Transcription receiver unavailable".to_string(),
                            })
                            .await;
                        return;
                    };

                    // Forward parsed transcript segments into the session loop
                    let segment_tx = tx.clone();
                    tokio::spawn(async move {
                        while let Some(segment) = segments.recv().await {
                            if segment_tx
                                .send(Event::Transcript(segment))
                                .await
                                .is_err()
                            {
                                break;
                            }
                        }
                        log::debug!("Segment forwarder exiting");
                    });

                    // Pump audio frames to the provider. The frame bridge
                    // closes when the capture stream is dropped on stop,
                    // which ends this task and flushes the provider.
                    tokio::spawn(async move {
                        while let Some(frame) = frames_rx.recv().await {
                            if let Err(e) = stt.send_audio(&frame).await {
                                log::warn!("Audio send failed, stopping pump: {}", e);
                                break;
                            }
                        }
                        stt.close().await;
                        log::debug!("Audio pump exiting");
                    });

                    *slot = Some(handle);
                    drop(slot);
                    let _ = tx.send(Event::CaptureStarted { source }).await;
                });
            }

            Effect::StopCapture => {
                let active = self.active_capture.clone();

                tokio::spawn(async move {
                    let handle = active.lock().await.take();
                    match handle {
                        Some(handle) => {
                            // Joining the capture thread blocks
                            if let Err(e) =
                                tokio::task::spawn_blocking(move || handle.stop()).await
                            {
                                log::warn!("Capture stop task failed: {}", e);
                            }
                        }
                        None => log::warn!("StopCapture: no active capture"),
                    }
                    let _ = tx.send(Event::CaptureStopped).await;
                });
            }

            Effect::SendQuestion { text } => {
                let channel = self.channel.clone();
                tokio::spawn(async move {
                    let mut guard = channel.lock().await;
                    if let Err(e) = guard.send_question(&text).await {
                        log::warn!("Failed to dispatch question: {}", e);
                    }
                });
            }

            Effect::SendStop => {
                let channel = self.channel.clone();
                tokio::spawn(async move {
                    let mut guard = channel.lock().await;
                    if let Err(e) = guard.send_stop().await {
                        log::warn!("Failed to send stop signal: {}", e);
                    }
                });
            }

            Effect::StartPauseTimer { generation } => {
                tokio::spawn(async move {
                    tokio::time::sleep(PAUSE_THRESHOLD).await;
                    let _ = tx.send(Event::PauseElapsed { generation }).await;
                });
            }

            // Handled in the session loop, not here
            Effect::RenderQuestion { .. }
            | Effect::RenderAnswer { .. }
            | Effect::RenderNotice { .. }
            | Effect::EmitView => {
                unreachable!("render effects are handled in run_session_loop");
            }
        }
    }
}

/// Stub effect runner for testing: no devices, no sockets. Dispatched
/// questions are echoed back as a question event followed by a short
/// streamed answer, the way the backend responds.
pub struct StubEffectRunner;

impl StubEffectRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self)
    }
}

impl EffectRunner for StubEffectRunner {
    fn spawn(&self, effect: Effect, tx: mpsc::Sender<Event>) {
        use crate::channel::ServerEvent;

        match effect {
            Effect::StartCapture { source } => {
                tokio::spawn(async move {
                    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                    let _ = tx.send(Event::CaptureStarted { source }).await;
                });
            }

            Effect::StopCapture => {
                tokio::spawn(async move {
                    let _ = tx.send(Event::CaptureStopped).await;
                });
            }

            Effect::SendQuestion { text } => {
                tokio::spawn(async move {
                    let _ = tx
                        .send(Event::Server(ServerEvent::Question {
                            text: text.clone(),
                            timestamp: "00:00:00".to_string(),
                        }))
                        .await;
                    let _ = tx
                        .send(Event::Server(ServerEvent::AnswerChunk {
                            text: format!("Answer to: {}", text),
                            timestamp: "00:00:01".to_string(),
                        }))
                        .await;
                    let _ = tx
                        .send(Event::Server(ServerEvent::AnswerComplete {
                            timestamp: "00:00:02".to_string(),
                        }))
                        .await;
                });
            }

            Effect::SendStop => {
                tokio::spawn(async move {
                    let _ = tx
                        .send(Event::Server(ServerEvent::AnswerStopped {
                            message: "Answer stopped".to_string(),
                            timestamp: "00:00:03".to_string(),
                        }))
                        .await;
                });
            }

            Effect::StartPauseTimer { generation } => {
                tokio::spawn(async move {
                    tokio::time::sleep(PAUSE_THRESHOLD).await;
                    let _ = tx.send(Event::PauseElapsed { generation }).await;
                });
            }

            Effect::RenderQuestion { .. }
            | Effect::RenderAnswer { .. }
            | Effect::RenderNotice { .. }
            | Effect::EmitView => {
                unreachable!("render effects are handled in run_session_loop");
            }
        }
    }
}
