pub mod answer;
pub mod capture;
pub mod channel;
pub mod effects;
pub mod orchestrator;
pub mod queue;
pub mod settings;
pub mod stt;
pub mod transcript;

use serde::Serialize;
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use capture::CaptureSource;
use channel::{ws_url, ChannelError, SessionChannel};
use effects::{EffectRunner, LiveEffectRunner};
use orchestrator::{Effect, Event, Session, SessionState};

/// Snapshot of the session sent to the presentation layer.
/// Uses camelCase keys: { "status": "...", "capturing": true, ... }
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub status: String,
    pub state: &'static str,
    pub capturing: bool,
    pub answering: bool,
    pub interim_transcript: String,
    pub queued_questions: usize,
    pub answer_markdown: Option<String>,
    pub resume_summary: Option<String>,
}

/// Project the session onto its view
fn session_view(session: &Session) -> SessionView {
    SessionView {
        status: session.status().to_string(),
        state: match session.state() {
            SessionState::Idle => "idle",
            SessionState::AwaitingAnswer => "awaitingAnswer",
        },
        capturing: session.is_capturing(),
        answering: session.is_answering(),
        interim_transcript: session.interim_transcript().to_string(),
        queued_questions: session.queued_questions(),
        answer_markdown: session.answer_markdown().map(str::to_string),
        resume_summary: session.resume_summary().map(str::to_string),
    }
}

/// Presentation seam for the session loop. Render effects are handled
/// inline, in event order; everything behind this trait must be cheap.
pub trait RenderSurface: Send {
    /// An accepted question entered the conversation log
    fn show_question(&mut self, text: &str, timestamp: &str);
    /// Full re-render of the answer document with the accumulated text
    fn render_answer(&mut self, document: Uuid, markdown: &str);
    /// A locally relevant notice (stop acknowledgments, status text)
    fn show_notice(&mut self, text: &str);
    /// The session view changed
    fn show_view(&mut self, view: &SessionView);
}

/// Terminal renderer
pub struct ConsoleSurface {
    last_status: String,
}

impl ConsoleSurface {
    pub fn new() -> Self {
        Self {
            last_status: String::new(),
        }
    }
}

impl Default for ConsoleSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderSurface for ConsoleSurface {
    fn show_question(&mut self, text: &str, timestamp: &str) {
        if timestamp.is_empty() {
            println!("\n>> Q: {}", text);
        } else {
            println!("\n>> [{}] Q: {}", timestamp, text);
        }
    }

    fn render_answer(&mut self, _document: Uuid, markdown: &str) {
        // The answer grows chunk by chunk; repaint the whole document
        print!("\r\x1b[2K{}", markdown.lines().last().unwrap_or(markdown));
        use std::io::Write;
        let _ = std::io::stdout().flush();
    }

    fn show_notice(&mut self, text: &str) {
        println!("\n-- {}", text);
    }

    fn show_view(&mut self, view: &SessionView) {
        // Only repaint the status line when it changes
        if view.status != self.last_status {
            println!("\n[{}]", view.status);
            self.last_status = view.status.clone();
        }
        if !view.interim_transcript.is_empty() {
            print!("\r\x1b[2K... {}", view.interim_transcript);
            use std::io::Write;
            let _ = std::io::stdout().flush();
        }
    }
}

/// Run the session loop: drain events, apply them to the session one at a
/// time, execute the resulting effects. Render effects happen inline so
/// output ordering matches event ordering; the rest go to the runner.
pub async fn run_session_loop(
    mut rx: mpsc::Receiver<Event>,
    tx: mpsc::Sender<Event>,
    effect_runner: Arc<dyn EffectRunner>,
    surface: &mut dyn RenderSurface,
) {
    let mut session = Session::new();

    surface.show_view(&session_view(&session));
    log::info!("Session loop started");

    while let Some(event) = rx.recv().await {
        log::debug!("Received event: {:?}", event);

        // Handle Exit at the edge
        if matches!(event, Event::Exit) {
            log::info!("Exit requested, shutting down session loop");
            break;
        }

        let before = session.state();
        let effects = session.handle(event);
        let after = session.state();

        if before != after {
            log::info!("Session transition: {:?} -> {:?}", before, after);
        }

        for effect in effects {
            match effect {
                Effect::RenderQuestion { text, timestamp } => {
                    surface.show_question(&text, &timestamp)
                }
                Effect::RenderAnswer { document, markdown } => {
                    surface.render_answer(document, &markdown)
                }
                Effect::RenderNotice { text } => surface.show_notice(&text),
                Effect::EmitView => surface.show_view(&session_view(&session)),
                other => effect_runner.spawn(other, tx.clone()),
            }
        }
    }

    log::info!("Session loop ended");
}

/// Parse one line of terminal input into a session event. Blank lines
/// and unknown slash commands produce nothing; any other text is a
/// manually typed question.
pub fn parse_command(line: &str) -> Option<Event> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed {
        "/mic" => Some(Event::StartCapture {
            source: CaptureSource::Microphone,
        }),
        "/system" => Some(Event::StartCapture {
            source: CaptureSource::SystemAudio,
        }),
        "/stopcapture" => Some(Event::StopCapture),
        "/stop" => Some(Event::StopAnswer),
        "/quit" | "/exit" => Some(Event::Exit),
        other if other.starts_with('/') => {
            log::warn!("Unknown command: {}", other);
            None
        }
        question => Some(Event::SubmitQuestion {
            text: question.to_string(),
        }),
    }
}

/// Startup configuration, resolved from the environment by the binary.
#[derive(Debug, Clone)]
pub struct Config {
    /// Backend base URL (http/https)
    pub server_url: String,
    /// Transcription provider API key; capture fails without one
    pub stt_api_key: Option<String>,
}

/// Connect to the backend and run the interactive session until exit.
pub async fn run(config: Config) -> Result<(), ChannelError> {
    let http = reqwest::Client::new();
    let settings = settings::fetch_settings(&http, &config.server_url).await;

    let url = ws_url(&config.server_url, "/ws/interview");
    let mut channel = SessionChannel::connect(&url).await?;
    let mut server_rx = channel
        .take_incoming_receiver()
        .ok_or_else(|| ChannelError::ProtocolError("Receiver already taken".to_string()))?;
    let channel = Arc::new(Mutex::new(channel));

    let stt_api_key = config.stt_api_key.unwrap_or_else(|| {
        log::warn!("No transcription API key configured; audio capture will fail");
        String::new()
    });

    let effect_runner = LiveEffectRunner::new(channel.clone(), stt_api_key, settings.language);

    let (tx, rx) = mpsc::channel::<Event>(32);

    // Bridge inbound backend events into the session loop
    let server_tx = tx.clone();
    tokio::spawn(async move {
        while let Some(event) = server_rx.recv().await {
            if server_tx.send(Event::Server(event)).await.is_err() {
                return;
            }
        }
        let _ = server_tx.send(Event::ChannelClosed).await;
    });

    // Terminal input: commands and typed questions
    let input_tx = tx.clone();
    tokio::spawn(async move {
        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if let Some(event) = parse_command(&line) {
                        let exiting = matches!(event, Event::Exit);
                        if input_tx.send(event).await.is_err() || exiting {
                            break;
                        }
                    }
                }
                Ok(None) | Err(_) => {
                    let _ = input_tx.send(Event::Exit).await;
                    break;
                }
            }
        }
    });

    let mut surface = ConsoleSurface::new();
    run_session_loop(rx, tx, effect_runner, &mut surface).await;

    // Best effort close; the backend also handles abrupt drops
    if let Ok(channel) = Arc::try_unwrap(channel).map(|m| m.into_inner()) {
        channel.disconnect().await;
    }

    Ok(())
}
