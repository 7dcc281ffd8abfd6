//! Session coordinator for the voice interaction pipelines
//!
//! This module provides the coordinator that owns all concurrent pipelines:
//! - Speech capture
//! - Question dispatch to the project backend
//! - Speech playback
//!
//! The coordinator uses a shared `SessionState` that can be queried by:
//! - Frontend for rendering
//! - Tests for assertions
//!
//! State changes are made by the coordinator in response to:
//! - External commands (from the frontend or tests)
//! - Internal pipeline events (transcripts, answers, playback completion)
//!
//! Every in-flight piece of work carries the generation it was issued under;
//! events whose generation no longer matches the session's are dropped, so a
//! stop (or a restart) cleanly cuts off whatever was pending.

use crate::backend::{AskCommand, AskEvent, AskPipeline, BackendClient};
use crate::chat::{ChatLog, ChatMessage};
use crate::config::SessionConfig;
use crate::intent::{classify, Intent};
use crate::session::state::{SessionCommand, SessionEvent, SharedSessionState};
use crate::speech::{
    CaptureAdapter, CaptureEvent, CaptureWorker, HttpRecognizer, HttpSynthesizer,
    NullSynthesizer, PlaybackAdapter, PlaybackEvent, PlaybackWorker, SpeechRecognizer,
    SpeechSynthesizer,
};
use crate::{ParleyError, Result};
use crossbeam_channel::{bounded, select, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Shutdown timeout for the pipeline handshake
const SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(5000);

/// Handle for controlling the session from the frontend or tests
///
/// This provides the public interface for:
/// - Sending commands
/// - Receiving events (for frontend updates)
/// - Querying state (via SharedSessionState)
/// - Reading the conversation log
pub struct SessionHandle {
    /// Command sender for controlling the coordinator
    command_tx: Sender<SessionCommand>,
    /// Event receiver for frontend notifications
    event_rx: Receiver<SessionEvent>,
    /// Shared session state (for direct queries)
    state: SharedSessionState,
    /// Conversation log
    chat: ChatLog,
}

impl SessionHandle {
    /// Send a command to the coordinator
    pub fn send_command(&self, cmd: SessionCommand) -> Result<()> {
        self.command_tx
            .send(cmd)
            .map_err(|e| ParleyError::ChannelError(format!("Failed to send command: {}", e)))
    }

    /// Start a voice interaction round
    pub fn start(&self) -> Result<()> {
        self.send_command(SessionCommand::Start)
    }

    /// Stop the session and discard in-flight work
    pub fn stop(&self) -> Result<()> {
        self.send_command(SessionCommand::Stop)
    }

    /// Report a visibility change of the host surface
    pub fn set_visibility(&self, visible: bool) -> Result<()> {
        self.send_command(SessionCommand::Visibility(visible))
    }

    /// Send text directly as a question (bypasses speech capture)
    pub fn send_text(&self, text: String) -> Result<()> {
        self.send_command(SessionCommand::SendText(text))
    }

    /// Report that the watched video changed
    pub fn video_changed(
        &self,
        video_id: impl Into<String>,
        name: impl Into<String>,
        description: Option<String>,
    ) -> Result<()> {
        self.send_command(SessionCommand::VideoChanged {
            video_id: video_id.into(),
            name: name.into(),
            description,
        })
    }

    /// Clear the conversation log
    pub fn reset_conversation(&self) -> Result<()> {
        self.send_command(SessionCommand::ResetConversation)
    }

    /// Request shutdown
    pub fn shutdown(&self) -> Result<()> {
        self.send_command(SessionCommand::Shutdown)
    }

    /// Try to receive an event (non-blocking)
    pub fn try_recv_event(&self) -> Option<SessionEvent> {
        self.event_rx.try_recv().ok()
    }

    /// Receive an event (blocking)
    pub fn recv_event(&self) -> Result<SessionEvent> {
        self.event_rx
            .recv()
            .map_err(|e| ParleyError::ChannelError(format!("Failed to receive event: {}", e)))
    }

    /// Receive an event with a timeout
    pub fn recv_event_timeout(&self, timeout: Duration) -> Option<SessionEvent> {
        self.event_rx.recv_timeout(timeout).ok()
    }

    /// Get the shared session state
    ///
    /// This can be used to query state directly without events.
    pub fn state(&self) -> &SharedSessionState {
        &self.state
    }

    /// Get the conversation log
    pub fn chat(&self) -> &ChatLog {
        &self.chat
    }

    // === Convenience state query methods ===

    /// Check if the microphone is open
    pub fn is_listening(&self) -> bool {
        self.state.is_listening()
    }

    /// Check if a question is in flight
    pub fn is_awaiting_answer(&self) -> bool {
        self.state.is_awaiting_answer()
    }

    /// Check if an answer is playing back
    pub fn is_speaking(&self) -> bool {
        self.state.is_speaking()
    }

    /// Check if the session is idle
    pub fn is_idle(&self) -> bool {
        self.state.is_idle()
    }

    /// Get the last captured transcript
    pub fn last_transcript(&self) -> Option<String> {
        self.state.last_transcript()
    }

    /// Get the last backend answer
    pub fn last_answer(&self) -> Option<String> {
        self.state.last_answer()
    }
}

/// Coordinator that owns all concurrent pipelines
///
/// The coordinator manages the lifecycle of:
/// - Capture worker for speech-to-text
/// - Ask pipeline for backend question dispatch
/// - Playback worker for text-to-speech
///
/// It routes events between these components, updates shared state,
/// and emits events for frontend notifications.
pub struct Coordinator {
    config: SessionConfig,

    // Shared state
    state: SharedSessionState,
    chat: ChatLog,

    // Channels for external communication
    command_rx: Receiver<SessionCommand>,
    event_tx: Sender<SessionEvent>,

    // Pipeline components (to be started)
    capture: Option<CaptureAdapter>,
    capture_worker: Option<CaptureWorker>,
    playback: Option<PlaybackAdapter>,
    playback_worker: Option<PlaybackWorker>,
    ask_pipeline: Option<AskPipeline>,
}

impl Coordinator {
    /// Create a coordinator with engines built from the configuration
    ///
    /// When `speech_url` is set, capture and playback talk to the external
    /// speech service; otherwise capture is a permanent no-op and playback
    /// completes instantly, so answers still flow through the same states.
    pub fn new(config: SessionConfig) -> Result<(Self, SessionHandle)> {
        let (recognizer, synthesizer): (
            Option<Box<dyn SpeechRecognizer>>,
            Box<dyn SpeechSynthesizer>,
        ) = match &config.speech_url {
            Some(url) => (
                Some(Box::new(HttpRecognizer::new(
                    url.clone(),
                    config.listen_timeout_secs,
                )?)),
                Box::new(HttpSynthesizer::new(url.clone())?),
            ),
            None => (None, Box::new(NullSynthesizer)),
        };

        Self::with_engines(config, recognizer, synthesizer)
    }

    /// Create a coordinator with explicit speech engines
    ///
    /// Pass `None` for the recognizer to model a host without a speech
    /// engine. Used by tests to drive the session with scripted engines.
    pub fn with_engines(
        config: SessionConfig,
        recognizer: Option<Box<dyn SpeechRecognizer>>,
        synthesizer: Box<dyn SpeechSynthesizer>,
    ) -> Result<(Self, SessionHandle)> {
        config.validate()?;
        let buffer_size = config.channel_buffer_size;

        // Create shared state
        let state = SharedSessionState::new();
        let chat = ChatLog::new();

        // Create external communication channels
        let (command_tx, command_rx) = bounded(buffer_size);
        let (event_tx, event_rx) = bounded(buffer_size);

        // Create the capture adapter (a permanent no-op without an engine)
        let (capture, capture_worker) = match recognizer {
            Some(recognizer) => {
                let (adapter, worker) = CaptureAdapter::new(recognizer, buffer_size);
                (adapter, Some(worker))
            }
            None => (CaptureAdapter::unavailable(), None),
        };
        state.write().capture_available = capture.is_available();

        // Create the playback adapter
        let (playback, playback_worker) = PlaybackAdapter::new(synthesizer, buffer_size);

        // Create the ask pipeline
        let client = BackendClient::new(config.backend_url.clone(), config.ask_timeout_secs)?;
        let ask_pipeline = AskPipeline::new(client, buffer_size);

        // Seed the conversation with the greeting
        if !config.project_name.is_empty() {
            chat.push(ChatMessage::greeting(&config.project_name));
        }

        let handle = SessionHandle {
            command_tx,
            event_rx,
            state: state.clone(),
            chat: chat.clone(),
        };

        let coordinator = Self {
            config,
            state,
            chat,
            command_rx,
            event_tx,
            capture: Some(capture),
            capture_worker,
            playback: Some(playback),
            playback_worker: Some(playback_worker),
            ask_pipeline: Some(ask_pipeline),
        };

        Ok((coordinator, handle))
    }

    /// Start the coordinator and all pipelines
    ///
    /// This consumes the coordinator and returns join handles for all worker
    /// threads. The coordinator runs in its own thread and routes events
    /// between the pipelines.
    pub fn start(mut self) -> Result<Vec<JoinHandle<()>>> {
        let mut handles = Vec::new();

        // Start the capture worker (absent on hosts without a speech engine)
        if let Some(worker) = self.capture_worker.take() {
            handles.push(worker.start()?);
            info!("Capture worker started");
        } else {
            info!("No speech engine configured, capture disabled");
        }

        // Start the playback worker
        let playback_worker = self
            .playback_worker
            .take()
            .ok_or_else(|| ParleyError::ChannelError("Playback worker already taken".into()))?;
        handles.push(playback_worker.start()?);
        info!("Playback worker started");

        // Start the ask pipeline worker
        let ask_pipeline = self
            .ask_pipeline
            .take()
            .ok_or_else(|| ParleyError::ChannelError("Ask pipeline already taken".into()))?;
        let ask_command_tx = ask_pipeline.command_sender();
        let ask_event_rx = ask_pipeline.event_receiver();
        handles.push(ask_pipeline.start_worker()?);
        info!("Ask pipeline worker started");

        let capture = self
            .capture
            .take()
            .ok_or_else(|| ParleyError::ChannelError("Capture adapter already taken".into()))?;
        let playback = self
            .playback
            .take()
            .ok_or_else(|| ParleyError::ChannelError("Playback adapter already taken".into()))?;

        // Start the main coordinator loop
        handles.push(self.run_coordinator_loop(capture, playback, ask_command_tx, ask_event_rx));
        info!("Coordinator loop started");

        Ok(handles)
    }

    /// Run the main coordinator event loop
    fn run_coordinator_loop(
        self,
        capture: CaptureAdapter,
        playback: PlaybackAdapter,
        ask_command_tx: Sender<AskCommand>,
        ask_event_rx: Receiver<AskEvent>,
    ) -> JoinHandle<()> {
        let config = self.config;
        let state = self.state;
        let chat = self.chat;
        let command_rx = self.command_rx;
        let event_tx = self.event_tx;

        let capture_event_rx = capture.event_receiver();
        let playback_event_rx = playback.event_receiver();

        thread::spawn(move || {
            info!("Coordinator main loop starting");

            // Opens the microphone for a new round. Bumps the generation so
            // anything left over from the previous round is stale.
            let begin_listening = |state: &SharedSessionState| -> bool {
                if !capture.is_available() {
                    return false;
                }
                state.write().begin_listening();
                let generation = state.generation();
                if let Err(e) = capture.listen(generation) {
                    error!("Failed to start listening: {}", e);
                    let mut s = state.write();
                    s.set_error(e.to_string());
                    s.settle();
                    return false;
                }
                debug!(generation, "listening started");
                true
            };

            // Dispatches one question to the backend under the current
            // generation and records the user's message.
            let dispatch_question = |question: String| {
                let message = ChatMessage::user(question.clone());
                chat.push(message.clone());
                let _ = event_tx.send(SessionEvent::Message(message));

                state.write().begin_awaiting(question.clone());
                let generation = state.generation();
                debug!(generation, question = %question, "dispatching question");

                if let Err(e) = ask_command_tx.send(AskCommand::Ask {
                    project_id: config.project_id,
                    question,
                    request_id: Uuid::new_v4(),
                    generation,
                }) {
                    error!("Failed to dispatch question: {}", e);
                    let mut s = state.write();
                    s.set_error(e.to_string());
                    s.settle();
                }
                let _ = event_tx.send(SessionEvent::StateChanged);
            };

            // Ends a round: re-arm listening when configured and possible,
            // otherwise return to idle.
            let settle_or_rearm = |state: &SharedSessionState| {
                let rearm =
                    config.auto_rearm && state.is_visible() && capture.is_available();
                if !(rearm && begin_listening(state)) {
                    state.write().settle();
                }
                let _ = event_tx.send(SessionEvent::StateChanged);
            };

            loop {
                select! {
                    // Handle external commands
                    recv(command_rx) -> cmd => {
                        match cmd {
                            Ok(SessionCommand::Start) => {
                                if !state.is_idle() {
                                    debug!("Start ignored: session already active");
                                } else if !capture.is_available() {
                                    warn!("Start ignored: no speech engine");
                                } else if begin_listening(&state) {
                                    let _ = event_tx.send(SessionEvent::StateChanged);
                                }
                            }

                            Ok(SessionCommand::Stop) => {
                                if state.is_idle() {
                                    debug!("Stop ignored: session already idle");
                                } else {
                                    capture.stop();
                                    playback.cancel();
                                    state.write().stop();
                                    let _ = event_tx.send(SessionEvent::StateChanged);
                                    debug!("Session stopped");
                                }
                            }

                            Ok(SessionCommand::Visibility(visible)) => {
                                state.write().visible = visible;
                                if visible {
                                    if state.is_idle()
                                        && capture.is_available()
                                        && begin_listening(&state)
                                    {
                                        debug!("Surface visible, listening resumed");
                                    }
                                } else if !state.is_idle() {
                                    capture.stop();
                                    playback.cancel();
                                    state.write().stop();
                                    debug!("Surface hidden, session stopped");
                                }
                                let _ = event_tx.send(SessionEvent::StateChanged);
                            }

                            Ok(SessionCommand::SendText(text)) => {
                                let text = text.trim().to_string();
                                if text.is_empty() {
                                    debug!("Empty text ignored");
                                } else if state.is_awaiting_answer() || state.is_speaking() {
                                    // At most one question in flight; sends are
                                    // dropped until the current round resolves
                                    debug!("Text ignored: previous question still unresolved");
                                } else {
                                    // Typed input preempts an open microphone
                                    if state.is_listening() {
                                        capture.stop();
                                    }
                                    dispatch_question(text);
                                }
                            }

                            Ok(SessionCommand::VideoChanged { video_id, name, description }) => {
                                let message =
                                    ChatMessage::video_context(&name, description.as_deref());
                                if chat.push_video_context(&video_id, message.clone()) {
                                    debug!(video_id = %video_id, "video context injected");
                                    let _ = event_tx.send(SessionEvent::Message(message));
                                } else {
                                    debug!(video_id = %video_id, "video context already seen");
                                }
                            }

                            Ok(SessionCommand::ResetConversation) => {
                                chat.clear();
                                if !config.project_name.is_empty() {
                                    chat.push(ChatMessage::greeting(&config.project_name));
                                }
                                let _ = event_tx.send(SessionEvent::StateChanged);
                                debug!("Conversation reset");
                            }

                            Ok(SessionCommand::Shutdown) => {
                                info!("Shutdown requested");

                                // Send shutdown to all pipelines
                                let _ = capture.shutdown();
                                let _ = playback.shutdown();
                                let _ = ask_command_tx.send(AskCommand::Shutdown);

                                // Wait for shutdown events with timeout
                                let mut capture_shutdown = !capture.is_available();
                                let mut playback_shutdown = false;
                                let mut ask_shutdown = false;

                                let deadline = std::time::Instant::now() + SHUTDOWN_TIMEOUT;

                                while !(capture_shutdown && playback_shutdown && ask_shutdown) {
                                    if std::time::Instant::now() > deadline {
                                        warn!("Shutdown timeout reached, forcing exit");
                                        break;
                                    }

                                    if !capture_shutdown {
                                        if let Ok(event) = capture_event_rx.recv_timeout(Duration::from_millis(100)) {
                                            if matches!(event, CaptureEvent::Shutdown) {
                                                capture_shutdown = true;
                                                debug!("Capture shutdown confirmed");
                                            }
                                        }
                                    }

                                    if let Ok(event) = playback_event_rx.recv_timeout(Duration::from_millis(10)) {
                                        if matches!(event, PlaybackEvent::Shutdown) {
                                            playback_shutdown = true;
                                            debug!("Playback shutdown confirmed");
                                        }
                                    }

                                    if let Ok(event) = ask_event_rx.recv_timeout(Duration::from_millis(10)) {
                                        if matches!(event, AskEvent::Shutdown) {
                                            ask_shutdown = true;
                                            debug!("Ask pipeline shutdown confirmed");
                                        }
                                    }
                                }

                                let _ = event_tx.send(SessionEvent::Shutdown);
                                info!("Coordinator shutdown complete");
                                return;
                            }

                            Err(_) => {
                                warn!("Command channel disconnected");
                                break;
                            }
                        }
                    }

                    // Handle capture events
                    recv(capture_event_rx) -> event => {
                        match event {
                            Ok(CaptureEvent::Started { generation }) => {
                                debug!(generation, "microphone live");
                            }

                            Ok(CaptureEvent::Transcript { text, generation }) => {
                                if generation != state.generation() {
                                    warn!(generation, current = state.generation(),
                                          "stale transcript dropped");
                                } else {
                                    debug!(generation, transcript = %text, "transcript received");
                                    match classify(&text) {
                                        Some(Intent::Navigate(direction)) => {
                                            info!(?direction, "navigation requested");
                                            let _ = event_tx.send(SessionEvent::Navigate(direction));
                                            state.write().settle();
                                            let _ = event_tx.send(SessionEvent::StateChanged);
                                        }
                                        Some(Intent::Question(question)) => {
                                            dispatch_question(question);
                                        }
                                        None => {
                                            debug!("Empty transcript, settling");
                                            state.write().settle();
                                            let _ = event_tx.send(SessionEvent::StateChanged);
                                        }
                                    }
                                }
                            }

                            Ok(CaptureEvent::Silence { generation }) => {
                                if generation == state.generation() {
                                    debug!(generation, "no speech detected, settling");
                                    state.write().settle();
                                    let _ = event_tx.send(SessionEvent::StateChanged);
                                }
                            }

                            Ok(CaptureEvent::Error { error, generation }) => {
                                if generation == state.generation() {
                                    error!("Capture error: {}", error);
                                    {
                                        let mut s = state.write();
                                        s.set_error(format!("Capture error: {}", error));
                                        s.settle();
                                    }
                                    let _ = event_tx.send(SessionEvent::Error(format!("Capture error: {}", error)));
                                    let _ = event_tx.send(SessionEvent::StateChanged);
                                }
                            }

                            Ok(CaptureEvent::Shutdown) => {
                                debug!("Capture shutdown event received");
                            }

                            Err(_) => {
                                warn!("Capture event channel disconnected");
                            }
                        }
                    }

                    // Handle ask pipeline events
                    recv(ask_event_rx) -> event => {
                        match event {
                            Ok(AskEvent::Answer { text, request_id, generation }) => {
                                if generation != state.generation() {
                                    // Stale answers leave no trace: no message,
                                    // no playback, no state change
                                    warn!(%request_id, generation, current = state.generation(),
                                          "stale answer dropped");
                                } else {
                                    debug!(%request_id, generation, "answer received");
                                    chat.push(ChatMessage::assistant(text.clone()));
                                    if let Some(message) = chat.last() {
                                        let _ = event_tx.send(SessionEvent::Message(message));
                                    }

                                    state.write().begin_speaking(text.clone());
                                    if let Err(e) = playback.speak(text, request_id, generation) {
                                        error!("Failed to start playback: {}", e);
                                        let mut s = state.write();
                                        s.set_error(e.to_string());
                                        s.settle();
                                    }
                                    let _ = event_tx.send(SessionEvent::StateChanged);
                                }
                            }

                            Ok(AskEvent::Shutdown) => {
                                debug!("Ask pipeline shutdown event received");
                            }

                            Err(_) => {
                                warn!("Ask event channel disconnected");
                            }
                        }
                    }

                    // Handle playback events
                    recv(playback_event_rx) -> event => {
                        match event {
                            Ok(PlaybackEvent::Started { request_id, generation }) => {
                                debug!(%request_id, generation, "playback started");
                            }

                            Ok(PlaybackEvent::Complete { request_id, generation }) => {
                                if generation == state.generation() {
                                    debug!(%request_id, generation, "playback complete");
                                    settle_or_rearm(&state);
                                }
                            }

                            Ok(PlaybackEvent::Interrupted { request_id, generation }) => {
                                // Interruptions are the fallout of a stop or a
                                // newer utterance; the session already moved on
                                debug!(%request_id, generation, "playback interrupted");
                            }

                            Ok(PlaybackEvent::Error { error, request_id, generation }) => {
                                if generation == state.generation() {
                                    error!(%request_id, "Playback error: {}", error);
                                    state.write().set_error(format!("Playback error: {}", error));
                                    let _ = event_tx.send(SessionEvent::Error(format!("Playback error: {}", error)));
                                    // The answer is already in the log; end the
                                    // round the same way a completion would
                                    settle_or_rearm(&state);
                                }
                            }

                            Ok(PlaybackEvent::Shutdown) => {
                                debug!("Playback shutdown event received");
                            }

                            Err(_) => {
                                warn!("Playback event channel disconnected");
                            }
                        }
                    }

                    // Default timeout to prevent busy-waiting
                    default(Duration::from_millis(10)) => {
                        // No events, continue loop
                    }
                }
            }

            info!("Coordinator main loop exiting");
        })
    }
}
