//! Shared session state for the voice interaction controller
//!
//! This module provides a thread-safe shared state that can be accessed by:
//! - **Coordinator**: Writes state changes based on pipeline events
//! - **Frontend**: Reads state for rendering, sends commands
//! - **Tests**: Read state for assertions, send commands
//!
//! The design separates:
//! - **State**: Shared data that can be queried synchronously
//! - **Commands**: Requests to change state (sent to the coordinator)
//! - **Events**: Notifications for frontend updates (messages, errors)

use crate::chat::ChatMessage;
use crate::intent::NavDirection;
use parking_lot::RwLock;
use std::sync::Arc;

/// Voice session lifecycle state
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum VoiceSessionState {
    /// Nothing in flight, microphone closed
    #[default]
    Idle,
    /// Microphone open, waiting for one utterance
    Listening,
    /// Question dispatched, waiting for the answer
    AwaitingAnswer,
    /// Answer playing back
    Speaking,
}

impl VoiceSessionState {
    /// Check if the microphone is open
    pub fn is_listening(&self) -> bool {
        matches!(self, VoiceSessionState::Listening)
    }

    /// Check if a question is in flight
    pub fn is_awaiting_answer(&self) -> bool {
        matches!(self, VoiceSessionState::AwaitingAnswer)
    }

    /// Check if an answer is playing back
    pub fn is_speaking(&self) -> bool {
        matches!(self, VoiceSessionState::Speaking)
    }

    /// Check if idle
    pub fn is_idle(&self) -> bool {
        matches!(self, VoiceSessionState::Idle)
    }

    /// Check if in an active state (not idle)
    pub fn is_active(&self) -> bool {
        !self.is_idle()
    }
}

impl std::fmt::Display for VoiceSessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VoiceSessionState::Idle => write!(f, "Idle"),
            VoiceSessionState::Listening => write!(f, "Listening"),
            VoiceSessionState::AwaitingAnswer => write!(f, "AwaitingAnswer"),
            VoiceSessionState::Speaking => write!(f, "Speaking"),
        }
    }
}

/// Unified session state
///
/// This is the single source of truth for session state.
/// It can be shared across threads using `SharedSessionState`.
#[derive(Clone, Debug)]
pub struct SessionState {
    /// Voice interaction lifecycle state
    pub voice: VoiceSessionState,
    /// Monotonic counter separating interaction rounds; responses carrying
    /// an older generation are stale and must be dropped
    pub generation: u64,
    /// Whether the voice surface is currently visible to the user
    pub visible: bool,
    /// Whether a speech recognizer is available on this host
    pub capture_available: bool,
    /// Last transcript captured from the user
    pub last_transcript: Option<String>,
    /// Last answer received from the backend
    pub last_answer: Option<String>,
    /// Current error (if any)
    pub error: Option<String>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            voice: VoiceSessionState::Idle,
            generation: 0,
            visible: true,
            capture_available: true,
            last_transcript: None,
            last_answer: None,
            error: None,
        }
    }
}

impl SessionState {
    /// Create a new default state
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an immutable snapshot of current state
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            voice: self.voice,
            generation: self.generation,
            visible: self.visible,
            capture_available: self.capture_available,
            last_transcript: self.last_transcript.clone(),
            last_answer: self.last_answer.clone(),
            error: self.error.clone(),
        }
    }

    /// Set an error
    pub fn set_error(&mut self, error: String) {
        self.error = Some(error);
    }

    /// Clear the current error
    pub fn clear_error(&mut self) {
        self.error = None;
    }

    // === State transitions ===

    /// Open the microphone for a new interaction round
    ///
    /// Bumps the generation so anything still in flight from the previous
    /// round is recognizably stale.
    pub fn begin_listening(&mut self) {
        self.generation += 1;
        self.voice = VoiceSessionState::Listening;
        self.last_transcript = None;
        self.clear_error();
    }

    /// Stop the session and return to idle
    ///
    /// Also bumps the generation: a stop invalidates any in-flight work.
    pub fn stop(&mut self) {
        self.generation += 1;
        self.voice = VoiceSessionState::Idle;
    }

    /// A question has been dispatched to the backend
    pub fn begin_awaiting(&mut self, transcript: String) {
        self.last_transcript = Some(transcript);
        self.voice = VoiceSessionState::AwaitingAnswer;
    }

    /// An answer has arrived and playback is starting
    pub fn begin_speaking(&mut self, answer: String) {
        self.last_answer = Some(answer);
        self.voice = VoiceSessionState::Speaking;
    }

    /// Return to idle without invalidating the generation
    ///
    /// Used when a round ends on its own (silence, navigation, playback
    /// finished with re-arm disabled) rather than by an explicit stop.
    pub fn settle(&mut self) {
        self.voice = VoiceSessionState::Idle;
    }
}

/// Immutable snapshot of session state
///
/// Used for event emission and thread-safe reads without holding locks.
#[derive(Clone, Debug)]
pub struct SessionSnapshot {
    pub voice: VoiceSessionState,
    pub generation: u64,
    pub visible: bool,
    pub capture_available: bool,
    pub last_transcript: Option<String>,
    pub last_answer: Option<String>,
    pub error: Option<String>,
}

/// Thread-safe shared session state
///
/// This wraps `SessionState` in `Arc<RwLock<>>` for safe concurrent access.
#[derive(Clone)]
pub struct SharedSessionState {
    inner: Arc<RwLock<SessionState>>,
}

impl Default for SharedSessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedSessionState {
    /// Create a new shared state
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(SessionState::new())),
        }
    }

    /// Get a read lock on the state
    pub fn read(&self) -> parking_lot::RwLockReadGuard<'_, SessionState> {
        self.inner.read()
    }

    /// Get a write lock on the state
    pub fn write(&self) -> parking_lot::RwLockWriteGuard<'_, SessionState> {
        self.inner.write()
    }

    /// Get a snapshot of current state (no lock held after return)
    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.read().snapshot()
    }

    // === Convenience read methods ===

    /// Get the current lifecycle state
    pub fn voice_state(&self) -> VoiceSessionState {
        self.inner.read().voice
    }

    /// Check if the microphone is open
    pub fn is_listening(&self) -> bool {
        self.inner.read().voice.is_listening()
    }

    /// Check if a question is in flight
    pub fn is_awaiting_answer(&self) -> bool {
        self.inner.read().voice.is_awaiting_answer()
    }

    /// Check if an answer is playing back
    pub fn is_speaking(&self) -> bool {
        self.inner.read().voice.is_speaking()
    }

    /// Check if the session is idle
    pub fn is_idle(&self) -> bool {
        self.inner.read().voice.is_idle()
    }

    /// Get the current generation
    pub fn generation(&self) -> u64 {
        self.inner.read().generation
    }

    /// Check if the voice surface is visible
    pub fn is_visible(&self) -> bool {
        self.inner.read().visible
    }

    /// Check if a speech recognizer is available
    pub fn capture_available(&self) -> bool {
        self.inner.read().capture_available
    }

    /// Get the last captured transcript
    pub fn last_transcript(&self) -> Option<String> {
        self.inner.read().last_transcript.clone()
    }

    /// Get the last backend answer
    pub fn last_answer(&self) -> Option<String> {
        self.inner.read().last_answer.clone()
    }

    /// Get the current error (if any)
    pub fn error(&self) -> Option<String> {
        self.inner.read().error.clone()
    }
}

/// Commands that can be sent to control the session
///
/// These are processed by the coordinator and result in state changes.
#[derive(Clone, Debug)]
pub enum SessionCommand {
    /// Start a voice interaction round (no-op while one is active)
    Start,
    /// Stop the session and discard in-flight work (no-op while idle)
    Stop,
    /// The host surface became visible (true) or hidden (false)
    Visibility(bool),
    /// Send text directly as a question (bypasses speech capture)
    SendText(String),
    /// The watched video changed; inject a context hint at most once per id
    VideoChanged {
        video_id: String,
        name: String,
        description: Option<String>,
    },
    /// Clear the conversation log
    ResetConversation,
    /// Shutdown all pipelines
    Shutdown,
}

/// Events emitted by the session
///
/// These are used for frontend updates and logging. State should be queried
/// directly from `SharedSessionState` rather than reconstructed from events.
#[derive(Clone, Debug)]
pub enum SessionEvent {
    /// State has changed (trigger a repaint)
    StateChanged,
    /// A message was appended to the conversation
    Message(ChatMessage),
    /// The user asked to navigate away from the current view
    Navigate(NavDirection),
    /// Error occurred
    Error(String),
    /// Shutdown complete
    Shutdown,
}
