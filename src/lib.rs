//! Parley - Voice-driven project assistant controller
//!
//! This crate provides a hands-free interface for asking questions about a
//! project: speech capture, intent classification, question dispatch to a
//! project backend, and spoken answers, coordinated by a single session
//! state machine.

pub mod backend;
pub mod chat;
pub mod config;
pub mod error;
pub mod intent;
pub mod session;
pub mod speech;

// Re-export error types
pub use error::{ParleyError, Result};

// Re-export configuration
pub use config::SessionConfig;

// Re-export session types
pub use session::{
    Coordinator, SessionCommand, SessionEvent, SessionHandle, SessionSnapshot, SessionState,
    SharedSessionState, VoiceSessionState,
};
