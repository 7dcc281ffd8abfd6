//! Session coordination
//!
//! This module provides:
//! - Shared session state, commands and events
//! - The coordinator that routes events between the pipelines

pub mod coordinator;
pub mod state;

// Re-export commonly used types
pub use coordinator::{Coordinator, SessionHandle};
pub use state::{
    SessionCommand, SessionEvent, SessionSnapshot, SessionState, SharedSessionState,
    VoiceSessionState,
};
