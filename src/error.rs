//! Error types for the Parley voice controller

use thiserror::Error;

/// Parley application errors
#[derive(Error, Debug, Clone)]
pub enum ParleyError {
    /// No speech engine is available on this host
    #[error("Speech capture unavailable")]
    CaptureUnavailable,

    /// Speech recognition error
    #[error("Speech capture error: {0}")]
    CaptureError(String),

    /// Text-to-speech playback error
    #[error("Playback error: {0}")]
    PlaybackError(String),

    /// Project backend request error
    #[error("Backend error: {0}")]
    BackendError(String),

    /// Channel communication error
    #[error("Channel error: {0}")]
    ChannelError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// File system I/O error
    #[error("IO error: {0}")]
    IoError(String),
}

impl From<std::io::Error> for ParleyError {
    fn from(e: std::io::Error) -> Self {
        ParleyError::IoError(e.to_string())
    }
}

impl ParleyError {
    /// Check if this error is recoverable
    ///
    /// Recoverable errors allow the session to continue running,
    /// while non-recoverable errors may require user intervention or restart.
    pub fn is_recoverable(&self) -> bool {
        match self {
            // No speech engine at all: the adapter stays a permanent no-op
            ParleyError::CaptureUnavailable => false,
            // Mid-session recognition failures are transient
            ParleyError::CaptureError(_) => true,
            ParleyError::PlaybackError(_) => true,
            // Dispatch failures degrade to the fallback answer
            ParleyError::BackendError(_) => true,
            // Channel errors indicate internal issues
            ParleyError::ChannelError(_) => false,
            // Config errors require user intervention
            ParleyError::ConfigError(_) => false,
            ParleyError::IoError(_) => false,
        }
    }

    /// Get a user-friendly description of the error
    ///
    /// Returns a message suitable for display in the conversation surface.
    pub fn user_message(&self) -> String {
        match self {
            ParleyError::CaptureUnavailable => {
                "Voice input is not available. You can still type your questions.".to_string()
            }
            ParleyError::CaptureError(_) => {
                "Speech recognition failed. Please try again.".to_string()
            }
            ParleyError::PlaybackError(_) => {
                "Text-to-speech failed. Response will be shown as text.".to_string()
            }
            ParleyError::BackendError(_) => {
                "Failed to reach the project backend. Please try again.".to_string()
            }
            ParleyError::ChannelError(_) => {
                "Internal communication error. Please restart the application.".to_string()
            }
            ParleyError::ConfigError(_) => {
                "Configuration error. Please check settings.".to_string()
            }
            ParleyError::IoError(_) => "File system error occurred.".to_string(),
        }
    }
}

/// Result type alias for Parley operations
pub type Result<T> = std::result::Result<T, ParleyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverability() {
        assert!(!ParleyError::CaptureUnavailable.is_recoverable());
        assert!(ParleyError::CaptureError("mic".into()).is_recoverable());
        assert!(ParleyError::BackendError("timeout".into()).is_recoverable());
        assert!(!ParleyError::ChannelError("closed".into()).is_recoverable());
        assert!(!ParleyError::ConfigError("bad url".into()).is_recoverable());
    }

    #[test]
    fn test_from_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: ParleyError = io.into();
        assert!(matches!(err, ParleyError::IoError(_)));
    }

    #[test]
    fn test_user_messages_are_nonempty() {
        let errors = vec![
            ParleyError::CaptureUnavailable,
            ParleyError::CaptureError("x".into()),
            ParleyError::PlaybackError("x".into()),
            ParleyError::BackendError("x".into()),
            ParleyError::ChannelError("x".into()),
            ParleyError::ConfigError("x".into()),
            ParleyError::IoError("x".into()),
        ];
        for err in errors {
            assert!(!err.user_message().is_empty());
        }
    }
}
