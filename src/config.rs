//! Configuration for a voice chat session
//!
//! Centralized configuration for the coordinator and all adapters.

use crate::{ParleyError, Result};
use serde::Deserialize;
use std::path::Path;

/// Configuration for one voice chat session
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Base URL of the project backend (e.g. "http://127.0.0.1:8000")
    pub backend_url: String,

    /// Base URL of the external speech service
    ///
    /// None means the host provides no speech engine: capture becomes a
    /// permanent no-op and answers are not spoken.
    pub speech_url: Option<String>,

    /// Project whose documents back the conversation
    pub project_id: i64,

    /// Project name used in the greeting message
    pub project_name: String,

    /// Timeout for one ask request in seconds
    pub ask_timeout_secs: u64,

    /// Timeout for one listening session in seconds
    pub listen_timeout_secs: u64,

    /// Buffer size for command/event channels
    pub channel_buffer_size: usize,

    /// Whether playback completion re-arms listening automatically
    pub auto_rearm: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            backend_url: "http://127.0.0.1:8000".to_string(),
            speech_url: None,
            project_id: 1,
            project_name: String::new(),
            ask_timeout_secs: 12,
            listen_timeout_secs: 30,
            channel_buffer_size: 100,
            auto_rearm: true,
        }
    }
}

impl SessionConfig {
    pub fn new(backend_url: impl Into<String>, project_id: i64) -> Self {
        Self {
            backend_url: backend_url.into(),
            project_id,
            ..Default::default()
        }
    }

    /// Load configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|e| ParleyError::ConfigError(format!("Invalid config file: {}", e)))
    }

    /// Set the speech service URL
    pub fn with_speech_url(mut self, url: impl Into<String>) -> Self {
        self.speech_url = Some(url.into());
        self
    }

    /// Set the project name for the greeting
    pub fn with_project_name(mut self, name: impl Into<String>) -> Self {
        self.project_name = name.into();
        self
    }

    /// Set the ask request timeout
    pub fn with_ask_timeout_secs(mut self, secs: u64) -> Self {
        self.ask_timeout_secs = secs;
        self
    }

    /// Disable automatic re-listening after playback ends
    pub fn without_auto_rearm(mut self) -> Self {
        self.auto_rearm = false;
        self
    }

    /// Apply environment overrides (PARLEY_BACKEND_URL, PARLEY_SPEECH_URL,
    /// PARLEY_PROJECT_ID)
    pub fn apply_env(mut self) -> Self {
        if let Ok(url) = std::env::var("PARLEY_BACKEND_URL") {
            self.backend_url = url;
        }
        if let Ok(url) = std::env::var("PARLEY_SPEECH_URL") {
            if !url.is_empty() {
                self.speech_url = Some(url);
            }
        }
        if let Ok(id) = std::env::var("PARLEY_PROJECT_ID") {
            if let Ok(id) = id.parse() {
                self.project_id = id;
            }
        }
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.backend_url.trim().is_empty() {
            return Err(ParleyError::ConfigError("Backend URL is required".into()));
        }
        if self.project_id <= 0 {
            return Err(ParleyError::ConfigError(format!(
                "Invalid project id: {}",
                self.project_id
            )));
        }
        if self.ask_timeout_secs == 0 {
            return Err(ParleyError::ConfigError(
                "Ask timeout must be non-zero".into(),
            ));
        }
        if self.channel_buffer_size == 0 {
            return Err(ParleyError::ConfigError(
                "Channel buffer size must be non-zero".into(),
            ));
        }
        Ok(())
    }
}
