use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Starter questions the chat surface can render and submit as typed text
pub const SUGGESTED_QUESTIONS: &[&str] = &[
    "What is the main goal of this project?",
    "What is the marketing strategy?",
    "Can you explain the demo video?",
    "What are the risks and challenges?",
    "What is the rollout timeline?",
    "What are the expected budget and ROI?",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sender {
    User,
    Assistant,
}

impl std::fmt::Display for Sender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Sender::User => write!(f, "user"),
            Sender::Assistant => write!(f, "assistant"),
        }
    }
}

/// Rendering hint for a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    /// Regular conversation turn
    Normal,
    /// Assistant-injected hint (greeting follow-ups, video context)
    Suggestion,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub sender: Sender,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub kind: MessageKind,
}

impl ChatMessage {
    pub fn new(sender: Sender, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender,
            content: content.into(),
            timestamp: Utc::now(),
            kind: MessageKind::Normal,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Sender::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Sender::Assistant, content)
    }

    pub fn with_kind(mut self, kind: MessageKind) -> Self {
        self.kind = kind;
        self
    }

    /// Greeting seeded when a conversation opens for a project
    pub fn greeting(project_name: &str) -> Self {
        Self::assistant(format!(
            "Hello! I am the AI assistant trained on the \"{project_name}\" project data.\n\n\
             I can explain the project's content and goals, analyze strategy and risks, \
             and answer questions from the documents and demo videos.\n\n\
             What would you like to know about this project?"
        ))
    }

    /// Context hint injected when the watched video changes
    pub fn video_context(video_name: &str, description: Option<&str>) -> Self {
        let about = match description {
            Some(d) if !d.trim().is_empty() => format!("\n\nAbout: {d}"),
            _ => String::new(),
        };
        Self::assistant(format!(
            "Currently watching: \"{video_name}\"{about}\n\nDo you have any questions about this video?"
        ))
        .with_kind(MessageKind::Suggestion)
    }
}
