use super::types::ChatMessage;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;

/// Append-only conversation log, newest-last
///
/// Owned by the chat surface for the lifetime of the open conversation and
/// cleared on project navigation. Video-context hints are deduplicated per
/// video id so switching back and forth does not repeat them.
#[derive(Debug, Clone)]
pub struct ChatLog {
    messages: Arc<RwLock<Vec<ChatMessage>>>,
    seen_videos: Arc<RwLock<HashSet<String>>>,
}

impl ChatLog {
    pub fn new() -> Self {
        Self {
            messages: Arc::new(RwLock::new(Vec::new())),
            seen_videos: Arc::new(RwLock::new(HashSet::new())),
        }
    }

    pub fn push(&self, message: ChatMessage) {
        self.messages.write().push(message);
    }

    /// Inject a video-context hint at most once per video id
    ///
    /// Returns true if the message was appended.
    pub fn push_video_context(&self, video_id: &str, message: ChatMessage) -> bool {
        let mut seen = self.seen_videos.write();
        if !seen.insert(video_id.to_string()) {
            return false;
        }
        self.messages.write().push(message);
        true
    }

    pub fn all(&self) -> Vec<ChatMessage> {
        self.messages.read().clone()
    }

    pub fn last(&self) -> Option<ChatMessage> {
        self.messages.read().last().cloned()
    }

    /// Reset on project navigation
    pub fn clear(&self) {
        self.messages.write().clear();
        self.seen_videos.write().clear();
    }

    pub fn len(&self) -> usize {
        self.messages.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.read().is_empty()
    }
}

impl Default for ChatLog {
    fn default() -> Self {
        Self::new()
    }
}
