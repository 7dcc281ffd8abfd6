pub mod log;
pub mod types;

pub use log::ChatLog;
pub use types::{ChatMessage, MessageKind, Sender, SUGGESTED_QUESTIONS};
