pub mod client;
pub mod pipeline;

pub use client::{BackendClient, Project, FALLBACK_ANSWER};
pub use pipeline::{AskCommand, AskEvent, AskPipeline};
