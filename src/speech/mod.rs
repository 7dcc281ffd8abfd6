//! Speech capture and playback
//!
//! This module provides:
//! - Speech capture (speech-to-text) behind the [`capture::SpeechRecognizer`] seam
//! - Speech playback (text-to-speech) behind the [`playback::SpeechSynthesizer`] seam

pub mod capture;
pub mod playback;

// Re-export commonly used types
pub use capture::{
    CaptureAdapter, CaptureCommand, CaptureEvent, CaptureWorker, HttpRecognizer, ListenOutcome,
    SpeechRecognizer,
};
pub use playback::{
    CancelToken, HttpSynthesizer, NullSynthesizer, PlaybackAdapter, PlaybackCommand,
    PlaybackEvent, PlaybackWorker, SpeechSynthesizer,
};
