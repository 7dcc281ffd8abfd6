//! Utterance classification for finalized transcripts
//!
//! A finalized transcript is either a navigation request ("go back",
//! "return", "exit") or a question for the project backend. Classification
//! is a pure function so the session coordinator keeps all branching in one
//! place.

/// Keywords that navigate back to the previous surface
const BACK_WORDS: &[&str] = &["go back", "return"];

/// Keywords that leave the chat surface entirely
const EXIT_WORDS: &[&str] = &["exit"];

/// Direction of a navigation intent
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NavDirection {
    /// Return to the previous surface (e.g. the video view)
    Back,
    /// Leave the chat surface
    Exit,
}

/// Classified intent of a finalized transcript
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Intent {
    /// Navigate away from the chat surface
    Navigate(NavDirection),
    /// Ask the backend a question (trimmed transcript text)
    Question(String),
}

/// Classify a finalized transcript
///
/// Matching is case-insensitive substring search against a small fixed
/// vocabulary. Empty or whitespace-only transcripts yield `None` and the
/// caller takes no action. When both a back and an exit keyword appear,
/// the earliest occurrence in the transcript wins.
pub fn classify(text: &str) -> Option<Intent> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    let lowered = trimmed.to_lowercase();
    let back_pos = earliest_match(&lowered, BACK_WORDS);
    let exit_pos = earliest_match(&lowered, EXIT_WORDS);

    match (back_pos, exit_pos) {
        (Some(b), Some(e)) => {
            if b <= e {
                Some(Intent::Navigate(NavDirection::Back))
            } else {
                Some(Intent::Navigate(NavDirection::Exit))
            }
        }
        (Some(_), None) => Some(Intent::Navigate(NavDirection::Back)),
        (None, Some(_)) => Some(Intent::Navigate(NavDirection::Exit)),
        (None, None) => Some(Intent::Question(trimmed.to_string())),
    }
}

/// Position of the earliest keyword occurrence, if any
fn earliest_match(lowered: &str, words: &[&str]) -> Option<usize> {
    words.iter().filter_map(|w| lowered.find(w)).min()
}
