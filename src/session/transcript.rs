use serde::Serialize;
use std::sync::{Mutex, MutexGuard};

/// Evolving transcript of one session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscriptState {
    /// Latest recognition hypothesis, replaced on every partial or final result
    pub latest_partial: String,

    /// Confirmed sentences in recognition order (append-only)
    pub final_sentences: Vec<String>,
}

impl TranscriptState {
    pub fn full_transcript(&self) -> String {
        self.final_sentences.join("\n")
    }
}

/// Consistent view of a transcript taken under a single lock
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TranscriptSnapshot {
    pub latest_partial: String,
    pub full_transcript: String,
}

/// Holds the transcript for one session.
///
/// Writers are the recognition event handler; readers are the inbound frame
/// path and the HTTP API. All access goes through one mutex so a reader never
/// sees a sentence-end half applied.
#[derive(Debug, Default)]
pub struct TranscriptAggregator {
    state: Mutex<TranscriptState>,
}

impl TranscriptAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the in-progress hypothesis
    pub fn set_partial(&self, text: &str) {
        self.lock().latest_partial = text.to_string();
    }

    /// Record a confirmed sentence: it becomes the latest result and is appended to the log
    pub fn commit_sentence(&self, text: &str) {
        let mut state = self.lock();
        state.latest_partial = text.to_string();
        if !text.is_empty() {
            state.final_sentences.push(text.to_string());
        }
    }

    pub fn latest_partial(&self) -> String {
        self.lock().latest_partial.clone()
    }

    pub fn full_transcript(&self) -> String {
        self.lock().full_transcript()
    }

    pub fn sentence_count(&self) -> usize {
        self.lock().final_sentences.len()
    }

    pub fn snapshot(&self) -> TranscriptSnapshot {
        let state = self.lock();
        TranscriptSnapshot {
            latest_partial: state.latest_partial.clone(),
            full_transcript: state.full_transcript(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TranscriptState> {
        // A panicking writer cannot leave a torn sentence behind, so the data stays usable
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_does_not_touch_final_sentences() {
        let transcript = TranscriptAggregator::new();
        transcript.set_partial("hel");
        transcript.set_partial("hello");

        assert_eq!(transcript.latest_partial(), "hello");
        assert_eq!(transcript.full_transcript(), "");
        assert_eq!(transcript.sentence_count(), 0);
    }

    #[test]
    fn test_sentence_end_replaces_partial_and_appends() {
        let transcript = TranscriptAggregator::new();
        transcript.set_partial("hel");
        transcript.commit_sentence("hello.");

        let snapshot = transcript.snapshot();
        assert_eq!(snapshot.latest_partial, "hello.");
        assert_eq!(snapshot.full_transcript, "hello.");
    }

    #[test]
    fn test_empty_sentence_is_not_logged() {
        let transcript = TranscriptAggregator::new();
        transcript.commit_sentence("one");
        transcript.commit_sentence("");

        assert_eq!(transcript.latest_partial(), "");
        assert_eq!(transcript.full_transcript(), "one");
    }
}
