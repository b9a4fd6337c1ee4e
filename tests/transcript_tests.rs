// Transcript aggregation properties
//
// Final sentences form an append-only log joined by newlines; partial results
// never leak into it, and snapshots are never torn.

use speech_relay::TranscriptAggregator;
use std::sync::Arc;
use std::thread;

#[test]
fn test_full_transcript_is_sentences_in_call_order() {
    let transcript = TranscriptAggregator::new();

    transcript.set_partial("he");
    transcript.commit_sentence("hello");
    transcript.set_partial("wor");
    transcript.set_partial("worl");
    transcript.commit_sentence("world");
    transcript.set_partial("again and");

    assert_eq!(transcript.full_transcript(), "hello\nworld");
    assert_eq!(transcript.latest_partial(), "again and");
    assert_eq!(transcript.sentence_count(), 2);
}

#[test]
fn test_full_transcript_independent_of_partial() {
    let transcript = TranscriptAggregator::new();
    transcript.set_partial("only a hypothesis");

    let snapshot = transcript.snapshot();
    assert_eq!(snapshot.latest_partial, "only a hypothesis");
    assert_eq!(snapshot.full_transcript, "");
}

#[test]
fn test_snapshot_never_observes_torn_update() {
    let transcript = Arc::new(TranscriptAggregator::new());
    let sentences: Vec<String> = (0..500).map(|i| format!("sentence number {}", i)).collect();

    let writer = {
        let transcript = Arc::clone(&transcript);
        let sentences = sentences.clone();
        thread::spawn(move || {
            for sentence in &sentences {
                transcript.set_partial("partial noise");
                transcript.commit_sentence(sentence);
            }
        })
    };

    let reader = {
        let transcript = Arc::clone(&transcript);
        let sentences = sentences.clone();
        thread::spawn(move || {
            for _ in 0..2000 {
                let snapshot = transcript.snapshot();
                if snapshot.full_transcript.is_empty() {
                    continue;
                }

                let lines: Vec<&str> = snapshot.full_transcript.split('\n').collect();
                for (i, line) in lines.iter().enumerate() {
                    assert_eq!(*line, sentences[i], "sentence log must be an exact prefix");
                }

                // A sentence-end sets the partial to the same text atomically
                let last = lines[lines.len() - 1];
                assert!(
                    snapshot.latest_partial == last || snapshot.latest_partial == "partial noise",
                    "unexpected partial {:?} after {:?}",
                    snapshot.latest_partial,
                    last
                );
            }
        })
    };

    writer.join().unwrap();
    reader.join().unwrap();

    assert_eq!(transcript.full_transcript(), sentences.join("\n"));
}
