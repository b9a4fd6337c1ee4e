use super::backend::{
    OpenedStream, RecognitionEvent, RecognizerBackend, RecognizerStream, StreamParams,
};
use crate::error::{RelayError, RelayResult};
use crate::session::TranscriptAggregator;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Lifecycle of a session's link to the recognizer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelState {
    Uninitialized,
    Starting,
    Streaming,
    Stopping,
    Stopped,
}

/// State touched by both the audio path and the event pump
struct ChannelShared {
    session_id: String,
    state: Mutex<ChannelState>,
    last_failure: Mutex<Option<String>>,
    transcript: Arc<TranscriptAggregator>,
}

impl ChannelShared {
    fn state(&self) -> ChannelState {
        *self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn set_state(&self, next: ChannelState) {
        *self.state.lock().unwrap_or_else(|p| p.into_inner()) = next;
    }

    /// Move `from` -> `to`; false if the channel was somewhere else
    fn transition(&self, from: ChannelState, to: ChannelState) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        if *state == from {
            *state = to;
            true
        } else {
            false
        }
    }

    fn apply(&self, event: RecognitionEvent) {
        match event {
            RecognitionEvent::Started => {
                info!("Recognizer started, session: {}", self.session_id);
            }
            RecognitionEvent::SentenceBegin => {
                debug!("Sentence begin, session: {}", self.session_id);
            }
            RecognitionEvent::Partial(text) => {
                debug!("Partial result: {} (session: {})", text, self.session_id);
                self.transcript.set_partial(&text);
            }
            RecognitionEvent::SentenceEnd(text) => {
                info!("Final result: {} (session: {})", text, self.session_id);
                self.transcript.commit_sentence(&text);
            }
            RecognitionEvent::Complete => {
                info!("Recognition complete, session: {}", self.session_id);
            }
            RecognitionEvent::Failure(reason) => {
                let e = RelayError::RecognitionFailure(reason.clone());
                error!("{} (session: {})", e, self.session_id);
                *self.last_failure.lock().unwrap_or_else(|p| p.into_inner()) = Some(reason);
                self.set_state(ChannelState::Stopped);
            }
        }
    }

    fn unavailable(&self) -> RelayError {
        let reason = match self.state() {
            ChannelState::Stopped => {
                match self.last_failure.lock().unwrap_or_else(|p| p.into_inner()).as_ref() {
                    Some(failure) => format!("recognition channel failed: {}", failure),
                    None => "recognition channel stopped".to_string(),
                }
            }
            ChannelState::Stopping => "recognition channel is stopping".to_string(),
            ChannelState::Starting => "recognition channel is starting".to_string(),
            ChannelState::Uninitialized => "recognition channel not started".to_string(),
            ChannelState::Streaming => "recognition stream is closed".to_string(),
        };
        RelayError::BackendUnavailable(reason)
    }
}

struct ActiveLink {
    stream: Box<dyn RecognizerStream>,
    pump: JoinHandle<()>,
}

/// One session's streaming link to the remote recognizer.
///
/// The stream is opened lazily by the first audio chunk. Backend events are
/// consumed by a pump task that drives the session's `TranscriptAggregator`.
/// A failure event stops the channel for good: later chunks fail with
/// `BackendUnavailable` instead of reconnecting mid-session.
pub struct RecognitionChannel {
    shared: Arc<ChannelShared>,
    backend: Arc<dyn RecognizerBackend>,
    params: StreamParams,
    link: tokio::sync::Mutex<Option<ActiveLink>>,
}

impl RecognitionChannel {
    pub fn new(
        session_id: String,
        backend: Arc<dyn RecognizerBackend>,
        params: StreamParams,
        transcript: Arc<TranscriptAggregator>,
    ) -> Self {
        Self {
            shared: Arc::new(ChannelShared {
                session_id,
                state: Mutex::new(ChannelState::Uninitialized),
                last_failure: Mutex::new(None),
                transcript,
            }),
            backend,
            params,
            link: tokio::sync::Mutex::new(None),
        }
    }

    pub fn state(&self) -> ChannelState {
        self.shared.state()
    }

    /// Open the recognizer stream if this channel has never been started
    pub async fn ensure_started(&self) -> RelayResult<()> {
        let mut link = self.link.lock().await;

        match self.shared.state() {
            ChannelState::Streaming => return Ok(()),
            ChannelState::Uninitialized => {}
            _ => return Err(self.shared.unavailable()),
        }

        self.shared.set_state(ChannelState::Starting);
        info!(
            "Starting recognition stream via {} (session: {}, sample_rate: {})",
            self.backend.name(),
            self.shared.session_id,
            self.params.sample_rate
        );

        match self
            .backend
            .open_stream(&self.shared.session_id, &self.params)
            .await
        {
            Ok(OpenedStream { mut stream, events }) => {
                if !self
                    .shared
                    .transition(ChannelState::Starting, ChannelState::Streaming)
                {
                    // stop() ran while we were connecting
                    if let Err(e) = stream.close().await {
                        warn!("Failed to close abandoned recognizer stream: {}", e);
                    }
                    return Err(self.shared.unavailable());
                }

                let pump = tokio::spawn(pump_events(Arc::clone(&self.shared), events));
                *link = Some(ActiveLink { stream, pump });

                info!("Recognition stream open, session: {}", self.shared.session_id);
                Ok(())
            }
            Err(e) => {
                self.shared
                    .transition(ChannelState::Starting, ChannelState::Uninitialized);
                error!(
                    "Failed to start recognition stream: {} (session: {})",
                    e, self.shared.session_id
                );
                Err(match e {
                    RelayError::BackendUnavailable(_) => e,
                    other => RelayError::BackendUnavailable(other.to_string()),
                })
            }
        }
    }

    /// Forward one audio chunk to the recognizer
    pub async fn send_audio(&self, chunk: &[u8]) -> RelayResult<()> {
        if chunk.is_empty() {
            debug!("Skipping empty audio chunk, session: {}", self.shared.session_id);
            return Ok(());
        }

        let mut link = self.link.lock().await;
        if self.shared.state() != ChannelState::Streaming {
            return Err(self.shared.unavailable());
        }

        let Some(active) = link.as_mut() else {
            return Err(self.shared.unavailable());
        };

        active.stream.send_audio(chunk).await.map_err(|e| {
            warn!(
                "Failed to forward {} bytes of audio: {} (session: {})",
                chunk.len(),
                e,
                self.shared.session_id
            );
            e
        })?;

        debug!(
            "Forwarded {} bytes of audio, session: {}",
            chunk.len(),
            self.shared.session_id
        );
        Ok(())
    }

    /// Apply a backend event as if delivered by the stream
    pub fn handle_event(&self, event: RecognitionEvent) {
        self.shared.apply(event);
    }

    /// Close the stream and its connection. Idempotent.
    pub async fn stop(&self) {
        {
            let mut state = self.shared.state.lock().unwrap_or_else(|p| p.into_inner());
            if matches!(*state, ChannelState::Streaming | ChannelState::Starting) {
                *state = ChannelState::Stopping;
            }
        }

        let active = self.link.lock().await.take();
        match active {
            Some(mut active) => {
                if let Err(e) = active.stream.close().await {
                    warn!(
                        "Error closing recognizer stream: {} (session: {})",
                        e, self.shared.session_id
                    );
                }
                active.pump.abort();
                info!("Recognition channel stopped, session: {}", self.shared.session_id);
            }
            None => {
                debug!(
                    "Recognition channel has no open stream, session: {}",
                    self.shared.session_id
                );
            }
        }

        self.shared.set_state(ChannelState::Stopped);
    }
}

async fn pump_events(shared: Arc<ChannelShared>, mut events: mpsc::Receiver<RecognitionEvent>) {
    while let Some(event) = events.recv().await {
        let failed = matches!(event, RecognitionEvent::Failure(_));
        shared.apply(event);
        if failed {
            break;
        }
    }

    debug!("Recognition event pump finished, session: {}", shared.session_id);
}
