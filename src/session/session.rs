use super::transcript::TranscriptAggregator;
use crate::connection::OutboundFrame;
use crate::recognition::{ChannelState, RecognitionChannel, RecognizerBackend, StreamParams};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};

/// Session lifecycle: open -> active -> closing -> closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Registered, no connection bound yet
    Open,
    /// A client connection is driving the session
    Active,
    /// Teardown in progress
    Closing,
    Closed,
}

impl SessionState {
    pub fn is_terminating(self) -> bool {
        matches!(self, SessionState::Closing | SessionState::Closed)
    }
}

/// Summary of a live session for the HTTP API
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub state: SessionState,
    pub channel_state: ChannelState,
    pub created_at: DateTime<Utc>,
    pub sentences: usize,
}

/// One audio-in / transcript-out conversation
pub struct Session {
    id: String,
    created_at: DateTime<Utc>,

    /// Lifecycle state; subscribers are woken on every transition
    state: watch::Sender<SessionState>,

    transcript: Arc<TranscriptAggregator>,
    channel: RecognitionChannel,

    /// Outbound queue of the bound client connection
    outbound: Mutex<Option<mpsc::Sender<OutboundFrame>>>,
}

impl Session {
    pub fn new(id: String, backend: Arc<dyn RecognizerBackend>, params: StreamParams) -> Self {
        let transcript = Arc::new(TranscriptAggregator::new());
        let channel = RecognitionChannel::new(id.clone(), backend, params, Arc::clone(&transcript));
        let (state, _) = watch::channel(SessionState::Open);

        Self {
            id,
            created_at: Utc::now(),
            state,
            transcript,
            channel,
            outbound: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn transcript(&self) -> &TranscriptAggregator {
        &self.transcript
    }

    pub fn channel(&self) -> &RecognitionChannel {
        &self.channel
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Open -> Active. Fails if another connection already claimed the session.
    pub fn activate(&self) -> bool {
        self.state.send_if_modified(|state| {
            if *state == SessionState::Open {
                *state = SessionState::Active;
                true
            } else {
                false
            }
        })
    }

    /// Open|Active -> Closing. Exactly one caller wins.
    pub fn begin_closing(&self) -> bool {
        self.state.send_if_modified(|state| {
            if state.is_terminating() {
                false
            } else {
                *state = SessionState::Closing;
                true
            }
        })
    }

    pub(crate) fn mark_closed(&self) {
        self.state.send_replace(SessionState::Closed);
    }

    /// Resolve once the session reached `Closed`
    pub async fn wait_closed(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives as long as `self`, so this only returns once closed
        let _ = rx.wait_for(|state| *state == SessionState::Closed).await;
    }

    pub fn bind_outbound(&self, tx: mpsc::Sender<OutboundFrame>) {
        *self.outbound.lock().unwrap_or_else(|p| p.into_inner()) = Some(tx);
    }

    pub fn release_outbound(&self) {
        self.outbound.lock().unwrap_or_else(|p| p.into_inner()).take();
    }

    /// Queue a frame to the bound connection without waiting; false if it could not be queued
    pub fn try_send(&self, frame: OutboundFrame) -> bool {
        match self.outbound.lock().unwrap_or_else(|p| p.into_inner()).as_ref() {
            Some(tx) => tx.try_send(frame).is_ok(),
            None => false,
        }
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            session_id: self.id.clone(),
            state: self.state(),
            channel_state: self.channel.state(),
            created_at: self.created_at,
            sentences: self.transcript.sentence_count(),
        }
    }
}
