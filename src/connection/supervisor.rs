use super::frames::{CloseReason, ControlFrame, InboundFrame, OutboundFrame};
use super::heartbeat::{closing, run_liveness_loop, Heartbeat, LivenessExit, LivenessSettings};
use super::retry::{RetryDecision, RetryState};
use crate::config::RelayConfig;
use crate::error::{RelayError, RelayResult};
use crate::session::{Session, SessionError, SessionLifecycleCoordinator};
use crate::store::{TranscriptRecord, TranscriptStore};
use futures::{Stream, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Per-connection limits and timers
#[derive(Debug, Clone, Copy)]
pub struct SupervisorSettings {
    pub liveness: LivenessSettings,
    pub max_retry_attempts: u32,
    pub idle_timeout: Duration,
    pub min_audio_frame_bytes: usize,
    pub max_text_frame_bytes: usize,
    pub max_binary_frame_bytes: usize,
    /// Longest wait for room in the outbound queue
    pub send_timeout: Duration,
}

impl From<&RelayConfig> for SupervisorSettings {
    fn from(config: &RelayConfig) -> Self {
        Self {
            liveness: LivenessSettings {
                interval: config.heartbeat_interval(),
                timeout: config.heartbeat_timeout(),
                grace: config.heartbeat_grace(),
            },
            max_retry_attempts: config.max_retry_attempts,
            idle_timeout: config.idle_timeout(),
            min_audio_frame_bytes: config.min_audio_frame_bytes,
            max_text_frame_bytes: config.max_text_frame_bytes,
            max_binary_frame_bytes: config.max_binary_frame_bytes,
            send_timeout: config.send_timeout(),
        }
    }
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self::from(&RelayConfig::default())
    }
}

/// Owns one client connection for the lifetime of its session.
///
/// Inbound frames are handled in arrival order. The liveness loop runs as a
/// separate task and is aborted when the connection closes, whatever the
/// cause. Closing always ends in `SessionLifecycleCoordinator::teardown`.
pub struct ConnectionSupervisor {
    session: Arc<Session>,
    coordinator: Arc<SessionLifecycleCoordinator>,
    store: Arc<dyn TranscriptStore>,
    outbound: mpsc::Sender<OutboundFrame>,
    heartbeat: Heartbeat,
    retry: RetryState,
    settings: SupervisorSettings,
    liveness: Option<JoinHandle<LivenessExit>>,
    last_activity: Instant,
    client_addr: Option<SocketAddr>,
}

impl ConnectionSupervisor {
    /// Claim the session, initialise heartbeat state and start the liveness loop
    pub fn establish(
        session_id: &str,
        coordinator: Arc<SessionLifecycleCoordinator>,
        store: Arc<dyn TranscriptStore>,
        outbound: mpsc::Sender<OutboundFrame>,
        settings: SupervisorSettings,
        client_addr: Option<SocketAddr>,
    ) -> Result<Self, SessionError> {
        let session = coordinator.open(session_id, outbound.clone())?;
        let now = Instant::now();
        let heartbeat = Heartbeat::new(now);

        let liveness = tokio::spawn(run_liveness_loop(
            session_id.to_string(),
            heartbeat.clone(),
            outbound.clone(),
            session.subscribe_state(),
            settings.liveness,
        ));

        match client_addr {
            Some(addr) => info!("Connection established: {} from {}", session_id, addr),
            None => info!("Connection established: {}", session_id),
        }

        Ok(Self {
            session,
            coordinator,
            store,
            outbound,
            heartbeat,
            retry: RetryState::new(settings.max_retry_attempts),
            settings,
            liveness: Some(liveness),
            last_activity: now,
            client_addr,
        })
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn heartbeat(&self) -> &Heartbeat {
        &self.heartbeat
    }

    pub fn retry_attempts(&self) -> u32 {
        self.retry.attempts()
    }

    /// Drive the connection until it closes, then tear the session down
    pub async fn run<S>(mut self, mut inbound: S) -> CloseReason
    where
        S: Stream<Item = RelayResult<InboundFrame>> + Unpin,
    {
        let mut state = self.session.subscribe_state();
        let mut liveness = self.liveness.take();

        let reason = loop {
            let idle_deadline = self.idle_deadline();

            tokio::select! {
                exit = liveness_exit(&mut liveness) => {
                    liveness = None;
                    match exit {
                        LivenessExit::TimedOut(silence) => {
                            let e = RelayError::HeartbeatTimeout { elapsed_secs: silence.as_secs() };
                            error!("{} (session: {})", e, self.session.id());
                            break CloseReason::NotReliable;
                        }
                        LivenessExit::OutboundClosed => {
                            warn!("Outbound queue closed, session: {}", self.session.id());
                            break CloseReason::ServerError;
                        }
                        LivenessExit::Cancelled => {}
                    }
                }
                _ = closing(&mut state) => {
                    info!("Session {} closed by another path", self.session.id());
                    break CloseReason::Normal;
                }
                _ = tokio::time::sleep_until(idle_deadline) => {
                    info!("Session {} idle for {:?}", self.session.id(), self.settings.idle_timeout);
                    break CloseReason::IdleTimeout;
                }
                frame = inbound.next() => match frame {
                    None | Some(Ok(InboundFrame::Close)) => {
                        info!("Client closed connection, session: {}", self.session.id());
                        break CloseReason::Normal;
                    }
                    Some(Ok(frame)) => {
                        self.last_activity = Instant::now();
                        match self.handle_frame(frame).await {
                            Ok(()) => self.retry.reset(),
                            Err(e) => {
                                if let Some(reason) = self.on_transport_failure(e) {
                                    break reason;
                                }
                            }
                        }
                    }
                    Some(Err(e)) => {
                        if let Some(reason) = self.on_transport_failure(e) {
                            break reason;
                        }
                    }
                },
            }
        };

        self.shutdown(reason, liveness).await;
        reason
    }

    /// Handle one inbound frame; errors are transport failures only
    pub async fn handle_frame(&mut self, frame: InboundFrame) -> RelayResult<()> {
        match frame {
            InboundFrame::Binary(data) => self.on_audio(data).await,
            InboundFrame::Text(text) => self.on_text(&text).await,
            InboundFrame::Ping | InboundFrame::Pong => {
                self.heartbeat.record_signal();
                Ok(())
            }
            InboundFrame::Close => Ok(()),
        }
    }

    async fn on_audio(&mut self, data: Vec<u8>) -> RelayResult<()> {
        let session_id = self.session.id();
        debug!("Received {} bytes of audio, session: {}", data.len(), session_id);

        if data.is_empty() {
            warn!("Empty audio frame, session: {}", session_id);
            return Ok(());
        }
        if data.len() < self.settings.min_audio_frame_bytes {
            warn!(
                "Audio frame too small to recognize ({} bytes), dropped, session: {}",
                data.len(),
                session_id
            );
            return Ok(());
        }
        if data.len() > self.settings.max_binary_frame_bytes {
            let e = RelayError::MalformedInput(format!("audio frame of {} bytes", data.len()));
            warn!("{}, dropped, session: {}", e, session_id);
            return Ok(());
        }

        let started = Instant::now();
        let frame = match self.relay_audio(&data).await {
            Ok(full_transcript) => {
                if full_transcript.is_empty() {
                    info!(
                        "Forwarded {} bytes but nothing recognized yet, session: {}",
                        data.len(),
                        session_id
                    );
                }
                OutboundFrame::transcription(full_transcript)
            }
            Err(e) => {
                error!("Failed to process audio: {} (session: {})", e, session_id);
                OutboundFrame::error(format!("Failed to process audio: {}", e))
            }
        };
        debug!(
            "Audio frame processed in {}ms, session: {}",
            started.elapsed().as_millis(),
            session_id
        );

        self.send(frame).await
    }

    /// Forward audio and return the full transcript accumulated so far
    async fn relay_audio(&self, data: &[u8]) -> RelayResult<String> {
        let channel = self.session.channel();
        channel.ensure_started().await?;
        channel.send_audio(data).await?;

        let latest = self.session.transcript().latest_partial();
        if !latest.is_empty() {
            let record = TranscriptRecord::new(self.session.id(), data, &latest);
            if let Err(e) = self.store.append(record).await {
                warn!(
                    "Failed to store transcript record: {} (session: {})",
                    e,
                    self.session.id()
                );
            }
        }

        Ok(self.session.transcript().snapshot().full_transcript)
    }

    async fn on_text(&mut self, text: &str) -> RelayResult<()> {
        if text.len() > self.settings.max_text_frame_bytes {
            let e = RelayError::MalformedInput(format!("text frame of {} bytes", text.len()));
            warn!("{}, dropped, session: {}", e, self.session.id());
            return Ok(());
        }

        match ControlFrame::parse(text) {
            ControlFrame::Ping => {
                self.heartbeat.record_signal();
                debug!("Received ping, replying pong, session: {}", self.session.id());
                self.send(OutboundFrame::Pong).await
            }
            ControlFrame::Pong => {
                self.heartbeat.record_signal();
                debug!("Received pong, session: {}", self.session.id());
                Ok(())
            }
            ControlFrame::Other(other) => {
                info!("Text message: {} (session: {})", other, self.session.id());
                Ok(())
            }
        }
    }

    fn idle_deadline(&self) -> Instant {
        self.last_activity + self.settings.idle_timeout
    }

    /// Queue a reply, giving up at the send timeout, the idle deadline or session close
    async fn send(&self, frame: OutboundFrame) -> RelayResult<()> {
        let deadline = (Instant::now() + self.settings.send_timeout).min(self.idle_deadline());
        let mut state = self.session.subscribe_state();

        tokio::select! {
            sent = self.outbound.send(frame) => sent.map_err(|_| {
                RelayError::TransportFailure("outbound queue closed".to_string())
            }),
            _ = tokio::time::sleep_until(deadline) => Err(RelayError::TransportFailure(
                "client is not reading, reply dropped".to_string(),
            )),
            _ = closing(&mut state) => Err(RelayError::TransportFailure(
                "session closing, reply dropped".to_string(),
            )),
        }
    }

    /// Count a transport failure; `Some` once the connection must close
    fn on_transport_failure(&mut self, err: RelayError) -> Option<CloseReason> {
        error!("Transport error: {} (session: {})", err, self.session.id());

        match self.retry.record_failure() {
            RetryDecision::Retry { attempt } => {
                info!(
                    "Keeping session {} after transport error, attempt {}/{}",
                    self.session.id(),
                    attempt,
                    self.retry.max_attempts()
                );
                None
            }
            RetryDecision::GiveUp { attempts } => {
                error!(
                    "Maximum retry attempts ({}) reached, closing session {}",
                    attempts,
                    self.session.id()
                );
                Some(CloseReason::ServerError)
            }
        }
    }

    async fn shutdown(self, reason: CloseReason, liveness: Option<JoinHandle<LivenessExit>>) {
        let session_id = self.session.id().to_string();

        if let Some(handle) = liveness {
            handle.abort();
        }

        let Self {
            heartbeat,
            retry,
            coordinator,
            outbound,
            settings,
            client_addr,
            ..
        } = self;
        debug!(
            "Releasing connection state for session {} (outstanding pings: {}, retries: {})",
            session_id,
            heartbeat.snapshot().outstanding_pings(),
            retry.attempts()
        );
        drop(heartbeat);
        drop(retry);

        // Teardown never waits on the client
        coordinator.teardown(&session_id).await;

        let deadline = Instant::now() + settings.send_timeout;
        if reason.is_error() {
            deliver(&outbound, OutboundFrame::error(reason.description()), deadline, &session_id)
                .await;
        }
        deliver(&outbound, OutboundFrame::Close(reason), deadline, &session_id).await;

        match client_addr {
            Some(addr) => info!(
                "Connection closed: {} from {} ({})",
                session_id,
                addr,
                reason.description()
            ),
            None => info!("Connection closed: {} ({})", session_id, reason.description()),
        }
    }
}

async fn deliver(
    outbound: &mpsc::Sender<OutboundFrame>,
    frame: OutboundFrame,
    deadline: Instant,
    session_id: &str,
) {
    match tokio::time::timeout_at(deadline, outbound.send(frame)).await {
        Ok(Ok(())) => {}
        Ok(Err(_)) => debug!("Outbound queue already closed, session: {}", session_id),
        Err(_) => warn!(
            "Client not reading, abandoned closing frames for session {}",
            session_id
        ),
    }
}

async fn liveness_exit(handle: &mut Option<JoinHandle<LivenessExit>>) -> LivenessExit {
    match handle {
        Some(handle) => handle.await.unwrap_or(LivenessExit::Cancelled),
        None => std::future::pending().await,
    }
}
