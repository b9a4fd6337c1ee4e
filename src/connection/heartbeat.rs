use super::frames::OutboundFrame;
use crate::session::SessionState;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, warn};

/// Liveness bookkeeping for one connection
#[derive(Debug, Clone)]
pub struct HeartbeatState {
    /// Never moves backwards
    last_seen: Instant,
    outstanding_pings: u32,
}

impl HeartbeatState {
    pub fn new(now: Instant) -> Self {
        Self {
            last_seen: now,
            outstanding_pings: 0,
        }
    }

    /// Inbound liveness signal (ping or pong)
    pub fn record_signal(&mut self, now: Instant) {
        self.last_seen = self.last_seen.max(now);
        self.outstanding_pings = 0;
    }

    pub fn record_ping_sent(&mut self) {
        self.outstanding_pings += 1;
    }

    pub fn last_seen(&self) -> Instant {
        self.last_seen
    }

    pub fn outstanding_pings(&self) -> u32 {
        self.outstanding_pings
    }

    pub fn silence(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_seen)
    }

    pub fn is_expired(&self, now: Instant, timeout: Duration) -> bool {
        self.silence(now) > timeout
    }
}

/// Handle shared by the inbound frame path and the liveness loop
#[derive(Debug, Clone)]
pub struct Heartbeat {
    inner: Arc<Mutex<HeartbeatState>>,
}

impl Heartbeat {
    pub fn new(now: Instant) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HeartbeatState::new(now))),
        }
    }

    pub fn record_signal(&self) {
        self.lock().record_signal(Instant::now());
    }

    pub fn snapshot(&self) -> HeartbeatState {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, HeartbeatState> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LivenessSettings {
    pub interval: Duration,
    pub timeout: Duration,
    /// Delay before the first interval starts
    pub grace: Duration,
}

/// How the liveness loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessExit {
    /// No liveness signal for longer than the timeout
    TimedOut(Duration),
    /// The session began closing
    Cancelled,
    /// The connection's outbound queue is gone
    OutboundClosed,
}

/// Periodically check liveness and ping the client.
///
/// Exits as soon as the session starts closing, and never outlives it.
pub async fn run_liveness_loop(
    session_id: String,
    heartbeat: Heartbeat,
    outbound: mpsc::Sender<OutboundFrame>,
    mut state: watch::Receiver<SessionState>,
    settings: LivenessSettings,
) -> LivenessExit {
    tokio::select! {
        _ = tokio::time::sleep(settings.grace) => {}
        _ = closing(&mut state) => return LivenessExit::Cancelled,
    }

    loop {
        tokio::select! {
            _ = tokio::time::sleep(settings.interval) => {}
            _ = closing(&mut state) => return LivenessExit::Cancelled,
        }

        let silence = heartbeat.lock().silence(Instant::now());
        if silence > settings.timeout {
            warn!(
                "Heartbeat timeout for session {} (last signal {:.1}s ago)",
                session_id,
                silence.as_secs_f64()
            );
            return LivenessExit::TimedOut(silence);
        }

        // A full queue skips this ping; the timeout check above does not depend on delivery
        match outbound.try_send(OutboundFrame::Ping) {
            Ok(()) => {
                heartbeat.lock().record_ping_sent();
                debug!("Sent heartbeat ping to session {}", session_id);
            }
            Err(TrySendError::Full(_)) => {
                warn!("Outbound queue full, skipped ping to session {}", session_id);
            }
            Err(TrySendError::Closed(_)) => return LivenessExit::OutboundClosed,
        }
    }
}

/// Resolve once the session is closing (or its state can no longer be observed)
pub(crate) async fn closing(state: &mut watch::Receiver<SessionState>) {
    let _ = state.wait_for(|s| s.is_terminating()).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_seen_is_monotonic() {
        let start = Instant::now();
        let mut state = HeartbeatState::new(start + Duration::from_secs(10));

        state.record_signal(start);
        assert_eq!(state.last_seen(), start + Duration::from_secs(10));

        state.record_signal(start + Duration::from_secs(20));
        assert_eq!(state.last_seen(), start + Duration::from_secs(20));
    }

    #[test]
    fn test_signal_clears_outstanding_pings() {
        let start = Instant::now();
        let mut state = HeartbeatState::new(start);
        state.record_ping_sent();
        state.record_ping_sent();
        assert_eq!(state.outstanding_pings(), 2);

        state.record_signal(start);
        assert_eq!(state.outstanding_pings(), 0);
    }

    #[test]
    fn test_expiry() {
        let start = Instant::now();
        let state = HeartbeatState::new(start);
        let timeout = Duration::from_secs(60);

        assert!(!state.is_expired(start + Duration::from_secs(60), timeout));
        assert!(state.is_expired(start + Duration::from_secs(61), timeout));
    }
}
