use super::registry::{SessionError, SessionRegistry};
use super::session::Session;
use crate::connection::OutboundFrame;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Drives sessions through open -> active -> closing -> closed.
///
/// Teardown work (stop the recognition channel, unregister the session)
/// runs on its own task, so it completes even if the caller is cancelled.
pub struct SessionLifecycleCoordinator {
    registry: Arc<SessionRegistry>,
    teardowns: Arc<AtomicUsize>,
}

impl SessionLifecycleCoordinator {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self {
            registry,
            teardowns: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Claim the session `id` for a client connection
    pub fn open(
        &self,
        id: &str,
        outbound: mpsc::Sender<OutboundFrame>,
    ) -> Result<Arc<Session>, SessionError> {
        let session = self.registry.get_or_create(id);
        if !session.activate() {
            return Err(SessionError::AlreadyActive(id.to_string()));
        }

        session.bind_outbound(outbound);
        info!("Session active: {}", id);
        Ok(session)
    }

    /// Stop the session's recognition channel and unregister it.
    ///
    /// Returns true for the single invocation that performed the work.
    /// Concurrent callers wait until the session is closed and return false.
    pub async fn teardown(&self, session_id: &str) -> bool {
        let Some(session) = self.registry.lookup(session_id) else {
            debug!("Teardown skipped, session not registered: {}", session_id);
            return false;
        };

        if !session.begin_closing() {
            session.wait_closed().await;
            return false;
        }

        let registry = Arc::clone(&self.registry);
        let teardowns = Arc::clone(&self.teardowns);
        let closing = Arc::clone(&session);

        let task = tokio::spawn(async move {
            info!("Tearing down session: {}", closing.id());

            closing.release_outbound();
            closing.channel().stop().await;
            registry.remove_exact(closing.id(), &closing);
            closing.mark_closed();
            teardowns.fetch_add(1, Ordering::SeqCst);

            info!("Session closed: {}", closing.id());
        });

        if let Err(e) = task.await {
            error!("Teardown task for session {} failed: {}", session_id, e);
            // Never leave the session stuck in Closing
            self.registry.remove_exact(session_id, &session);
            session.mark_closed();
        }

        true
    }

    /// Number of teardowns that performed stop-and-remove work
    pub fn teardowns_performed(&self) -> usize {
        self.teardowns.load(Ordering::SeqCst)
    }
}
