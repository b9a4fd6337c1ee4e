use super::session::{Session, SessionInfo};
use crate::connection::OutboundFrame;
use crate::recognition::{RecognizerBackend, StreamParams};
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Session already has an active connection: {0}")]
    AlreadyActive(String),

    #[error("Session {0} could not accept the message")]
    Undeliverable(String),
}

/// Live sessions keyed by identifier.
///
/// Backed by a sharded map, so sessions hashed to different shards never
/// contend. Creation, removal and lookup are the only operations touching
/// the map.
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<Session>>,
    backend: Arc<dyn RecognizerBackend>,
    params: StreamParams,
    created: AtomicUsize,
}

impl SessionRegistry {
    pub fn new(backend: Arc<dyn RecognizerBackend>, params: StreamParams) -> Self {
        Self {
            sessions: DashMap::new(),
            backend,
            params,
            created: AtomicUsize::new(0),
        }
    }

    /// Return the session for `id`, constructing and registering it if absent
    pub fn get_or_create(&self, id: &str) -> Arc<Session> {
        if let Some(existing) = self.sessions.get(id) {
            return Arc::clone(existing.value());
        }

        let entry = self.sessions.entry(id.to_string()).or_insert_with(|| {
            self.created.fetch_add(1, Ordering::SeqCst);
            info!("Creating session: {}", id);
            Arc::new(Session::new(
                id.to_string(),
                Arc::clone(&self.backend),
                self.params.clone(),
            ))
        });

        Arc::clone(entry.value())
    }

    pub fn lookup(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Unregister a session; `None` if it was not registered
    pub fn remove(&self, id: &str) -> Option<Arc<Session>> {
        let removed = self.sessions.remove(id).map(|(_, session)| session);
        if removed.is_some() {
            debug!("Removed session: {}", id);
        }
        removed
    }

    /// Remove `id` only if it still maps to `session`
    pub(crate) fn remove_exact(&self, id: &str, session: &Arc<Session>) -> bool {
        self.sessions
            .remove_if(id, |_, current| Arc::ptr_eq(current, session))
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Number of sessions ever constructed by this registry
    pub fn sessions_created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn list(&self) -> Vec<SessionInfo> {
        let mut infos: Vec<SessionInfo> = self
            .sessions
            .iter()
            .map(|entry| entry.value().info())
            .collect();
        infos.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        infos
    }

    /// Push a bare text frame to one session's connection
    pub fn send_to(&self, id: &str, text: &str) -> Result<(), SessionError> {
        let session = self
            .lookup(id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;

        if session.try_send(OutboundFrame::Text(text.to_string())) {
            Ok(())
        } else {
            Err(SessionError::Undeliverable(id.to_string()))
        }
    }

    /// Push a bare text frame to every connected session; returns how many accepted it
    pub fn broadcast(&self, text: &str) -> usize {
        let sessions: Vec<Arc<Session>> = self
            .sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let delivered = sessions
            .iter()
            .filter(|session| session.try_send(OutboundFrame::Text(text.to_string())))
            .count();

        info!("Broadcast delivered to {}/{} sessions", delivered, sessions.len());
        delivered
    }
}
