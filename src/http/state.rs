use crate::config::RelayConfig;
use crate::connection::SupervisorSettings;
use crate::session::{SessionLifecycleCoordinator, SessionRegistry};
use crate::store::TranscriptStore;
use std::sync::Arc;

/// Shared application state for HTTP and WebSocket handlers
#[derive(Clone)]
pub struct AppState {
    /// Session activation and teardown (owns the session registry)
    pub coordinator: Arc<SessionLifecycleCoordinator>,

    /// Transcript record sink
    pub store: Arc<dyn TranscriptStore>,

    /// Limits and timers applied to every client connection
    pub settings: SupervisorSettings,

    /// Largest WebSocket message accepted at upgrade time
    pub max_message_bytes: usize,

    /// Outbound frame queue capacity per connection
    pub outbound_buffer: usize,
}

impl AppState {
    pub fn new(
        coordinator: Arc<SessionLifecycleCoordinator>,
        store: Arc<dyn TranscriptStore>,
        relay: &RelayConfig,
    ) -> Self {
        Self {
            coordinator,
            store,
            settings: SupervisorSettings::from(relay),
            max_message_bytes: relay.max_message_bytes(),
            outbound_buffer: relay.outbound_buffer.max(1),
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        self.coordinator.registry()
    }
}
