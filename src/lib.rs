pub mod config;
pub mod connection;
pub mod error;
pub mod http;
pub mod recognition;
pub mod session;
pub mod store;

pub use config::Config;
pub use connection::{
    CloseReason, ConnectionSupervisor, InboundFrame, OutboundFrame, SupervisorSettings,
};
pub use error::{RelayError, RelayResult};
pub use http::{create_router, AppState};
pub use recognition::{
    RecognitionChannel, RecognitionEvent, RecognizerBackend, RemoteRecognizer, StreamParams,
};
pub use session::{
    Session, SessionLifecycleCoordinator, SessionRegistry, SessionState, TranscriptAggregator,
};
pub use store::{JsonlTranscriptStore, MemoryTranscriptStore, TranscriptRecord, TranscriptStore};
