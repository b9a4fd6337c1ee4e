//! Relay session management
//!
//! This module provides:
//! - `Session`: per-conversation state (lifecycle, transcript, recognition channel)
//! - `TranscriptAggregator`: latest partial result plus the log of final sentences
//! - `SessionRegistry`: concurrent identifier -> session map
//! - `SessionLifecycleCoordinator`: activation and exactly-once teardown

mod lifecycle;
mod registry;
mod session;
mod transcript;

pub use lifecycle::SessionLifecycleCoordinator;
pub use registry::{SessionError, SessionRegistry};
pub use session::{Session, SessionInfo, SessionState};
pub use transcript::{TranscriptAggregator, TranscriptSnapshot, TranscriptState};
