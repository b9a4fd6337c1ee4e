//! Client-facing connection handling
//!
//! - `frames`: inbound/outbound frame types and their text encoding
//! - `heartbeat`: liveness state and the per-connection liveness loop
//! - `retry`: transport-failure budget
//! - `supervisor`: `ConnectionSupervisor`, which ties the above to a session

pub mod frames;
pub mod heartbeat;
pub mod retry;
pub mod supervisor;

pub use frames::{
    CloseReason, ControlFrame, InboundFrame, OutboundFrame, ResultPayload, NO_SPEECH_MESSAGE,
};
pub use heartbeat::{Heartbeat, HeartbeatState, LivenessExit, LivenessSettings};
pub use retry::{RetryDecision, RetryState};
pub use supervisor::{ConnectionSupervisor, SupervisorSettings};
