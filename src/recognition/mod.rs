//! Link from each session to the remote speech recognizer
//!
//! - `backend`: the recognizer contract (stream parameters, event enum, traits)
//! - `channel`: per-session `RecognitionChannel` state machine
//! - `remote`: WebSocket implementation with credential exchange
//! - `messages`: wire format of the remote recognizer

pub mod backend;
pub mod channel;
pub mod messages;
pub mod remote;

pub use backend::{
    AudioFormat, OpenedStream, RecognitionEvent, RecognizerBackend, RecognizerStream,
    StreamParams,
};
pub use channel::{ChannelState, RecognitionChannel};
pub use remote::RemoteRecognizer;
