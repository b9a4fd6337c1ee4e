use thiserror::Error;

/// Failures scoped to a single relay session.
///
/// Nothing here is fatal to the process: every variant is handled by the
/// session that produced it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// Credential acquisition or connect to the remote recognizer failed
    #[error("Recognition backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Client connection I/O failure
    #[error("Transport failure: {0}")]
    TransportFailure(String),

    /// Frame that could not be used (oversized, unparseable)
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// No liveness signal within the heartbeat timeout
    #[error("Heartbeat timed out after {elapsed_secs}s without a liveness signal")]
    HeartbeatTimeout { elapsed_secs: u64 },

    /// Failure event reported by the recognizer
    #[error("Recognition failed: {0}")]
    RecognitionFailure(String),

    /// Transcript record store I/O
    #[error("Record store error: {0}")]
    Store(String),
}

impl From<std::io::Error> for RelayError {
    fn from(err: std::io::Error) -> Self {
        RelayError::Store(err.to_string())
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::MalformedInput(err.to_string())
    }
}

pub type RelayResult<T> = Result<T, RelayError>;
