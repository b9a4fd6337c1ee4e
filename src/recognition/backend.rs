use crate::error::RelayResult;
use serde::Serialize;
use tokio::sync::mpsc;

/// Event emitted by a recognizer stream, in the order the backend produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    /// Backend accepted the stream configuration
    Started,
    SentenceBegin,
    /// Revisable hypothesis for the sentence currently being spoken
    Partial(String),
    /// Confirmed sentence
    SentenceEnd(String),
    /// Backend finished the task (normally after a stop)
    Complete,
    /// Backend-reported failure; the stream is unusable afterwards
    Failure(String),
}

/// Audio payload format accepted by the recognizer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Pcm,
}

/// Fixed stream configuration sent when a recognizer stream is opened
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamParams {
    pub format: AudioFormat,
    pub sample_rate: u32,
    pub intermediate_results: bool,
    pub punctuation: bool,
    pub normalization: bool,
}

impl StreamParams {
    /// PCM stream with intermediate results, punctuation and number normalization enabled
    pub fn pcm(sample_rate: u32) -> Self {
        Self {
            format: AudioFormat::Pcm,
            sample_rate,
            intermediate_results: true,
            punctuation: true,
            normalization: true,
        }
    }
}

impl Default for StreamParams {
    fn default() -> Self {
        Self::pcm(16000)
    }
}

/// An open recognizer stream and the receiving end of its events
pub struct OpenedStream {
    pub stream: Box<dyn RecognizerStream>,
    pub events: mpsc::Receiver<RecognitionEvent>,
}

/// Remote speech recognizer
///
/// Implementations:
/// - `RemoteRecognizer`: WebSocket streaming service with credential exchange
/// - test backends scripting events in-process
#[async_trait::async_trait]
pub trait RecognizerBackend: Send + Sync {
    /// Acquire (or reuse) a credential, connect, and configure a stream for one session
    ///
    /// Errors are `RelayError::BackendUnavailable`.
    async fn open_stream(&self, session_id: &str, params: &StreamParams)
        -> RelayResult<OpenedStream>;

    /// Backend name for logging
    fn name(&self) -> &str;
}

/// Outbound half of one recognizer stream
#[async_trait::async_trait]
pub trait RecognizerStream: Send {
    /// Forward one audio chunk
    async fn send_audio(&mut self, chunk: &[u8]) -> RelayResult<()>;

    /// Finish the task and release the connection
    async fn close(&mut self) -> RelayResult<()>;
}
