use crate::error::RelayResult;
use serde::Serialize;

/// Sent with an empty transcript so every audio frame is acknowledged
pub const NO_SPEECH_MESSAGE: &str = "未能识别语音内容，请检查麦克风并重试";

/// Why a client connection was closed, and the close code sent for it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Client closed, or the session was torn down elsewhere
    Normal,
    /// No inbound frame within the idle timeout
    IdleTimeout,
    /// Another connection already owns the session identifier
    DuplicateSession,
    /// Transport retries exhausted
    ServerError,
    /// Heartbeat timeout
    NotReliable,
}

impl CloseReason {
    pub fn code(self) -> u16 {
        match self {
            CloseReason::Normal => 1000,
            CloseReason::IdleTimeout => 1001,
            CloseReason::DuplicateSession => 1008,
            CloseReason::ServerError => 1011,
            CloseReason::NotReliable => 4500,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            CloseReason::Normal => "normal closure",
            CloseReason::IdleTimeout => "session idle timeout",
            CloseReason::DuplicateSession => "session already connected",
            CloseReason::ServerError => "maximum retry attempts reached",
            CloseReason::NotReliable => "session not reliable: heartbeat timeout",
        }
    }

    /// Abnormal closes are announced with an error frame first
    pub fn is_error(self) -> bool {
        matches!(
            self,
            CloseReason::DuplicateSession | CloseReason::ServerError | CloseReason::NotReliable
        )
    }
}

/// JSON result frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ResultPayload {
    Transcription { transcription: String },
    NoSpeech { transcription: String, message: String },
    Error { error: String },
}

/// Frame received from the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// PCM audio chunk
    Binary(Vec<u8>),
    Text(String),
    /// Protocol-level ping
    Ping,
    /// Protocol-level pong
    Pong,
    Close,
}

/// Frame queued for the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    Result(ResultPayload),
    /// Bare text (targeted or broadcast notices)
    Text(String),
    Ping,
    Pong,
    Close(CloseReason),
}

impl OutboundFrame {
    /// Result frame for the current full transcript
    pub fn transcription(full_transcript: String) -> Self {
        if full_transcript.is_empty() {
            OutboundFrame::Result(ResultPayload::NoSpeech {
                transcription: String::new(),
                message: NO_SPEECH_MESSAGE.to_string(),
            })
        } else {
            OutboundFrame::Result(ResultPayload::Transcription {
                transcription: full_transcript,
            })
        }
    }

    pub fn error(description: impl Into<String>) -> Self {
        OutboundFrame::Result(ResultPayload::Error {
            error: description.into(),
        })
    }

    /// Text body of the frame; `None` for close frames
    pub fn encode(&self) -> RelayResult<Option<String>> {
        let text = match self {
            OutboundFrame::Result(payload) => serde_json::to_string(payload)?,
            OutboundFrame::Text(text) => text.clone(),
            OutboundFrame::Ping => "ping".to_string(),
            OutboundFrame::Pong => "pong".to_string(),
            OutboundFrame::Close(_) => return Ok(None),
        };
        Ok(Some(text))
    }
}

/// Text frame interpretation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlFrame<'a> {
    Ping,
    Pong,
    Other(&'a str),
}

impl<'a> ControlFrame<'a> {
    pub fn parse(text: &'a str) -> Self {
        match text {
            "ping" => ControlFrame::Ping,
            "pong" => ControlFrame::Pong,
            other => ControlFrame::Other(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_transcript_becomes_no_speech_message() {
        let frame = OutboundFrame::transcription(String::new());
        let text = frame.encode().unwrap().unwrap();
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();

        assert_eq!(json["transcription"], "");
        assert_eq!(json["message"], NO_SPEECH_MESSAGE);
    }

    #[test]
    fn test_transcription_frame() {
        let frame = OutboundFrame::transcription("hello\nworld".to_string());
        assert_eq!(
            frame.encode().unwrap().unwrap(),
            r#"{"transcription":"hello\nworld"}"#
        );
    }

    #[test]
    fn test_error_and_heartbeat_frames() {
        assert_eq!(
            OutboundFrame::error("boom").encode().unwrap().unwrap(),
            r#"{"error":"boom"}"#
        );
        assert_eq!(OutboundFrame::Ping.encode().unwrap().unwrap(), "ping");
        assert_eq!(OutboundFrame::Pong.encode().unwrap().unwrap(), "pong");
        assert_eq!(
            OutboundFrame::Close(CloseReason::Normal).encode().unwrap(),
            None
        );
    }

    #[test]
    fn test_close_codes() {
        assert_eq!(CloseReason::Normal.code(), 1000);
        assert_eq!(CloseReason::ServerError.code(), 1011);
        assert_eq!(CloseReason::NotReliable.code(), 4500);
        assert!(CloseReason::NotReliable.is_error());
        assert!(!CloseReason::IdleTimeout.is_error());
    }

    #[test]
    fn test_control_frame_parse() {
        assert_eq!(ControlFrame::parse("ping"), ControlFrame::Ping);
        assert_eq!(ControlFrame::parse("pong"), ControlFrame::Pong);
        assert_eq!(ControlFrame::parse("PING"), ControlFrame::Other("PING"));
    }
}
