use super::backend::{AudioFormat, RecognitionEvent, StreamParams};
use crate::error::RelayResult;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

pub const NAMESPACE: &str = "SpeechTranscriber";

/// Command sent to the recognizer over the stream's text channel
#[derive(Debug, Serialize)]
pub struct CommandMessage {
    pub header: CommandHeader,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<StartPayload>,
}

#[derive(Debug, Serialize)]
pub struct CommandHeader {
    pub namespace: String,
    pub name: String,
    pub appkey: String,
    pub message_id: String,
    pub task_id: String,
}

#[derive(Debug, Serialize)]
pub struct StartPayload {
    pub format: AudioFormat,
    pub sample_rate: u32,
    pub enable_intermediate_result: bool,
    pub enable_punctuation_prediction: bool,
    pub enable_inverse_text_normalization: bool,
}

impl CommandMessage {
    fn new(name: &str, app_key: &str, task_id: &str, payload: Option<StartPayload>) -> Self {
        Self {
            header: CommandHeader {
                namespace: NAMESPACE.to_string(),
                name: name.to_string(),
                appkey: app_key.to_string(),
                message_id: uuid::Uuid::new_v4().simple().to_string(),
                task_id: task_id.to_string(),
            },
            payload,
        }
    }

    pub fn start_transcription(app_key: &str, task_id: &str, params: &StreamParams) -> Self {
        let payload = StartPayload {
            format: params.format,
            sample_rate: params.sample_rate,
            enable_intermediate_result: params.intermediate_results,
            enable_punctuation_prediction: params.punctuation,
            enable_inverse_text_normalization: params.normalization,
        };
        Self::new("StartTranscription", app_key, task_id, Some(payload))
    }

    pub fn stop_transcription(app_key: &str, task_id: &str) -> Self {
        Self::new("StopTranscription", app_key, task_id, None)
    }
}

/// Event received from the recognizer
#[derive(Debug, Deserialize)]
pub struct ServerMessage {
    pub header: ServerHeader,
    #[serde(default)]
    pub payload: ServerPayload,
}

#[derive(Debug, Deserialize)]
pub struct ServerHeader {
    pub name: String,
    #[serde(default)]
    pub status: u32,
    #[serde(default)]
    pub status_text: String,
    #[serde(default)]
    pub task_id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ServerPayload {
    /// Sentence number, starting at 1
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub result: String,
    #[serde(default)]
    pub confidence: Option<f32>,
}

impl ServerMessage {
    /// Map to a recognition event; `None` for messages the relay does not track
    pub fn into_event(self) -> Option<RecognitionEvent> {
        match self.header.name.as_str() {
            "TranscriptionStarted" => Some(RecognitionEvent::Started),
            "SentenceBegin" => Some(RecognitionEvent::SentenceBegin),
            "TranscriptionResultChanged" => Some(RecognitionEvent::Partial(self.payload.result)),
            "SentenceEnd" => Some(RecognitionEvent::SentenceEnd(self.payload.result)),
            "TranscriptionCompleted" => Some(RecognitionEvent::Complete),
            "TaskFailed" => Some(RecognitionEvent::Failure(format!(
                "{} (status {})",
                self.header.status_text, self.header.status
            ))),
            _ => None,
        }
    }
}

pub fn parse_event(text: &str) -> RelayResult<Option<RecognitionEvent>> {
    let message: ServerMessage = serde_json::from_str(text)?;
    Ok(message.into_event())
}

/// Credential exchange request
#[derive(Debug, Serialize)]
pub struct TokenRequest<'a> {
    pub access_key_id: &'a str,
    pub access_key_secret: &'a str,
}

/// Credential exchange response
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub token: String,
    /// Unix timestamp (seconds)
    pub expires_at: i64,
}

impl TokenResponse {
    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.expires_at, 0).single()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_command_carries_stream_params() {
        let cmd = CommandMessage::start_transcription("app", "task-1", &StreamParams::pcm(16000));
        let json: serde_json::Value = serde_json::to_value(&cmd).unwrap();

        assert_eq!(json["header"]["namespace"], "SpeechTranscriber");
        assert_eq!(json["header"]["name"], "StartTranscription");
        assert_eq!(json["header"]["task_id"], "task-1");
        assert_eq!(json["payload"]["format"], "pcm");
        assert_eq!(json["payload"]["sample_rate"], 16000);
        assert_eq!(json["payload"]["enable_intermediate_result"], true);
        assert_eq!(json["payload"]["enable_punctuation_prediction"], true);
        assert_eq!(json["payload"]["enable_inverse_text_normalization"], true);
    }

    #[test]
    fn test_stop_command_has_no_payload() {
        let cmd = CommandMessage::stop_transcription("app", "task-1");
        let json = serde_json::to_string(&cmd).unwrap();

        assert!(json.contains("\"StopTranscription\""));
        assert!(!json.contains("payload"));
    }

    #[test]
    fn test_parse_result_changed() {
        let json = r#"{
            "header": {"namespace": "SpeechTranscriber", "name": "TranscriptionResultChanged", "status": 20000000, "task_id": "t"},
            "payload": {"index": 1, "result": "hel", "confidence": 0.5}
        }"#;

        let event = parse_event(json).unwrap();
        assert_eq!(event, Some(RecognitionEvent::Partial("hel".to_string())));
    }

    #[test]
    fn test_parse_sentence_end() {
        let json = r#"{"header": {"name": "SentenceEnd"}, "payload": {"index": 2, "result": "hello."}}"#;

        let event = parse_event(json).unwrap();
        assert_eq!(event, Some(RecognitionEvent::SentenceEnd("hello.".to_string())));
    }

    #[test]
    fn test_parse_task_failed() {
        let json = r#"{"header": {"name": "TaskFailed", "status": 40000001, "status_text": "token expired"}}"#;

        match parse_event(json).unwrap() {
            Some(RecognitionEvent::Failure(reason)) => {
                assert!(reason.contains("token expired"));
                assert!(reason.contains("40000001"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_parse_unknown_and_garbage() {
        let unknown = r#"{"header": {"name": "SomethingElse"}}"#;
        assert_eq!(parse_event(unknown).unwrap(), None);
        assert!(parse_event("not json").is_err());
    }
}
