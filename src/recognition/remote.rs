use super::backend::{
    OpenedStream, RecognitionEvent, RecognizerBackend, RecognizerStream, StreamParams,
};
use super::messages::{parse_event, CommandMessage, TokenRequest, TokenResponse};
use crate::config::RecognizerConfig;
use crate::error::{RelayError, RelayResult};
use chrono::{DateTime, Utc};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Tokens expiring within this window are refreshed before use
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone)]
struct CredentialToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl CredentialToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        (self.expires_at - now).num_seconds() > TOKEN_REFRESH_MARGIN_SECS
    }
}

/// Streaming recognizer reached over WebSocket
///
/// A credential token is obtained from `token_url` and shared by every
/// session until it is close to expiry.
pub struct RemoteRecognizer {
    config: RecognizerConfig,
    http: reqwest::Client,
    token: Mutex<Option<CredentialToken>>,
}

impl RemoteRecognizer {
    pub fn new(config: RecognizerConfig) -> RelayResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.connect_timeout())
            .build()
            .map_err(|e| RelayError::BackendUnavailable(format!("HTTP client: {}", e)))?;

        Ok(Self {
            config,
            http,
            token: Mutex::new(None),
        })
    }

    async fn token(&self) -> RelayResult<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(Utc::now())) {
            return Ok(token.value.clone());
        }

        let fresh = self.request_token().await?;
        let value = fresh.value.clone();
        *cached = Some(fresh);
        Ok(value)
    }

    async fn request_token(&self) -> RelayResult<CredentialToken> {
        info!("Requesting recognizer token from {}", self.config.token_url);

        let response = self
            .http
            .post(&self.config.token_url)
            .json(&TokenRequest {
                access_key_id: &self.config.access_key_id,
                access_key_secret: &self.config.access_key_secret,
            })
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| RelayError::BackendUnavailable(format!("token request failed: {}", e)))?;

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| RelayError::BackendUnavailable(format!("invalid token response: {}", e)))?;

        let expires_at = body.expiry().ok_or_else(|| {
            RelayError::BackendUnavailable(format!("invalid token expiry: {}", body.expires_at))
        })?;

        Ok(CredentialToken {
            value: body.token,
            expires_at,
        })
    }
}

#[async_trait::async_trait]
impl RecognizerBackend for RemoteRecognizer {
    async fn open_stream(
        &self,
        session_id: &str,
        params: &StreamParams,
    ) -> RelayResult<OpenedStream> {
        let token = self.token().await?;
        let url = stream_url(&self.config.url, &token)?;
        let connect_timeout = self.config.connect_timeout();

        let (ws, _) = tokio::time::timeout(connect_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| RelayError::BackendUnavailable("connect timed out".to_string()))?
            .map_err(|e| RelayError::BackendUnavailable(format!("connect failed: {}", e)))?;

        let (mut write, mut read) = ws.split();
        let task_id = uuid::Uuid::new_v4().simple().to_string();

        let start = CommandMessage::start_transcription(&self.config.app_key, &task_id, params);
        let start = serde_json::to_string(&start)
            .map_err(|e| RelayError::BackendUnavailable(e.to_string()))?;
        write
            .send(Message::Text(start))
            .await
            .map_err(|e| RelayError::BackendUnavailable(format!("start command failed: {}", e)))?;

        tokio::time::timeout(connect_timeout, wait_started(&mut read))
            .await
            .map_err(|_| {
                RelayError::BackendUnavailable("recognizer did not confirm start".to_string())
            })??;

        info!("Recognizer task {} started for session {}", task_id, session_id);

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(read_events(session_id.to_string(), read, tx));

        Ok(OpenedStream {
            stream: Box::new(RemoteStream {
                write,
                app_key: self.config.app_key.clone(),
                task_id,
                closed: false,
            }),
            events: rx,
        })
    }

    fn name(&self) -> &str {
        "remote"
    }
}

/// Streaming endpoint with the credential token as a query parameter
fn stream_url(base: &str, token: &str) -> RelayResult<reqwest::Url> {
    let mut url = reqwest::Url::parse(base).map_err(|e| {
        RelayError::BackendUnavailable(format!("invalid recognizer url {}: {}", base, e))
    })?;
    url.query_pairs_mut().append_pair("token", token);
    Ok(url)
}

async fn wait_started(read: &mut SplitStream<WsStream>) -> RelayResult<()> {
    while let Some(message) = read.next().await {
        match message {
            Ok(Message::Text(text)) => match parse_event(&text) {
                Ok(Some(RecognitionEvent::Started)) => return Ok(()),
                Ok(Some(RecognitionEvent::Failure(reason))) => {
                    return Err(RelayError::BackendUnavailable(reason))
                }
                Ok(_) => continue,
                Err(e) => warn!("Unparseable recognizer message: {}", e),
            },
            Ok(Message::Close(frame)) => {
                return Err(RelayError::BackendUnavailable(format!(
                    "recognizer closed the stream: {:?}",
                    frame
                )))
            }
            Ok(_) => {}
            Err(e) => return Err(RelayError::BackendUnavailable(e.to_string())),
        }
    }

    Err(RelayError::BackendUnavailable(
        "recognizer stream ended before start".to_string(),
    ))
}

async fn read_events(
    session_id: String,
    mut read: SplitStream<WsStream>,
    tx: mpsc::Sender<RecognitionEvent>,
) {
    let mut completed = false;

    while let Some(message) = read.next().await {
        let event = match message {
            Ok(Message::Text(text)) => match parse_event(&text) {
                Ok(Some(event)) => event,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Unparseable recognizer message: {} (session: {})", e, session_id);
                    continue;
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => RecognitionEvent::Failure(e.to_string()),
        };

        let terminal = matches!(event, RecognitionEvent::Failure(_));
        completed |= matches!(event, RecognitionEvent::Complete);
        if tx.send(event).await.is_err() || terminal {
            return;
        }
    }

    if !completed {
        let _ = tx
            .send(RecognitionEvent::Failure(
                "recognizer closed the stream".to_string(),
            ))
            .await;
    }

    debug!("Recognizer reader finished, session: {}", session_id);
}

struct RemoteStream {
    write: SplitSink<WsStream, Message>,
    app_key: String,
    task_id: String,
    closed: bool,
}

#[async_trait::async_trait]
impl RecognizerStream for RemoteStream {
    async fn send_audio(&mut self, chunk: &[u8]) -> RelayResult<()> {
        self.write
            .send(Message::Binary(chunk.to_vec()))
            .await
            .map_err(|e| RelayError::BackendUnavailable(format!("audio send failed: {}", e)))
    }

    async fn close(&mut self) -> RelayResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let stop = CommandMessage::stop_transcription(&self.app_key, &self.task_id);
        match serde_json::to_string(&stop) {
            Ok(stop) => {
                if let Err(e) = self.write.send(Message::Text(stop)).await {
                    warn!("Failed to send stop command for task {}: {}", self.task_id, e);
                }
            }
            Err(e) => warn!("Failed to encode stop command: {}", e),
        }

        self.write
            .close()
            .await
            .map_err(|e| RelayError::BackendUnavailable(format!("close failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_token_freshness_margin() {
        let now = Utc::now();
        let fresh = CredentialToken {
            value: "t".to_string(),
            expires_at: now + Duration::seconds(3600),
        };
        let stale = CredentialToken {
            value: "t".to_string(),
            expires_at: now + Duration::seconds(30),
        };

        assert!(fresh.is_fresh(now));
        assert!(!stale.is_fresh(now));
    }

    #[test]
    fn test_stream_url_encodes_token() {
        let url = stream_url("wss://nls.example.com/ws/v1", "a+b/c=d&e").unwrap();
        assert_eq!(
            url.as_str(),
            "wss://nls.example.com/ws/v1?token=a%2Bb%2Fc%3Dd%26e"
        );

        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs, vec![("token".to_string(), "a+b/c=d&e".to_string())]);
    }

    #[test]
    fn test_stream_url_rejects_invalid_base() {
        assert!(matches!(
            stream_url("not a url", "t"),
            Err(RelayError::BackendUnavailable(_))
        ));
    }
}
