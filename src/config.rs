use anyhow::Result;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub relay: RelayConfig,
    pub recognizer: RecognizerConfig,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "speech-relay".to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Client connection tuning: heartbeat, retry and frame limits
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Interval between liveness checks (default 30s)
    pub heartbeat_interval_secs: u64,

    /// Silence after which the connection is considered unreliable (default 60s)
    pub heartbeat_timeout_secs: u64,

    /// Delay before the first liveness check, giving the client time to set up
    pub heartbeat_grace_ms: u64,

    /// Transport failures tolerated before the connection is force-closed
    pub max_retry_attempts: u32,

    pub max_text_frame_bytes: usize,

    /// Default: 1 MiB
    pub max_binary_frame_bytes: usize,

    /// Close the connection after this long without any inbound frame (default 15 min)
    pub idle_timeout_secs: u64,

    /// Audio frames shorter than this are treated as non-speech and dropped
    pub min_audio_frame_bytes: usize,

    /// Capacity of the per-connection outbound frame queue
    pub outbound_buffer: usize,

    /// Longest wait for room in the outbound queue before a frame is abandoned
    pub send_timeout_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 60,
            heartbeat_grace_ms: 2000,
            max_retry_attempts: 3,
            max_text_frame_bytes: 8192,
            max_binary_frame_bytes: 1024 * 1024,
            idle_timeout_secs: 15 * 60,
            min_audio_frame_bytes: 100,
            outbound_buffer: 64,
            send_timeout_ms: 5000,
        }
    }
}

impl RelayConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }

    pub fn heartbeat_grace(&self) -> Duration {
        Duration::from_millis(self.heartbeat_grace_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    /// Largest message the WebSocket upgrade should accept
    pub fn max_message_bytes(&self) -> usize {
        self.max_binary_frame_bytes.max(self.max_text_frame_bytes)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecognizerConfig {
    /// Streaming endpoint (ws:// or wss://)
    pub url: String,

    /// Credential exchange endpoint
    pub token_url: String,

    pub access_key_id: String,
    pub access_key_secret: String,
    pub app_key: String,

    /// Sample rate of the PCM audio relayed by clients
    pub sample_rate: u32,

    pub connect_timeout_secs: u64,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            url: "wss://nls-gateway.cn-shanghai.aliyuncs.com/ws/v1".to_string(),
            token_url: "http://localhost:8090/token".to_string(),
            access_key_id: String::new(),
            access_key_secret: String::new(),
            app_key: String::new(),
            sample_rate: 16000,
            connect_timeout_secs: 10,
        }
    }
}

impl RecognizerConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// JSON-lines file receiving transcript records
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: "data/transcripts.jsonl".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from an optional file, then `SPEECH_RELAY__*` environment variables
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("SPEECH_RELAY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
