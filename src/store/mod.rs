//! Append-only transcript record store

use crate::error::{RelayError, RelayResult};
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::io::AsyncWriteExt;
use tracing::info;

/// One relayed audio chunk and the recognition result current when it was sent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptRecord {
    pub session_id: String,

    /// Base64-encoded PCM bytes
    pub audio: String,

    pub text: String,

    pub created_at: DateTime<Utc>,
}

impl TranscriptRecord {
    pub fn new(session_id: &str, audio: &[u8], text: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            audio: base64::engine::general_purpose::STANDARD.encode(audio),
            text: text.to_string(),
            created_at: Utc::now(),
        }
    }

    pub fn audio_bytes(&self) -> RelayResult<Vec<u8>> {
        base64::engine::general_purpose::STANDARD
            .decode(&self.audio)
            .map_err(|e| RelayError::Store(format!("invalid audio payload: {}", e)))
    }
}

#[async_trait::async_trait]
pub trait TranscriptStore: Send + Sync {
    async fn append(&self, record: TranscriptRecord) -> RelayResult<()>;
}

/// Writes one JSON object per line
pub struct JsonlTranscriptStore {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonlTranscriptStore {
    pub async fn open(path: impl AsRef<Path>) -> RelayResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        info!("Transcript records will be appended to {:?}", path);

        Ok(Self {
            path,
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl TranscriptStore for JsonlTranscriptStore {
    async fn append(&self, record: TranscriptRecord) -> RelayResult<()> {
        let mut line = serde_json::to_vec(&record).map_err(|e| RelayError::Store(e.to_string()))?;
        line.push(b'\n');

        // Keep concurrent sessions from interleaving partial lines
        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;

        Ok(())
    }
}

/// Keeps records in memory
#[derive(Default)]
pub struct MemoryTranscriptStore {
    records: Mutex<Vec<TranscriptRecord>>,
}

impl MemoryTranscriptStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<TranscriptRecord> {
        self.records.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

#[async_trait::async_trait]
impl TranscriptStore for MemoryTranscriptStore {
    async fn append(&self, record: TranscriptRecord) -> RelayResult<()> {
        self.records
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(record);
        Ok(())
    }
}
