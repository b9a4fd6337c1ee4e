// Shared test helpers: an in-process recognizer whose events are scripted by the test

#![allow(dead_code)]

use speech_relay::recognition::{OpenedStream, RecognizerStream};
use speech_relay::{RecognitionEvent, RecognizerBackend, RelayError, RelayResult, StreamParams};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Default)]
pub struct ScriptedBackend {
    opens: AtomicUsize,
    closes: Arc<AtomicUsize>,
    fail_open: AtomicBool,
    audio: Arc<Mutex<Vec<Vec<u8>>>>,
    events: Mutex<Option<mpsc::Sender<RecognitionEvent>>>,
    params: Mutex<Option<StreamParams>>,
}

impl ScriptedBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make subsequent `open_stream` calls fail (credential/connect outage)
    pub fn set_unavailable(&self, unavailable: bool) {
        self.fail_open.store(unavailable, Ordering::SeqCst);
    }

    /// Deliver an event on the most recently opened stream
    pub async fn emit(&self, event: RecognitionEvent) {
        let tx = self
            .events
            .lock()
            .unwrap()
            .clone()
            .expect("no recognizer stream has been opened");
        tx.send(event).await.expect("event pump is gone");
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn audio_chunks(&self) -> Vec<Vec<u8>> {
        self.audio.lock().unwrap().clone()
    }

    pub fn last_params(&self) -> Option<StreamParams> {
        self.params.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl RecognizerBackend for ScriptedBackend {
    async fn open_stream(
        &self,
        _session_id: &str,
        params: &StreamParams,
    ) -> RelayResult<OpenedStream> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(RelayError::BackendUnavailable(
                "token request failed".to_string(),
            ));
        }

        let (tx, rx) = mpsc::channel(16);
        *self.events.lock().unwrap() = Some(tx);
        *self.params.lock().unwrap() = Some(params.clone());

        Ok(OpenedStream {
            stream: Box::new(ScriptedStream {
                audio: Arc::clone(&self.audio),
                closes: Arc::clone(&self.closes),
            }),
            events: rx,
        })
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

struct ScriptedStream {
    audio: Arc<Mutex<Vec<Vec<u8>>>>,
    closes: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl RecognizerStream for ScriptedStream {
    async fn send_audio(&mut self, chunk: &[u8]) -> RelayResult<()> {
        self.audio.lock().unwrap().push(chunk.to_vec());
        Ok(())
    }

    async fn close(&mut self) -> RelayResult<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Poll `condition` until it holds, failing the test after ~5 seconds
pub async fn eventually<F: Fn() -> bool>(condition: F) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}
