// Session registry and lifecycle coordinator tests
//
// Covers insert-if-absent under concurrency, idempotent removal and
// exactly-once teardown.

mod common;

use common::ScriptedBackend;
use speech_relay::session::SessionError;
use speech_relay::{
    OutboundFrame, SessionLifecycleCoordinator, SessionRegistry, SessionState, StreamParams,
};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;

fn registry(backend: &Arc<ScriptedBackend>) -> Arc<SessionRegistry> {
    Arc::new(SessionRegistry::new(backend.clone(), StreamParams::pcm(16000)))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_get_or_create_same_id_constructs_once() {
    let registry = registry(&ScriptedBackend::new());

    let handles: Vec<_> = (0..64)
        .map(|_| {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.get_or_create("shared") })
        })
        .collect();

    let mut sessions = Vec::new();
    for handle in handles {
        sessions.push(handle.await.unwrap());
    }

    assert_eq!(registry.sessions_created(), 1);
    assert_eq!(registry.len(), 1);
    assert!(sessions.iter().all(|s| Arc::ptr_eq(s, &sessions[0])));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_get_or_create_distinct_ids() {
    let registry = registry(&ScriptedBackend::new());

    let handles: Vec<_> = (0..32)
        .map(|i| {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.get_or_create(&format!("session-{}", i)) })
        })
        .collect();

    let mut ids = HashSet::new();
    for handle in handles {
        ids.insert(handle.await.unwrap().id().to_string());
    }

    assert_eq!(ids.len(), 32);
    assert_eq!(registry.sessions_created(), 32);
    assert_eq!(registry.len(), 32);
}

#[test]
fn test_new_session_starts_open_with_empty_transcript() {
    let registry = registry(&ScriptedBackend::new());
    let session = registry.get_or_create("fresh");

    assert_eq!(session.id(), "fresh");
    assert_eq!(session.state(), SessionState::Open);
    assert_eq!(session.transcript().full_transcript(), "");
    assert!(Arc::ptr_eq(&session, &registry.lookup("fresh").unwrap()));
}

#[test]
fn test_remove_is_idempotent() {
    let registry = registry(&ScriptedBackend::new());
    registry.get_or_create("gone");

    assert!(registry.remove("gone").is_some());
    assert!(registry.remove("gone").is_none());
    assert!(registry.lookup("gone").is_none());
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_open_rejects_second_connection() {
    let coordinator = SessionLifecycleCoordinator::new(registry(&ScriptedBackend::new()));
    let (tx, _rx) = mpsc::channel(4);

    let session = coordinator.open("dup", tx.clone()).unwrap();
    assert_eq!(session.state(), SessionState::Active);

    match coordinator.open("dup", tx) {
        Err(e) => assert_eq!(e, SessionError::AlreadyActive("dup".to_string())),
        Ok(_) => panic!("second connection must be rejected"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_teardown_runs_once() {
    let backend = ScriptedBackend::new();
    let coordinator = Arc::new(SessionLifecycleCoordinator::new(registry(&backend)));
    let (tx, _rx) = mpsc::channel(4);

    let session = coordinator.open("closing", tx).unwrap();
    session.channel().ensure_started().await.unwrap();

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.teardown("closing").await })
        })
        .collect();

    let mut performed = 0;
    for handle in handles {
        if handle.await.unwrap() {
            performed += 1;
        }
    }

    assert_eq!(performed, 1);
    assert_eq!(coordinator.teardowns_performed(), 1);
    assert_eq!(backend.closes(), 1, "recognizer stream closed exactly once");
    assert_eq!(session.state(), SessionState::Closed);
    assert!(coordinator.registry().lookup("closing").is_none());
}

#[tokio::test]
async fn test_lookup_none_after_teardown_completes() {
    let coordinator = SessionLifecycleCoordinator::new(registry(&ScriptedBackend::new()));
    coordinator.registry().get_or_create("s");

    assert!(coordinator.teardown("s").await);
    assert!(coordinator.registry().lookup("s").is_none());
    assert!(!coordinator.teardown("s").await);
    assert_eq!(coordinator.teardowns_performed(), 1);
}

#[tokio::test]
async fn test_send_to_and_broadcast() {
    let coordinator = SessionLifecycleCoordinator::new(registry(&ScriptedBackend::new()));
    let (tx_a, mut rx_a) = mpsc::channel(4);
    let (tx_b, mut rx_b) = mpsc::channel(4);
    coordinator.open("a", tx_a).unwrap();
    coordinator.open("b", tx_b).unwrap();
    // Registered but never connected: broadcast skips it
    coordinator.registry().get_or_create("c");

    let registry = coordinator.registry();
    registry.send_to("a", "hello a").unwrap();
    assert_eq!(
        registry.send_to("missing", "x"),
        Err(SessionError::NotFound("missing".to_string()))
    );
    assert_eq!(registry.broadcast("everyone"), 2);

    assert_eq!(rx_a.recv().await, Some(OutboundFrame::Text("hello a".to_string())));
    assert_eq!(rx_a.recv().await, Some(OutboundFrame::Text("everyone".to_string())));
    assert_eq!(rx_b.recv().await, Some(OutboundFrame::Text("everyone".to_string())));
}
