use super::state::AppState;
use crate::session::{SessionError, SessionInfo};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct TranscriptResponse {
    pub session_id: String,
    pub latest_partial: String,
    pub full_transcript: String,
}

#[derive(Debug, Serialize)]
pub struct CloseSessionResponse {
    pub session_id: String,
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct NotifyRequest {
    /// Sent to the client verbatim as a text frame
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct NotifyResponse {
    pub delivered: usize,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: String) -> axum::response::Response {
    (status, Json(ErrorResponse { error })).into_response()
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /sessions
/// List live sessions
pub async fn list_sessions(State(state): State<AppState>) -> Json<Vec<SessionInfo>> {
    Json(state.registry().list())
}

/// GET /sessions/:session_id/transcript
/// Transcript accumulated so far
pub async fn get_session_transcript(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    match state.registry().lookup(&session_id) {
        Some(session) => {
            let snapshot = session.transcript().snapshot();
            (
                StatusCode::OK,
                Json(TranscriptResponse {
                    session_id,
                    latest_partial: snapshot.latest_partial,
                    full_transcript: snapshot.full_transcript,
                }),
            )
                .into_response()
        }
        None => error_response(
            StatusCode::NOT_FOUND,
            format!("Session {} not found", session_id),
        ),
    }
}

/// DELETE /sessions/:session_id
/// Tear a session down; its client connection is closed
pub async fn close_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    info!("Closing session on request: {}", session_id);

    if state.registry().lookup(&session_id).is_none() {
        return error_response(
            StatusCode::NOT_FOUND,
            format!("Session {} not found", session_id),
        );
    }

    state.coordinator.teardown(&session_id).await;

    (
        StatusCode::OK,
        Json(CloseSessionResponse {
            session_id,
            status: "closed".to_string(),
        }),
    )
        .into_response()
}

/// POST /sessions/:session_id/notify
/// Send a text frame to one session
pub async fn notify_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(req): Json<NotifyRequest>,
) -> impl IntoResponse {
    match state.registry().send_to(&session_id, &req.message) {
        Ok(()) => (StatusCode::OK, Json(NotifyResponse { delivered: 1 })).into_response(),
        Err(e @ SessionError::NotFound(_)) => error_response(StatusCode::NOT_FOUND, e.to_string()),
        Err(e) => {
            warn!("Notify failed: {}", e);
            error_response(StatusCode::CONFLICT, e.to_string())
        }
    }
}

/// POST /notify
/// Send a text frame to every connected session
pub async fn broadcast(
    State(state): State<AppState>,
    Json(req): Json<NotifyRequest>,
) -> Json<NotifyResponse> {
    let delivered = state.registry().broadcast(&req.message);
    Json(NotifyResponse { delivered })
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
