use super::state::AppState;
use crate::connection::{CloseReason, ConnectionSupervisor, InboundFrame, OutboundFrame};
use crate::error::{RelayError, RelayResult};
use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, Query, State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::borrow::Cow;
use std::net::SocketAddr;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    /// Optional client-chosen session identifier (otherwise a UUID is generated)
    pub session_id: Option<String>,
}

/// GET /speech
/// Upgrade to the streaming audio relay
pub async fn speech_socket(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<ConnectParams>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
) -> impl IntoResponse {
    let session_id = params
        .session_id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let client_addr = connect_info.map(|ConnectInfo(addr)| addr);

    info!("WebSocket handshake for session {} from {:?}", session_id, client_addr);

    ws.max_message_size(state.max_message_bytes)
        .max_frame_size(state.max_message_bytes)
        .on_upgrade(move |socket| handle_socket(state, socket, session_id, client_addr))
}

async fn handle_socket(
    state: AppState,
    socket: WebSocket,
    session_id: String,
    client_addr: Option<SocketAddr>,
) {
    let (mut sink, stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<OutboundFrame>(state.outbound_buffer);

    let writer_session = session_id.clone();
    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let is_close = matches!(frame, OutboundFrame::Close(_));
            let Some(message) = to_message(frame) else {
                continue;
            };

            if let Err(e) = sink.send(message).await {
                warn!("Failed to write frame to session {}: {}", writer_session, e);
                break;
            }
            if is_close {
                break;
            }
        }
    });

    match ConnectionSupervisor::establish(
        &session_id,
        state.coordinator.clone(),
        state.store.clone(),
        tx.clone(),
        state.settings,
        client_addr,
    ) {
        Ok(supervisor) => {
            let reason = supervisor.run(stream.map(to_inbound)).await;
            info!("Session {} finished: {}", session_id, reason.description());
        }
        Err(e) => {
            warn!("Rejecting connection: {}", e);
            let _ = tx.send(OutboundFrame::error(e.to_string())).await;
            let _ = tx
                .send(OutboundFrame::Close(CloseReason::DuplicateSession))
                .await;
        }
    }

    drop(tx);
    if let Err(e) = writer.await {
        error!("Writer task for session {} panicked: {}", session_id, e);
    }
}

fn to_inbound(message: Result<Message, axum::Error>) -> RelayResult<InboundFrame> {
    match message {
        Ok(Message::Binary(data)) => Ok(InboundFrame::Binary(data)),
        Ok(Message::Text(text)) => Ok(InboundFrame::Text(text)),
        Ok(Message::Ping(_)) => Ok(InboundFrame::Ping),
        Ok(Message::Pong(_)) => Ok(InboundFrame::Pong),
        Ok(Message::Close(_)) => Ok(InboundFrame::Close),
        Err(e) => Err(RelayError::TransportFailure(e.to_string())),
    }
}

fn to_message(frame: OutboundFrame) -> Option<Message> {
    if let OutboundFrame::Close(reason) = frame {
        return Some(Message::Close(Some(CloseFrame {
            code: reason.code(),
            reason: Cow::Borrowed(reason.description()),
        })));
    }

    match frame.encode() {
        Ok(Some(text)) => Some(Message::Text(text)),
        Ok(None) => None,
        Err(e) => {
            error!("Failed to encode outbound frame: {}", e);
            None
        }
    }
}
