//! HTTP and WebSocket API
//!
//! - GET /speech - WebSocket audio relay (optional `?session_id=`)
//! - GET /sessions - List live sessions
//! - GET /sessions/:id/transcript - Transcript accumulated so far
//! - DELETE /sessions/:id - Close a session
//! - POST /sessions/:id/notify - Text frame to one session
//! - POST /notify - Text frame to every session
//! - GET /health - Health check

mod handlers;
mod routes;
mod socket;
mod state;

pub use routes::create_router;
pub use state::AppState;
