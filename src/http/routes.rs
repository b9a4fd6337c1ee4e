use super::handlers;
use super::socket;
use super::state::AppState;
use axum::{
    routing::{delete, get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Streaming relay
        .route("/speech", get(socket::speech_socket))
        // Session queries and control
        .route("/sessions", get(handlers::list_sessions))
        .route("/sessions/:session_id", delete(handlers::close_session))
        .route(
            "/sessions/:session_id/transcript",
            get(handlers::get_session_transcript),
        )
        .route(
            "/sessions/:session_id/notify",
            post(handlers::notify_session),
        )
        .route("/notify", post(handlers::broadcast))
        // Request logging and browser clients on other origins
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
