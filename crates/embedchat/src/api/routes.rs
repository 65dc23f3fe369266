//! API route definitions.

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

use super::handlers;
use super::state::AppState;

/// Create the application router.
///
/// Widgets are served from arbitrary third-party origins, so every route
/// allows any origin.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::DEBUG))
        .on_request(DefaultOnRequest::new().level(Level::DEBUG))
        .on_response(DefaultOnResponse::new().level(Level::DEBUG));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/embed/{embed_id}/stream-chat", post(handlers::stream_chat))
        .route(
            "/embed/{embed_id}/{session_id}",
            get(handlers::get_history).delete(handlers::reset_session),
        )
        .route(
            "/embed/{embed_id}/{session_id}/chat-feedback/{chat_id}",
            post(handlers::set_feedback),
        )
        .route(
            "/embed/{embed_id}/{session_id}/chat-feedback/{chat_id}/comment",
            post(handlers::set_comment),
        )
        .layer(trace_layer)
        .layer(cors)
        .with_state(state)
}
