//! HTTP request handlers.

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::{HeaderName, StatusCode, header},
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use embedchat_protocol::{
    ChatRequest, CommentRequest, FeedbackRequest, FeedbackResponse, HistoryResponse,
};
use serde_json::{Value, json};
use tokio_stream::{StreamExt, wrappers::ReceiverStream};
use tracing::{info, instrument};

use crate::chats::SessionScope;

use super::error::{ApiError, ApiResult, StreamFailure};
use super::state::AppState;

const X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

/// Health check endpoint. Answers 503 when the database is unreachable.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let (status, label) = if state.database.is_healthy().await {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };
    let body = json!({
        "status": label,
        "version": env!("CARGO_PKG_VERSION"),
        "database": label,
    });
    (status, Json(body))
}

/// Stream one chat turn as server-sent events.
#[instrument(skip(state, payload))]
pub async fn stream_chat(
    State(state): State<AppState>,
    Path(embed_id): Path<String>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, StreamFailure> {
    let Json(request) = payload.map_err(ApiError::from)?;
    let embed = state.embeds.resolve(&embed_id).await.map_err(ApiError::from)?;
    let rx = state
        .pipeline
        .start(embed, request)
        .await
        .map_err(ApiError::from)?;

    let events = ReceiverStream::new(rx).map(|event| Event::default().json_data(event));
    let headers = [
        (header::CACHE_CONTROL, "no-cache"),
        (header::CONNECTION, "keep-alive"),
        (X_ACCEL_BUFFERING, "no"),
        (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
    ];

    Ok((headers, Sse::new(events).keep_alive(KeepAlive::default())).into_response())
}

/// History of a session. Sources are always stripped and query parameters
/// are not consulted.
#[instrument(skip(state))]
pub async fn get_history(
    State(state): State<AppState>,
    Path((embed_id, session_id)): Path<(String, String)>,
) -> ApiResult<Json<HistoryResponse>> {
    let embed = state.embeds.resolve(&embed_id).await?;
    let scope = SessionScope::new(embed.id, session_id);
    let history = state.history.session_history(&scope).await;
    Ok(Json(HistoryResponse { history }))
}

/// Hide every past exchange of a session.
#[instrument(skip(state))]
pub async fn reset_session(
    State(state): State<AppState>,
    Path((embed_id, session_id)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    let embed = state.embeds.resolve(&embed_id).await?;
    let scope = SessionScope::new(embed.id, session_id);
    let hidden = state.history.invalidate(&scope).await?;
    info!(hidden, "Reset embed session");
    Ok(StatusCode::OK)
}

#[instrument(skip(state, payload))]
pub async fn set_feedback(
    State(state): State<AppState>,
    Path((embed_id, session_id, chat_id)): Path<(String, String, String)>,
    payload: Result<Json<FeedbackRequest>, JsonRejection>,
) -> ApiResult<Json<FeedbackResponse>> {
    let Json(body) = payload?;
    let embed = state.embeds.resolve(&embed_id).await?;
    let scope = SessionScope::new(embed.id, session_id);
    state
        .feedback
        .set_feedback(&scope, parse_chat_id(&chat_id)?, body.feedback)
        .await?;
    Ok(Json(FeedbackResponse::ok()))
}

#[instrument(skip(state, payload))]
pub async fn set_comment(
    State(state): State<AppState>,
    Path((embed_id, session_id, chat_id)): Path<(String, String, String)>,
    payload: Result<Json<CommentRequest>, JsonRejection>,
) -> ApiResult<Json<FeedbackResponse>> {
    let Json(body) = payload?;
    let embed = state.embeds.resolve(&embed_id).await?;
    let scope = SessionScope::new(embed.id, session_id);
    state
        .feedback
        .set_comment(&scope, parse_chat_id(&chat_id)?, body.comment)
        .await?;
    Ok(Json(FeedbackResponse::ok()))
}

/// Chat ids that are not integers cannot name a record.
fn parse_chat_id(raw: &str) -> ApiResult<i64> {
    raw.parse()
        .map_err(|_| ApiError::not_found("Chat not found"))
}
