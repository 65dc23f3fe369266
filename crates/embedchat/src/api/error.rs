//! API error handling with structured responses.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use embedchat_protocol::StreamEvent;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::chats::StoreError;
use crate::embed::EmbedError;
use crate::feedback::FeedbackError;
use crate::stream::{StreamRejection, abort_message};

/// API error type with structured responses.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Too many requests: {0}")]
    TooManyRequests(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::TooManyRequests(_) => "TOO_MANY_REQUESTS",
            Self::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// The message without the category prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::NotFound(msg)
            | Self::BadRequest(msg)
            | Self::Forbidden(msg)
            | Self::TooManyRequests(msg)
            | Self::ServiceUnavailable(msg)
            | Self::Internal(msg) => msg,
        }
    }

    fn log(&self) {
        let code = self.error_code();
        match self {
            Self::Internal(msg) => error!(error_code = code, message = %msg, "API error"),
            Self::ServiceUnavailable(msg) => {
                warn!(error_code = code, message = %msg, "Service unavailable")
            }
            _ => debug!(error_code = code, message = %self.message(), "Client error"),
        }
    }
}

/// Structured error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub code: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.log();
        let body = ErrorResponse {
            success: false,
            error: self.message().to_string(),
            code: self.error_code(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}

/// Error of the stream endpoint, answered with an abort event as the body.
#[derive(Debug)]
pub struct StreamFailure(pub ApiError);

impl IntoResponse for StreamFailure {
    fn into_response(self) -> Response {
        self.0.log();
        let event = StreamEvent::abort(
            Some(Uuid::new_v4().to_string()),
            abort_message(self.0.message()),
        );
        (self.0.status_code(), Json(event)).into_response()
    }
}

impl From<ApiError> for StreamFailure {
    fn from(err: ApiError) -> Self {
        Self(err)
    }
}

impl From<EmbedError> for ApiError {
    fn from(err: EmbedError) -> Self {
        match err {
            EmbedError::NotFound(_) => ApiError::NotFound("Embed not found".to_string()),
            EmbedError::Disabled(_) => ApiError::Forbidden("Embed is disabled".to_string()),
            EmbedError::Invalid(msg) => ApiError::BadRequest(msg),
            EmbedError::Database(e) => ApiError::Internal(format!("Embed lookup failed: {}", e)),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => ApiError::NotFound("Chat not found".to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<FeedbackError> for ApiError {
    fn from(err: FeedbackError) -> Self {
        match err {
            FeedbackError::NotFound { .. } => ApiError::NotFound("Chat not found".to_string()),
            FeedbackError::Store(e) => e.into(),
        }
    }
}

impl From<StreamRejection> for ApiError {
    fn from(err: StreamRejection) -> Self {
        match err {
            StreamRejection::EmptyMessage => ApiError::BadRequest(err.to_string()),
            StreamRejection::SessionLimit { .. } => ApiError::TooManyRequests(err.to_string()),
            StreamRejection::Store(e) => e.into(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ApiError::not_found("").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::bad_request("").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::TooManyRequests(String::new()).status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(ApiError::internal("").status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_embed_errors_map_to_status() {
        let not_found: ApiError = EmbedError::NotFound("x".to_string()).into();
        assert_eq!(not_found.status_code(), StatusCode::NOT_FOUND);

        let disabled: ApiError = EmbedError::Disabled("x".to_string()).into();
        assert_eq!(disabled.status_code(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_feedback_not_found_message() {
        let err: ApiError = FeedbackError::NotFound { chat_id: 9 }.into();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.message(), "Chat not found");
    }

    #[tokio::test]
    async fn test_stream_failure_body_is_abort_event() {
        let response = StreamFailure(ApiError::TooManyRequests("rate limited".to_string()))
            .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        let event = embedchat_protocol::decode_error_body(&body).unwrap();
        assert!(event.is_abort());
        assert!(event.error().unwrap().ends_with("rate limited"));
    }
}
