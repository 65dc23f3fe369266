use embedchat_protocol::StreamEvent;
use thiserror::Error;

use crate::session::SessionState;

/// Prefix of every abort message synthesized on the client.
pub(crate) const ABORT_PREFIX: &str = "An error occurred while streaming response.";

/// Why a stream ended without a terminal frame from the server.
///
/// Each variant is turned into exactly one synthesized abort event.
#[derive(Debug, Error)]
pub enum StreamError {
    /// Connection failure or the stream ending early.
    #[error("{0}")]
    Transport(String),

    /// Error status (>= 400). `body` is the server's abort payload when it
    /// could be decoded.
    #[error("Code {status}")]
    Application {
        status: u16,
        body: Option<StreamEvent>,
    },

    /// Any other non-ok answer: a non-2xx status below 400 or a response
    /// that is not an event stream.
    #[error("Unknown Error.")]
    Unexpected,
}

impl StreamError {
    /// The abort event delivered to the caller for this error.
    pub fn into_abort(self) -> StreamEvent {
        match self {
            StreamError::Application {
                body: Some(event), ..
            } => event,
            other => StreamEvent::abort(None, format!("{ABORT_PREFIX} {other}")),
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("illegal session transition {from:?} -> {to:?}")]
    InvalidTransition { from: SessionState, to: SessionState },
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Chat not found: {chat_id}")]
    NotFound { chat_id: i64 },

    #[error("Server returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Session(#[from] SessionError),
}
