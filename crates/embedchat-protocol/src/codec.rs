//! Request encoding and frame decoding.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::events::{RawEvent, StreamEvent};

/// Errors decoding a single stream frame or error body.
///
/// A frame that fails to decode is dropped by the consumer; it never ends a
/// stream on its own.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("empty frame")]
    Empty,

    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Optional per-request overrides of the embed defaults.
///
/// `None` is written as an explicit `null`, which the server reads as "no
/// override".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    pub prompt: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f64>,
}

/// Body of `POST /embed/{embedId}/stream-chat`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub message: String,
    pub session_id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f64>,
}

impl ChatRequest {
    pub fn new(
        message: impl Into<String>,
        session_id: impl Into<String>,
        identity: Option<String>,
        overrides: Overrides,
    ) -> Self {
        Self {
            message: message.into(),
            session_id: session_id.into(),
            username: identity,
            prompt: overrides.prompt,
            model: overrides.model,
            temperature: overrides.temperature,
        }
    }

    pub fn overrides(&self) -> Overrides {
        Overrides {
            prompt: self.prompt.clone(),
            model: self.model.clone(),
            temperature: self.temperature,
        }
    }
}

/// Encode a chat request body.
pub fn encode_request(
    message: &str,
    session_id: &str,
    identity: Option<&str>,
    overrides: &Overrides,
) -> Result<Vec<u8>, serde_json::Error> {
    let request = ChatRequest::new(
        message,
        session_id,
        identity.map(str::to_string),
        overrides.clone(),
    );
    serde_json::to_vec(&request)
}

/// Decode the `data` field of one SSE frame.
pub fn decode_event(raw: &str) -> Result<StreamEvent, DecodeError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(DecodeError::Empty);
    }
    Ok(serde_json::from_str(raw)?)
}

/// Decode the body of an error response received instead of a stream.
///
/// Such a body always ends the exchange, so it is returned as an abort event
/// carrying whatever `id`, `textResponse`, `sources` and `error` it had.
pub fn decode_error_body(body: &[u8]) -> Result<StreamEvent, DecodeError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(DecodeError::Empty);
    }
    let mut raw: RawEvent = serde_json::from_slice(body)?;
    raw.kind = Some("abort".to_string());
    raw.close = true;
    Ok(StreamEvent::from(raw))
}
