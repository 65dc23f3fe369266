//! Embed chat record models.

use chrono::DateTime;
use embedchat_protocol::Source;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use tracing::warn;

/// Current version of the stored response payload.
pub const RESPONSE_SCHEMA_VERSION: u32 = 1;

/// Scope every chat read and write is keyed by.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionScope {
    /// Storage id of the embed.
    pub embed_id: i64,
    /// Caller-supplied session id.
    pub session_id: String,
}

impl SessionScope {
    pub fn new(embed_id: i64, session_id: impl Into<String>) -> Self {
        Self {
            embed_id,
            session_id: session_id.into(),
        }
    }
}

/// Assistant response as stored in the `response` column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredResponse {
    #[serde(default = "legacy_version")]
    pub version: u32,
    #[serde(default)]
    pub text_response: String,
    #[serde(default)]
    pub sources: Vec<Source>,
    #[serde(rename = "type", default = "default_response_type")]
    pub response_type: String,
}

fn legacy_version() -> u32 {
    0
}

fn default_response_type() -> String {
    "chat".to_string()
}

impl StoredResponse {
    pub fn new(text_response: impl Into<String>, sources: Vec<Source>) -> Self {
        Self {
            version: RESPONSE_SCHEMA_VERSION,
            text_response: text_response.into(),
            sources,
            response_type: default_response_type(),
        }
    }

    /// Decode a stored column. Rows that are not valid JSON are kept as
    /// plain text so a single bad row never hides a whole session.
    pub(crate) fn decode(chat_id: i64, raw: &str) -> Self {
        match serde_json::from_str(raw) {
            Ok(response) => response,
            Err(e) => {
                warn!(chat_id, error = %e, "Stored response is not valid JSON, keeping raw text");
                Self {
                    version: legacy_version(),
                    text_response: raw.to_string(),
                    sources: Vec::new(),
                    response_type: default_response_type(),
                }
            }
        }
    }
}

/// Row as it comes out of SQLite.
#[derive(Debug, Clone, FromRow)]
pub(crate) struct ChatRow {
    pub id: i64,
    pub embed_id: i64,
    pub session_id: String,
    pub prompt: String,
    pub response: String,
    pub username: Option<String>,
    pub include: bool,
    pub feedback_score: Option<bool>,
    pub feedback_comment: Option<String>,
    pub created_at: String,
}

/// A persisted prompt/response exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRecord {
    pub id: i64,
    pub embed_id: i64,
    pub session_id: String,
    pub prompt: String,
    pub response: StoredResponse,
    pub username: Option<String>,
    pub include: bool,
    pub feedback_score: Option<bool>,
    pub feedback_comment: Option<String>,
    /// RFC 3339 timestamp.
    pub created_at: String,
}

impl ChatRecord {
    /// Creation time as unix seconds.
    pub fn sent_at(&self) -> Option<i64> {
        DateTime::parse_from_rfc3339(&self.created_at)
            .map(|ts| ts.timestamp())
            .ok()
    }
}

impl From<ChatRow> for ChatRecord {
    fn from(row: ChatRow) -> Self {
        Self {
            response: StoredResponse::decode(row.id, &row.response),
            id: row.id,
            embed_id: row.embed_id,
            session_id: row.session_id,
            prompt: row.prompt,
            username: row.username,
            include: row.include,
            feedback_score: row.feedback_score,
            feedback_comment: row.feedback_comment,
            created_at: row.created_at,
        }
    }
}

/// Input for persisting a finished exchange.
#[derive(Debug, Clone)]
pub struct NewChat {
    pub scope: SessionScope,
    pub prompt: String,
    pub response: StoredResponse,
    pub username: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_current_payload() {
        let raw = r#"{"version":1,"textResponse":"Hi","sources":[{"title":"a.md"}],"type":"chat"}"#;
        let response = StoredResponse::decode(1, raw);
        assert_eq!(response.version, RESPONSE_SCHEMA_VERSION);
        assert_eq!(response.text_response, "Hi");
        assert_eq!(response.sources.len(), 1);
    }

    #[test]
    fn test_decode_legacy_payload_without_version() {
        let raw = r#"{"text":"ignored","textResponse":"Old answer"}"#;
        let response = StoredResponse::decode(2, raw);
        assert_eq!(response.version, 0);
        assert_eq!(response.text_response, "Old answer");
        assert!(response.sources.is_empty());
    }

    #[test]
    fn test_decode_garbage_keeps_text() {
        let response = StoredResponse::decode(3, "plain words");
        assert_eq!(response.text_response, "plain words");
    }

    #[test]
    fn test_encode_uses_wire_names() {
        let value = serde_json::to_value(StoredResponse::new("Hi", vec![])).unwrap();
        assert_eq!(value["version"], 1);
        assert_eq!(value["textResponse"], "Hi");
        assert_eq!(value["type"], "chat");
    }
}
