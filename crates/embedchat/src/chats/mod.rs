//! Embed chat records.

mod models;
mod store;

use thiserror::Error;

pub use models::{ChatRecord, NewChat, RESPONSE_SCHEMA_VERSION, SessionScope, StoredResponse};
pub use store::{ChatStore, SqliteChatStore};

/// Errors from the chat store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Chat not found: {chat_id}")]
    NotFound { chat_id: i64 },

    #[error("Chat database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Failed to encode chat response: {0}")]
    Encode(#[from] serde_json::Error),
}
