//! Streaming chat backend for embeddable website widgets.
//!
//! A widget posts one message to `/embed/{embedId}/stream-chat` and reads the
//! reply as server-sent events. History and per-turn feedback are plain JSON
//! endpoints scoped by embed and caller-supplied session id.

pub mod api;
pub mod assistant;
pub mod chats;
pub mod config;
pub mod db;
pub mod embed;
pub mod feedback;
pub mod history;
pub mod stream;
pub mod telemetry;

use std::sync::Arc;

use crate::api::AppState;
use crate::assistant::Assistant;
use crate::chats::{ChatStore, SqliteChatStore};
use crate::db::Database;
use crate::embed::EmbedRepository;
use crate::feedback::FeedbackService;
use crate::history::HistoryService;
use crate::stream::ChatPipeline;
use crate::telemetry::TelemetrySink;

/// Wire the default SQLite-backed collaborators into handler state.
pub fn build_state(
    database: &Database,
    assistant: Arc<dyn Assistant>,
    telemetry: Arc<dyn TelemetrySink>,
    default_model: impl Into<String>,
) -> AppState {
    let store: Arc<dyn ChatStore> = Arc::new(SqliteChatStore::new(database.pool().clone()));
    let embeds = Arc::new(EmbedRepository::new(database.pool().clone()));

    AppState::new(
        database.clone(),
        embeds,
        HistoryService::new(store.clone()),
        FeedbackService::new(store.clone()),
        ChatPipeline::new(store, assistant, telemetry, default_model),
    )
}
