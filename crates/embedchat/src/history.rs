//! Client-visible conversation history.

use std::sync::Arc;

use embedchat_protocol::ChatTurn;
use tracing::{error, instrument};

use crate::chats::{ChatRecord, ChatStore, SessionScope, StoreError};

/// Turn persisted records into the ordered user/system turns a widget shows.
///
/// Every record yields exactly two turns, user first, each with a fresh id.
pub fn assemble_history(records: &[ChatRecord]) -> Vec<ChatTurn> {
    let mut turns = Vec::with_capacity(records.len() * 2);

    for record in records {
        let sent_at = record.sent_at();

        let mut user = ChatTurn::user(record.prompt.clone());
        user.sent_at = sent_at;
        turns.push(user);

        let mut system = ChatTurn::system(record.response.text_response.clone());
        system.sources = Some(record.response.sources.clone());
        system.chat_id = Some(record.id);
        system.sent_at = sent_at;
        system.feedback_score = record.feedback_score;
        turns.push(system);
    }

    turns
}

/// Remove sources from every system turn.
pub fn redact_sources(turns: Vec<ChatTurn>) -> Vec<ChatTurn> {
    turns
        .into_iter()
        .map(|mut turn| {
            if turn.is_system() {
                turn.sources = None;
            }
            turn
        })
        .collect()
}

/// History reads and invalidation for embed sessions.
#[derive(Clone)]
pub struct HistoryService {
    store: Arc<dyn ChatStore>,
}

impl HistoryService {
    pub fn new(store: Arc<dyn ChatStore>) -> Self {
        Self { store }
    }

    /// Redacted history of a session. Store failures yield an empty history.
    #[instrument(skip(self))]
    pub async fn session_history(&self, scope: &SessionScope) -> Vec<ChatTurn> {
        match self.store.list(scope, None).await {
            Ok(records) => redact_sources(assemble_history(&records)),
            Err(e) => {
                error!("Failed to load embed session history: {}", e);
                Vec::new()
            }
        }
    }

    /// Hide every record of the session from later history reads.
    pub async fn invalidate(&self, scope: &SessionScope) -> Result<u64, StoreError> {
        self.store.invalidate(scope).await
    }
}
