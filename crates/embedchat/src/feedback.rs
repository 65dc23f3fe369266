//! Per-turn feedback scores and comments.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, instrument};

use crate::chats::{ChatStore, SessionScope, StoreError};

#[derive(Debug, Error)]
pub enum FeedbackError {
    #[error("Chat not found: {chat_id}")]
    NotFound { chat_id: i64 },

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for FeedbackError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { chat_id } => Self::NotFound { chat_id },
            other => Self::Store(other),
        }
    }
}

/// Feedback on chat records, scoped to the session that owns them.
#[derive(Clone)]
pub struct FeedbackService {
    store: Arc<dyn ChatStore>,
}

impl FeedbackService {
    pub fn new(store: Arc<dyn ChatStore>) -> Self {
        Self { store }
    }

    /// Set or clear (`None`) the score of a turn.
    #[instrument(skip(self))]
    pub async fn set_feedback(
        &self,
        scope: &SessionScope,
        chat_id: i64,
        score: Option<bool>,
    ) -> Result<(), FeedbackError> {
        self.ensure_owned(scope, chat_id).await?;
        self.store.set_feedback_score(scope, chat_id, score).await?;
        debug!("Updated feedback score");
        Ok(())
    }

    /// Set or clear the comment of a turn. Blank comments clear it.
    #[instrument(skip(self, comment))]
    pub async fn set_comment(
        &self,
        scope: &SessionScope,
        chat_id: i64,
        comment: Option<String>,
    ) -> Result<(), FeedbackError> {
        self.ensure_owned(scope, chat_id).await?;
        self.store
            .set_feedback_comment(scope, chat_id, normalize_comment(comment))
            .await?;
        debug!("Updated feedback comment");
        Ok(())
    }

    async fn ensure_owned(&self, scope: &SessionScope, chat_id: i64) -> Result<(), FeedbackError> {
        match self.store.get(scope, chat_id).await? {
            Some(_) => Ok(()),
            None => Err(FeedbackError::NotFound { chat_id }),
        }
    }
}

/// Trim a comment; empty or whitespace-only comments become `None`.
pub fn normalize_comment(comment: Option<String>) -> Option<String> {
    comment
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
}
