//! Persistence of embed chat records.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, instrument};

use super::StoreError;
use super::models::{ChatRecord, ChatRow, NewChat, SessionScope};

/// Scoped access to chat records.
///
/// Every operation is keyed by a [`SessionScope`]; there is no way to read or
/// write a record without naming the embed and session it belongs to.
#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn create(&self, chat: NewChat) -> Result<ChatRecord, StoreError>;

    /// Fetch one record if it belongs to `scope` (included or not).
    async fn get(&self, scope: &SessionScope, chat_id: i64)
    -> Result<Option<ChatRecord>, StoreError>;

    /// Included records in id order. With a limit, the most recent `limit`
    /// records are returned, still oldest first.
    async fn list(
        &self,
        scope: &SessionScope,
        limit: Option<i64>,
    ) -> Result<Vec<ChatRecord>, StoreError>;

    /// Mark every record of the scope `include = false`.
    async fn invalidate(&self, scope: &SessionScope) -> Result<u64, StoreError>;

    /// Count included records.
    async fn count(&self, scope: &SessionScope) -> Result<i64, StoreError>;

    async fn set_feedback_score(
        &self,
        scope: &SessionScope,
        chat_id: i64,
        score: Option<bool>,
    ) -> Result<(), StoreError>;

    async fn set_feedback_comment(
        &self,
        scope: &SessionScope,
        chat_id: i64,
        comment: Option<String>,
    ) -> Result<(), StoreError>;
}

const SELECT_COLUMNS: &str = "SELECT id, embed_id, session_id, prompt, response, username, \
     include, feedback_score, feedback_comment, created_at FROM embed_chats";

/// [`ChatStore`] backed by the `embed_chats` table.
#[derive(Debug, Clone)]
pub struct SqliteChatStore {
    pool: SqlitePool,
}

impl SqliteChatStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChatStore for SqliteChatStore {
    #[instrument(skip(self, chat), fields(embed_id = chat.scope.embed_id, session_id = %chat.scope.session_id))]
    async fn create(&self, chat: NewChat) -> Result<ChatRecord, StoreError> {
        let response = serde_json::to_string(&chat.response)?;
        let created_at = Utc::now().to_rfc3339();

        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO embed_chats (embed_id, session_id, prompt, response, username, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(chat.scope.embed_id)
        .bind(&chat.scope.session_id)
        .bind(&chat.prompt)
        .bind(&response)
        .bind(&chat.username)
        .bind(&created_at)
        .fetch_one(&self.pool)
        .await?;

        debug!(chat_id = id, "Stored embed chat");

        self.get(&chat.scope, id)
            .await?
            .ok_or(StoreError::NotFound { chat_id: id })
    }

    async fn get(
        &self,
        scope: &SessionScope,
        chat_id: i64,
    ) -> Result<Option<ChatRecord>, StoreError> {
        let row = sqlx::query_as::<_, ChatRow>(&format!(
            "{SELECT_COLUMNS} WHERE id = ? AND embed_id = ? AND session_id = ?"
        ))
        .bind(chat_id)
        .bind(scope.embed_id)
        .bind(&scope.session_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(ChatRecord::from))
    }

    async fn list(
        &self,
        scope: &SessionScope,
        limit: Option<i64>,
    ) -> Result<Vec<ChatRecord>, StoreError> {
        // SQLite treats a negative LIMIT as "no limit".
        let rows = sqlx::query_as::<_, ChatRow>(&format!(
            r#"
            SELECT * FROM (
                {SELECT_COLUMNS}
                WHERE embed_id = ? AND session_id = ? AND include = 1
                ORDER BY id DESC
                LIMIT ?
            ) ORDER BY id ASC
            "#
        ))
        .bind(scope.embed_id)
        .bind(&scope.session_id)
        .bind(limit.unwrap_or(-1))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ChatRecord::from).collect())
    }

    #[instrument(skip(self))]
    async fn invalidate(&self, scope: &SessionScope) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE embed_chats SET include = 0 WHERE embed_id = ? AND session_id = ? AND include = 1",
        )
        .bind(scope.embed_id)
        .bind(&scope.session_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn count(&self, scope: &SessionScope) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM embed_chats WHERE embed_id = ? AND session_id = ? AND include = 1",
        )
        .bind(scope.embed_id)
        .bind(&scope.session_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn set_feedback_score(
        &self,
        scope: &SessionScope,
        chat_id: i64,
        score: Option<bool>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE embed_chats SET feedback_score = ? WHERE id = ? AND embed_id = ? AND session_id = ?",
        )
        .bind(score)
        .bind(chat_id)
        .bind(scope.embed_id)
        .bind(&scope.session_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound { chat_id });
        }
        Ok(())
    }

    async fn set_feedback_comment(
        &self,
        scope: &SessionScope,
        chat_id: i64,
        comment: Option<String>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE embed_chats SET feedback_comment = ? WHERE id = ? AND embed_id = ? AND session_id = ?",
        )
        .bind(&comment)
        .bind(chat_id)
        .bind(scope.embed_id)
        .bind(&scope.session_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound { chat_id });
        }
        Ok(())
    }
}
