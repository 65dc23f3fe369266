//! Embed configuration repository.

use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::models::{CreateEmbed, DEFAULT_HISTORY_WINDOW, EmbedConfig, ResolvedEmbed};
use super::{EmbedError, EmbedResolver};

const SELECT_COLUMNS: &str = "SELECT id, uuid, enabled, workspace, prompt, model, temperature, \
     history_window, max_chats_per_session, created_at FROM embed_configs";

/// Repository for embed configurations.
#[derive(Debug, Clone)]
pub struct EmbedRepository {
    pool: SqlitePool,
}

impl EmbedRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new embed with a random public id.
    #[instrument(skip(self, input), fields(workspace = %input.workspace))]
    pub async fn create(&self, input: CreateEmbed) -> Result<EmbedConfig, EmbedError> {
        if input.workspace.trim().is_empty() {
            return Err(EmbedError::Invalid("workspace must not be empty".to_string()));
        }
        if input.history_window.is_some_and(|window| window < 0) {
            return Err(EmbedError::Invalid(
                "history window must not be negative".to_string(),
            ));
        }

        let uuid = Uuid::new_v4().to_string();
        debug!("Creating embed {}", uuid);

        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO embed_configs
                (uuid, workspace, prompt, model, temperature, history_window, max_chats_per_session)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&uuid)
        .bind(input.workspace.trim())
        .bind(&input.prompt)
        .bind(&input.model)
        .bind(input.temperature)
        .bind(input.history_window.unwrap_or(DEFAULT_HISTORY_WINDOW))
        .bind(input.max_chats_per_session)
        .fetch_one(&self.pool)
        .await?;

        self.get_by_id(id)
            .await?
            .ok_or_else(|| EmbedError::NotFound(uuid.clone()))
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<EmbedConfig>, EmbedError> {
        let embed = sqlx::query_as::<_, EmbedConfig>(&format!("{SELECT_COLUMNS} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(embed)
    }

    pub async fn get_by_uuid(&self, uuid: &str) -> Result<Option<EmbedConfig>, EmbedError> {
        let embed = sqlx::query_as::<_, EmbedConfig>(&format!("{SELECT_COLUMNS} WHERE uuid = ?"))
            .bind(uuid)
            .fetch_optional(&self.pool)
            .await?;
        Ok(embed)
    }

    pub async fn list(&self) -> Result<Vec<EmbedConfig>, EmbedError> {
        let embeds = sqlx::query_as::<_, EmbedConfig>(&format!("{SELECT_COLUMNS} ORDER BY id"))
            .fetch_all(&self.pool)
            .await?;
        Ok(embeds)
    }

    /// Enable or disable an embed. Returns false when no embed matched.
    pub async fn set_enabled(&self, uuid: &str, enabled: bool) -> Result<bool, EmbedError> {
        let result = sqlx::query("UPDATE embed_configs SET enabled = ? WHERE uuid = ?")
            .bind(enabled)
            .bind(uuid)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl EmbedResolver for EmbedRepository {
    async fn resolve(&self, embed_uuid: &str) -> Result<ResolvedEmbed, EmbedError> {
        let embed = self
            .get_by_uuid(embed_uuid)
            .await?
            .ok_or_else(|| EmbedError::NotFound(embed_uuid.to_string()))?;

        if !embed.enabled {
            return Err(EmbedError::Disabled(embed_uuid.to_string()));
        }

        Ok(embed.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    async fn repo() -> EmbedRepository {
        let db = Database::in_memory().await.unwrap();
        EmbedRepository::new(db.pool().clone())
    }

    #[tokio::test]
    async fn test_create_and_resolve() {
        let repo = repo().await;
        let embed = repo
            .create(CreateEmbed {
                workspace: "docs".to_string(),
                model: Some("llama3".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(embed.enabled);
        assert_eq!(embed.history_window, DEFAULT_HISTORY_WINDOW);

        let resolved = repo.resolve(&embed.uuid).await.unwrap();
        assert_eq!(resolved.id, embed.id);
        assert_eq!(resolved.model.as_deref(), Some("llama3"));
    }

    #[tokio::test]
    async fn test_resolve_unknown_is_not_found() {
        let repo = repo().await;
        let err = repo.resolve("missing").await.unwrap_err();
        assert!(matches!(err, EmbedError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_resolve_disabled_is_invalid() {
        let repo = repo().await;
        let embed = repo
            .create(CreateEmbed {
                workspace: "docs".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(repo.set_enabled(&embed.uuid, false).await.unwrap());
        let err = repo.resolve(&embed.uuid).await.unwrap_err();
        assert!(matches!(err, EmbedError::Disabled(_)));
    }

    #[tokio::test]
    async fn test_create_rejects_blank_workspace() {
        let repo = repo().await;
        let err = repo.create(CreateEmbed::default()).await.unwrap_err();
        assert!(matches!(err, EmbedError::Invalid(_)));
        assert!(repo.list().await.unwrap().is_empty());
    }
}
