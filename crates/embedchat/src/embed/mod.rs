//! Embed configurations and their resolution.

mod models;
mod repository;

use async_trait::async_trait;
use thiserror::Error;

pub use models::{ChatSettings, CreateEmbed, DEFAULT_HISTORY_WINDOW, EmbedConfig, ResolvedEmbed};
pub use repository::EmbedRepository;

/// Errors resolving or managing an embed.
#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("Embed not found: {0}")]
    NotFound(String),

    #[error("Embed is disabled: {0}")]
    Disabled(String),

    #[error("Invalid embed: {0}")]
    Invalid(String),

    #[error("Embed database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Looks up the configuration a widget request runs under.
#[async_trait]
pub trait EmbedResolver: Send + Sync {
    /// Resolve the public embed id. Unknown ids fail with
    /// [`EmbedError::NotFound`], disabled embeds with [`EmbedError::Disabled`].
    async fn resolve(&self, embed_uuid: &str) -> Result<ResolvedEmbed, EmbedError>;
}
