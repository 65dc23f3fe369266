//! Embed configuration models.

use embedchat_protocol::Overrides;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Default number of past exchanges sent to the assistant as context.
pub const DEFAULT_HISTORY_WINDOW: i64 = 20;

/// A deployed widget configuration as stored.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EmbedConfig {
    pub id: i64,
    /// Public identifier used in widget URLs.
    pub uuid: String,
    pub enabled: bool,
    /// Workspace the widget answers from.
    pub workspace: String,
    pub prompt: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub history_window: i64,
    pub max_chats_per_session: Option<i64>,
    pub created_at: String,
}

/// Input for creating an embed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateEmbed {
    pub workspace: String,
    pub prompt: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub history_window: Option<i64>,
    pub max_chats_per_session: Option<i64>,
}

/// Embed settings the chat pipeline works with.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedEmbed {
    pub id: i64,
    pub uuid: String,
    pub workspace: String,
    pub prompt: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub history_window: i64,
    pub max_chats_per_session: Option<i64>,
}

impl From<EmbedConfig> for ResolvedEmbed {
    fn from(config: EmbedConfig) -> Self {
        Self {
            id: config.id,
            uuid: config.uuid,
            workspace: config.workspace,
            prompt: config.prompt,
            model: config.model,
            temperature: config.temperature,
            history_window: config.history_window,
            max_chats_per_session: config.max_chats_per_session,
        }
    }
}

/// Settings for one chat turn after overrides are applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatSettings {
    pub prompt: Option<String>,
    pub model: String,
    pub temperature: Option<f64>,
}

impl ResolvedEmbed {
    /// Apply request overrides. A `None` override keeps the embed default;
    /// the model falls back to `fallback_model` when neither is set.
    pub fn settings(&self, overrides: &Overrides, fallback_model: &str) -> ChatSettings {
        ChatSettings {
            prompt: overrides.prompt.clone().or_else(|| self.prompt.clone()),
            model: overrides
                .model
                .clone()
                .or_else(|| self.model.clone())
                .unwrap_or_else(|| fallback_model.to_string()),
            temperature: overrides.temperature.or(self.temperature),
        }
    }
}
