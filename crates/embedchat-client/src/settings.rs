use embedchat_protocol::Overrides;
use serde::{Deserialize, Serialize};

/// Where a widget talks to and what it asks for.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbedSettings {
    /// Server base URL, e.g. `https://chat.example.com/api`.
    pub base_api_url: String,
    /// Public id of the embed.
    pub embed_id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f64>,
}

impl EmbedSettings {
    pub fn new(base_api_url: impl Into<String>, embed_id: impl Into<String>) -> Self {
        Self {
            base_api_url: base_api_url.into(),
            embed_id: embed_id.into(),
            ..Self::default()
        }
    }

    pub fn overrides(&self) -> Overrides {
        Overrides {
            prompt: self.prompt.clone(),
            model: self.model.clone(),
            temperature: self.temperature,
        }
    }

    /// `{base}/embed/{embedId}`
    pub fn embed_url(&self) -> String {
        format!(
            "{}/embed/{}",
            self.base_api_url.trim_end_matches('/'),
            urlencoding::encode(&self.embed_id)
        )
    }
}
