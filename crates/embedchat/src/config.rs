//! Server configuration.
//!
//! Layered as defaults, then `config.toml`, then `EMBEDCHAT__SECTION__KEY`
//! environment variables.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::embed::DEFAULT_HISTORY_WINDOW;

pub const APP_NAME: &str = "embedchat";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub assistant: AssistantConfig,
    pub chat: ChatConfig,
    pub telemetry: TelemetryConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3001,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database file. Defaults to `embedchat.db` in the data directory.
    pub path: Option<String>,
}

/// Which assistant answers chat messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssistantProvider {
    /// OpenAI-compatible `/chat/completions` endpoint.
    #[default]
    Openai,
    /// Repeat every message back. No network access.
    Echo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    pub provider: AssistantProvider,
    pub base_url: String,
    pub api_key: Option<String>,
    pub default_model: String,
    /// Connect timeout for assistant requests. Replies stream without a
    /// total timeout and end when the client disconnects.
    pub connect_timeout_secs: u64,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            provider: AssistantProvider::default(),
            base_url: "http://localhost:11434/v1".to_string(),
            api_key: None,
            default_model: "llama3.1".to_string(),
            connect_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// History window for embeds created without one.
    pub history_window: i64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            history_window: DEFAULT_HISTORY_WINDOW,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub enabled: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Database file, with `~` and variables expanded.
    pub fn database_path(&self, data_dir: &Path) -> Result<PathBuf> {
        match &self.database.path {
            Some(path) => expand_str_path(path),
            None => Ok(data_dir.join("embedchat.db")),
        }
    }
}

/// Load the config at `path`, writing the defaults there first if missing.
pub fn load_or_init_config(path: &Path, dry_run: bool) -> Result<AppConfig> {
    if !path.exists() && !dry_run {
        write_default_config(path)?;
    }
    load_config(path)
}

pub fn load_config(path: &Path) -> Result<AppConfig> {
    let built = Config::builder()
        .set_default("server.host", "127.0.0.1")?
        .set_default("server.port", 3001_i64)?
        .set_default("logging.level", "info")?
        .add_source(File::from(path).format(FileFormat::Toml).required(false))
        .add_source(Environment::with_prefix(&env_prefix()).separator("__"))
        .build()
        .context("building configuration")?;

    built
        .try_deserialize()
        .context("deserializing configuration")
}

pub fn write_default_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating config directory {parent:?}"))?;
    }

    let config = AppConfig::default();
    let toml = toml::to_string_pretty(&config).context("serializing default config to TOML")?;
    let mut body = format!("# Configuration for {APP_NAME}\n# File: {}\n\n", path.display());
    body.push_str(&toml);
    fs::write(path, body).with_context(|| format!("writing config file to {}", path.display()))
}

pub fn expand_path(path: PathBuf) -> Result<PathBuf> {
    if let Some(text) = path.to_str() {
        expand_str_path(text)
    } else {
        Ok(path)
    }
}

pub fn expand_str_path(text: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(text).context("expanding path")?;
    Ok(PathBuf::from(expanded.to_string()))
}

pub fn default_config_dir() -> Result<PathBuf> {
    if let Some(dir) = env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir).join(APP_NAME));
    }

    if let Some(dir) = dirs::config_dir() {
        return Ok(dir.join(APP_NAME));
    }

    dirs::home_dir()
        .map(|home| home.join(".config").join(APP_NAME))
        .ok_or_else(|| anyhow!("unable to determine configuration directory"))
}

pub fn default_data_dir() -> Result<PathBuf> {
    if let Some(dir) = env::var_os("XDG_DATA_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir).join(APP_NAME));
    }

    if let Some(dir) = dirs::data_dir() {
        return Ok(dir.join(APP_NAME));
    }

    dirs::home_dir()
        .map(|home| home.join(".local").join("share").join(APP_NAME))
        .ok_or_else(|| anyhow!("unable to determine data directory"))
}

fn env_prefix() -> String {
    APP_NAME.to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_first_run_writes_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("embedchat").join("config.toml");

        let config = load_or_init_config(&path, false).unwrap();
        assert!(path.exists());
        assert_eq!(config.server.port, 3001);
        assert_eq!(config.assistant.provider, AssistantProvider::Openai);
        assert_eq!(config.chat.history_window, DEFAULT_HISTORY_WINDOW);

        let written = fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("# Configuration for embedchat"));
    }

    #[test]
    fn test_dry_run_does_not_write() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");

        let config = load_or_init_config(&path, true).unwrap();
        assert!(!path.exists());
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_file_values_override_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(
            &path,
            "[server]\nport = 9000\n\n[assistant]\nprovider = \"echo\"\ndefault_model = \"tiny\"\n",
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.assistant.provider, AssistantProvider::Echo);
        assert_eq!(config.assistant.default_model, "tiny");
        assert!(config.telemetry.enabled);
    }

    #[test]
    fn test_database_path_defaults_to_data_dir() {
        let config = AppConfig::default();
        let path = config.database_path(Path::new("/var/lib/embedchat")).unwrap();
        assert_eq!(path, PathBuf::from("/var/lib/embedchat/embedchat.db"));
    }
}
