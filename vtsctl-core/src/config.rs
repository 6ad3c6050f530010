//! Configuration management for vtsctl
//!
//! Config files are stored in platform-appropriate locations:
//! - Linux: ~/.config/vtsctl/
//! - macOS: ~/Library/Application Support/vtsctl/
//! - Windows: %APPDATA%\vtsctl\
//!
//! `VTSCTL_CONFIG` overrides the file location.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::catalog::{CatalogEntry, CatalogError, ExpressionCatalog};
use crate::protocol::PluginIdentity;
use crate::session::{ActivateDefault, DiscoveryPolicy, NoDefault};

/// Environment variable pointing at an alternate config file
pub const CONFIG_ENV: &str = "VTSCTL_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Invalid expression table: {0}")]
    CatalogError(#[from] CatalogError),

    #[error("Default expression {0} is not in the expression table")]
    UnknownDefault(String),

    #[error("Config directory not found")]
    NoDirFound,
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Token file; defaults to `vtube_token.txt` in the config directory
    pub token_file: Option<PathBuf>,

    /// Catalog name activated after the first expression listing
    pub default_expression: Option<String>,

    #[serde(default)]
    pub connection: ConnectionConfig,

    #[serde(default)]
    pub plugin: PluginConfig,

    /// Replaces the built-in expression table when non-empty
    #[serde(default)]
    pub expressions: Vec<CatalogEntry>,

    #[serde(default)]
    pub chat: ChatConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// VTube Studio endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default = "default_api_url")]
    pub url: String,
}

/// Identity shown in VTube Studio's plugin approval popup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginConfig {
    #[serde(default = "default_plugin_name")]
    pub name: String,

    #[serde(default = "default_plugin_developer")]
    pub developer: String,
}

/// Local OpenAI-compatible chat endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    #[serde(default = "default_chat_url")]
    pub url: String,

    #[serde(default = "default_chat_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// JSON file with a `content` key, prepended to every prompt
    pub system_prompt_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Write logs here instead of stderr
    pub file: Option<PathBuf>,
}

// Default value functions
fn default_api_url() -> String {
    crate::DEFAULT_API_URL.to_string()
}
fn default_plugin_name() -> String {
    "vtsctl".to_string()
}
fn default_plugin_developer() -> String {
    "vtsctl".to_string()
}
fn default_chat_url() -> String {
    crate::DEFAULT_CHAT_URL.to_string()
}
fn default_chat_model() -> String {
    "mistral-7b-instruct-v0.3".to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    300
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self { url: default_api_url() }
    }
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            name: default_plugin_name(),
            developer: default_plugin_developer(),
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            url: default_chat_url(),
            model: default_chat_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            system_prompt_file: None,
        }
    }
}

impl Config {
    /// Get config directory path
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|p| p.join("vtsctl"))
            .ok_or(ConfigError::NoDirFound)
    }

    /// Get config file path, honoring `VTSCTL_CONFIG`
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Ok(PathBuf::from(path));
        }
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load config from default location
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path()?;

        if !path.exists() {
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load config from specific path
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save config to specific path
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Where the authentication token lives
    pub fn token_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.token_file {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::config_dir()?.join(crate::DEFAULT_TOKEN_FILE)),
        }
    }

    /// Expression table from config, or the built-in one
    pub fn catalog(&self) -> Result<ExpressionCatalog, ConfigError> {
        if self.expressions.is_empty() {
            return Ok(ExpressionCatalog::default());
        }
        Ok(ExpressionCatalog::from_entries(self.expressions.iter().cloned())?)
    }

    pub fn plugin_identity(&self) -> PluginIdentity {
        PluginIdentity {
            plugin_name: self.plugin.name.clone(),
            plugin_developer: self.plugin.developer.clone(),
        }
    }

    /// Post-discovery policy selected by `default_expression`
    pub fn discovery_policy(&self, catalog: &ExpressionCatalog) -> Result<Box<dyn DiscoveryPolicy>, ConfigError> {
        match &self.default_expression {
            None => Ok(Box::new(NoDefault)),
            Some(name) if catalog.resolve(name).is_some() => Ok(Box::new(ActivateDefault::new(name.clone()))),
            Some(name) => Err(ConfigError::UnknownDefault(name.clone())),
        }
    }
}
