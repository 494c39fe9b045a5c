//! Deployment settings loaded from an optional TOML file
//!
//! Every section is optional; anything left out falls back to the defaults
//! the relay and conversation store were designed around.
//!
//! ```toml
//! [relay]
//! models = ["llama3-70b-8192", "llama3-8b-8192"]
//! max_tokens = 1000
//! temperature = 0.7
//! history_window = 10
//!
//! [storage]
//! max_conversations = 50
//! quota_bytes = 5242880
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Candidate models, most capable first
pub const DEFAULT_MODELS: [&str; 4] = [
    "llama3-70b-8192",
    "mixtral-8x7b-32768",
    "gemma-7b-it",
    "llama3-8b-8192",
];

/// Root settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Completion relay settings
    #[serde(default)]
    pub relay: RelaySettings,

    /// Conversation storage settings
    #[serde(default)]
    pub storage: StorageSettings,
}

impl Settings {
    /// Load settings from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load settings from a TOML string
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let settings: Settings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.relay.models.iter().any(|m| m.trim().is_empty()) {
            return Err(ConfigError::Validation(
                "relay.models must not contain empty names".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.relay.temperature) {
            return Err(ConfigError::Validation(format!(
                "relay.temperature must be between 0 and 2, got {}",
                self.relay.temperature
            )));
        }
        if self.storage.max_conversations == 0 {
            return Err(ConfigError::Validation(
                "storage.max_conversations must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Completion relay settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelaySettings {
    /// Candidate models in priority order
    #[serde(default = "default_models")]
    pub models: Vec<String>,

    /// Maximum output tokens per completion
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Number of most recent history entries forwarded with each message
    #[serde(default = "default_history_window")]
    pub history_window: usize,
}

fn default_models() -> Vec<String> {
    DEFAULT_MODELS.iter().map(|m| m.to_string()).collect()
}

fn default_max_tokens() -> u32 {
    1000
}

fn default_temperature() -> f32 {
    0.7
}

fn default_history_window() -> usize {
    10
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            models: default_models(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            history_window: default_history_window(),
        }
    }
}

/// Conversation storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Maximum number of conversations kept
    #[serde(default = "default_max_conversations")]
    pub max_conversations: usize,

    /// Maximum size in bytes of the serialized conversation collection, 0 disables the quota
    #[serde(default = "default_quota_bytes")]
    pub quota_bytes: usize,
}

fn default_max_conversations() -> usize {
    crate::core::DEFAULT_MAX_CONVERSATIONS
}

fn default_quota_bytes() -> usize {
    5 * 1024 * 1024
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            max_conversations: default_max_conversations(),
            quota_bytes: default_quota_bytes(),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}
