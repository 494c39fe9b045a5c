//! Application configuration

pub mod personas;
pub mod settings;

use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use personas::{Persona, PersonaRegistry};
pub use settings::{RelaySettings, Settings};

/// OpenAI-compatible endpoint used when `GROQ_BASE_URL` is not set
pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub host: String,
    pub port: u16,
    #[serde(skip_serializing)]
    pub groq_api_key: Option<String>,
    pub groq_base_url: String,
    pub data_dir: PathBuf,
    pub personas_dir: Option<PathBuf>,
    pub settings_path: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".into()),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            groq_api_key: env::var("GROQ_API_KEY")
                .ok()
                .map(|key| key.trim().to_string())
                .filter(|key| !key.is_empty()),
            groq_base_url: env::var("GROQ_BASE_URL")
                .ok()
                .map(|url| url.trim_end_matches('/').to_string())
                .filter(|url| !url.is_empty())
                .unwrap_or_else(|| DEFAULT_BASE_URL.into()),
            data_dir: env::var("DUSKWAVE_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data")),
            personas_dir: env::var("DUSKWAVE_PERSONAS_DIR").ok().map(PathBuf::from),
            settings_path: env::var("DUSKWAVE_CONFIG").ok().map(PathBuf::from),
        })
    }

    /// Load deployment settings, or defaults when no settings file is configured
    pub fn load_settings(&self) -> Result<Settings, settings::ConfigError> {
        match &self.settings_path {
            Some(path) => Settings::from_file(path),
            None => Ok(Settings::default()),
        }
    }
}
