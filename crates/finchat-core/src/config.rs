//! Persisted config (Ollama endpoint, chunking, retrieval) in the app data directory.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::app_data;
use crate::chunks::{DEFAULT_MAX_CHARS, DEFAULT_OVERLAP};
use crate::context::DEFAULT_BUDGET_CHARS;
use crate::index::DEFAULT_TOP_K;
use crate::ollama::{DEFAULT_BASE_URL, DEFAULT_CHAT_MODEL, DEFAULT_EMBED_MODEL, DEFAULT_TIMEOUT};

pub const CONFIG_FILENAME: &str = "config.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ollama: OllamaConfig,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub context: ContextConfig,
    /// Curated company catalog (TOML). Unset means no curated data.
    pub catalog_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    pub base_url: String,
    pub embed_model: String,
    pub chat_model: String,
    pub timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            embed_model: DEFAULT_EMBED_MODEL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_MAX_CHARS,
            overlap: DEFAULT_OVERLAP,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { top_k: DEFAULT_TOP_K }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    pub budget_chars: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            budget_chars: DEFAULT_BUDGET_CHARS,
        }
    }
}

impl Config {
    /// Check values that would otherwise fail deep inside a request.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunking.max_chars == 0 || self.chunking.overlap >= self.chunking.max_chars {
            return Err(ConfigError::Invalid(format!(
                "chunking.overlap ({}) must be smaller than chunking.max_chars ({})",
                self.chunking.overlap, self.chunking.max_chars
            )));
        }
        if self.retrieval.top_k == 0 {
            return Err(ConfigError::Invalid("retrieval.top_k must be at least 1".into()));
        }
        if self.context.budget_chars == 0 {
            return Err(ConfigError::Invalid("context.budget_chars must be at least 1".into()));
        }
        if self.ollama.timeout_secs == 0 {
            return Err(ConfigError::Invalid("ollama.timeout_secs must be at least 1".into()));
        }
        if self.ollama.embed_model.trim().is_empty() {
            return Err(ConfigError::Invalid("ollama.embed_model must not be empty".into()));
        }
        Ok(())
    }

    pub fn catalog_path(&self) -> Option<PathBuf> {
        self.catalog_path.as_deref().filter(|s| !s.is_empty()).map(PathBuf::from)
    }
}

/// Path of `config.toml` in the app data directory.
pub fn config_path() -> Option<PathBuf> {
    app_data::app_data_dir().map(|dir| dir.join(CONFIG_FILENAME))
}

/// Load config from the app data directory. Returns default config if missing or invalid.
pub fn load_config() -> Config {
    config_path().map(|p| load_config_from(&p)).unwrap_or_default()
}

/// Load config from `path`; missing or unparsable files give the default.
pub fn load_config_from(path: &Path) -> Config {
    let Ok(s) = std::fs::read_to_string(path) else {
        return Config::default();
    };
    toml::from_str(&s).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "ignoring invalid config");
        Config::default()
    })
}

/// Validate and write `config` to `path`.
pub fn save_config_to(config: &Config, path: &Path) -> Result<(), ConfigError> {
    config.validate()?;
    let s = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;
    std::fs::write(path, s).map_err(ConfigError::Write)
}

/// Set and persist the curated catalog path in the config at `config_path`.
pub fn set_catalog_path(config_path: &Path, catalog: &Path) -> Result<Config, ConfigError> {
    let catalog = catalog.canonicalize().map_err(ConfigError::Canonicalize)?;
    if !catalog.is_file() {
        return Err(ConfigError::NotAFile(catalog));
    }
    let mut config = load_config_from(config_path);
    config.catalog_path = Some(catalog.to_string_lossy().into_owned());
    save_config_to(&config, config_path)?;
    Ok(config)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("failed to write config: {0}")]
    Write(std::io::Error),
    #[error("failed to resolve path: {0}")]
    Canonicalize(std::io::Error),
    #[error("not a file: {0}")]
    NotAFile(PathBuf),
    #[error("invalid config: {0}")]
    Invalid(String),
}
