//! Persisted config (Ollama endpoint, models, retrieval knobs) in the app data directory.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::app_data;
use crate::chunks::{ChunkerConfig, DEFAULT_WINDOW_LINES};
use crate::index::{IngestConfig, DEFAULT_BATCH_SIZE};
use crate::ollama::{DEFAULT_BASE_URL, DEFAULT_CHAT_MODEL, DEFAULT_EMBED_MODEL};
use crate::retrieve::DEFAULT_TOP_K;

const CONFIG_FILENAME: &str = "config.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ollama_url: String,
    pub embed_model: String,
    /// Model used for answers, explanations and evaluation grading.
    pub chat_model: String,
    /// Prefix embedded text with `search_document:` / `search_query:`.
    pub task_prefixes: bool,
    /// Lines per window when a file is not chunked by declarations.
    pub window_lines: usize,
    /// Also chunk functions and classes nested inside other definitions.
    pub nested_chunks: bool,
    pub top_k: usize,
    /// Chunks embedded and written per request.
    pub batch_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ollama_url: DEFAULT_BASE_URL.to_string(),
            embed_model: DEFAULT_EMBED_MODEL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            task_prefixes: true,
            window_lines: DEFAULT_WINDOW_LINES,
            nested_chunks: true,
            top_k: DEFAULT_TOP_K,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl Config {
    /// Ingestion settings derived from this config.
    pub fn ingest(&self) -> IngestConfig {
        IngestConfig {
            chunker: ChunkerConfig {
                window_lines: self.window_lines,
                nested_chunks: self.nested_chunks,
            },
            batch_size: self.batch_size,
        }
    }
}

/// Path of `config.toml`, if the app data directory can be determined.
pub fn config_path() -> Option<PathBuf> {
    app_data::app_data_dir().map(|d| d.join(CONFIG_FILENAME))
}

/// Load config from the app data directory. Returns default config if missing or invalid.
pub fn load_config() -> Config {
    let Some(path) = config_path() else {
        return Config::default();
    };
    let Ok(s) = std::fs::read_to_string(&path) else {
        return Config::default();
    };
    parse_config(&s)
}

fn parse_config(s: &str) -> Config {
    match toml::from_str(s) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("ignoring invalid config: {e}");
            Config::default()
        }
    }
}

/// Save config to the app data directory.
pub fn save_config(config: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path().ok_or(ConfigError::NoDataDir)?;
    let s = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;
    std::fs::write(&path, s).map_err(ConfigError::Write)?;
    Ok(path)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not determine app data directory")]
    NoDataDir,
    #[error("failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("failed to write config: {0}")]
    Write(std::io::Error),
}
