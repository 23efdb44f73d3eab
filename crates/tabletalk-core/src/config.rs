//! Engine configuration
//!
//! Settings shared by the binaries: where the datasets live, which
//! model translates questions, and how long a sandbox run may take.
//! Loaded from the environment (with `.env` support via the binaries)
//! or built programmatically.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default SQLite database location
pub const DEFAULT_DB_PATH: &str = "data/tabletalk.db";

/// Default model used for all generation
pub const DEFAULT_MODEL: &str = "google/gemini-2.0-flash-exp:free";

/// Default wall-clock bound for one sandbox run
pub const DEFAULT_SANDBOX_TIMEOUT_MS: u64 = 2_000;

/// Main engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// OpenRouter API key
    pub api_key: String,

    /// Model ID sent to the provider
    pub model: String,

    /// Path to the SQLite database holding the datasets
    pub db_path: PathBuf,

    /// Rows of a table previewed to the chart generator
    pub sample_rows: usize,

    /// Wall-clock bound for a single sandbox run, in milliseconds
    pub sandbox_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            sample_rows: crate::engine::DEFAULT_SAMPLE_ROWS,
            sandbox_timeout_ms: DEFAULT_SANDBOX_TIMEOUT_MS,
        }
    }
}

impl EngineConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the API key
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    /// Set the model ID
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the database path
    pub fn with_db_path(mut self, db_path: impl Into<PathBuf>) -> Self {
        self.db_path = db_path.into();
        self
    }

    /// Set the sandbox timeout
    pub fn with_sandbox_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.sandbox_timeout_ms = timeout_ms;
        self
    }

    /// Load configuration from the process environment.
    ///
    /// Reads `OPENROUTER_API_KEY`, `TABLETALK_MODEL` and
    /// `TABLETALK_DB`; anything unset keeps its default.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(key) = std::env::var("OPENROUTER_API_KEY") {
            config.api_key = key;
        }
        if let Ok(model) = std::env::var("TABLETALK_MODEL") {
            config.model = model;
        }
        if let Ok(path) = std::env::var("TABLETALK_DB") {
            config.db_path = PathBuf::from(path);
        }
        config
    }
}
