//! Server configuration
//!
//! Loading order: built-in defaults, then an optional TOML or YAML file
//! (chosen by extension), then environment overrides:
//! - `DAA_BIND`: listen address
//! - `DAA_TIMEOUT_MS`: default request budget
//! - `OPENAI_API_KEY`, `DAA_LLM_ENDPOINT`, `DAA_LLM_MODEL`: language model
//! - `DAA_QUERY_ENDPOINT`: remote query engine

use daa_collaborators::{OpenAiConfig, ScraperConfig};
use daa_core::DAAConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("cannot read {path}: {source}")]
    Io {
        /// File that failed
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// Config file content is invalid
    #[error("invalid config {path}: {message}")]
    Parse {
        /// File that failed
        path: PathBuf,
        /// Parser message
        message: String,
    },

    /// Extension is neither TOML nor YAML
    #[error("unsupported config format: {0}")]
    UnsupportedFormat(PathBuf),

    /// Environment variable holds an unusable value
    #[error("invalid value for {var}: {value}")]
    InvalidEnv {
        /// Variable name
        var: &'static str,
        /// Offending value
        value: String,
    },

    /// A collaborator could not be constructed
    #[error("collaborator setup failed: {0}")]
    Collaborator(String),
}

/// Query engine settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuerySettings {
    /// Remote endpoint; queries fail when unset
    pub endpoint: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_secs: 60,
        }
    }
}

/// Chart renderer settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartSettings {
    /// Ceiling on any requested byte budget
    pub max_bytes: usize,
    /// Smallest width tried when downscaling
    pub min_width: u32,
    /// Smallest height tried when downscaling
    pub min_height: u32,
}

impl Default for ChartSettings {
    fn default() -> Self {
        Self {
            max_bytes: 1_000_000,
            min_width: 64,
            min_height: 48,
        }
    }
}

/// Complete server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address
    pub bind: String,
    /// Pipeline settings
    pub core: DAAConfig,
    /// Language model client
    pub llm: OpenAiConfig,
    /// Page fetching
    pub scraper: ScraperConfig,
    /// Query engine
    pub query: QuerySettings,
    /// Chart rendering
    pub chart: ChartSettings,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
            core: DAAConfig::default(),
            llm: OpenAiConfig::default(),
            scraper: ScraperConfig::default(),
            query: QuerySettings::default(),
            chart: ChartSettings::default(),
        }
    }
}

impl ServerConfig {
    /// Defaults, then `path` if given, then the process environment
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, or an
    /// environment override is invalid.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|var| std::env::var(var).ok())?;
        Ok(config)
    }

    /// Parse a TOML (`.toml`) or YAML (`.yaml`, `.yml`) file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let parse_error = |message: String| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        };
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => toml::from_str(&content).map_err(|e| parse_error(e.to_string())),
            Some("yaml" | "yml") => serde_yaml::from_str(&content).map_err(|e| parse_error(e.to_string())),
            _ => Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
        }
    }

    /// Apply overrides from `lookup` (normally the process environment)
    ///
    /// # Errors
    /// Returns an error if `DAA_TIMEOUT_MS` is not a positive integer.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        if let Some(bind) = get("DAA_BIND") {
            self.bind = bind;
        }
        if let Some(raw) = get("DAA_TIMEOUT_MS") {
            self.core.default_timeout_ms = raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|ms| *ms > 0)
                .ok_or(ConfigError::InvalidEnv {
                    var: "DAA_TIMEOUT_MS",
                    value: raw,
                })?;
        }
        if let Some(key) = get("OPENAI_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Some(endpoint) = get("DAA_LLM_ENDPOINT") {
            self.llm.endpoint = endpoint;
        }
        if let Some(model) = get("DAA_LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(endpoint) = get("DAA_QUERY_ENDPOINT") {
            self.query.endpoint = Some(endpoint);
        }
        Ok(())
    }

    /// Whether a remote language model is configured
    #[must_use]
    pub fn has_language_model(&self) -> bool {
        self.llm.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }
}
