//! Configuration management for chinook-ask.
//!
//! Handles loading configuration from a TOML file and environment variables,
//! covering the LLM provider, the store file, and pipeline switches.

use crate::db::provision::FileProvisioner;
use crate::error::{AskError, Result};
use crate::llm::{ClientSettings, LlmProvider};
use crate::pipeline::PipelineOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Environment variable overriding `store.path`.
pub const ENV_DB_PATH: &str = "CHINOOK_DB_PATH";
/// Environment variable overriding `store.source`.
pub const ENV_DB_SOURCE: &str = "CHINOOK_DB_SOURCE";
/// Environment variable overriding `llm.provider`.
pub const ENV_LLM_PROVIDER: &str = "CHINOOK_LLM_PROVIDER";
/// Environment variable overriding `llm.model`.
pub const ENV_LLM_MODEL: &str = "CHINOOK_LLM_MODEL";

/// Main configuration structure for chinook-ask.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// LLM provider configuration.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Store file configuration.
    #[serde(default)]
    pub store: StoreConfig,

    /// Pipeline behaviour.
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// LLM provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmConfig {
    /// LLM provider: "openai", "groq" or "mock".
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Model name; the provider's default when absent.
    #[serde(default)]
    pub model: Option<String>,

    /// API base URL override.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_provider() -> String {
    "groq".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            base_url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Store file configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreConfig {
    /// Path of the SQLite file queried by the pipeline.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,

    /// File copied to `path` when it does not exist yet.
    #[serde(default)]
    pub source: Option<PathBuf>,

    /// Treat schema drift as fatal at startup.
    #[serde(default)]
    pub strict_schema: bool,
}

fn default_store_path() -> PathBuf {
    PathBuf::from("Chinook.db")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            source: None,
            strict_schema: false,
        }
    }
}

/// Pipeline behaviour switches.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineConfig {
    /// Reject anything but a single read-only query before execution.
    #[serde(default = "default_read_only")]
    pub read_only: bool,
}

fn default_read_only() -> bool {
    true
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            read_only: default_read_only(),
        }
    }
}

impl Config {
    /// Returns the default config file path for the current platform.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("chinook-ask")
            .join("config.toml")
    }

    /// Loads configuration from a TOML file. A missing file yields the defaults.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| AskError::config(format!("Failed to read config file: {e}")))?;

        Self::parse_toml(&content, path)
    }

    /// Parses configuration from a TOML string.
    fn parse_toml(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            AskError::config(format!(
                "Configuration error in {}:\n  {}",
                path.display(),
                e
            ))
        })
    }

    /// Applies `CHINOOK_*` environment variables over the file values.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(path) = lookup(ENV_DB_PATH) {
            self.store.path = PathBuf::from(path);
        }
        if let Some(source) = lookup(ENV_DB_SOURCE) {
            self.store.source = Some(PathBuf::from(source));
        }
        if let Some(provider) = lookup(ENV_LLM_PROVIDER) {
            self.llm.provider = provider;
        }
        if let Some(model) = lookup(ENV_LLM_MODEL) {
            self.llm.model = Some(model);
        }
    }

    /// Checks values serde cannot check.
    pub fn validate(&self) -> Result<()> {
        self.provider()?;

        if let Some(base_url) = &self.llm.base_url {
            let url = Url::parse(base_url)
                .map_err(|e| AskError::config(format!("Invalid llm.base_url '{base_url}': {e}")))?;
            if url.scheme() != "http" && url.scheme() != "https" {
                return Err(AskError::config(format!(
                    "Invalid scheme '{}' in llm.base_url. Expected 'http' or 'https'",
                    url.scheme()
                )));
            }
        }

        if self.llm.timeout_secs == 0 {
            return Err(AskError::config("llm.timeout_secs must be greater than zero"));
        }

        if self.store.path.as_os_str().is_empty() {
            return Err(AskError::config("store.path must not be empty"));
        }

        Ok(())
    }

    /// Parses the configured provider name.
    pub fn provider(&self) -> Result<LlmProvider> {
        self.llm.provider.parse().map_err(AskError::config)
    }

    /// Settings for constructing the LLM client.
    pub fn client_settings(&self) -> Result<ClientSettings> {
        Ok(ClientSettings {
            provider: self.provider()?,
            model: self.llm.model.clone(),
            base_url: self.llm.base_url.clone(),
            api_key: None,
            timeout: Some(Duration::from_secs(self.llm.timeout_secs)),
        })
    }

    /// Options for building the pipeline.
    ///
    /// The store is re-provisioned from `store.source` before every execution.
    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            read_only: self.pipeline.read_only,
            provisioner: Some(Arc::new(FileProvisioner::new(
                &self.store.path,
                self.store.source.clone(),
            ))),
        }
    }
}
