//! LLM client factory.
//!
//! Centralizes provider-specific logic for creating LLM clients.

use std::time::Duration;

use crate::error::{AskError, Result};
use crate::llm::{LlmClient, LlmProvider, MockLlmClient, OpenAiClient, OpenAiConfig};

/// Resolved settings for constructing a client.
#[derive(Debug, Clone, Default)]
pub struct ClientSettings {
    /// Which provider to talk to.
    pub provider: LlmProvider,
    /// Model override; the provider's default is used when absent.
    pub model: Option<String>,
    /// Base URL override for the OpenAI-compatible endpoint.
    pub base_url: Option<String>,
    /// API key override; the provider's environment variable is used when absent.
    pub api_key: Option<String>,
    /// Request timeout.
    pub timeout: Option<Duration>,
}

impl ClientSettings {
    /// Settings for the given provider with everything else defaulted.
    pub fn new(provider: LlmProvider) -> Self {
        Self {
            provider,
            ..Self::default()
        }
    }

    fn model(&self) -> String {
        self.model
            .clone()
            .unwrap_or_else(|| self.provider.default_model().to_string())
    }

    fn resolve_key(&self) -> Result<String> {
        if let Some(key) = &self.api_key {
            return Ok(key.clone());
        }

        let Some(var) = self.provider.api_key_env() else {
            return Ok(String::new());
        };

        std::env::var(var)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                AskError::llm(format!(
                    "No API key configured for {}. Set {}.",
                    self.provider, var
                ))
            })
    }
}

/// Creates an LLM client from resolved settings.
///
/// For providers that require an API key, the key is resolved in order:
/// 1. `settings.api_key`
/// 2. The provider's environment variable (`OPENAI_API_KEY`, `GROQ_API_KEY`)
pub fn create_client(settings: &ClientSettings) -> Result<Box<dyn LlmClient>> {
    let model = settings.model();
    let timeout_secs = settings.timeout.map(|t| t.as_secs());

    match settings.provider {
        LlmProvider::OpenAi | LlmProvider::Groq => {
            let key = settings.resolve_key()?;
            let mut config = if settings.provider == LlmProvider::Groq {
                OpenAiConfig::groq(key, model)
            } else {
                OpenAiConfig::new(key, model)
            };
            if let Some(base_url) = &settings.base_url {
                config = config.with_base_url(base_url.clone());
            }
            if let Some(secs) = timeout_secs {
                config = config.with_timeout(secs);
            }
            Ok(Box::new(OpenAiClient::new(config)?))
        }
        LlmProvider::Mock => Ok(Box::new(MockLlmClient::new())),
    }
}
