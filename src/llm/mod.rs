//! LLM integration for the conversation responder.
//!
//! Supports:
//! - **Anthropic**: via rig-core, bridged by [`RigAdapter`]
//! - **OpenAI-compatible**: any `/chat/completions` endpoint (DeepSeek by default)
//!
//! The backend is chosen once from configuration; the rest of the crate only
//! sees `Arc<dyn LlmProvider>`.

pub mod openai_compatible;
pub mod provider;
mod rig_adapter;

pub use openai_compatible::OpenAiCompatibleProvider;
pub use provider::*;
pub use rig_adapter::RigAdapter;

use std::str::FromStr;
use std::sync::Arc;

use rig::client::CompletionClient;
use secrecy::{ExposeSecret, SecretString};

use crate::config::{env_parse, env_string};
use crate::error::{ConfigError, LlmError};

/// Supported LLM backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Anthropic,
    OpenAiCompatible,
}

impl FromStr for LlmBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "anthropic" => Ok(Self::Anthropic),
            "openai_compatible" | "openai" | "deepseek" => Ok(Self::OpenAiCompatible),
            other => Err(format!("unknown LLM backend '{other}'")),
        }
    }
}

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub api_key: SecretString,
    pub model: String,
    /// Endpoint for OpenAI-compatible backends.
    pub base_url: String,
    pub temperature: f64,
    pub max_tokens: u64,
}

impl LlmConfig {
    /// Read `CAMPAIGN_LLM_*` variables, with backend-specific key fallbacks.
    pub fn from_env() -> Result<Self, ConfigError> {
        let backend = env_parse("CAMPAIGN_LLM_BACKEND", LlmBackend::OpenAiCompatible)?;

        let (key_fallback, default_model) = match backend {
            LlmBackend::Anthropic => ("ANTHROPIC_API_KEY", "claude-sonnet-4-20250514"),
            LlmBackend::OpenAiCompatible => ("DEEPSEEK_API_KEY", "deepseek-chat"),
        };
        let api_key = env_string("CAMPAIGN_LLM_API_KEY")
            .or_else(|| env_string(key_fallback))
            .ok_or_else(|| ConfigError::MissingEnvVar(key_fallback.to_string()))?;

        Ok(Self {
            backend,
            api_key: SecretString::from(api_key),
            model: env_string("CAMPAIGN_LLM_MODEL").unwrap_or_else(|| default_model.to_string()),
            base_url: env_string("CAMPAIGN_LLM_BASE_URL")
                .unwrap_or_else(|| openai_compatible::DEFAULT_BASE_URL.to_string()),
            temperature: env_parse("CAMPAIGN_LLM_TEMPERATURE", 0.3)?,
            max_tokens: env_parse("CAMPAIGN_LLM_MAX_TOKENS", 200)?,
        })
    }
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    match config.backend {
        LlmBackend::Anthropic => create_anthropic_provider(config),
        LlmBackend::OpenAiCompatible => {
            tracing::info!(
                "Using OpenAI-compatible endpoint {} (model: {})",
                config.base_url,
                config.model
            );
            Ok(Arc::new(OpenAiCompatibleProvider::new(
                &config.base_url,
                config.api_key.clone(),
                &config.model,
                config.temperature,
                config.max_tokens,
            )))
        }
    }
}

fn create_anthropic_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    use rig::providers::anthropic;

    let client: rig::client::Client<anthropic::client::AnthropicExt> =
        anthropic::Client::new(config.api_key.expose_secret()).map_err(|e| {
            LlmError::RequestFailed {
                provider: "anthropic".to_string(),
                reason: format!("Failed to create Anthropic client: {}", e),
            }
        })?;

    let model = client.completion_model(&config.model);
    tracing::info!("Using Anthropic (model: {})", config.model);
    Ok(Arc::new(RigAdapter::new(
        model,
        &config.model,
        config.temperature,
        config.max_tokens,
    )))
}
