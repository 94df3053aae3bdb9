//! Provider for any OpenAI-compatible chat-completions endpoint.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tracing::debug;

use super::provider::{ChatMessage, LlmProvider};
use crate::error::LlmError;

/// Default endpoint when none is configured.
pub const DEFAULT_BASE_URL: &str = "https://api.deepseek.com/v1";

pub struct OpenAiCompatibleProvider {
    name: String,
    base_url: String,
    api_key: SecretString,
    model: String,
    temperature: f64,
    max_tokens: u64,
    client: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(
        base_url: &str,
        api_key: SecretString,
        model: &str,
        temperature: f64,
        max_tokens: u64,
    ) -> Self {
        Self {
            name: "openai_compatible".to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
            temperature,
            max_tokens,
            client: reqwest::Client::new(),
        }
    }

    fn request_body(&self, messages: &[ChatMessage]) -> Value {
        json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "top_p": 0.9,
        })
    }
}

/// Pull the first choice's text out of a chat-completions response.
fn extract_content(provider: &str, body: &Value) -> Result<String, LlmError> {
    let content = body["choices"]
        .get(0)
        .and_then(|choice| choice["message"]["content"].as_str())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .ok_or_else(|| LlmError::InvalidResponse {
            provider: provider.to_string(),
            reason: "no message content in first choice".to_string(),
        })?;
    Ok(content.to_string())
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(url = %url, model = %self.model, messages = messages.len(), "Sending completion request");

        let resp = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .bearer_auth(self.api_key.expose_secret())
            .json(&self.request_body(messages))
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed {
                provider: self.name.clone(),
                reason: format!("connection failed ({url}): {e}"),
            })?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(LlmError::AuthFailed {
                provider: self.name.clone(),
            });
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(LlmError::RequestFailed {
                provider: self.name.clone(),
                reason: format!("API error {status}: {text}"),
            });
        }

        let body: Value = resp.json().await.map_err(|e| LlmError::InvalidResponse {
            provider: self.name.clone(),
            reason: e.to_string(),
        })?;
        extract_content(&self.name, &body)
    }
}
