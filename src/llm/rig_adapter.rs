//! Bridge from rig's `CompletionModel` to [`LlmProvider`].

use async_trait::async_trait;
use rig::completion::{AssistantContent, CompletionModel, Message};

use super::provider::{ChatMessage, LlmProvider, Role};
use crate::error::LlmError;

pub struct RigAdapter<M> {
    model: M,
    model_name: String,
    temperature: f64,
    max_tokens: u64,
}

impl<M> RigAdapter<M> {
    pub fn new(model: M, model_name: &str, temperature: f64, max_tokens: u64) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
            temperature,
            max_tokens,
        }
    }
}

/// Split a transcript into rig's preamble, history and final prompt.
fn to_rig_parts(messages: &[ChatMessage]) -> (String, Vec<Message>, Option<Message>) {
    let preamble = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    let mut history: Vec<Message> = messages
        .iter()
        .filter_map(|m| match m.role {
            Role::User => Some(Message::user(m.content.clone())),
            Role::Assistant => Some(Message::assistant(m.content.clone())),
            Role::System => None,
        })
        .collect();
    let prompt = history.pop();

    (preamble, history, prompt)
}

#[async_trait]
impl<M> LlmProvider for RigAdapter<M>
where
    M: CompletionModel + Send + Sync + 'static,
{
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn generate(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let (preamble, history, prompt) = to_rig_parts(messages);
        let prompt = prompt.ok_or_else(|| LlmError::InvalidResponse {
            provider: self.model_name.clone(),
            reason: "transcript has no user message".to_string(),
        })?;

        let response = self
            .model
            .completion_request(prompt)
            .preamble(preamble)
            .messages(history)
            .temperature(self.temperature)
            .max_tokens(self.max_tokens)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed {
                provider: self.model_name.clone(),
                reason: e.to_string(),
            })?;

        let text = response
            .choice
            .iter()
            .filter_map(|content| match content {
                AssistantContent::Text(text) => Some(text.text.clone()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("");

        let text = text.trim();
        if text.is_empty() {
            return Err(LlmError::InvalidResponse {
                provider: self.model_name.clone(),
                reason: "no text content in completion".to_string(),
            });
        }
        Ok(text.to_string())
    }
}
