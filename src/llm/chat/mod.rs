#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Config;
use crate::provider::ProviderClient;

const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";

/// Client for the `/v1/chat/completions` endpoint
#[derive(Debug, Clone)]
pub struct ChatClient {
    provider: ProviderClient,
    model: String,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl ChatClient {
    #[inline]
    pub fn new(config: &Config) -> Result<Self> {
        let provider = ProviderClient::new(config)?;
        Ok(Self::with_provider(
            provider,
            config.generation.model.clone(),
            config.generation.temperature,
        ))
    }

    #[inline]
    pub fn with_provider(provider: ProviderClient, model: String, temperature: f32) -> Self {
        Self {
            provider,
            model,
            temperature,
        }
    }

    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    #[inline]
    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    /// Send `prompt` as a single user message and return the first choice
    #[inline]
    pub fn complete(&self, prompt: &str) -> Result<String> {
        debug!(
            "Requesting completion from {} (prompt length: {})",
            self.model,
            prompt.len()
        );

        let request = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response: ChatResponse = self
            .provider
            .post_json(CHAT_COMPLETIONS_PATH, &request)
            .context("Failed to generate completion")?;

        let content = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Language model returned no choices"))?
            .message
            .content
            .unwrap_or_default();

        let answer = content.trim();
        if answer.is_empty() {
            anyhow::bail!("Language model returned an empty completion");
        }

        debug!("Received completion ({} chars)", answer.len());
        Ok(answer.to_string())
    }
}
