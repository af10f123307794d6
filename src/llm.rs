//! Text-understanding service client
//!
//! One call contract: `(system_instructions, user_text) -> generated_text`.
//! Callers treat the output as an opaque string; anything that needs
//! structure parses it leniently and degrades to "nothing extracted".

use crate::config::LlmConfig;
use crate::TravelError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument};

/// Errors that can occur during LLM operations
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// The single call contract against the text-understanding service
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<String, LlmError>;
}

/// Chat-completions client for OpenAI-compatible endpoints
pub struct OpenAiClient {
    model: String,
    api_key: String,
    base_url: String,
    temperature: f32,
    http: Client,
}

impl OpenAiClient {
    /// Create a client from configuration; reads the API key from the
    /// environment variable named in the config.
    pub fn from_config(config: &LlmConfig) -> Result<Self, TravelError> {
        let api_key = config.api_key()?;
        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;

        Ok(Self {
            model: config.model.clone(),
            api_key,
            base_url: config.base_url.clone(),
            temperature: config.temperature,
            http,
        })
    }
}

#[async_trait]
impl ChatModel for OpenAiClient {
    #[instrument(level = "debug", skip(self, system, user))]
    async fn complete(&self, system: &str, user: &str) -> Result<String, LlmError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            debug!(status = %status, "chat completion failed");
            return Err(LlmError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let api_response: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let content = api_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| LlmError::InvalidResponse("response contained no choices".to_string()))?;

        debug!(content_len = content.len(), "chat completion succeeded");
        Ok(content)
    }
}

// Chat-completions API response types

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_deserialization() {
        let raw = r#"{"choices":[{"message":{"role":"assistant","content":"JFK"}}]}"#;
        let parsed: ChatCompletionResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.choices[0].message.content, "JFK");
    }

    #[test]
    fn test_empty_choices_rejected() {
        let raw = r#"{"choices":[]}"#;
        let parsed: ChatCompletionResponse = serde_json::from_str(raw).unwrap();
        assert!(parsed.choices.is_empty());
    }
}
