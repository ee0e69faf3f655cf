//! OpenAI provider implementation
//!
//! Chat Completions API client. The remaining-requests header is captured on
//! every response, including the `/models` health probe.

use crate::llm::provider::{
    accept_response, CompletionRequest, CompletionResponse, FinishReason, LlmError, LlmProvider,
    Message, MessageRole, RateLimitGauge, TokenUsage,
};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const RATE_LIMIT_HEADER: &str = "x-ratelimit-remaining-requests";

/// OpenAI provider configuration
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    /// Any OpenAI-compatible endpoint works here
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

pub struct OpenAiProvider {
    name: String,
    config: OpenAiConfig,
    client: Client,
    rate_limit: RateLimitGauge,
}

impl OpenAiProvider {
    /// Create a provider registered under `name`; fails without an API key
    pub fn new(name: impl Into<String>, config: OpenAiConfig) -> Result<Self, LlmError> {
        if config.api_key.is_empty() {
            return Err(LlmError::NotConfigured(
                "OpenAI API key is required".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::NetworkError(e.to_string()))?;

        Ok(Self {
            name: name.into(),
            config,
            client,
            rate_limit: RateLimitGauge::new(),
        })
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.bearer_auth(&self.config.api_key)
    }

    async fn send(&self, builder: RequestBuilder) -> Result<reqwest::Response, LlmError> {
        let response = self
            .authorized(builder)
            .send()
            .await
            .map_err(|e| LlmError::NetworkError(e.to_string()))?;
        accept_response("OpenAI", response, &self.rate_limit, RATE_LIMIT_HEADER).await
    }

    fn to_wire(messages: &[Message]) -> Vec<ChatMessage> {
        messages
            .iter()
            .map(|m| ChatMessage {
                role: match m.role {
                    MessageRole::System => "system",
                    MessageRole::User => "user",
                    MessageRole::Assistant => "assistant",
                }
                .to_string(),
                content: m.content.clone(),
            })
            .collect()
    }

    fn finish_reason(reason: Option<&str>) -> FinishReason {
        match reason {
            Some("stop") => FinishReason::Stop,
            Some("length") => FinishReason::Length,
            Some("content_filter") => FinishReason::ContentFilter,
            _ => FinishReason::Error,
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = ChatRequest {
            model: request.model.clone(),
            messages: Self::to_wire(&request.messages),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };
        debug!(
            provider = %self.name,
            model = %request.model,
            messages = body.messages.len(),
            "Sending OpenAI chat completion"
        );

        let url = format!("{}/chat/completions", self.config.base_url);
        let reply: ChatResponse = self
            .send(self.client.post(url).json(&body))
            .await?
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let Some(choice) = reply.choices.into_iter().next() else {
            return Err(LlmError::InvalidResponse(
                "OpenAI response contained no choices".to_string(),
            ));
        };
        let usage = reply
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            })
            .unwrap_or_default();

        Ok(CompletionResponse {
            content: choice.message.content,
            model: reply.model,
            usage,
            finish_reason: Self::finish_reason(choice.finish_reason.as_deref()),
            metadata: request.metadata,
        })
    }

    async fn health_check(&self) -> Result<(), LlmError> {
        let url = format!("{}/models", self.config.base_url);
        self.send(self.client.get(url)).await.map(|_| ())
    }

    fn rate_limit_remaining(&self) -> Option<u32> {
        self.rate_limit.get()
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    model: String,
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_api_key() {
        let result = OpenAiProvider::new("openai", OpenAiConfig::default());
        assert!(matches!(result, Err(LlmError::NotConfigured(_))));
    }

    #[test]
    fn test_finish_reasons() {
        let cases = [
            (Some("stop"), FinishReason::Stop),
            (Some("length"), FinishReason::Length),
            (Some("content_filter"), FinishReason::ContentFilter),
            (Some("tool_calls"), FinishReason::Error),
            (None, FinishReason::Error),
        ];
        for (raw, expected) in cases {
            assert_eq!(OpenAiProvider::finish_reason(raw), expected, "{raw:?}");
        }
    }

    #[test]
    fn test_system_prompt_stays_inline() {
        let wire = OpenAiProvider::to_wire(&[
            Message {
                role: MessageRole::System,
                content: "Be brief.".to_string(),
            },
            Message {
                role: MessageRole::Assistant,
                content: "Sure.".to_string(),
            },
        ]);
        let roles: Vec<&str> = wire.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "assistant"]);
    }
}
