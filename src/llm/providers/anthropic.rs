//! Anthropic provider implementation
//!
//! Talks to the Messages API and keeps the last reported
//! `anthropic-ratelimit-requests-remaining` value for the status endpoint.

use crate::llm::provider::{
    accept_response, CompletionRequest, CompletionResponse, FinishReason, LlmError, LlmProvider,
    Message, MessageRole, RateLimitGauge, TokenUsage,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const RATE_LIMIT_HEADER: &str = "anthropic-ratelimit-requests-remaining";

/// Used when the request leaves `max_tokens` unset; the API requires one
const DEFAULT_MAX_TOKENS: u32 = 4096;

#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout: Duration,
    /// Value of the `anthropic-version` header
    pub version: String,
    /// Model used for the one-token health probe
    pub probe_model: String,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.anthropic.com/v1".to_string(),
            timeout: Duration::from_secs(60),
            version: "2023-06-01".to_string(),
            probe_model: "claude-3-5-haiku-20241022".to_string(),
        }
    }
}

pub struct AnthropicProvider {
    name: String,
    config: AnthropicConfig,
    client: Client,
    rate_limit: RateLimitGauge,
}

impl AnthropicProvider {
    /// Create a provider registered under `name`; fails without an API key
    pub fn new(name: impl Into<String>, config: AnthropicConfig) -> Result<Self, LlmError> {
        if config.api_key.is_empty() {
            return Err(LlmError::NotConfigured(
                "Anthropic API key is required".to_string(),
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

    /// The Messages API takes the system prompt as a top-level field
    fn split_system(messages: &[Message]) -> (Option<String>, Vec<WireMessage>) {
        let system = messages
            .iter()
            .filter(|m| m.role == MessageRole::System)
            .map(|m| m.content.as_str())
            .last()
            .map(str::to_string);
        let turns = messages
            .iter()
            .filter_map(|m| {
                let role = match m.role {
                    MessageRole::System => return None,
                    MessageRole::User => "user",
                    MessageRole::Assistant => "assistant",
                };
                Some(WireMessage {
                    role: role.to_string(),
                    content: m.content.clone(),
                })
            })
            .collect();
        (system, turns)
    }

    fn finish_reason(stop_reason: Option<&str>) -> FinishReason {
        match stop_reason {
            Some("end_turn" | "stop_sequence") => FinishReason::Stop,
            Some("max_tokens") => FinishReason::Length,
            _ => FinishReason::Error,
        }
    }

    async fn post_messages(&self, body: &MessagesRequest) -> Result<reqwest::Response, LlmError> {
        let response = self
            .client
            .post(format!("{}/messages", self.config.base_url))
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", &self.config.version)
            .json(body)
            .send()
            .await
            .map_err(|e| LlmError::NetworkError(e.to_string()))?;

        accept_response("Anthropic", response, &self.rate_limit, RATE_LIMIT_HEADER).await
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let (system, messages) = Self::split_system(&request.messages);
        let body = MessagesRequest {
            model: request.model.clone(),
            max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            messages,
            system,
            temperature: request.temperature,
        };
        debug!(
            provider = %self.name,
            model = %request.model,
            turns = body.messages.len(),
            "Sending Anthropic messages request"
        );

        let reply: MessagesResponse = self
            .post_messages(&body)
            .await?
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let text: String = reply
            .content
            .iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text.as_deref())
            .collect();
        if text.is_empty() {
            return Err(LlmError::InvalidResponse(
                "Anthropic response had no text content".to_string(),
            ));
        }

        let (input, output) = (reply.usage.input_tokens, reply.usage.output_tokens);
        Ok(CompletionResponse {
            content: Some(text),
            model: reply.model,
            usage: TokenUsage {
                prompt_tokens: input,
                completion_tokens: output,
                total_tokens: input + output,
            },
            finish_reason: Self::finish_reason(reply.stop_reason.as_deref()),
            metadata: request.metadata,
        })
    }

    /// No dedicated health endpoint; a one-token request proves auth and capacity
    async fn health_check(&self) -> Result<(), LlmError> {
        let probe = MessagesRequest {
            model: self.config.probe_model.clone(),
            max_tokens: 1,
            messages: vec![WireMessage {
                role: "user".to_string(),
                content: "ping".to_string(),
            }],
            system: None,
            temperature: None,
        };
        self.post_messages(&probe).await.map(|_| ())
    }

    fn rate_limit_remaining(&self) -> Option<u32> {
        self.rate_limit.get()
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    model: String,
    stop_reason: Option<String>,
    usage: WireUsage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    input_tokens: u32,
    output_tokens: u32,
}
