//! LLM provider abstraction and trait definitions
//!
//! Agents talk to upstream models only through [`LlmProvider`], which keeps the
//! routing core independent of any particular vendor API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// A single message in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

/// Message roles in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// LLM completion request parameters
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub model: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub metadata: HashMap<String, String>,
}

/// LLM completion response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub content: Option<String>,
    pub model: String,
    pub usage: TokenUsage,
    pub finish_reason: FinishReason,
    pub metadata: HashMap<String, String>,
}

/// Token usage statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Reason why completion finished
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    Error,
}

/// LLM provider trait for dependency injection and testing
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Get the provider name (e.g., "openai", "anthropic")
    fn name(&self) -> &str;

    /// Generate a completion from the given request
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Check if the provider is reachable and accepting requests
    async fn health_check(&self) -> Result<(), LlmError>;

    /// Requests left in the current rate-limit window, as last reported upstream
    fn rate_limit_remaining(&self) -> Option<u32> {
        None
    }
}

/// LLM provider errors
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    #[error("Provider not configured: {0}")]
    NotConfigured(String),
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),
    #[error("Request failed: {0}")]
    RequestFailed(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("API error: {0}")]
    ApiError(String),
}

/// Last rate-limit value seen in provider response headers
///
/// Stored as `u64` with `u64::MAX` meaning "never reported".
#[derive(Debug)]
pub struct RateLimitGauge(AtomicU64);

impl RateLimitGauge {
    const UNKNOWN: u64 = u64::MAX;

    pub fn new() -> Self {
        Self(AtomicU64::new(Self::UNKNOWN))
    }

    /// Update from a header map, ignoring absent or malformed values
    pub fn observe(&self, headers: &reqwest::header::HeaderMap, header_name: &str) {
        if let Some(remaining) = headers
            .get(header_name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u32>().ok())
        {
            self.0.store(u64::from(remaining), Ordering::Relaxed);
        }
    }

    pub fn get(&self) -> Option<u32> {
        match self.0.load(Ordering::Relaxed) {
            Self::UNKNOWN => None,
            value => u32::try_from(value).ok(),
        }
    }
}

impl Default for RateLimitGauge {
    fn default() -> Self {
        Self::new()
    }
}

/// Record the rate-limit header, then pass 2xx responses through
///
/// Non-success statuses become errors: 429 is throttling, 401/403 bad
/// credentials, anything else an API error carrying the response body.
pub(crate) async fn accept_response(
    vendor: &str,
    response: reqwest::Response,
    gauge: &RateLimitGauge,
    rate_limit_header: &str,
) -> Result<reqwest::Response, LlmError> {
    gauge.observe(response.headers(), rate_limit_header);

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(vendor, status, &body))
}

pub(crate) fn status_error(vendor: &str, status: reqwest::StatusCode, body: &str) -> LlmError {
    use reqwest::StatusCode;
    match status {
        StatusCode::TOO_MANY_REQUESTS => {
            LlmError::RateLimitExceeded(format!("{vendor} API rate limited: {body}"))
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            LlmError::AuthenticationFailed(format!("{vendor} API rejected credentials ({status})"))
        }
        _ => LlmError::ApiError(format!("{vendor} API error: {status} - {body}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderValue};

    #[test]
    fn test_message_role_serialization() {
        assert_eq!(
            serde_json::to_string(&MessageRole::System).unwrap(),
            "\"system\""
        );
        assert_eq!(
            serde_json::to_string(&MessageRole::Assistant).unwrap(),
            "\"assistant\""
        );
    }

    #[test]
    fn test_token_usage_default() {
        let usage = TokenUsage::default();
        assert_eq!(usage.total_tokens, 0);
    }

    #[test]
    fn test_status_error_mapping() {
        use reqwest::StatusCode;
        assert!(matches!(
            status_error("Anthropic", StatusCode::TOO_MANY_REQUESTS, ""),
            LlmError::RateLimitExceeded(_)
        ));
        assert!(matches!(
            status_error("OpenAI", StatusCode::FORBIDDEN, ""),
            LlmError::AuthenticationFailed(_)
        ));
        match status_error("Anthropic", StatusCode::BAD_GATEWAY, "oops") {
            LlmError::ApiError(message) => assert!(message.contains("502") && message.contains("oops")),
            other => panic!("unexpected mapping: {other:?}"),
        }
    }

    #[test]
    fn test_rate_limit_gauge_starts_unknown() {
        let gauge = RateLimitGauge::new();
        assert_eq!(gauge.get(), None);
    }

    #[test]
    fn test_rate_limit_gauge_reads_header() {
        let gauge = RateLimitGauge::new();
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-ratelimit-remaining-requests",
            HeaderValue::from_static("42"),
        );

        gauge.observe(&headers, "x-ratelimit-remaining-requests");
        assert_eq!(gauge.get(), Some(42));

        // Malformed values leave the previous reading in place
        headers.insert(
            "x-ratelimit-remaining-requests",
            HeaderValue::from_static("lots"),
        );
        gauge.observe(&headers, "x-ratelimit-remaining-requests");
        assert_eq!(gauge.get(), Some(42));
    }
}
