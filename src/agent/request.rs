//! Request and response types of the dispatch entry point

use crate::llm::provider::{Message, TokenUsage};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Apology shown when no agent could answer
pub const GRACEFUL_RESPONSE_TEXT: &str = "I'm sorry, I'm having trouble responding right now. \
Some of my services are temporarily unavailable. Please try again in a moment.";

/// A user request to be routed to one agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRequest {
    pub message: String,
    /// Prior turns of the conversation, oldest first
    #[serde(default)]
    pub history: Vec<Message>,
    #[serde(default)]
    pub preferences: RequestPreferences,
    #[serde(default)]
    pub session_id: Option<String>,
}

impl AgentRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            history: Vec::new(),
            preferences: RequestPreferences::default(),
            session_id: None,
        }
    }

    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.preferences.capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// Per-request routing preferences
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestPreferences {
    /// Capabilities the caller explicitly asks for
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Agent to favour when it is eligible
    #[serde(default)]
    pub agent: Option<String>,
}

/// What an agent produced for one invocation
#[derive(Debug, Clone, PartialEq)]
pub struct AgentOutput {
    pub content: String,
    pub token_usage: Option<TokenUsage>,
}

/// Response returned to the caller of the dispatch entry point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    /// `None` when the response is the graceful fallback
    pub agent_id: Option<String>,
    pub confidence: f64,
    pub content: String,
    pub metadata: ResponseMetadata,
}

/// Processing metadata attached to every response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    pub request_id: Uuid,
    pub session_id: Option<String>,
    pub processing_time_ms: u64,
    pub token_usage: Option<TokenUsage>,
    pub attempts: usize,
    pub fallback_used: bool,
    pub system_health: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AgentResponse {
    /// Safe apologetic response for when routing or every attempt failed
    pub fn graceful(
        request: &AgentRequest,
        request_id: Uuid,
        processing_time_ms: u64,
        attempts: usize,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            agent_id: None,
            confidence: 0.0,
            content: GRACEFUL_RESPONSE_TEXT.to_string(),
            metadata: ResponseMetadata {
                request_id,
                session_id: request.session_id.clone(),
                processing_time_ms,
                token_usage: None,
                attempts,
                fallback_used: attempts > 1,
                system_health: false,
                error: Some(reason.into()),
            },
        }
    }

    pub fn is_graceful(&self) -> bool {
        self.agent_id.is_none()
    }
}
