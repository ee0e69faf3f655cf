//! Agent abstraction and the LLM-backed implementation

use crate::agent::capability::CapabilitySet;
use crate::agent::request::{AgentOutput, AgentRequest};
use crate::config::AgentConfig;
use crate::error::AgentError;
use crate::llm::provider::{CompletionRequest, LlmProvider, Message, MessageRole};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// A routable unit that can answer a request
#[async_trait]
pub trait Agent: Send + Sync {
    fn id(&self) -> &str;

    /// Name of the provider component this agent depends on
    fn provider(&self) -> &str;

    fn capabilities(&self) -> &CapabilitySet;

    async fn respond(&self, request: &AgentRequest) -> Result<AgentOutput, AgentError>;
}

/// Agent that answers through a single LLM provider
pub struct LlmAgent {
    config: AgentConfig,
    capabilities: CapabilitySet,
    model: String,
    provider: Arc<dyn LlmProvider>,
}

impl LlmAgent {
    pub fn new(config: AgentConfig, model: impl Into<String>, provider: Arc<dyn LlmProvider>) -> Self {
        let capabilities = CapabilitySet::from(&config.capabilities);
        Self {
            config,
            capabilities,
            model: model.into(),
            provider,
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    fn build_messages(&self, request: &AgentRequest) -> Vec<Message> {
        let mut messages = Vec::with_capacity(request.history.len() + 2);
        messages.push(Message {
            role: MessageRole::System,
            content: self.config.system_prompt.clone(),
        });
        // The agent owns the system prompt; callers cannot inject one
        messages.extend(
            request
                .history
                .iter()
                .filter(|m| m.role != MessageRole::System)
                .cloned(),
        );
        messages.push(Message {
            role: MessageRole::User,
            content: request.message.clone(),
        });
        messages
    }
}

#[async_trait]
impl Agent for LlmAgent {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn provider(&self) -> &str {
        &self.config.provider
    }

    fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    async fn respond(&self, request: &AgentRequest) -> Result<AgentOutput, AgentError> {
        let mut metadata = HashMap::new();
        if let Some(session_id) = &request.session_id {
            metadata.insert("session_id".to_string(), session_id.clone());
        }

        let completion = CompletionRequest {
            messages: self.build_messages(request),
            model: self.model.clone(),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            metadata,
        };

        let response = self.provider.complete(completion).await?;
        debug!(
            agent = %self.config.id,
            model = %response.model,
            tokens = response.usage.total_tokens,
            "Agent completion received"
        );

        match response.content {
            Some(content) if !content.trim().is_empty() => Ok(AgentOutput {
                content,
                token_usage: Some(response.usage),
            }),
            _ => Err(AgentError::EmptyResponse),
        }
    }
}
