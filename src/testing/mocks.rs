//! Mock implementations for testing
//!
//! Provides mock HealthCheck, LlmProvider and Agent implementations so routing,
//! probing and dispatch can be exercised without upstream services.

use crate::agent::{Agent, AgentOutput, AgentRequest, Capability, CapabilitySet};
use crate::error::{AgentError, RelayError, RelayResult};
use crate::health::probe::HealthCheck;
use crate::health::status::HealthStatus;
use crate::llm::provider::{
    CompletionRequest, CompletionResponse, FinishReason, LlmError, LlmProvider, TokenUsage,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
enum CheckOutcome {
    Report(HealthStatus),
    SignalUnhealthy,
    Fail,
}

/// Mock health check with a scripted outcome
#[derive(Debug, Clone)]
pub struct MockHealthCheck {
    name: String,
    outcome: CheckOutcome,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
}

impl MockHealthCheck {
    fn with_outcome(name: impl Into<String>, outcome: CheckOutcome) -> Self {
        Self {
            name: name.into(),
            outcome,
            delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Component reports the given status
    pub fn reporting(name: impl Into<String>, status: HealthStatus) -> Self {
        Self::with_outcome(name, CheckOutcome::Report(status))
    }

    /// Component answers but says it is broken
    pub fn signalling_unhealthy(name: impl Into<String>) -> Self {
        Self::with_outcome(name, CheckOutcome::SignalUnhealthy)
    }

    /// Component cannot be reached
    pub fn failing(name: impl Into<String>) -> Self {
        Self::with_outcome(name, CheckOutcome::Fail)
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HealthCheck for MockHealthCheck {
    async fn check(&self) -> RelayResult<HealthStatus> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match &self.outcome {
            CheckOutcome::Report(status) => Ok(*status),
            CheckOutcome::SignalUnhealthy => Err(RelayError::component_unhealthy(
                &self.name,
                "mock component reported failure",
            )),
            CheckOutcome::Fail => Err(RelayError::check_failed("mock connection refused")),
        }
    }

    fn component_name(&self) -> &str {
        &self.name
    }
}

/// Mock LLM provider for testing
#[derive(Debug)]
pub struct MockLlmProvider {
    name: String,
    responses: Vec<String>,
    current_response: AtomicUsize,
    should_fail: bool,
    health_error: Option<LlmError>,
    rate_limit: Option<u32>,
}

impl MockLlmProvider {
    pub fn new(name: impl Into<String>, responses: Vec<String>) -> Self {
        Self {
            name: name.into(),
            responses,
            current_response: AtomicUsize::new(0),
            should_fail: false,
            health_error: None,
            rate_limit: None,
        }
    }

    pub fn single_response(name: impl Into<String>, response: impl Into<String>) -> Self {
        Self::new(name, vec![response.into()])
    }

    /// Completions and health checks both fail
    pub fn with_failure(name: impl Into<String>) -> Self {
        Self {
            should_fail: true,
            health_error: Some(LlmError::RequestFailed(
                "Mock health check failure".to_string(),
            )),
            ..Self::new(name, vec![])
        }
    }

    /// Health checks fail with the given error, completions still work
    pub fn with_health_error(mut self, error: LlmError) -> Self {
        self.health_error = Some(error);
        self
    }

    pub fn with_rate_limit(mut self, remaining: u32) -> Self {
        self.rate_limit = Some(remaining);
        self
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        if self.should_fail {
            return Err(LlmError::RequestFailed("Mock LLM failure".to_string()));
        }

        let index = self.current_response.fetch_add(1, Ordering::SeqCst);
        let content = if self.responses.is_empty() {
            "Mock response".to_string()
        } else {
            self.responses[index % self.responses.len()].clone()
        };

        Ok(CompletionResponse {
            content: Some(content),
            model: request.model,
            usage: TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            },
            finish_reason: FinishReason::Stop,
            metadata: HashMap::new(),
        })
    }

    async fn health_check(&self) -> Result<(), LlmError> {
        match &self.health_error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn rate_limit_remaining(&self) -> Option<u32> {
        self.rate_limit
    }
}

#[derive(Debug, Clone)]
enum AgentBehavior {
    Respond(String),
    Fail(AgentError),
    Hang,
}

/// Mock agent with scripted behaviour and a call counter
#[derive(Debug, Clone)]
pub struct MockAgent {
    id: String,
    provider: String,
    capabilities: CapabilitySet,
    behavior: AgentBehavior,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
}

impl MockAgent {
    fn with_behavior(
        id: impl Into<String>,
        provider: impl Into<String>,
        capabilities: &[(&str, f64)],
        behavior: AgentBehavior,
    ) -> Self {
        Self {
            id: id.into(),
            provider: provider.into(),
            capabilities: capabilities
                .iter()
                .map(|(name, weight)| Capability::new(name, *weight))
                .collect(),
            behavior,
            delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn responding(
        id: impl Into<String>,
        provider: impl Into<String>,
        capabilities: &[(&str, f64)],
        content: impl Into<String>,
    ) -> Self {
        Self::with_behavior(id, provider, capabilities, AgentBehavior::Respond(content.into()))
    }

    pub fn failing(
        id: impl Into<String>,
        provider: impl Into<String>,
        capabilities: &[(&str, f64)],
    ) -> Self {
        Self::with_behavior(
            id,
            provider,
            capabilities,
            AgentBehavior::Fail(AgentError::Failed("mock agent failure".to_string())),
        )
    }

    /// Never completes; only a timeout or cancellation ends the call
    pub fn hanging(
        id: impl Into<String>,
        provider: impl Into<String>,
        capabilities: &[(&str, f64)],
    ) -> Self {
        Self::with_behavior(id, provider, capabilities, AgentBehavior::Hang)
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Agent for MockAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn provider(&self) -> &str {
        &self.provider
    }

    fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    async fn respond(&self, _request: &AgentRequest) -> Result<AgentOutput, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match &self.behavior {
            AgentBehavior::Respond(content) => Ok(AgentOutput {
                content: content.clone(),
                token_usage: Some(TokenUsage {
                    prompt_tokens: 10,
                    completion_tokens: 5,
                    total_tokens: 15,
                }),
            }),
            AgentBehavior::Fail(error) => Err(error.clone()),
            AgentBehavior::Hang => {
                std::future::pending::<()>().await;
                Err(AgentError::Cancelled)
            }
        }
    }
}
