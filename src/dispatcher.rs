//! Select, invoke, record, fall back
//!
//! Every attempt is recorded in the tracker exactly once. An attempt whose
//! future is dropped before it settles (caller cancelled the dispatch) is
//! recorded as a failure by [`AttemptGuard`]. System totals are updated by
//! [`DispatchTimer`] on drop, so cancelled dispatches are counted too.

use crate::agent::{Agent, AgentOutput, AgentRequest, AgentResponse, ResponseMetadata};
use crate::config::RoutingSection;
use crate::dispatch_span;
use crate::error::{AgentError, RelayError, RelayResult};
use crate::health::monitor::HealthLayout;
use crate::health::status::HealthStatus;
use crate::observability::metrics::MetricsTracker;
use crate::routing::{AgentRouter, HealthSnapshot};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

/// Dispatch limits taken from `[routing]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DispatchSettings {
    pub timeout: Duration,
    pub fallback_enabled: bool,
    pub max_attempts: Option<usize>,
}

impl From<&RoutingSection> for DispatchSettings {
    fn from(section: &RoutingSection) -> Self {
        Self {
            timeout: Duration::from_millis(section.dispatch_timeout_ms),
            fallback_enabled: section.fallback_enabled,
            max_attempts: section.max_attempts,
        }
    }
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self::from(&RoutingSection::default())
    }
}

/// Records one attempt; a guard dropped while armed counts as a failure
struct AttemptGuard<'a> {
    tracker: &'a MetricsTracker,
    agent_id: String,
    provider: String,
    start: Instant,
    armed: bool,
}

impl<'a> AttemptGuard<'a> {
    fn new(tracker: &'a MetricsTracker, agent: &dyn Agent) -> Self {
        Self {
            tracker,
            agent_id: agent.id().to_string(),
            provider: agent.provider().to_string(),
            start: Instant::now(),
            armed: true,
        }
    }

    fn finish(mut self, result: &Result<AgentOutput, AgentError>) {
        self.armed = false;
        let latency = self.start.elapsed();
        match result {
            Ok(_) => {
                self.tracker.record_outcome(&self.agent_id, true, latency);
                self.tracker.record_outcome(&self.provider, true, latency);
            }
            Err(error) => {
                self.tracker.record_outcome(&self.agent_id, false, latency);
                if blames_provider(error) {
                    self.tracker.record_outcome(&self.provider, false, latency);
                }
            }
        }
    }
}

impl Drop for AttemptGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let latency = self.start.elapsed();
            warn!(agent = %self.agent_id, "Attempt cancelled before completion");
            self.tracker.record_outcome(&self.agent_id, false, latency);
            self.tracker.record_outcome(&self.provider, false, latency);
        }
    }
}

/// Counts one dispatch in the system totals when dropped
struct DispatchTimer<'a> {
    tracker: &'a MetricsTracker,
    start: Instant,
}

impl<'a> DispatchTimer<'a> {
    fn start(tracker: &'a MetricsTracker) -> Self {
        Self {
            tracker,
            start: Instant::now(),
        }
    }
}

impl Drop for DispatchTimer<'_> {
    fn drop(&mut self) {
        self.tracker.record_dispatch(self.start.elapsed());
    }
}

/// Failures that say something about the upstream provider, not just the agent
fn blames_provider(error: &AgentError) -> bool {
    matches!(
        error,
        AgentError::Llm(_) | AgentError::Timeout { .. } | AgentError::Cancelled
    )
}

/// Routes a request and retries on the next best agent after failures
pub struct Dispatcher {
    router: AgentRouter,
    agents: Vec<Arc<dyn Agent>>,
    tracker: Arc<MetricsTracker>,
    layout: HealthLayout,
    settings: DispatchSettings,
}

impl Dispatcher {
    pub fn new(
        router: AgentRouter,
        agents: Vec<Arc<dyn Agent>>,
        tracker: Arc<MetricsTracker>,
        layout: HealthLayout,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            router,
            agents,
            tracker,
            layout,
            settings,
        }
    }

    pub fn agents(&self) -> &[Arc<dyn Agent>] {
        &self.agents
    }

    pub fn settings(&self) -> DispatchSettings {
        self.settings
    }

    /// Current verdict plus every tracked component, read once
    pub fn health_snapshot(&self) -> HealthSnapshot {
        HealthSnapshot::new(
            self.layout.verdict(&self.tracker),
            self.tracker.snapshot_all(),
        )
    }

    /// Attempts allowed for a request with `eligible` matching agents
    pub fn attempt_limit(&self, eligible: usize) -> usize {
        if !self.settings.fallback_enabled {
            return 1;
        }
        let limit = eligible.max(1);
        match self.settings.max_attempts {
            Some(cap) => limit.min(cap),
            None => limit,
        }
    }

    pub async fn dispatch(&self, request: &AgentRequest) -> RelayResult<AgentResponse> {
        let snapshot = self.health_snapshot();
        self.dispatch_with_snapshot(request, &snapshot).await
    }

    /// Dispatch against a snapshot taken by the caller
    pub async fn dispatch_with_snapshot(
        &self,
        request: &AgentRequest,
        snapshot: &HealthSnapshot,
    ) -> RelayResult<AgentResponse> {
        let request_id = Uuid::new_v4();
        let span = dispatch_span!(request_id = %request_id);
        let timer = DispatchTimer::start(&self.tracker);

        self.run_attempts(request, snapshot, request_id, timer.start)
            .instrument(span)
            .await
    }

    async fn run_attempts(
        &self,
        request: &AgentRequest,
        snapshot: &HealthSnapshot,
        request_id: Uuid,
        start: Instant,
    ) -> RelayResult<AgentResponse> {
        let mut excluded: HashSet<String> = HashSet::new();
        let mut attempt_limit: Option<usize> = None;
        let mut attempts = 0usize;
        let mut last_error: Option<AgentError> = None;

        loop {
            let decision = match self.router.select(request, snapshot, &self.agents, &excluded) {
                Ok(decision) => decision,
                Err(e) => {
                    return Err(match last_error {
                        Some(last_error) => RelayError::AllAgentsExhausted {
                            attempts,
                            last_error,
                        },
                        None => e,
                    })
                }
            };
            let limit =
                *attempt_limit.get_or_insert_with(|| self.attempt_limit(decision.eligible_count()));

            let agent = self
                .agents
                .iter()
                .find(|a| a.id() == decision.agent_id)
                .ok_or_else(|| {
                    RelayError::no_healthy_agent(format!(
                        "selected agent '{}' is not registered",
                        decision.agent_id
                    ))
                })?;

            attempts += 1;
            debug!(agent = %decision.agent_id, attempt = attempts, limit, "Invoking agent");

            match self.attempt(agent.as_ref(), request).await {
                Ok(output) => {
                    if attempts > 1 {
                        info!(
                            agent = %decision.agent_id,
                            attempts,
                            "Request served by fallback agent"
                        );
                    }
                    return Ok(AgentResponse {
                        agent_id: Some(decision.agent_id),
                        confidence: decision.confidence,
                        content: output.content,
                        metadata: ResponseMetadata {
                            request_id,
                            session_id: request.session_id.clone(),
                            processing_time_ms: elapsed_ms(start),
                            token_usage: output.token_usage,
                            attempts,
                            fallback_used: attempts > 1,
                            system_health: snapshot.verdict == HealthStatus::Healthy,
                            error: None,
                        },
                    });
                }
                Err(error) => {
                    warn!(
                        agent = %decision.agent_id,
                        attempt = attempts,
                        error = %error,
                        "Agent attempt failed"
                    );
                    excluded.insert(decision.agent_id);
                    last_error = Some(error);
                }
            }

            if attempts >= limit {
                break;
            }
        }

        Err(RelayError::AllAgentsExhausted {
            attempts,
            last_error: last_error.unwrap_or(AgentError::Cancelled),
        })
    }

    async fn attempt(
        &self,
        agent: &dyn Agent,
        request: &AgentRequest,
    ) -> Result<AgentOutput, AgentError> {
        let guard = AttemptGuard::new(&self.tracker, agent);
        let timeout = self.settings.timeout;
        let result = match tokio::time::timeout(timeout, agent.respond(request)).await {
            Ok(result) => result,
            Err(_) => Err(AgentError::Timeout {
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        };
        guard.finish(&result);
        result
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}
