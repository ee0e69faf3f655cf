//! System lifecycle and the projections served over HTTP
//!
//! [`RelaySystem`] starts `NotInitialized`, moves to `Initialized` after the
//! first successful setup, and to `Error` when setup fails. It never returns
//! to `NotInitialized`; setup may be retried from `Error`.

use crate::agent::{Agent, AgentRequest, AgentResponse, LlmAgent};
use crate::config::{ProviderConfig, ProviderKind, RelayConfig};
use crate::dispatcher::{DispatchSettings, Dispatcher};
use crate::error::{RelayError, RelayResult};
use crate::health::monitor::{HealthLayout, HealthMonitor, HealthReport};
use crate::health::probe::{HealthCheck, HttpEndpointHealthCheck, LlmProviderHealthCheck};
use crate::health::status::{Component, HealthStatus};
use crate::llm::provider::LlmProvider;
use crate::llm::providers::{AnthropicConfig, AnthropicProvider, OpenAiConfig, OpenAiProvider};
use crate::observability::metrics::{MetricsTracker, TrackerSettings};
use crate::routing::AgentRouter;
use crate::{lifecycle_span, probe_span};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{error, info, Instrument};
use uuid::Uuid;

/// Lifecycle state of the relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SystemStatus {
    NotInitialized,
    Initialized,
    Error(String),
}

impl SystemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SystemStatus::NotInitialized => "not-initialized",
            SystemStatus::Initialized => "initialized",
            SystemStatus::Error(_) => "error",
        }
    }
}

/// Everything setup produces: upstream providers, agents and probes
pub struct RelayComponents {
    pub providers: Vec<Arc<dyn LlmProvider>>,
    pub agents: Vec<Arc<dyn Agent>>,
    pub checks: Vec<Arc<dyn HealthCheck>>,
}

impl RelayComponents {
    /// Build real providers, agents and probes; API keys come from the environment
    pub fn from_config(config: &RelayConfig) -> RelayResult<Self> {
        let mut providers: Vec<Arc<dyn LlmProvider>> = Vec::with_capacity(config.providers.len());
        for provider in &config.providers {
            providers.push(build_provider(provider)?);
        }

        let mut agents: Vec<Arc<dyn Agent>> = Vec::with_capacity(config.agents.len());
        for agent in &config.agents {
            let (settings, provider) = config
                .provider(&agent.provider)
                .zip(providers.iter().find(|p| p.name() == agent.provider))
                .ok_or_else(|| {
                    RelayError::setup_failure(format!(
                        "agent '{}' references unknown provider '{}'",
                        agent.id, agent.provider
                    ))
                })?;
            agents.push(Arc::new(LlmAgent::new(
                agent.clone(),
                settings.model.clone(),
                Arc::clone(provider),
            )));
        }

        let mut checks: Vec<Arc<dyn HealthCheck>> = providers
            .iter()
            .map(|p| Arc::new(LlmProviderHealthCheck::new(Arc::clone(p))) as Arc<dyn HealthCheck>)
            .collect();
        checks.extend(config.endpoints.iter().map(|e| {
            Arc::new(HttpEndpointHealthCheck::new(&e.name, &e.url)) as Arc<dyn HealthCheck>
        }));

        Ok(Self {
            providers,
            agents,
            checks,
        })
    }
}

fn build_provider(config: &ProviderConfig) -> RelayResult<Arc<dyn LlmProvider>> {
    let api_key = config.api_key().map_err(|e| {
        RelayError::setup_failure(format!("provider '{}': {e}", config.name))
    })?;
    let timeout = Duration::from_secs(config.timeout_secs);

    let provider: Arc<dyn LlmProvider> = match config.kind {
        ProviderKind::Anthropic => {
            let defaults = AnthropicConfig::default();
            Arc::new(
                AnthropicProvider::new(
                    &config.name,
                    AnthropicConfig {
                        api_key,
                        base_url: config.base_url.clone().unwrap_or(defaults.base_url),
                        timeout,
                        ..defaults
                    },
                )
                .map_err(|e| RelayError::setup_failure(format!("provider '{}': {e}", config.name)))?,
            )
        }
        ProviderKind::Openai => {
            let defaults = OpenAiConfig::default();
            Arc::new(
                OpenAiProvider::new(
                    &config.name,
                    OpenAiConfig {
                        api_key,
                        base_url: config.base_url.clone().unwrap_or(defaults.base_url),
                        timeout,
                    },
                )
                .map_err(|e| RelayError::setup_failure(format!("provider '{}': {e}", config.name)))?,
            )
        }
    };
    Ok(provider)
}

/// Wired-up runtime pieces, present once setup succeeded
struct RelayRuntime {
    dispatcher: Dispatcher,
    monitor: Arc<HealthMonitor>,
    providers: Vec<Arc<dyn LlmProvider>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemSummary {
    pub state: String,
    pub is_healthy: bool,
    pub uptime_seconds: u64,
    pub total_requests: u64,
    pub avg_processing_time_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderStatus {
    pub is_available: bool,
    pub response_time_ms: f64,
    pub error_rate: f64,
    pub rate_limit_remaining: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentStatus {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub is_healthy: bool,
    pub requests_processed: u64,
    pub average_response_time_ms: f64,
    pub error_rate: f64,
    pub capabilities: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutingStatus {
    pub strategy: String,
    pub fallback_enabled: bool,
    pub probe_interval_secs: u64,
}

/// Body of the status endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    pub system: SystemSummary,
    pub providers: BTreeMap<String, ProviderStatus>,
    pub agents: BTreeMap<String, AgentStatus>,
    pub routing: RoutingStatus,
}

/// Owns the tracker, the runtime and the lifecycle state
pub struct RelaySystem {
    config: RelayConfig,
    tracker: Arc<MetricsTracker>,
    state: RwLock<SystemStatus>,
    runtime: RwLock<Option<Arc<RelayRuntime>>>,
    background: Mutex<Option<JoinHandle<()>>>,
}

impl RelaySystem {
    pub fn new(config: RelayConfig) -> Self {
        let tracker = Arc::new(MetricsTracker::new(TrackerSettings::from(&config.metrics)));
        Self {
            config,
            tracker,
            state: RwLock::new(SystemStatus::NotInitialized),
            runtime: RwLock::new(None),
            background: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn tracker(&self) -> &Arc<MetricsTracker> {
        &self.tracker
    }

    pub fn state(&self) -> SystemStatus {
        self.state
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Set up from configuration, creating real upstream clients
    pub fn initialize(&self) -> RelayResult<()> {
        if self.state() == SystemStatus::Initialized {
            return Ok(());
        }
        match RelayComponents::from_config(&self.config) {
            Ok(components) => self.initialize_with(components),
            Err(e) => {
                self.fail_setup(&e);
                Err(e)
            }
        }
    }

    /// Set up with injected components
    pub fn initialize_with(&self, components: RelayComponents) -> RelayResult<()> {
        let span = lifecycle_span!(event = "initialize");
        let _enter = span.enter();

        if self.state() == SystemStatus::Initialized {
            return Ok(());
        }

        match self.build_runtime(components) {
            Ok(runtime) => {
                *self.runtime.write().unwrap_or_else(|p| p.into_inner()) = Some(Arc::new(runtime));
                self.set_state(SystemStatus::Initialized);
                info!(
                    agents = self.config.agents.len(),
                    providers = self.config.providers.len(),
                    "Relay initialized"
                );
                Ok(())
            }
            Err(e) => {
                self.fail_setup(&e);
                Err(e)
            }
        }
    }

    fn build_runtime(&self, components: RelayComponents) -> RelayResult<RelayRuntime> {
        let layout = HealthLayout::from_section(&self.config.health).ok_or_else(|| {
            RelayError::setup_failure("[health] must name a primary and exactly three auxiliaries")
        })?;
        let router = AgentRouter::from_config(&self.config.routing)?;
        let monitor = Arc::new(HealthMonitor::new(
            layout.clone(),
            components.checks,
            Arc::clone(&self.tracker),
            Duration::from_millis(self.config.routing.probe_timeout_ms),
        ));
        let dispatcher = Dispatcher::new(
            router,
            components.agents,
            Arc::clone(&self.tracker),
            layout,
            DispatchSettings::from(&self.config.routing),
        );

        Ok(RelayRuntime {
            dispatcher,
            monitor,
            providers: components.providers,
        })
    }

    fn fail_setup(&self, error: &RelayError) {
        error!(error = %error, "Relay setup failed");
        self.set_state(SystemStatus::Error(error.user_message()));
    }

    fn set_state(&self, next: SystemStatus) {
        let mut state = self.state.write().unwrap_or_else(|p| p.into_inner());
        if *state != next {
            info!(from = state.as_str(), to = next.as_str(), "System state transition");
        }
        *state = next;
    }

    fn runtime(&self) -> Option<Arc<RelayRuntime>> {
        self.runtime
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Start periodic probing; no-op before setup or when already running
    pub fn start_background_probing(&self) {
        let Some(runtime) = self.runtime() else {
            return;
        };
        let mut background = self.background.lock().unwrap_or_else(|p| p.into_inner());
        if background.is_none() {
            let interval = Duration::from_secs(self.config.routing.probe_interval_secs.max(1));
            *background = Some(Arc::clone(&runtime.monitor).spawn_background(interval));
        }
    }

    /// Stop background probing
    pub fn shutdown(&self) {
        let span = lifecycle_span!(event = "shutdown");
        let _enter = span.enter();
        if let Some(handle) = self
            .background
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take()
        {
            handle.abort();
            info!("Background health probing stopped");
        }
    }

    /// Route a request, degrading to an apology when no agent can answer
    pub async fn handle(&self, request: AgentRequest) -> RelayResult<AgentResponse> {
        if request.message.trim().is_empty() {
            return Err(RelayError::invalid_input("message must not be empty"));
        }

        let start = Instant::now();
        let Some(runtime) = self.runtime() else {
            let reason = match self.state() {
                SystemStatus::Error(message) => format!("system setup failed: {message}"),
                _ => "system not initialized".to_string(),
            };
            return Ok(AgentResponse::graceful(
                &request,
                Uuid::new_v4(),
                elapsed_ms(start),
                0,
                reason,
            ));
        };

        match runtime.dispatcher.dispatch(&request).await {
            Ok(response) => Ok(response),
            Err(e) if e.is_degradable() => {
                let attempts = match &e {
                    RelayError::AllAgentsExhausted { attempts, .. } => *attempts,
                    _ => 0,
                };
                Ok(AgentResponse::graceful(
                    &request,
                    Uuid::new_v4(),
                    elapsed_ms(start),
                    attempts,
                    e.user_message(),
                ))
            }
            Err(e) => Err(e),
        }
    }

    /// Run a full probe cycle and report the result
    pub async fn health_report(&self) -> HealthReport {
        match self.runtime() {
            Some(runtime) => {
                runtime
                    .monitor
                    .run_cycle()
                    .instrument(probe_span!(trigger = "request"))
                    .await
            }
            None => HealthReport {
                status: HealthStatus::Unhealthy,
                components: BTreeMap::new(),
                fallback_chain: Vec::new(),
                timestamp: chrono::Utc::now().to_rfc3339(),
            },
        }
    }

    /// Verdict from current tracker state, without probing
    pub fn liveness(&self) -> HealthStatus {
        match self.runtime() {
            Some(runtime) => runtime.monitor.layout().verdict(&self.tracker),
            None => HealthStatus::Unhealthy,
        }
    }

    /// Tracker snapshots with provider rate limits filled in
    pub fn components(&self) -> Vec<Component> {
        let runtime = self.runtime();
        let mut components = self.tracker.snapshot_all();
        if let Some(runtime) = runtime {
            for provider in &runtime.providers {
                match components.iter_mut().find(|c| c.name == provider.name()) {
                    Some(component) => component.rate_limit_remaining = provider.rate_limit_remaining(),
                    None => {
                        let mut component = Component::unobserved(provider.name());
                        component.rate_limit_remaining = provider.rate_limit_remaining();
                        components.push(component);
                    }
                }
            }
        }
        components.sort_by(|a, b| a.name.cmp(&b.name));
        components
    }

    pub fn status_report(&self) -> StatusReport {
        let state = self.state();
        let totals = self.tracker.totals();
        let components: BTreeMap<String, Component> = self
            .components()
            .into_iter()
            .map(|c| (c.name.clone(), c))
            .collect();
        let component = |name: &str| {
            components
                .get(name)
                .cloned()
                .unwrap_or_else(|| Component::unobserved(name))
        };

        let providers = self
            .config
            .providers
            .iter()
            .map(|p| {
                let c = component(&p.name);
                (
                    p.name.clone(),
                    ProviderStatus {
                        is_available: c.is_available,
                        response_time_ms: c.response_time_ms,
                        error_rate: c.error_rate,
                        rate_limit_remaining: c.rate_limit_remaining,
                    },
                )
            })
            .collect();

        let agents = self
            .config
            .agents
            .iter()
            .map(|a| {
                let c = component(&a.id);
                (
                    a.id.clone(),
                    AgentStatus {
                        description: a.description.clone(),
                        is_healthy: c.is_healthy,
                        requests_processed: c.requests_processed,
                        average_response_time_ms: c.response_time_ms,
                        error_rate: c.error_rate,
                        capabilities: a.capabilities.keys().cloned().collect(),
                    },
                )
            })
            .collect();

        let routing = &self.config.routing;
        StatusReport {
            system: SystemSummary {
                is_healthy: state == SystemStatus::Initialized
                    && self.liveness() == HealthStatus::Healthy,
                state: state.as_str().to_string(),
                uptime_seconds: totals.uptime_seconds,
                total_requests: totals.total_requests,
                avg_processing_time_ms: totals.avg_processing_time_ms,
            },
            providers,
            agents,
            routing: RoutingStatus {
                strategy: routing.strategy.clone(),
                fallback_enabled: routing.fallback_enabled,
                probe_interval_secs: routing.probe_interval_secs,
            },
        }
    }
}

impl Drop for RelaySystem {
    fn drop(&mut self) {
        if let Some(handle) = self
            .background
            .get_mut()
            .unwrap_or_else(|p| p.into_inner())
            .take()
        {
            handle.abort();
        }
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}
