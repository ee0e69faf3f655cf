//! Bounded-time health probing of a single component
//!
//! A [`HealthCheck`] reports what the component says about itself. The
//! [`HealthProbe`] wraps it in a timeout and classifies the outcome:
//!
//! - `Ok(status)` from the check is passed through
//! - `RelayError::ComponentUnhealthy` (explicit signal) becomes `unhealthy`
//! - any other error becomes `unavailable`
//! - a timeout becomes `unhealthy` when more than 90% of the budget elapsed,
//!   otherwise `unavailable`

use crate::error::{RelayError, RelayResult};
use crate::health::status::HealthStatus;
use crate::llm::provider::{LlmError, LlmProvider};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Fraction of the probe budget past which a timeout counts as real distress
pub const NEAR_TIMEOUT_RATIO: f64 = 0.9;

/// Trait for components that can be health checked
#[async_trait]
pub trait HealthCheck: Send + Sync {
    /// Ask the component for its health
    ///
    /// Return `Err(RelayError::ComponentUnhealthy)` when the component itself
    /// reports a failure, any other error when it could not be reached.
    async fn check(&self) -> RelayResult<HealthStatus>;

    /// Component name for reporting
    fn component_name(&self) -> &str;
}

/// Settled result of one probe
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeResult {
    pub component: String,
    pub status: HealthStatus,
    pub latency_ms: u64,
    pub message: Option<String>,
}

impl ProbeResult {
    pub fn latency(&self) -> Duration {
        Duration::from_millis(self.latency_ms)
    }
}

/// Runs a single check under a timeout
pub struct HealthProbe;

impl HealthProbe {
    /// Probe one component; always settles within `timeout` plus scheduling slack
    pub async fn probe(check: &dyn HealthCheck, timeout: Duration) -> ProbeResult {
        let component = check.component_name().to_string();
        let start = Instant::now();
        let outcome = tokio::time::timeout(timeout, check.check()).await;
        let elapsed = start.elapsed();

        let (status, message) = match outcome {
            Ok(Ok(status)) => (status, None),
            Ok(Err(e @ RelayError::ComponentUnhealthy { .. })) => {
                (HealthStatus::Unhealthy, Some(e.user_message()))
            }
            Ok(Err(e)) => (HealthStatus::Unavailable, Some(e.user_message())),
            Err(_) => {
                let error = RelayError::ProbeTimeout {
                    component: component.clone(),
                    timeout_ms: duration_ms(timeout),
                };
                (classify_timeout(elapsed, timeout), Some(error.to_string()))
            }
        };

        let latency_ms = duration_ms(elapsed);
        if status.is_usable() {
            debug!(component = %component, status = %status, latency_ms, "Health probe settled");
        } else {
            warn!(
                component = %component,
                status = %status,
                latency_ms,
                message = message.as_deref().unwrap_or(""),
                "Health probe reported a problem"
            );
        }

        ProbeResult {
            component,
            status,
            latency_ms,
            message,
        }
    }
}

/// Status for a probe that hit its timeout after `elapsed` of a `budget`
///
/// A response that only missed the deadline narrowly indicates a component in
/// distress rather than one that is simply unreachable.
pub fn classify_timeout(elapsed: Duration, budget: Duration) -> HealthStatus {
    if elapsed.as_secs_f64() > budget.as_secs_f64() * NEAR_TIMEOUT_RATIO {
        HealthStatus::Unhealthy
    } else {
        HealthStatus::Unavailable
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// LLM provider health check
pub struct LlmProviderHealthCheck {
    provider: Arc<dyn LlmProvider>,
}

impl LlmProviderHealthCheck {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl HealthCheck for LlmProviderHealthCheck {
    async fn check(&self) -> RelayResult<HealthStatus> {
        match self.provider.health_check().await {
            Ok(()) => Ok(HealthStatus::Healthy),
            // Throttled but answering
            Err(LlmError::RateLimitExceeded(_)) => Ok(HealthStatus::Degraded),
            Err(e @ (LlmError::ApiError(_) | LlmError::AuthenticationFailed(_))) => Err(
                RelayError::component_unhealthy(self.provider.name(), e.to_string()),
            ),
            Err(e) => Err(RelayError::check_failed(e.to_string())),
        }
    }

    fn component_name(&self) -> &str {
        self.provider.name()
    }
}

/// HTTP endpoint health check for functional services (knowledge store, etc.)
///
/// A 2xx response is healthy unless its JSON body carries
/// `"status": "degraded"` or `"status": "unhealthy"`. Non-2xx responses are an
/// explicit unhealthy signal; connection failures leave the status unavailable.
pub struct HttpEndpointHealthCheck {
    name: String,
    url: String,
    client: Client,
}

impl HttpEndpointHealthCheck {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            client: Client::new(),
        }
    }
}

#[async_trait]
impl HealthCheck for HttpEndpointHealthCheck {
    async fn check(&self) -> RelayResult<HealthStatus> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| RelayError::check_failed(format!("{}: {e}", self.name)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::component_unhealthy(
                &self.name,
                format!("HTTP {status}"),
            ));
        }

        let body: serde_json::Value = match response.json().await {
            Ok(body) => body,
            // Non-JSON 2xx bodies still count as alive
            Err(_) => return Ok(HealthStatus::Healthy),
        };

        match body.get("status").and_then(|s| s.as_str()) {
            Some("degraded") => Ok(HealthStatus::Degraded),
            Some("unhealthy") | Some("error") | Some("down") => Err(
                RelayError::component_unhealthy(&self.name, "endpoint reported unhealthy"),
            ),
            _ => Ok(HealthStatus::Healthy),
        }
    }

    fn component_name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mocks::{MockHealthCheck, MockLlmProvider};

    #[test]
    fn test_near_timeout_threshold() {
        let budget = Duration::from_millis(1000);

        assert_eq!(
            classify_timeout(Duration::from_millis(901), budget),
            HealthStatus::Unhealthy
        );
        assert_eq!(
            classify_timeout(Duration::from_millis(900), budget),
            HealthStatus::Unavailable
        );
        assert_eq!(
            classify_timeout(Duration::from_millis(100), budget),
            HealthStatus::Unavailable
        );
    }

    #[tokio::test]
    async fn test_probe_passes_through_reported_status() {
        let check = MockHealthCheck::reporting("openai", HealthStatus::Degraded);
        let result = HealthProbe::probe(&check, Duration::from_secs(1)).await;

        assert_eq!(result.component, "openai");
        assert_eq!(result.status, HealthStatus::Degraded);
        assert!(result.message.is_none());
    }

    #[tokio::test]
    async fn test_explicit_unhealthy_signal() {
        let check = MockHealthCheck::signalling_unhealthy("knowledge");
        let result = HealthProbe::probe(&check, Duration::from_secs(1)).await;

        assert_eq!(result.status, HealthStatus::Unhealthy);
        assert!(result.message.is_some());
    }

    #[tokio::test]
    async fn test_transport_error_is_unavailable() {
        let check = MockHealthCheck::failing("embeddings");
        let result = HealthProbe::probe(&check, Duration::from_secs(1)).await;

        assert_eq!(result.status, HealthStatus::Unavailable);
    }

    #[tokio::test]
    async fn test_slow_check_is_cut_off_at_timeout() {
        let check = MockHealthCheck::reporting("slow", HealthStatus::Healthy)
            .with_delay(Duration::from_secs(10));
        let start = Instant::now();
        let result = HealthProbe::probe(&check, Duration::from_millis(50)).await;

        assert!(start.elapsed() < Duration::from_secs(2));
        // The full budget elapsed, which is past the near-timeout threshold
        assert_eq!(result.status, HealthStatus::Unhealthy);
        assert!(result.message.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_llm_provider_check_healthy() {
        let provider = Arc::new(MockLlmProvider::single_response("anthropic", "ok"));
        let check = LlmProviderHealthCheck::new(provider);

        let result = HealthProbe::probe(&check, Duration::from_secs(1)).await;
        assert_eq!(result.component, "anthropic");
        assert_eq!(result.status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn test_llm_provider_check_failure_is_unavailable() {
        let provider = Arc::new(MockLlmProvider::with_failure("anthropic"));
        let check = LlmProviderHealthCheck::new(provider);

        let result = HealthProbe::probe(&check, Duration::from_secs(1)).await;
        assert_eq!(result.status, HealthStatus::Unavailable);
    }

    #[tokio::test]
    async fn test_llm_provider_rate_limited_is_degraded() {
        let provider = Arc::new(
            MockLlmProvider::single_response("openai", "ok")
                .with_health_error(LlmError::RateLimitExceeded("slow down".to_string())),
        );
        let check = LlmProviderHealthCheck::new(provider);

        let result = HealthProbe::probe(&check, Duration::from_secs(1)).await;
        assert_eq!(result.status, HealthStatus::Degraded);
    }

    #[tokio::test]
    async fn test_llm_provider_auth_failure_is_unhealthy() {
        let provider = Arc::new(
            MockLlmProvider::single_response("openai", "ok")
                .with_health_error(LlmError::AuthenticationFailed("bad key".to_string())),
        );
        let check = LlmProviderHealthCheck::new(provider);

        let result = HealthProbe::probe(&check, Duration::from_secs(1)).await;
        assert_eq!(result.status, HealthStatus::Unhealthy);
    }
}
