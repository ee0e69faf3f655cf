//! Canonical health data model shared by probing, routing and reporting

use serde::{Deserialize, Serialize};

/// Health of a single component or of the whole system
///
/// Severity is ordered `Healthy < Degraded < Unhealthy`. `Unavailable` means the
/// probe itself could not complete and is kept distinct from a reported failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Unavailable,
}

impl HealthStatus {
    pub const ALL: [HealthStatus; 4] = [
        HealthStatus::Healthy,
        HealthStatus::Degraded,
        HealthStatus::Unhealthy,
        HealthStatus::Unavailable,
    ];

    /// Healthy or degraded: the component can still serve traffic
    pub fn is_usable(self) -> bool {
        matches!(self, HealthStatus::Healthy | HealthStatus::Degraded)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
            HealthStatus::Unavailable => "unavailable",
        }
    }

    /// Rank used only when combining two observations of the same component
    fn combine_rank(self) -> u8 {
        match self {
            HealthStatus::Healthy => 0,
            HealthStatus::Degraded => 1,
            HealthStatus::Unhealthy => 2,
            HealthStatus::Unavailable => 3,
        }
    }

    /// The more severe of two observations
    pub fn worst(self, other: HealthStatus) -> HealthStatus {
        if other.combine_rank() > self.combine_rank() {
            other
        } else {
            self
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Most recent probe observation of a component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeObservation {
    pub status: HealthStatus,
    pub latency_ms: u64,
    /// Unix timestamp (seconds) the probe settled at
    pub observed_at: u64,
}

/// Point-in-time view of one provider, agent or endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub name: String,
    pub status: HealthStatus,
    pub is_available: bool,
    pub is_healthy: bool,
    /// Rolling average over completed attempts and probes
    pub response_time_ms: f64,
    /// Failure fraction over the trailing outcome window
    pub error_rate: f64,
    /// Reported by providers only
    pub rate_limit_remaining: Option<u32>,
    pub requests_processed: u64,
    pub last_probe: Option<ProbeObservation>,
}

impl Component {
    /// Neutral view of a component nothing has been recorded for
    pub fn unobserved(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Healthy,
            is_available: true,
            is_healthy: true,
            response_time_ms: 0.0,
            error_rate: 0.0,
            rate_limit_remaining: None,
            requests_processed: 0,
            last_probe: None,
        }
    }
}
