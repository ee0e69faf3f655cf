//! System health verdict from one primary and three auxiliary components
//!
//! Precedence, evaluated top to bottom:
//!
//! 1. primary `unhealthy` -> `unhealthy`
//! 2. primary `healthy` -> `healthy` when at least two of the four are healthy,
//!    otherwise `degraded`
//! 3. primary `degraded` -> `degraded`
//! 4. primary `unavailable` -> `unhealthy`
//!
//! The system never reads fully healthy unless an auxiliary is confirmed working.

use crate::config::AUXILIARY_COUNT;
use crate::health::status::HealthStatus;
use serde::Serialize;

/// Statuses of the four components the verdict is computed over
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentStatuses {
    pub primary: (String, HealthStatus),
    pub auxiliaries: [(String, HealthStatus); AUXILIARY_COUNT],
}

impl ComponentStatuses {
    /// Names and statuses in declared priority order, primary first
    pub fn iter(&self) -> impl Iterator<Item = (&str, HealthStatus)> {
        std::iter::once(&self.primary)
            .chain(self.auxiliaries.iter())
            .map(|(name, status)| (name.as_str(), *status))
    }
}

/// Combines component statuses into the system verdict
pub struct HealthAggregator;

impl HealthAggregator {
    /// Verdict for a primary status and the three auxiliary statuses
    pub fn verdict(
        primary: HealthStatus,
        auxiliaries: &[HealthStatus; AUXILIARY_COUNT],
    ) -> HealthStatus {
        match primary {
            HealthStatus::Unhealthy | HealthStatus::Unavailable => HealthStatus::Unhealthy,
            HealthStatus::Degraded => HealthStatus::Degraded,
            HealthStatus::Healthy => {
                let healthy = 1 + auxiliaries
                    .iter()
                    .filter(|s| **s == HealthStatus::Healthy)
                    .count();
                if healthy >= 2 {
                    HealthStatus::Healthy
                } else {
                    // Primary alone still serves; with or without degraded help
                    // the system reads as degraded
                    HealthStatus::Degraded
                }
            }
        }
    }

    pub fn aggregate(statuses: &ComponentStatuses) -> HealthStatus {
        let auxiliaries = [
            statuses.auxiliaries[0].1,
            statuses.auxiliaries[1].1,
            statuses.auxiliaries[2].1,
        ];
        Self::verdict(statuses.primary.1, &auxiliaries)
    }
}
