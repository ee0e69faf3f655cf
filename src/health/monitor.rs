//! Concurrent health probing across all registered components
//!
//! Every probe runs under its own timeout and all of them are joined before
//! the verdict is computed, so one slow component never holds up the others
//! and a full cycle costs at most the slowest single timeout.

use crate::config::{HealthSection, AUXILIARY_COUNT};
use crate::health::aggregator::{ComponentStatuses, HealthAggregator};
use crate::health::fallback::FallbackChainBuilder;
use crate::health::probe::{HealthCheck, HealthProbe, ProbeResult};
use crate::health::status::HealthStatus;
use crate::observability::metrics::MetricsTracker;
use futures::future::join_all;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// The four components the system verdict is computed over
#[derive(Debug, Clone, PartialEq)]
pub struct HealthLayout {
    pub primary: String,
    pub auxiliaries: [String; AUXILIARY_COUNT],
}

impl HealthLayout {
    pub fn new(primary: impl Into<String>, auxiliaries: [String; AUXILIARY_COUNT]) -> Self {
        Self {
            primary: primary.into(),
            auxiliaries,
        }
    }

    /// Build from validated configuration
    pub fn from_section(section: &HealthSection) -> Option<Self> {
        let auxiliaries: [String; AUXILIARY_COUNT] = section.auxiliaries.clone().try_into().ok()?;
        Some(Self::new(section.primary.clone(), auxiliaries))
    }

    /// Names in declared priority order, primary first
    pub fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.primary.as_str()).chain(self.auxiliaries.iter().map(String::as_str))
    }

    /// Current statuses of the layout components as seen by the tracker
    pub fn statuses(&self, tracker: &MetricsTracker) -> ComponentStatuses {
        let named = |name: &String| (name.clone(), tracker.snapshot(name).status);
        ComponentStatuses {
            primary: named(&self.primary),
            auxiliaries: [
                named(&self.auxiliaries[0]),
                named(&self.auxiliaries[1]),
                named(&self.auxiliaries[2]),
            ],
        }
    }

    /// System verdict from current tracker state, without probing
    pub fn verdict(&self, tracker: &MetricsTracker) -> HealthStatus {
        HealthAggregator::aggregate(&self.statuses(tracker))
    }

    pub fn fallback_builder(&self) -> FallbackChainBuilder {
        FallbackChainBuilder::new(self.names())
    }
}

/// Health of one probed component as reported on the health endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentHealth {
    pub status: HealthStatus,
    pub response_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Result of a full probe cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub components: BTreeMap<String, ComponentHealth>,
    pub fallback_chain: Vec<String>,
    pub timestamp: String,
}

/// Fans out probes and feeds the results into the tracker
pub struct HealthMonitor {
    layout: HealthLayout,
    checks: Vec<Arc<dyn HealthCheck>>,
    tracker: Arc<MetricsTracker>,
    probe_timeout: Duration,
}

impl HealthMonitor {
    pub fn new(
        layout: HealthLayout,
        checks: Vec<Arc<dyn HealthCheck>>,
        tracker: Arc<MetricsTracker>,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            layout,
            checks,
            tracker,
            probe_timeout,
        }
    }

    pub fn layout(&self) -> &HealthLayout {
        &self.layout
    }

    /// Probe a single component by name
    pub async fn probe(&self, component_id: &str, timeout: Duration) -> Option<ProbeResult> {
        let check = self
            .checks
            .iter()
            .find(|c| c.component_name() == component_id)?;
        let result = HealthProbe::probe(check.as_ref(), timeout).await;
        self.tracker
            .record_probe(&result.component, result.status, result.latency());
        Some(result)
    }

    /// Probe every component concurrently and wait for all of them to settle
    pub async fn probe_all(&self) -> Vec<ProbeResult> {
        let timeout = self.probe_timeout;
        let results = join_all(
            self.checks
                .iter()
                .map(|check| HealthProbe::probe(check.as_ref(), timeout)),
        )
        .await;

        for result in &results {
            self.tracker
                .record_probe(&result.component, result.status, result.latency());
        }
        results
    }

    /// Full cycle: probe everything, then compute verdict and fallback chain
    pub async fn run_cycle(&self) -> HealthReport {
        let results = self.probe_all().await;

        let statuses = self.layout.statuses(&self.tracker);
        let status = HealthAggregator::aggregate(&statuses);
        let status_map: HashMap<String, HealthStatus> = statuses
            .iter()
            .map(|(name, status)| (name.to_string(), status))
            .collect();
        let fallback_chain = self.layout.fallback_builder().build(&status_map);

        let components = results
            .into_iter()
            .map(|r| {
                let tracked = self.tracker.snapshot(&r.component).status;
                (
                    r.component,
                    ComponentHealth {
                        status: tracked,
                        response_time_ms: r.latency_ms,
                        message: r.message,
                    },
                )
            })
            .collect();

        match status {
            HealthStatus::Healthy => debug!("Health cycle complete: healthy"),
            other => warn!(status = %other, fallback = ?fallback_chain, "Health cycle complete"),
        }

        HealthReport {
            status,
            components,
            fallback_chain,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Spawn periodic probing; abort the handle to stop it
    pub fn spawn_background(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            info!(interval_secs = interval.as_secs(), "Background health probing started");

            loop {
                ticker.tick().await;
                let report = self.run_cycle().await;
                debug!(status = %report.status, "Background health cycle");
            }
        })
    }
}
