//! Per-component health metrics
//!
//! `MetricsTracker` is the single owner of every mutable health counter. The
//! only component mutators are [`MetricsTracker::record_outcome`] and
//! [`MetricsTracker::record_probe`]; everything else reads [`Component`]
//! snapshots. Each component has its own mutex, held only for the duration of
//! an update, so concurrent requests and background probes never lose updates.
//!
//! Outcomes expire after `outcome_ttl`, so a component that stopped receiving
//! traffic after failing comes back once its failures age out. A healthy probe
//! that settles after the latest failure caps the error-rate band at degraded;
//! the error rate itself only ever reflects completed attempts.

use crate::config::MetricsSection;
use crate::health::status::{Component, HealthStatus, ProbeObservation};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Number of dispatch durations kept for the system-wide average
const PROCESSING_TIME_WINDOW: usize = 1000;

/// Thresholds mapping an error rate onto a health band
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerSettings {
    pub window_size: usize,
    pub degraded_error_rate: f64,
    pub unhealthy_error_rate: f64,
    pub outcome_ttl: Duration,
}

impl From<&MetricsSection> for TrackerSettings {
    fn from(section: &MetricsSection) -> Self {
        Self {
            window_size: section.window_size.max(1),
            degraded_error_rate: section.degraded_error_rate,
            unhealthy_error_rate: section.unhealthy_error_rate,
            outcome_ttl: Duration::from_millis(section.outcome_ttl_ms.max(1)),
        }
    }
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self::from(&MetricsSection::default())
    }
}

impl TrackerSettings {
    /// Health band implied by an error rate alone
    pub fn band_for(&self, error_rate: f64) -> HealthStatus {
        if error_rate >= self.unhealthy_error_rate {
            HealthStatus::Unhealthy
        } else if error_rate >= self.degraded_error_rate {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Outcome {
    success: bool,
    at: Instant,
}

#[derive(Debug, Default)]
struct ComponentCounters {
    requests_processed: u64,
    /// Trailing outcomes in recording order
    outcomes: VecDeque<Outcome>,
    /// Trailing latencies of completed attempts and probes
    latencies: VecDeque<u64>,
    last_probe: Option<ProbeObservation>,
    last_probe_at: Option<Instant>,
    last_failure_at: Option<Instant>,
}

impl ComponentCounters {
    fn push_latency(&mut self, latency_ms: u64, window: usize) {
        self.latencies.push_back(latency_ms);
        while self.latencies.len() > window {
            self.latencies.pop_front();
        }
    }

    fn push_outcome(&mut self, success: bool, settings: &TrackerSettings) {
        let now = Instant::now();
        self.outcomes.push_back(Outcome { success, at: now });
        if !success {
            self.last_failure_at = Some(now);
        }
        while self.outcomes.len() > settings.window_size {
            self.outcomes.pop_front();
        }
        while self
            .outcomes
            .front()
            .is_some_and(|o| now.duration_since(o.at) > settings.outcome_ttl)
        {
            self.outcomes.pop_front();
        }
    }

    /// Failure fraction over the outcomes still inside `ttl`
    fn error_rate(&self, now: Instant, ttl: Duration) -> f64 {
        let (total, failures) = self
            .outcomes
            .iter()
            .filter(|o| now.saturating_duration_since(o.at) <= ttl)
            .fold((0usize, 0usize), |(total, failures), o| {
                (total + 1, failures + usize::from(!o.success))
            });
        if total == 0 {
            return 0.0;
        }
        failures as f64 / total as f64
    }

    /// A healthy probe settled after the most recent failure
    fn probe_vouches(&self) -> bool {
        let healthy = self
            .last_probe
            .as_ref()
            .is_some_and(|p| p.status == HealthStatus::Healthy);
        match (self.last_probe_at, self.last_failure_at) {
            (Some(probed), Some(failed)) => healthy && probed > failed,
            (Some(_), None) => healthy,
            _ => false,
        }
    }

    fn average_latency(&self) -> f64 {
        if self.latencies.is_empty() {
            return 0.0;
        }
        self.latencies.iter().sum::<u64>() as f64 / self.latencies.len() as f64
    }
}

#[derive(Debug, Default)]
struct SystemCounters {
    total_requests: u64,
    processing_times: VecDeque<u64>,
}

/// System-wide totals reported on the status endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemTotals {
    pub uptime_seconds: u64,
    pub total_requests: u64,
    pub avg_processing_time_ms: f64,
}

/// Thread-safe per-component metrics tracker
#[derive(Debug)]
pub struct MetricsTracker {
    settings: TrackerSettings,
    components: RwLock<HashMap<String, Arc<Mutex<ComponentCounters>>>>,
    system: Mutex<SystemCounters>,
    started_at: Instant,
}

impl MetricsTracker {
    pub fn new(settings: TrackerSettings) -> Self {
        Self {
            settings,
            components: RwLock::new(HashMap::new()),
            system: Mutex::new(SystemCounters::default()),
            started_at: Instant::now(),
        }
    }

    pub fn settings(&self) -> TrackerSettings {
        self.settings
    }

    /// Record a completed request attempt (success or failure)
    pub fn record_outcome(&self, component_id: &str, success: bool, latency: Duration) {
        let counters = self.counters_for(component_id);
        let mut counters = lock(&counters);
        counters.requests_processed += 1;
        counters.push_outcome(success, &self.settings);
        counters.push_latency(duration_ms(latency), self.settings.window_size);
    }

    /// Record a settled health probe
    pub fn record_probe(&self, component_id: &str, status: HealthStatus, latency: Duration) {
        let latency_ms = duration_ms(latency);
        let counters = self.counters_for(component_id);
        let mut counters = lock(&counters);
        // A probe that never completed has no meaningful latency
        if status != HealthStatus::Unavailable {
            counters.push_latency(latency_ms, self.settings.window_size);
        }
        counters.last_probe_at = Some(Instant::now());
        counters.last_probe = Some(ProbeObservation {
            status,
            latency_ms,
            observed_at: unix_timestamp(),
        });
    }

    /// Record the end-to-end duration of one dispatch
    pub fn record_dispatch(&self, duration: Duration) {
        let mut system = lock(&self.system);
        system.total_requests += 1;
        system.processing_times.push_back(duration_ms(duration));
        while system.processing_times.len() > PROCESSING_TIME_WINDOW {
            system.processing_times.pop_front();
        }
    }

    /// Current view of one component; neutral defaults when nothing is recorded
    pub fn snapshot(&self, component_id: &str) -> Component {
        let counters = {
            let components = read(&self.components);
            components.get(component_id).cloned()
        };

        match counters {
            Some(counters) => self.build_component(component_id, &lock(&counters)),
            None => Component::unobserved(component_id),
        }
    }

    /// Views of every component seen so far, sorted by name
    pub fn snapshot_all(&self) -> Vec<Component> {
        let entries: Vec<(String, Arc<Mutex<ComponentCounters>>)> = {
            let components = read(&self.components);
            components
                .iter()
                .map(|(name, counters)| (name.clone(), Arc::clone(counters)))
                .collect()
        };

        let mut snapshots: Vec<Component> = entries
            .iter()
            .map(|(name, counters)| self.build_component(name, &lock(counters)))
            .collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }

    pub fn totals(&self) -> SystemTotals {
        let system = lock(&self.system);
        let avg_processing_time_ms = if system.processing_times.is_empty() {
            0.0
        } else {
            system.processing_times.iter().sum::<u64>() as f64
                / system.processing_times.len() as f64
        };

        SystemTotals {
            uptime_seconds: self.started_at.elapsed().as_secs(),
            total_requests: system.total_requests,
            avg_processing_time_ms,
        }
    }

    fn counters_for(&self, component_id: &str) -> Arc<Mutex<ComponentCounters>> {
        if let Some(counters) = read(&self.components).get(component_id) {
            return Arc::clone(counters);
        }

        let mut components = self
            .components
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(
            components
                .entry(component_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(ComponentCounters::default()))),
        )
    }

    fn build_component(&self, name: &str, counters: &ComponentCounters) -> Component {
        let error_rate = counters.error_rate(Instant::now(), self.settings.outcome_ttl);
        let band = match self.settings.band_for(error_rate) {
            HealthStatus::Unhealthy if counters.probe_vouches() => HealthStatus::Degraded,
            band => band,
        };
        let status = match &counters.last_probe {
            Some(probe) => probe.status.worst(band),
            None => band,
        };
        let is_available = counters
            .last_probe
            .as_ref()
            .map(|probe| probe.status != HealthStatus::Unavailable)
            .unwrap_or(true);

        Component {
            name: name.to_string(),
            status,
            is_available,
            is_healthy: status == HealthStatus::Healthy,
            response_time_ms: counters.average_latency(),
            error_rate,
            rate_limit_remaining: None,
            requests_processed: counters.requests_processed,
            last_probe: counters.last_probe.clone(),
        }
    }
}

impl Default for MetricsTracker {
    fn default() -> Self {
        Self::new(TrackerSettings::default())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

pub(crate) fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
