//! Component health: probing, aggregation and fallback chains
//!
//! Data flows one way: probes feed the metrics tracker, and the aggregator and
//! fallback builder read tracker snapshots.

pub mod aggregator;
pub mod fallback;
pub mod monitor;
pub mod probe;
pub mod status;

pub use aggregator::{ComponentStatuses, HealthAggregator};
pub use fallback::FallbackChainBuilder;
pub use monitor::{ComponentHealth, HealthLayout, HealthMonitor, HealthReport};
pub use probe::{
    classify_timeout, HealthCheck, HealthProbe, HttpEndpointHealthCheck, LlmProviderHealthCheck,
    ProbeResult, NEAR_TIMEOUT_RATIO,
};
pub use status::{Component, HealthStatus, ProbeObservation};
