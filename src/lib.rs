//! agentrelay - health-aware routing across LLM-backed agents
//!
//! Requests are routed to the agent whose capabilities best match the
//! inferred intent, among agents the current health picture allows. Failed
//! attempts fall back to the next best agent, and when nothing can answer the
//! caller gets a graceful degraded response instead of an error.
//!
//! # Overview
//!
//! - [`observability::MetricsTracker`] keeps rolling error rates and latencies
//! - [`health::HealthProbe`] checks one component under a timeout
//! - [`health::HealthAggregator`] turns component statuses into a verdict
//! - [`health::FallbackChainBuilder`] orders the still-usable components
//! - [`routing::AgentRouter`] picks an agent for a request
//! - [`dispatcher::Dispatcher`] invokes it and falls back on failure
//!
//! # Quick Start
//!
//! ```rust
//! use agentrelay::health::{HealthAggregator, HealthStatus};
//!
//! let verdict = HealthAggregator::verdict(
//!     HealthStatus::Healthy,
//!     &[HealthStatus::Healthy, HealthStatus::Unavailable, HealthStatus::Degraded],
//! );
//! assert_eq!(verdict, HealthStatus::Healthy);
//! ```
//!
//! Probing a component under a timeout:
//!
//! ```rust
//! use agentrelay::health::{HealthProbe, HealthStatus};
//! use agentrelay::testing::MockHealthCheck;
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let check = MockHealthCheck::reporting("knowledge", HealthStatus::Degraded);
//! let result = HealthProbe::probe(&check, Duration::from_secs(1)).await;
//! assert_eq!(result.status, HealthStatus::Degraded);
//! # });
//! ```

pub mod agent;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod health;
pub mod llm;
pub mod observability;
pub mod routing;
pub mod server;
pub mod system;
pub mod testing;

pub use config::*;
pub use dispatcher::{DispatchSettings, Dispatcher};
pub use error::{AgentError, RelayError, RelayResult};
pub use system::{RelayComponents, RelaySystem, SystemStatus};
