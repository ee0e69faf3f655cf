//! Observability: structured logging and per-component metrics

pub mod logging;
pub mod metrics;

pub use logging::{init_default_logging, init_logging, LogFormat, LogSettings};
pub use metrics::{MetricsTracker, SystemTotals, TrackerSettings};

// Span macros for structured logging
pub use logging::{dispatch_span, lifecycle_span, probe_span};
