//! Request routing
//!
//! [`IntentClassifier`] decides which capabilities a request needs and
//! [`AgentRouter`] picks the agent that serves them best among those the
//! current [`HealthSnapshot`] allows.

pub mod intent;
pub mod router;

pub use intent::{Intent, IntentClassifier, IntentSource};
pub use router::{AgentRouter, HealthSnapshot, RoutingDecision};
