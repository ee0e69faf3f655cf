//! Health-gated, capability-scored agent selection
//!
//! Health decides which agents are eligible at all: unhealthy and unavailable
//! agents never are, and degraded agents only when no healthy agent matches
//! the request. Within the eligible tier agents are ranked by
//!
//! ```text
//! score = capability_weight * match
//!       - error_penalty * error_rate
//!       + latency_bonus * 1 / (1 + avg_ms / latency_reference_ms)
//! ```
//!
//! with ties broken by lower error rate, then lower id.

use crate::agent::{Agent, AgentRequest};
use crate::config::{RoutingSection, RoutingWeights};
use crate::error::{RelayError, RelayResult};
use crate::health::status::{Component, HealthStatus};
use crate::routing::intent::{Intent, IntentClassifier};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

/// Point-in-time view of system health used for one dispatch
#[derive(Debug, Clone)]
pub struct HealthSnapshot {
    pub verdict: HealthStatus,
    pub components: HashMap<String, Component>,
}

impl HealthSnapshot {
    pub fn new(verdict: HealthStatus, components: impl IntoIterator<Item = Component>) -> Self {
        Self {
            verdict,
            components: components
                .into_iter()
                .map(|c| (c.name.clone(), c))
                .collect(),
        }
    }

    /// Snapshot of a component; never observed reads as healthy
    pub fn component(&self, name: &str) -> Component {
        self.components
            .get(name)
            .cloned()
            .unwrap_or_else(|| Component::unobserved(name))
    }

    pub fn status_of(&self, name: &str) -> HealthStatus {
        self.components
            .get(name)
            .map(|c| c.status)
            .unwrap_or(HealthStatus::Healthy)
    }

    /// Worse of the agent's own status and its provider's
    pub fn agent_status(&self, agent: &dyn Agent) -> HealthStatus {
        self.status_of(agent.id())
            .worst(self.status_of(agent.provider()))
    }
}

/// Outcome of a successful selection
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingDecision {
    pub agent_id: String,
    pub confidence: f64,
    /// Remaining eligible agents, best first
    pub fallback: Vec<String>,
    pub intent: Intent,
}

impl RoutingDecision {
    /// Agents that could be tried for this request, including the chosen one
    pub fn eligible_count(&self) -> usize {
        1 + self.fallback.len()
    }
}

#[derive(Debug, Clone)]
struct Candidate {
    id: String,
    healthy: bool,
    score: f64,
    error_rate: f64,
}

impl Candidate {
    fn rank(&self, other: &Self) -> Ordering {
        other
            .healthy
            .cmp(&self.healthy)
            .then_with(|| other.score.total_cmp(&self.score))
            .then_with(|| self.error_rate.total_cmp(&other.error_rate))
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Selects one agent per request
#[derive(Debug, Clone)]
pub struct AgentRouter {
    weights: RoutingWeights,
    classifier: IntentClassifier,
}

impl AgentRouter {
    pub fn new(weights: RoutingWeights, classifier: IntentClassifier) -> Self {
        Self {
            weights,
            classifier,
        }
    }

    pub fn from_config(section: &RoutingSection) -> RelayResult<Self> {
        Ok(Self::new(
            section.weights,
            IntentClassifier::from_routing(section)?,
        ))
    }

    pub fn weights(&self) -> RoutingWeights {
        self.weights
    }

    /// Composite score of an agent with the given capability match and metrics
    pub fn score(&self, match_strength: f64, component: &Component) -> f64 {
        let w = &self.weights;
        let latency_factor = 1.0 / (1.0 + component.response_time_ms / w.latency_reference_ms);
        w.capability * match_strength - w.error_penalty * component.error_rate
            + w.latency_bonus * latency_factor
    }

    /// Score normalized by the best achievable score, clamped to [0, 1]
    pub fn confidence(&self, score: f64) -> f64 {
        let max = self.weights.capability + self.weights.latency_bonus;
        if max <= 0.0 {
            return 0.0;
        }
        (score / max).clamp(0.0, 1.0)
    }

    pub fn select(
        &self,
        request: &AgentRequest,
        snapshot: &HealthSnapshot,
        agents: &[Arc<dyn Agent>],
        excluded: &HashSet<String>,
    ) -> RelayResult<RoutingDecision> {
        if !snapshot.verdict.is_usable() {
            return Err(RelayError::no_healthy_agent(format!(
                "system health is {}",
                snapshot.verdict
            )));
        }

        let intent = self.classifier.infer(request).ok_or_else(|| {
            RelayError::no_healthy_agent("no capability could be inferred for the request")
        })?;

        let mut candidates: Vec<Candidate> = agents
            .iter()
            .filter(|agent| !excluded.contains(agent.id()))
            .filter(|agent| intent.intersects(agent.capabilities()))
            .filter_map(|agent| {
                let status = snapshot.agent_status(agent.as_ref());
                if !status.is_usable() {
                    return None;
                }
                let component = snapshot.component(agent.id());
                Some(Candidate {
                    id: agent.id().to_string(),
                    healthy: status == HealthStatus::Healthy,
                    score: self.score(intent.match_strength(agent.capabilities()), &component),
                    error_rate: component.error_rate,
                })
            })
            .collect();

        if candidates.is_empty() {
            return Err(RelayError::no_healthy_agent(format!(
                "no usable agent matches capabilities [{}]",
                intent
                    .capabilities()
                    .map(|(name, _)| name)
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }

        candidates.sort_by(Candidate::rank);

        // An eligible preferred agent in the winning tier takes the lead
        let top_tier_healthy = candidates[0].healthy;
        if let Some(preferred) = request.preferences.agent.as_deref() {
            if let Some(pos) = candidates
                .iter()
                .position(|c| c.id == preferred && c.healthy == top_tier_healthy)
            {
                let chosen = candidates.remove(pos);
                candidates.insert(0, chosen);
            }
        }

        let chosen = &candidates[0];
        let confidence = self.confidence(chosen.score);
        if chosen.healthy {
            debug!(agent = %chosen.id, score = chosen.score, confidence, "Agent selected");
        } else {
            info!(
                agent = %chosen.id,
                score = chosen.score,
                confidence,
                "No healthy agent eligible, selected degraded agent"
            );
        }

        Ok(RoutingDecision {
            agent_id: chosen.id.clone(),
            confidence,
            fallback: candidates[1..].iter().map(|c| c.id.clone()).collect(),
            intent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mocks::MockAgent;
    use std::collections::BTreeMap;

    fn router() -> AgentRouter {
        AgentRouter::new(
            RoutingWeights::default(),
            IntentClassifier::new(&BTreeMap::new(), Some("general".to_string())).unwrap(),
        )
    }

    fn agents() -> Vec<Arc<dyn Agent>> {
        vec![
            Arc::new(MockAgent::responding(
                "writer",
                "anthropic",
                &[("creative", 1.0), ("general", 0.5)],
                "w",
            )),
            Arc::new(MockAgent::responding(
                "builder",
                "openai",
                &[("implementation", 1.0), ("general", 0.5)],
                "b",
            )),
        ]
    }

    fn component(name: &str, status: HealthStatus, error_rate: f64) -> Component {
        let mut component = Component::unobserved(name);
        component.status = status;
        component.error_rate = error_rate;
        component
    }

    #[test]
    fn test_selects_best_capability_match() {
        let snapshot = HealthSnapshot::new(HealthStatus::Healthy, vec![]);
        let request = AgentRequest::new("write").with_capabilities(["creative"]);

        let decision = router()
            .select(&request, &snapshot, &agents(), &HashSet::new())
            .unwrap();

        assert_eq!(decision.agent_id, "writer");
        assert!(decision.fallback.is_empty());
        // match 1.0 and a fresh agent: (1.0 + 0.1) / 1.1
        assert!((decision.confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_tie_breaks_by_id() {
        let snapshot = HealthSnapshot::new(HealthStatus::Healthy, vec![]);
        let decision = router()
            .select(&AgentRequest::new("hi"), &snapshot, &agents(), &HashSet::new())
            .unwrap();

        assert_eq!(decision.agent_id, "builder");
        assert_eq!(decision.fallback, vec!["writer"]);
        assert_eq!(decision.eligible_count(), 2);
    }

    #[test]
    fn test_tie_breaks_by_error_rate_before_id() {
        let router = AgentRouter::new(
            RoutingWeights {
                error_penalty: 0.0,
                ..RoutingWeights::default()
            },
            IntentClassifier::new(&BTreeMap::new(), Some("general".to_string())).unwrap(),
        );
        let snapshot = HealthSnapshot::new(
            HealthStatus::Healthy,
            vec![component("builder", HealthStatus::Healthy, 0.1)],
        );

        let decision = router
            .select(&AgentRequest::new("hi"), &snapshot, &agents(), &HashSet::new())
            .unwrap();
        assert_eq!(decision.agent_id, "writer");
    }

    #[test]
    fn test_never_selects_unhealthy_provider() {
        let snapshot = HealthSnapshot::new(
            HealthStatus::Degraded,
            vec![component("anthropic", HealthStatus::Unhealthy, 0.0)],
        );
        let request = AgentRequest::new("write").with_capabilities(["creative"]);

        let err = router()
            .select(&request, &snapshot, &agents(), &HashSet::new())
            .unwrap_err();
        assert!(matches!(err, RelayError::NoHealthyAgent { .. }));
    }

    #[test]
    fn test_healthy_preferred_over_stronger_degraded() {
        let snapshot = HealthSnapshot::new(
            HealthStatus::Healthy,
            vec![component("writer", HealthStatus::Degraded, 0.3)],
        );
        let request = AgentRequest::new("x").with_capabilities(["creative", "general"]);

        let decision = router()
            .select(&request, &snapshot, &agents(), &HashSet::new())
            .unwrap();
        assert_eq!(decision.agent_id, "builder");
        assert_eq!(decision.fallback, vec!["writer"]);
    }

    #[test]
    fn test_unhealthy_verdict_fails() {
        let snapshot = HealthSnapshot::new(HealthStatus::Unhealthy, vec![]);
        let err = router()
            .select(&AgentRequest::new("hi"), &snapshot, &agents(), &HashSet::new())
            .unwrap_err();

        assert!(err.to_string().contains("system health is unhealthy"));
    }

    #[test]
    fn test_excluded_agents_are_skipped() {
        let snapshot = HealthSnapshot::new(HealthStatus::Healthy, vec![]);
        let excluded: HashSet<String> = ["builder".to_string()].into_iter().collect();

        let decision = router()
            .select(&AgentRequest::new("hi"), &snapshot, &agents(), &excluded)
            .unwrap();
        assert_eq!(decision.agent_id, "writer");
    }

    #[test]
    fn test_preferred_agent_within_tier() {
        let snapshot = HealthSnapshot::new(HealthStatus::Healthy, vec![]);
        let mut request = AgentRequest::new("hi");
        request.preferences.agent = Some("writer".to_string());

        let decision = router()
            .select(&request, &snapshot, &agents(), &HashSet::new())
            .unwrap();
        assert_eq!(decision.agent_id, "writer");
        assert_eq!(decision.fallback, vec!["builder"]);
    }

    #[test]
    fn test_confidence_is_clamped() {
        let router = router();
        assert_eq!(router.confidence(-0.5), 0.0);
        assert_eq!(router.confidence(5.0), 1.0);
    }
}
