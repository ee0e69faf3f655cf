//! Ordered fallback chains of still-usable components

use crate::health::status::{Component, HealthStatus};
use std::collections::HashMap;

/// Builds fallback chains in declared priority order
#[derive(Debug, Clone)]
pub struct FallbackChainBuilder {
    order: Vec<String>,
}

impl FallbackChainBuilder {
    /// `order` is the declaration order: primary first, then auxiliaries
    pub fn new<I, S>(order: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            order: order.into_iter().map(Into::into).collect(),
        }
    }

    /// Healthy and degraded components in declaration order
    ///
    /// Components missing from `statuses` are left out.
    pub fn build(&self, statuses: &HashMap<String, HealthStatus>) -> Vec<String> {
        self.order
            .iter()
            .filter(|name| statuses.get(*name).is_some_and(|s| s.is_usable()))
            .cloned()
            .collect()
    }

    /// Re-rank a chain: healthy before degraded, then lower error rate, then
    /// lower response time. Stable, so declaration order breaks remaining ties.
    pub fn sort_by_health(chain: &mut [String], snapshots: &HashMap<String, Component>) {
        chain.sort_by(|a, b| {
            let (a, b) = (snapshots.get(a), snapshots.get(b));
            let rank = |c: Option<&Component>| match c.map(|c| c.status) {
                Some(HealthStatus::Healthy) | None => 0u8,
                _ => 1u8,
            };
            let error_rate = |c: Option<&Component>| c.map(|c| c.error_rate).unwrap_or(0.0);
            let latency = |c: Option<&Component>| c.map(|c| c.response_time_ms).unwrap_or(0.0);

            rank(a)
                .cmp(&rank(b))
                .then_with(|| error_rate(a).total_cmp(&error_rate(b)))
                .then_with(|| latency(a).total_cmp(&latency(b)))
        });
    }
}
