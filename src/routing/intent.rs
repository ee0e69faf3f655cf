//! Inferring which capabilities a request needs

use crate::agent::capability::{normalize_name, CapabilitySet};
use crate::agent::request::AgentRequest;
use crate::config::RoutingSection;
use crate::error::{RelayError, RelayResult};
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;

/// Where an inferred intent came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentSource {
    Explicit,
    Keywords,
    Default,
}

/// Capability weights a request asks for, normalized to sum to 1
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Intent {
    pub source: IntentSource,
    weights: BTreeMap<String, f64>,
}

impl Intent {
    /// Build from raw (capability, weight) pairs; `None` when nothing has weight
    pub fn from_weights<I, S>(source: IntentSource, raw: I) -> Option<Self>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: AsRef<str>,
    {
        let mut weights: BTreeMap<String, f64> = BTreeMap::new();
        for (name, weight) in raw {
            let name = normalize_name(name.as_ref());
            if name.is_empty() || weight <= 0.0 {
                continue;
            }
            *weights.entry(name).or_insert(0.0) += weight;
        }

        let total: f64 = weights.values().sum();
        if total <= 0.0 {
            return None;
        }
        weights.values_mut().for_each(|w| *w /= total);
        Some(Self { source, weights })
    }

    pub fn capabilities(&self) -> impl Iterator<Item = (&str, f64)> {
        self.weights.iter().map(|(name, w)| (name.as_str(), *w))
    }

    /// Weighted overlap with an agent's capabilities, in [0, 1]
    pub fn match_strength(&self, capabilities: &CapabilitySet) -> f64 {
        self.weights
            .iter()
            .map(|(name, w)| w * capabilities.weight(name))
            .sum::<f64>()
            .clamp(0.0, 1.0)
    }

    pub fn intersects(&self, capabilities: &CapabilitySet) -> bool {
        self.weights.keys().any(|name| capabilities.contains(name))
    }
}

/// Maps request text to an [`Intent`]
///
/// Explicit capability preferences win, then the keyword table, then the
/// configured default capability.
#[derive(Debug, Clone)]
pub struct IntentClassifier {
    keywords: Vec<(String, Regex)>,
    default_capability: Option<String>,
}

impl IntentClassifier {
    pub fn new(
        keywords: &BTreeMap<String, Vec<String>>,
        default_capability: Option<String>,
    ) -> RelayResult<Self> {
        let mut compiled = Vec::new();
        for (capability, words) in keywords {
            for word in words.iter().map(|w| w.trim()).filter(|w| !w.is_empty()) {
                let pattern = format!(r"(?i)\b{}\b", regex::escape(word));
                let regex = Regex::new(&pattern).map_err(|e| {
                    RelayError::setup_failure(format!(
                        "invalid keyword '{word}' for capability '{capability}': {e}"
                    ))
                })?;
                compiled.push((capability.clone(), regex));
            }
        }

        Ok(Self {
            keywords: compiled,
            default_capability,
        })
    }

    pub fn from_routing(section: &RoutingSection) -> RelayResult<Self> {
        Self::new(&section.keywords, section.default_capability.clone())
    }

    pub fn infer(&self, request: &AgentRequest) -> Option<Intent> {
        let explicit = Intent::from_weights(
            IntentSource::Explicit,
            request.preferences.capabilities.iter().map(|c| (c, 1.0)),
        );
        if explicit.is_some() {
            return explicit;
        }

        let hits = self.keywords.iter().map(|(capability, regex)| {
            (capability, regex.find_iter(&request.message).count() as f64)
        });
        if let Some(intent) = Intent::from_weights(IntentSource::Keywords, hits) {
            return Some(intent);
        }

        self.default_capability
            .as_ref()
            .and_then(|c| Intent::from_weights(IntentSource::Default, [(c, 1.0)]))
    }
}
