//! Weighted capability sets advertised by agents

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A named skill with a weight in [0, 1]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capability {
    pub name: String,
    pub weight: f64,
}

impl Capability {
    pub fn new(name: impl AsRef<str>, weight: f64) -> Self {
        Self {
            name: normalize_name(name.as_ref()),
            weight: weight.clamp(0.0, 1.0),
        }
    }
}

/// Capabilities of one agent, keyed by lowercase name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilitySet(BTreeMap<String, f64>);

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every capability at full weight
    pub fn uniform<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names.into_iter().map(|n| Capability::new(n, 1.0)).collect()
    }

    pub fn insert(&mut self, capability: Capability) {
        self.0.insert(capability.name, capability.weight);
    }

    /// Weight of a capability, 0 when not advertised
    pub fn weight(&self, name: &str) -> f64 {
        self.0.get(&normalize_name(name)).copied().unwrap_or(0.0)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.weight(name) > 0.0
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<T: IntoIterator<Item = Capability>>(iter: T) -> Self {
        let mut set = CapabilitySet::new();
        for capability in iter {
            set.insert(capability);
        }
        set
    }
}

impl From<&BTreeMap<String, f64>> for CapabilitySet {
    fn from(map: &BTreeMap<String, f64>) -> Self {
        map.iter().map(|(name, w)| Capability::new(name, *w)).collect()
    }
}

pub(crate) fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}
