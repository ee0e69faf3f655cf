//! Configuration for the relay
//!
//! Loaded from TOML. API keys are never stored in the file; providers name the
//! environment variable that holds them and the key is resolved during setup.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use thiserror::Error;

/// Number of auxiliary components the health verdict is computed over
pub const AUXILIARY_COUNT: usize = 3;

/// Top-level relay configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelayConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub metrics: MetricsSection,
    #[serde(default)]
    pub routing: RoutingSection,
    pub health: HealthSection,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    #[serde(default)]
    pub endpoints: Vec<EndpointConfig>,
    #[serde(default)]
    pub agents: Vec<AgentConfig>,
}

/// HTTP surface settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSection {
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

/// Rolling-window and health-band settings for the metrics tracker
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricsSection {
    /// Number of trailing outcomes the error rate is computed over
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    /// Error rate at or above which a component reads as degraded
    #[serde(default = "default_degraded_error_rate")]
    pub degraded_error_rate: f64,
    /// Error rate at or above which a component reads as unhealthy
    #[serde(default = "default_unhealthy_error_rate")]
    pub unhealthy_error_rate: f64,
    /// Outcomes older than this no longer count toward the error rate
    #[serde(default = "default_outcome_ttl")]
    pub outcome_ttl_ms: u64,
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            degraded_error_rate: default_degraded_error_rate(),
            unhealthy_error_rate: default_unhealthy_error_rate(),
            outcome_ttl_ms: default_outcome_ttl(),
        }
    }
}

/// Routing, probing and dispatch settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoutingSection {
    /// Strategy name reported on the status endpoint
    #[serde(default = "default_strategy")]
    pub strategy: String,
    /// When false a dispatch makes exactly one attempt
    #[serde(default = "default_true")]
    pub fallback_enabled: bool,
    #[serde(default = "default_probe_interval")]
    pub probe_interval_secs: u64,
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    #[serde(default = "default_dispatch_timeout_ms")]
    pub dispatch_timeout_ms: u64,
    /// Optional hard cap on attempts per dispatch
    pub max_attempts: Option<usize>,
    /// Capability assumed when nothing in the request matches a keyword
    pub default_capability: Option<String>,
    #[serde(default)]
    pub weights: RoutingWeights,
    /// capability name -> keywords that signal it in message text
    #[serde(default)]
    pub keywords: BTreeMap<String, Vec<String>>,
}

impl Default for RoutingSection {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            fallback_enabled: true,
            probe_interval_secs: default_probe_interval(),
            probe_timeout_ms: default_probe_timeout_ms(),
            dispatch_timeout_ms: default_dispatch_timeout_ms(),
            max_attempts: None,
            default_capability: None,
            weights: RoutingWeights::default(),
            keywords: BTreeMap::new(),
        }
    }
}

/// Tunable weights of the agent scoring function
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RoutingWeights {
    #[serde(default = "default_capability_weight")]
    pub capability: f64,
    #[serde(default = "default_error_penalty")]
    pub error_penalty: f64,
    #[serde(default = "default_latency_bonus")]
    pub latency_bonus: f64,
    /// Average response time at which the latency bonus is halved
    #[serde(default = "default_latency_reference_ms")]
    pub latency_reference_ms: f64,
}

impl Default for RoutingWeights {
    fn default() -> Self {
        Self {
            capability: default_capability_weight(),
            error_penalty: default_error_penalty(),
            latency_bonus: default_latency_bonus(),
            latency_reference_ms: default_latency_reference_ms(),
        }
    }
}

/// Which components the system verdict is computed over
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthSection {
    /// Component users interact with directly
    pub primary: String,
    /// Exactly three auxiliary components, in fallback priority order
    pub auxiliaries: Vec<String>,
}

/// Upstream model provider kinds
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Anthropic,
    Openai,
}

/// Upstream model provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderConfig {
    pub name: String,
    pub kind: ProviderKind,
    pub model: String,
    /// Environment variable containing the API key
    pub api_key_env: String,
    pub base_url: Option<String>,
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,
}

/// Functional endpoint probed over HTTP (e.g. the knowledge service)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EndpointConfig {
    pub name: String,
    pub url: String,
}

/// Agent definition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentConfig {
    pub id: String,
    /// Name of the provider this agent runs on
    pub provider: String,
    #[serde(default)]
    pub description: String,
    pub system_prompt: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    /// capability name -> weight in [0, 1]
    #[serde(default)]
    pub capabilities: BTreeMap<String, f64>,
}

fn default_port() -> u16 {
    8080
}

fn default_window_size() -> usize {
    50
}

fn default_degraded_error_rate() -> f64 {
    0.25
}

fn default_unhealthy_error_rate() -> f64 {
    0.75
}

fn default_outcome_ttl() -> u64 {
    60_000
}

fn default_strategy() -> String {
    "capability".to_string()
}

fn default_true() -> bool {
    true
}

fn default_probe_interval() -> u64 {
    30
}

fn default_probe_timeout_ms() -> u64 {
    5000
}

fn default_dispatch_timeout_ms() -> u64 {
    60_000
}

fn default_capability_weight() -> f64 {
    1.0
}

fn default_error_penalty() -> f64 {
    1.0
}

fn default_latency_bonus() -> f64 {
    0.1
}

fn default_latency_reference_ms() -> f64 {
    1000.0
}

fn default_provider_timeout() -> u64 {
    60
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
    #[error("Invalid identifier: {0}")]
    InvalidId(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl RelayConfig {
    /// Load and validate configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: RelayConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-references and value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut names = HashSet::new();
        for name in self
            .providers
            .iter()
            .map(|p| &p.name)
            .chain(self.endpoints.iter().map(|e| &e.name))
            .chain(self.agents.iter().map(|a| &a.id))
        {
            validate_id(name)?;
            if !names.insert(name.as_str()) {
                return Err(ConfigError::InvalidConfig(format!(
                    "Component name '{name}' is declared more than once"
                )));
            }
        }

        for agent in &self.agents {
            if !self.providers.iter().any(|p| p.name == agent.provider) {
                return Err(ConfigError::InvalidConfig(format!(
                    "Agent '{}' references unknown provider '{}'",
                    agent.id, agent.provider
                )));
            }
            if agent.capabilities.is_empty() {
                return Err(ConfigError::InvalidConfig(format!(
                    "Agent '{}' declares no capabilities",
                    agent.id
                )));
            }
            if let Some((name, weight)) = agent
                .capabilities
                .iter()
                .find(|(_, w)| !(0.0..=1.0).contains(*w))
            {
                return Err(ConfigError::InvalidConfig(format!(
                    "Agent '{}' capability '{name}' has weight {weight} outside [0, 1]",
                    agent.id
                )));
            }
        }

        for endpoint in &self.endpoints {
            url::Url::parse(&endpoint.url).map_err(|e| {
                ConfigError::InvalidConfig(format!(
                    "Endpoint '{}' has invalid url '{}': {e}",
                    endpoint.name, endpoint.url
                ))
            })?;
        }

        if self.health.auxiliaries.len() != AUXILIARY_COUNT {
            return Err(ConfigError::InvalidConfig(format!(
                "[health] requires exactly {AUXILIARY_COUNT} auxiliaries, found {}",
                self.health.auxiliaries.len()
            )));
        }
        let probed: HashSet<&str> = self
            .providers
            .iter()
            .map(|p| p.name.as_str())
            .chain(self.endpoints.iter().map(|e| e.name.as_str()))
            .collect();
        let mut seen = HashSet::new();
        for component in self.health_components() {
            if !probed.contains(component) {
                return Err(ConfigError::InvalidConfig(format!(
                    "[health] references unknown component '{component}'"
                )));
            }
            if !seen.insert(component) {
                return Err(ConfigError::InvalidConfig(format!(
                    "[health] lists component '{component}' more than once"
                )));
            }
        }

        let m = &self.metrics;
        if m.window_size == 0 {
            return Err(ConfigError::InvalidConfig(
                "metrics.window_size must be at least 1".to_string(),
            ));
        }
        if m.outcome_ttl_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "metrics.outcome_ttl_ms must be greater than 0".to_string(),
            ));
        }
        if !(m.degraded_error_rate > 0.0
            && m.degraded_error_rate <= m.unhealthy_error_rate
            && m.unhealthy_error_rate <= 1.0)
        {
            return Err(ConfigError::InvalidConfig(format!(
                "error-rate thresholds must satisfy 0 < degraded ({}) <= unhealthy ({}) <= 1",
                m.degraded_error_rate, m.unhealthy_error_rate
            )));
        }

        let r = &self.routing;
        if r.probe_timeout_ms == 0 || r.dispatch_timeout_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "probe and dispatch timeouts must be non-zero".to_string(),
            ));
        }
        if r.max_attempts == Some(0) {
            return Err(ConfigError::InvalidConfig(
                "routing.max_attempts must be at least 1 when set".to_string(),
            ));
        }
        if r.weights.latency_reference_ms <= 0.0 {
            return Err(ConfigError::InvalidConfig(
                "routing.weights.latency_reference_ms must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// Primary followed by auxiliaries, in declared priority order
    pub fn health_components(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.health.primary.as_str())
            .chain(self.health.auxiliaries.iter().map(String::as_str))
    }

    pub fn provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.name == name)
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[routing]
default_capability = "general"

[routing.keywords]
creative = ["story", "poem"]
implementation = ["code", "function"]

[health]
primary = "anthropic"
auxiliaries = ["openai", "knowledge", "embeddings"]

[[providers]]
name = "anthropic"
kind = "anthropic"
model = "claude-sonnet-4-20250514"
api_key_env = "ANTHROPIC_API_KEY"

[[providers]]
name = "openai"
kind = "openai"
model = "gpt-4o"
api_key_env = "OPENAI_API_KEY"

[[endpoints]]
name = "knowledge"
url = "http://localhost:6333/health"

[[endpoints]]
name = "embeddings"
url = "http://localhost:8081/health"

[[agents]]
id = "writer"
provider = "anthropic"
system_prompt = "You write."
capabilities = { creative = 1.0, general = 0.5 }

[[agents]]
id = "builder"
provider = "openai"
system_prompt = "You build."
capabilities = { implementation = 1.0, general = 0.5 }
"#;
        Self::from_toml_str(toml_content).expect("Test config should parse")
    }
}

impl ProviderConfig {
    /// Resolve the API key from the environment
    pub fn api_key(&self) -> Result<String, ConfigError> {
        std::env::var(&self.api_key_env)
            .map_err(|_| ConfigError::EnvVarNotFound(self.api_key_env.clone()))
    }
}

/// Identifiers must match [a-zA-Z0-9._-]+
fn validate_id(id: &str) -> Result<(), ConfigError> {
    let valid_chars = id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-');

    if id.is_empty() || !valid_chars {
        return Err(ConfigError::InvalidId(format!(
            "'{id}' must match pattern [a-zA-Z0-9._-]+"
        )));
    }

    Ok(())
}
