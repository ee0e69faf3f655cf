//! Configuration loading and validation from TOML files

use agentrelay::{ConfigError, ProviderKind, RelayConfig};
use std::io::Write;
use tempfile::NamedTempFile;

const VALID_CONFIG: &str = r#"
[server]
port = 9090

[metrics]
window_size = 20
degraded_error_rate = 0.2
unhealthy_error_rate = 0.6
outcome_ttl_ms = 30000

[routing]
strategy = "capability"
fallback_enabled = true
probe_interval_secs = 15
probe_timeout_ms = 2000
dispatch_timeout_ms = 30000
max_attempts = 3
default_capability = "general"

[routing.weights]
capability = 1.0
error_penalty = 0.5
latency_bonus = 0.2
latency_reference_ms = 500.0

[routing.keywords]
creative = ["story", "poem"]

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
base_url = "http://localhost:4000/v1"
timeout_secs = 10

[[endpoints]]
name = "knowledge"
url = "http://localhost:6333/health"

[[endpoints]]
name = "embeddings"
url = "http://localhost:8081/health"

[[agents]]
id = "writer"
provider = "anthropic"
description = "Creative writing"
system_prompt = "You write."
capabilities = { creative = 1.0, general = 0.5 }
"#;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn invalid(content: &str) -> String {
    match RelayConfig::from_toml_str(content) {
        Err(ConfigError::InvalidConfig(message)) => message,
        other => panic!("expected InvalidConfig, got {other:?}"),
    }
}

#[test]
fn test_loads_full_config_from_file() {
    let file = write_config(VALID_CONFIG);
    let config = RelayConfig::load_from_file(file.path()).unwrap();

    assert_eq!(config.server.port, 9090);
    assert_eq!(config.metrics.window_size, 20);
    assert_eq!(config.metrics.outcome_ttl_ms, 30_000);
    assert_eq!(config.routing.max_attempts, Some(3));
    assert_eq!(config.routing.weights.error_penalty, 0.5);
    assert_eq!(config.routing.keywords["creative"], vec!["story", "poem"]);
    assert_eq!(config.providers.len(), 2);
    assert_eq!(config.providers[1].kind, ProviderKind::Openai);
    assert_eq!(config.providers[1].timeout_secs, 10);
    assert_eq!(
        config.health_components().collect::<Vec<_>>(),
        vec!["anthropic", "openai", "knowledge", "embeddings"]
    );
    assert_eq!(config.agents[0].capabilities["creative"], 1.0);
}

#[test]
fn test_defaults_fill_optional_sections() {
    let minimal = r#"
[health]
primary = "anthropic"
auxiliaries = ["openai", "knowledge", "embeddings"]

[[providers]]
name = "anthropic"
kind = "anthropic"
model = "m"
api_key_env = "K1"

[[providers]]
name = "openai"
kind = "openai"
model = "m"
api_key_env = "K2"

[[endpoints]]
name = "knowledge"
url = "http://localhost:1/health"

[[endpoints]]
name = "embeddings"
url = "http://localhost:2/health"
"#;
    let config = RelayConfig::from_toml_str(minimal).unwrap();

    assert_eq!(config.server.port, 8080);
    assert_eq!(config.metrics.window_size, 50);
    assert_eq!(config.metrics.outcome_ttl_ms, 60_000);
    assert!(config.routing.fallback_enabled);
    assert_eq!(config.routing.probe_timeout_ms, 5000);
    assert_eq!(config.routing.max_attempts, None);
    assert_eq!(config.routing.weights.capability, 1.0);
    assert_eq!(config.providers[0].timeout_secs, 60);
    assert!(config.agents.is_empty());
}

#[test]
fn test_missing_file_is_read_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = RelayConfig::load_from_file(&dir.path().join("relay.toml"));
    assert!(matches!(result, Err(ConfigError::FileRead(_))));
}

#[test]
fn test_malformed_toml_is_parse_error() {
    let file = write_config("[health\nprimary = ");
    let result = RelayConfig::load_from_file(file.path());
    assert!(matches!(result, Err(ConfigError::TomlParse(_))));
}

#[test]
fn test_rejects_wrong_auxiliary_count() {
    let content = VALID_CONFIG.replace(
        r#"auxiliaries = ["openai", "knowledge", "embeddings"]"#,
        r#"auxiliaries = ["openai", "knowledge"]"#,
    );
    assert!(invalid(&content).contains("exactly 3 auxiliaries"));
}

#[test]
fn test_rejects_unknown_health_component() {
    let content = VALID_CONFIG.replace(r#"primary = "anthropic""#, r#"primary = "mystery""#);
    assert!(invalid(&content).contains("unknown component 'mystery'"));
}

#[test]
fn test_rejects_agent_with_unknown_provider() {
    let content = VALID_CONFIG.replace(
        "provider = \"anthropic\"\ndescription",
        "provider = \"cohere\"\ndescription",
    );
    assert!(invalid(&content).contains("unknown provider 'cohere'"));
}

#[test]
fn test_rejects_capability_weight_out_of_range() {
    let content = VALID_CONFIG.replace("creative = 1.0, general = 0.5", "creative = 1.5");
    assert!(invalid(&content).contains("outside [0, 1]"));
}

#[test]
fn test_rejects_inverted_error_thresholds() {
    let content = VALID_CONFIG.replace("degraded_error_rate = 0.2", "degraded_error_rate = 0.9");
    assert!(invalid(&content).contains("thresholds"));
}

#[test]
fn test_rejects_zero_max_attempts() {
    let content = VALID_CONFIG.replace("max_attempts = 3", "max_attempts = 0");
    assert!(invalid(&content).contains("max_attempts"));
}

#[test]
fn test_rejects_zero_outcome_ttl() {
    let content = VALID_CONFIG.replace("outcome_ttl_ms = 30000", "outcome_ttl_ms = 0");
    assert!(invalid(&content).contains("outcome_ttl_ms"));
}

#[test]
fn test_rejects_duplicate_component_names() {
    let content = VALID_CONFIG.replace(r#"name = "embeddings""#, r#"name = "knowledge""#);
    assert!(invalid(&content).contains("more than once"));
}

#[test]
fn test_rejects_invalid_identifier() {
    let content = VALID_CONFIG.replace(r#"id = "writer""#, r#"id = "writer one""#);
    assert!(matches!(
        RelayConfig::from_toml_str(&content),
        Err(ConfigError::InvalidId(_))
    ));
}

#[test]
fn test_rejects_invalid_endpoint_url() {
    let content = VALID_CONFIG.replace("http://localhost:8081/health", "not a url");
    assert!(invalid(&content).contains("invalid url"));
}

#[test]
fn test_missing_api_key_env_is_reported() {
    let config = RelayConfig::from_toml_str(
        &VALID_CONFIG.replace("OPENAI_API_KEY", "AGENTRELAY_TEST_DEFINITELY_UNSET"),
    )
    .unwrap();
    let provider = config.provider("openai").unwrap();

    match provider.api_key() {
        Err(ConfigError::EnvVarNotFound(name)) => {
            assert_eq!(name, "AGENTRELAY_TEST_DEFINITELY_UNSET")
        }
        other => panic!("expected EnvVarNotFound, got {other:?}"),
    }
}

#[test]
fn test_config_round_trips_through_toml() {
    let config = RelayConfig::from_toml_str(VALID_CONFIG).unwrap();
    let rendered = toml::to_string_pretty(&config).unwrap();
    assert_eq!(RelayConfig::from_toml_str(&rendered).unwrap(), config);
}
