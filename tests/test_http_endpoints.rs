//! HTTP surface exercised in-process with warp's test harness

use agentrelay::agent::Agent;
use agentrelay::health::{HealthCheck, HealthStatus};
use agentrelay::llm::LlmProvider;
use agentrelay::server::routes;
use agentrelay::testing::{MockAgent, MockHealthCheck, MockLlmProvider};
use agentrelay::{RelayComponents, RelayConfig, RelaySystem};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

const CONFIG: &str = r#"
[routing]
default_capability = "general"
probe_timeout_ms = 200

[routing.keywords]
implementation = ["code"]

[health]
primary = "anthropic"
auxiliaries = ["openai", "knowledge", "embeddings"]

[[providers]]
name = "anthropic"
kind = "anthropic"
model = "claude-sonnet-4-20250514"
api_key_env = "AGENTRELAY_TEST_UNSET_ANTHROPIC_KEY"

[[providers]]
name = "openai"
kind = "openai"
model = "gpt-4o"
api_key_env = "AGENTRELAY_TEST_UNSET_OPENAI_KEY"

[[endpoints]]
name = "knowledge"
url = "http://localhost:6333/health"

[[endpoints]]
name = "embeddings"
url = "http://localhost:8081/health"

[[agents]]
id = "writer"
provider = "anthropic"
description = "Drafts prose and general answers"
system_prompt = "You write."
capabilities = { general = 1.0 }

[[agents]]
id = "builder"
provider = "openai"
system_prompt = "You build."
capabilities = { implementation = 1.0 }
"#;

fn system_with(checks: Vec<Arc<dyn HealthCheck>>) -> Arc<RelaySystem> {
    let system = RelaySystem::new(RelayConfig::from_toml_str(CONFIG).unwrap());
    let providers: Vec<Arc<dyn LlmProvider>> = vec![
        Arc::new(MockLlmProvider::single_response("anthropic", "unused").with_rate_limit(42)),
        Arc::new(MockLlmProvider::single_response("openai", "unused")),
    ];
    let agents: Vec<Arc<dyn Agent>> = vec![
        Arc::new(MockAgent::responding(
            "writer",
            "anthropic",
            &[("general", 1.0)],
            "Hello from writer",
        )),
        Arc::new(MockAgent::responding(
            "builder",
            "openai",
            &[("implementation", 1.0)],
            "fn main() {}",
        )),
    ];
    system
        .initialize_with(RelayComponents {
            providers,
            agents,
            checks,
        })
        .unwrap();
    Arc::new(system)
}

fn all_healthy() -> Vec<Arc<dyn HealthCheck>> {
    ["anthropic", "openai", "knowledge", "embeddings"]
        .into_iter()
        .map(|name| Arc::new(MockHealthCheck::reporting(name, HealthStatus::Healthy)) as Arc<dyn HealthCheck>)
        .collect()
}

fn body_json(body: &[u8]) -> Value {
    serde_json::from_slice(body).unwrap()
}

#[tokio::test]
async fn test_health_reports_healthy_system() {
    let api = routes(system_with(all_healthy()));

    let res = warp::test::request()
        .method("GET")
        .path("/health")
        .reply(&api)
        .await;

    assert_eq!(res.status(), 200);
    let body = body_json(res.body());
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["components"]["knowledge"]["status"], "healthy");
    assert_eq!(
        body["fallback_chain"],
        serde_json::json!(["anthropic", "openai", "knowledge", "embeddings"])
    );
}

#[tokio::test]
async fn test_health_returns_503_when_primary_down() {
    let checks: Vec<Arc<dyn HealthCheck>> = vec![
        Arc::new(MockHealthCheck::signalling_unhealthy("anthropic")),
        Arc::new(MockHealthCheck::reporting("openai", HealthStatus::Healthy)),
        Arc::new(MockHealthCheck::failing("knowledge")),
        Arc::new(MockHealthCheck::reporting("embeddings", HealthStatus::Degraded)),
    ];
    let api = routes(system_with(checks));

    let res = warp::test::request().path("/health").reply(&api).await;

    assert_eq!(res.status(), 503);
    let body = body_json(res.body());
    assert_eq!(body["status"], "unhealthy");
    assert_eq!(body["components"]["anthropic"]["status"], "unhealthy");
    assert_eq!(body["components"]["knowledge"]["status"], "unavailable");
    assert_eq!(body["fallback_chain"], serde_json::json!(["openai", "embeddings"]));
}

#[tokio::test]
async fn test_slow_probe_does_not_block_health_endpoint() {
    let checks: Vec<Arc<dyn HealthCheck>> = vec![
        Arc::new(MockHealthCheck::reporting("anthropic", HealthStatus::Healthy)),
        Arc::new(MockHealthCheck::reporting("openai", HealthStatus::Healthy)),
        Arc::new(
            MockHealthCheck::reporting("knowledge", HealthStatus::Healthy)
                .with_delay(Duration::from_secs(10)),
        ),
        Arc::new(MockHealthCheck::reporting("embeddings", HealthStatus::Healthy)),
    ];
    let api = routes(system_with(checks));

    let res = tokio::time::timeout(
        Duration::from_secs(2),
        warp::test::request().path("/health").reply(&api),
    )
    .await
    .expect("health endpoint must settle within the probe timeout");

    assert_eq!(res.status(), 200);
    let body = body_json(res.body());
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["components"]["knowledge"]["status"], "unhealthy");
}

#[tokio::test]
async fn test_head_health_reads_tracker_without_probing() {
    let probe = Arc::new(MockHealthCheck::reporting("anthropic", HealthStatus::Healthy));
    let mut checks = all_healthy();
    checks[0] = probe.clone() as Arc<dyn HealthCheck>;
    let api = routes(system_with(checks));

    let res = warp::test::request()
        .method("HEAD")
        .path("/health")
        .reply(&api)
        .await;

    assert_eq!(res.status(), 200);
    assert!(res.body().is_empty());
    assert_eq!(probe.calls(), 0);
}

#[tokio::test]
async fn test_status_reports_lifecycle_and_rate_limits() {
    let system = system_with(all_healthy());
    let api = routes(Arc::clone(&system));

    let res = warp::test::request().path("/status").reply(&api).await;

    assert_eq!(res.status(), 200);
    let body = body_json(res.body());
    assert_eq!(body["system"]["state"], "initialized");
    assert_eq!(body["system"]["is_healthy"], true);
    assert_eq!(body["providers"]["anthropic"]["rate_limit_remaining"], 42);
    assert_eq!(body["providers"]["openai"]["rate_limit_remaining"], Value::Null);
    assert_eq!(body["agents"]["builder"]["capabilities"], serde_json::json!(["implementation"]));
    assert_eq!(body["agents"]["writer"]["description"], "Drafts prose and general answers");
    // No description configured, so the field is left out
    assert!(body["agents"]["builder"].get("description").is_none());
    assert_eq!(body["routing"]["fallback_enabled"], true);
}

#[tokio::test]
async fn test_chat_routes_by_keyword() {
    let api = routes(system_with(all_healthy()));

    let res = warp::test::request()
        .method("POST")
        .path("/chat")
        .json(&serde_json::json!({"message": "please write some code", "session_id": "abc"}))
        .reply(&api)
        .await;

    assert_eq!(res.status(), 200);
    let body = body_json(res.body());
    assert_eq!(body["agent_id"], "builder");
    assert_eq!(body["content"], "fn main() {}");
    assert_eq!(body["metadata"]["session_id"], "abc");
    assert_eq!(body["metadata"]["attempts"], 1);
    assert_eq!(body["metadata"]["fallback_used"], false);
    assert!(body["metadata"].get("error").is_none());
}

#[tokio::test]
async fn test_chat_rejects_empty_message() {
    let api = routes(system_with(all_healthy()));

    let res = warp::test::request()
        .method("POST")
        .path("/chat")
        .json(&serde_json::json!({"message": "   "}))
        .reply(&api)
        .await;

    assert_eq!(res.status(), 400);
    let body = body_json(res.body());
    assert!(body["error"].as_str().unwrap().contains("message must not be empty"));
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_chat_rejects_malformed_body() {
    let api = routes(system_with(all_healthy()));

    let res = warp::test::request()
        .method("POST")
        .path("/chat")
        .header("content-type", "application/json")
        .body("{\"history\": []}")
        .reply(&api)
        .await;

    assert_eq!(res.status(), 400);
}

#[tokio::test]
async fn test_chat_degrades_before_initialization() {
    let system = Arc::new(RelaySystem::new(RelayConfig::from_toml_str(CONFIG).unwrap()));
    let api = routes(system);

    let res = warp::test::request()
        .method("POST")
        .path("/chat")
        .json(&serde_json::json!({"message": "hello"}))
        .reply(&api)
        .await;

    assert_eq!(res.status(), 200);
    let body = body_json(res.body());
    assert_eq!(body["agent_id"], Value::Null);
    assert_eq!(body["metadata"]["system_health"], false);
    assert!(body["metadata"]["error"]
        .as_str()
        .unwrap()
        .contains("not initialized"));
}

#[tokio::test]
async fn test_health_is_503_before_initialization() {
    let system = Arc::new(RelaySystem::new(RelayConfig::from_toml_str(CONFIG).unwrap()));
    let api = routes(system);

    let res = warp::test::request().path("/health").reply(&api).await;
    assert_eq!(res.status(), 503);

    let res = warp::test::request().method("HEAD").path("/health").reply(&api).await;
    assert_eq!(res.status(), 503);
}

#[tokio::test]
async fn test_unknown_route_is_json_404() {
    let api = routes(system_with(all_healthy()));

    let res = warp::test::request().path("/nope").reply(&api).await;

    assert_eq!(res.status(), 404);
    assert_eq!(body_json(res.body())["error"], "not found");
}
