//! Integration tests for the API layer.
//!
//! These tests spin up a real HTTP server on a random port, backed by a
//! coordinator whose agents are scripted stubs.

use async_trait::async_trait;
use concierge_agents::AgentRegistry;
use concierge_api::{create_router, AppState};
use concierge_common::{AgentContent, AgentInvoker, Invocation, InvocationFailure};
use concierge_coordinator::{Coordinator, CoordinatorConfig};
use std::sync::Arc;
use std::time::Duration;

/// Replies with the agent name; the architect is slow so requests can be cancelled.
struct StubInvoker;

#[async_trait]
impl AgentInvoker for StubInvoker {
    async fn invoke(&self, invocation: &Invocation) -> Result<AgentContent, InvocationFailure> {
        if invocation.agent_name == "software-architect" {
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
        Ok(AgentContent::text(format!("{} says hi", invocation.agent_name)))
    }
}

/// Spin up a test server on a random port and return the base URL.
async fn start_test_server() -> String {
    let coordinator = Coordinator::new(
        &CoordinatorConfig::default(),
        Arc::new(AgentRegistry::with_default_catalog()),
        Arc::new(StubInvoker),
    )
    .unwrap();
    let state = Arc::new(AppState::with_coordinator(Arc::new(coordinator)));
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    format!("http://{}", addr)
}

/// Helper to GET a URL and return (status, body_string).
async fn get(base: &str, path: &str) -> (u16, String) {
    let resp = reqwest::Client::new()
        .get(format!("{}{}", base, path))
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap();
    (status, body)
}

/// Helper to POST JSON and return (status, body_string).
async fn post_json(base: &str, path: &str, json: &str) -> (u16, String) {
    let resp = reqwest::Client::new()
        .post(format!("{}{}", base, path))
        .header("content-type", "application/json")
        .body(json.to_string())
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap();
    (status, body)
}

// ============================================================================
// Health and catalog
// ============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let base = start_test_server().await;
    let (status, body) = get(&base, "/health").await;
    assert_eq!(status, 200);

    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["agents"], 8);
}

#[tokio::test]
async fn test_list_agents() {
    let base = start_test_server().await;
    let (status, body) = get(&base, "/api/v1/agents").await;
    assert_eq!(status, 200);

    let agents: Vec<serde_json::Value> = serde_json::from_str(&body).unwrap();
    assert_eq!(agents.len(), 8);
    assert!(agents.iter().any(|a| a["name"] == "security-auditor"));
}

// ============================================================================
// Requests
// ============================================================================

#[tokio::test]
async fn test_submit_request() {
    let base = start_test_server().await;
    let (status, body) = post_json(
        &base,
        "/api/v1/requests",
        r#"{"id": "req_api", "content": "review this component for bugs"}"#,
    )
    .await;
    assert_eq!(status, 200);

    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["request_id"], "req_api");
    assert_eq!(json["content"], "code-reviewer says hi");
    assert_eq!(json["trace"][0]["agent"], "code-reviewer");
    assert_eq!(json["degraded"], false);

    let (_, health) = get(&base, "/health").await;
    let health: serde_json::Value = serde_json::from_str(&health).unwrap();
    assert_eq!(health["history_len"], 2);
}

#[tokio::test]
async fn test_empty_content_rejected() {
    let base = start_test_server().await;
    let (status, body) = post_json(&base, "/api/v1/requests", r#"{"content": "   "}"#).await;
    assert_eq!(status, 400);
    assert!(body.contains("INVALID_REQUEST"));
}

#[tokio::test]
async fn test_malformed_body_rejected() {
    let base = start_test_server().await;
    let (status, _) = post_json(&base, "/api/v1/requests", r#"{"text": "missing content"}"#).await;
    assert!(status == 400 || status == 422);
}

#[tokio::test]
async fn test_plan_without_execution() {
    let base = start_test_server().await;
    let (status, body) = post_json(
        &base,
        "/api/v1/plan",
        r#"{"content": "build a secure authentication system with full test coverage"}"#,
    )
    .await;
    assert_eq!(status, 200);

    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["classification"]["complexity"], "high");
    assert_eq!(json["plan"]["name"], "secure-feature");
    assert_eq!(json["plan"]["phases"].as_array().unwrap().len(), 4);
}

// ============================================================================
// Cancellation and history
// ============================================================================

#[tokio::test]
async fn test_cancel_unknown_request() {
    let base = start_test_server().await;
    let (status, body) = post_json(&base, "/api/v1/requests/req_nope/cancel", "").await;
    assert_eq!(status, 404);
    assert!(body.contains("NOT_FOUND"));
}

#[tokio::test]
async fn test_cancel_in_flight_request() {
    let base = start_test_server().await;

    let submit_base = base.clone();
    let submit = tokio::spawn(async move {
        post_json(
            &submit_base,
            "/api/v1/requests",
            r#"{"id": "req_slow", "content": "design the architecture for the system"}"#,
        )
        .await
    });

    let mut cancelled = false;
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let (status, _) = post_json(&base, "/api/v1/requests/req_slow/cancel", "").await;
        if status == 200 {
            cancelled = true;
            break;
        }
    }
    assert!(cancelled);

    let (status, body) = submit.await.unwrap();
    assert_eq!(status, 200);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["cancelled"], true);
}

#[tokio::test]
async fn test_clear_history() {
    let base = start_test_server().await;
    post_json(&base, "/api/v1/requests", r#"{"content": "review this component for bugs"}"#).await;

    let resp = reqwest::Client::new()
        .delete(format!("{}/api/v1/history", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 204);

    let (_, health) = get(&base, "/health").await;
    let health: serde_json::Value = serde_json::from_str(&health).unwrap();
    assert_eq!(health["history_len"], 0);
}
