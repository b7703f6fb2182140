//! HTTP route handlers for the API.

use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use concierge_agents::AgentDescriptor;
use concierge_common::UserRequest;
use concierge_coordinator::{AggregatedResponse, Classification, WorkflowPlan};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub agents: usize,
    pub active_requests: usize,
    pub history_len: usize,
}

/// Health check endpoint.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let coordinator = &state.coordinator;

    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.uptime_seconds(),
        agents: coordinator.registry().len(),
        active_requests: coordinator.active_requests(),
        history_len: coordinator.context().history_len(),
    })
}

/// API error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
    #[serde(skip)]
    pub status: StatusCode,
}

impl ErrorResponse {
    fn bad_request(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: "INVALID_REQUEST",
            status: StatusCode::BAD_REQUEST,
        }
    }

    fn not_found(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: "NOT_FOUND",
            status: StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

/// List every registered agent.
pub async fn list_agents(State(state): State<Arc<AppState>>) -> Json<Vec<AgentDescriptor>> {
    Json(state.coordinator.registry().iter().cloned().collect())
}

fn validate(request: &UserRequest) -> Result<(), ErrorResponse> {
    if request.content.trim().is_empty() {
        return Err(ErrorResponse::bad_request("content must not be empty"));
    }
    if request.id.trim().is_empty() {
        return Err(ErrorResponse::bad_request("id must not be empty"));
    }
    Ok(())
}

/// Process a request through the coordinator.
pub async fn submit_request(
    State(state): State<Arc<AppState>>,
    Json(request): Json<UserRequest>,
) -> Result<Json<AggregatedResponse>, ErrorResponse> {
    validate(&request)?;

    info!(
        request_id = %request.id,
        content_preview = %request.content.chars().take(50).collect::<String>(),
        "Received request"
    );

    Ok(Json(state.coordinator.process(request).await))
}

/// Result of a cancel call.
#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub request_id: String,
    pub cancelled: bool,
}

/// Cancel an in-flight request.
pub async fn cancel_request(
    State(state): State<Arc<AppState>>,
    Path(request_id): Path<String>,
) -> Result<Json<CancelResponse>, ErrorResponse> {
    if state.coordinator.cancel(&request_id) {
        Ok(Json(CancelResponse {
            request_id,
            cancelled: true,
        }))
    } else {
        warn!(request_id = %request_id, "Cancel requested for unknown request");
        Err(ErrorResponse::not_found(format!(
            "no in-flight request with id '{request_id}'"
        )))
    }
}

/// Classification and plan of a request, without execution.
#[derive(Debug, Serialize)]
pub struct PlanResponse {
    pub request_id: String,
    pub classification: Classification,
    pub plan: WorkflowPlan,
}

/// Classify and plan a request without invoking any agent.
pub async fn plan_request(
    State(state): State<Arc<AppState>>,
    Json(request): Json<UserRequest>,
) -> Result<Json<PlanResponse>, ErrorResponse> {
    validate(&request)?;

    let (classification, plan) = state.coordinator.plan(&request);
    Ok(Json(PlanResponse {
        request_id: request.id,
        classification,
        plan,
    }))
}

/// Clear the conversation history.
pub async fn clear_history(State(state): State<Arc<AppState>>) -> StatusCode {
    state.coordinator.context().clear();
    info!("Conversation history cleared");
    StatusCode::NO_CONTENT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_response_serialization() {
        let response = HealthResponse {
            status: "healthy",
            version: "0.1.0",
            uptime_seconds: 100,
            agents: 8,
            active_requests: 0,
            history_len: 4,
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"status\":\"healthy\""));
        assert!(json.contains("\"agents\":8"));
    }

    #[test]
    fn test_error_response_hides_status() {
        let error = ErrorResponse::bad_request("content must not be empty");
        let json = serde_json::to_string(&error).unwrap();
        assert!(json.contains("INVALID_REQUEST"));
        assert!(!json.contains("status"));
    }

    #[test]
    fn test_validate_rejects_blank_content() {
        assert!(validate(&UserRequest::new("   ")).is_err());
        assert!(validate(&UserRequest::new("review this")).is_ok());
    }
}
