//! HTTP API for Concierge.
//!
//! # Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /api/v1/agents` - List the agent catalog
//! - `POST /api/v1/requests` - Process a request and return the aggregated response
//! - `POST /api/v1/requests/{id}/cancel` - Cancel an in-flight request
//! - `POST /api/v1/plan` - Classify and plan a request without executing it
//! - `DELETE /api/v1/history` - Clear the conversation history
//!
//! # Architecture
//!
//! ```text
//! Client (editor extension, CLI, ...)
//!    │
//!    ▼
//! ┌─────────────────┐
//! │   API Server    │ ◄── This crate
//! │     (Axum)      │
//! └────────┬────────┘
//!          ▼
//! ┌─────────────────┐
//! │   Coordinator   │
//! └─────────────────┘
//! ```

pub mod routes;
pub mod state;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

pub use state::AppState;

/// Maximum accepted request body size.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Create the API router with all routes configured.
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(routes::health))
        .route("/api/v1/agents", get(routes::list_agents))
        .route("/api/v1/requests", post(routes::submit_request))
        .route("/api/v1/requests/{id}/cancel", post(routes::cancel_request))
        .route("/api/v1/plan", post(routes::plan_request))
        .route("/api/v1/history", delete(routes::clear_history))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the API server on the given address and run until ctrl-c.
pub async fn serve(state: Arc<AppState>, addr: SocketAddr) -> anyhow::Result<()> {
    let router = create_router(state);

    info!(%addr, "Starting Concierge API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Concierge API server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
