//! Application state for the API server.

use concierge_coordinator::{Coordinator, CoordinatorConfig};
use std::sync::Arc;

/// Shared application state for the API server.
pub struct AppState {
    /// The coordinator that handles every request
    pub coordinator: Arc<Coordinator>,

    /// Server start time (for health checks)
    pub start_time: std::time::Instant,
}

impl AppState {
    /// Create application state with an LLM-backed coordinator.
    pub fn new(config: CoordinatorConfig) -> concierge_common::Result<Self> {
        Ok(Self::with_coordinator(Arc::new(Coordinator::from_config(
            config,
        )?)))
    }

    /// Wrap an already-built coordinator.
    pub fn with_coordinator(coordinator: Arc<Coordinator>) -> Self {
        Self {
            coordinator,
            start_time: std::time::Instant::now(),
        }
    }

    /// Get the uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
