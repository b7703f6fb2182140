//! Request coordination for Concierge.
//!
//! The coordinator turns one free-form development request into one response:
//! 1. Snapshots conversation and project context
//! 2. Classifies intent and complexity, ranking candidate agents
//! 3. Plans a single phase or a dependency graph of phases
//! 4. Executes phases concurrently as their dependencies complete, with
//!    per-phase timeouts, backup agents and generic guidance as fallbacks
//! 5. Aggregates phase outputs into one response with suggested actions
//!
//! # Architecture
//!
//! ```text
//! UserRequest
//!      │
//!      ▼
//! ┌─────────────────┐     ┌────────────────┐
//! │   Coordinator   │ ◄── │ ContextManager │
//! └────────┬────────┘     └────────────────┘
//!          ▼
//!   RequestClassifier ──► WorkflowPlanner ──► WorkflowExecutor ──► ResponseAggregator
//!                                                  │
//!                                        ┌─────────┴─────────┐
//!                                        ▼                   ▼
//!                                  AgentInvoker      FallbackCoordinator
//! ```

pub mod aggregator;
pub mod classifier;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod executor;
pub mod fallback;
pub mod plan;
pub mod planner;

pub use aggregator::{AggregatedResponse, PhaseTrace, ResponseAggregator};
pub use classifier::{Classification, Complexity, Intent, RequestClassifier};
pub use config::CoordinatorConfig;
pub use context::{detect_project, ContextManager};
pub use coordinator::{Coordinator, CoordinatorBuilder};
pub use executor::{ExecutionReport, HandoffRecord, PhaseReport, WorkflowExecutor};
pub use fallback::{FallbackCoordinator, GuidanceProvider, PhaseRun, StaticGuidance};
pub use plan::{
    InvocationResult, Phase, PhaseOutput, PhaseStage, PhaseStatus, PlanError, WorkflowPlan,
};
pub use planner::{render_task, WorkflowPlanner};
