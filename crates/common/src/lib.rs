//! Common types shared across Concierge crates.
//!
//! This crate provides the data model every component agrees on: conversation
//! turns, the per-request context snapshot, request input, and the agent
//! invocation contract.

pub mod context;
pub mod error;
pub mod message;
pub mod request;
pub mod traits;

pub use context::{ContextSnapshot, ProjectContext, SecurityLevel, UserPreferences};
pub use error::{ConciergeError, CoordinationError, Result};
pub use message::{ConversationTurn, MessageRole};
pub use request::{OperatingMode, UserRequest};
pub use traits::{
    AgentContent, AgentInvoker, Capability, FailureKind, Invocation, InvocationBudget,
    InvocationFailure,
};
