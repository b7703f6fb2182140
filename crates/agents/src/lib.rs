//! Specialist agents for Concierge.
//!
//! This crate provides:
//!
//! - **Registry**: the read-only catalog of specialists and their matching signals
//! - **Catalog**: the built-in specialists (frontend, backend, security, testing,
//!   review, performance, architecture, general)
//! - **Tool gate**: per-agent allow-lists of external tools
//! - **LLM invoker**: the invocation contract implemented over a language model
//!
//! ```text
//!            Invocation (agent, task, snapshot, budget, tools, cancel)
//!                                  │
//!                                  ▼
//!                        ┌──────────────────┐
//!                        │  LlmAgentInvoker │ ◄── system prompt per agent
//!                        └────────┬─────────┘
//!                                 ▼
//!                          LlmClient (HTTP)
//! ```

pub mod catalog;
pub mod invoker;
pub mod prompts;
pub mod registry;
pub mod signals;
pub mod tools;

pub use catalog::{GENERAL_AGENT, default_catalog};
pub use invoker::LlmAgentInvoker;
pub use registry::{AgentDescriptor, AgentRegistry, CandidateMatch};
pub use tools::ToolGate;
