//! The agent invocation contract.
//!
//! Defined in `concierge-common` so that the coordinator, which consumes the
//! contract, and the agents crate, which implements it, share one definition.

use crate::context::ContextSnapshot;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Capability tags declared by agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Reviews code for defects and quality issues
    Review,
    /// Writes or modifies code
    Generate,
    /// Writes and runs tests
    Test,
    /// Audits for security issues
    Audit,
    /// Profiles and optimizes
    Optimize,
    /// Designs system structure
    Design,
    /// Agent-agnostic general help
    General,
}

impl Capability {
    /// Human-readable domain name used in user-facing notes.
    pub fn domain_label(&self) -> &'static str {
        match self {
            Capability::Review => "code review",
            Capability::Generate => "implementation",
            Capability::Test => "testing",
            Capability::Audit => "security",
            Capability::Optimize => "performance",
            Capability::Design => "architecture",
            Capability::General => "general",
        }
    }
}

/// Why an invocation did not produce content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    Unavailable,
    InvalidResponse,
    Unknown,
    /// The request was aborted while the invocation was running
    Cancelled,
}

/// Failure record of a single invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl InvocationFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for InvocationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// Successful payload of an invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentContent {
    pub text: String,

    /// Structured follow-up actions proposed by the agent
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<String>,
}

impl AgentContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            actions: Vec::new(),
        }
    }

    pub fn with_actions(mut self, actions: Vec<String>) -> Self {
        self.actions = actions;
        self
    }
}

/// Resource budget for one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvocationBudget {
    pub timeout: Duration,
}

impl Default for InvocationBudget {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
        }
    }
}

/// Everything an agent receives for one call.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub agent_name: String,

    /// Task text, including any context carried from upstream phases
    pub task: String,

    pub context: Arc<ContextSnapshot>,

    pub budget: InvocationBudget,

    /// External tools this agent may use
    pub allowed_tools: Vec<String>,

    /// Cooperative cancellation signal for the whole request
    pub cancel: CancellationToken,
}

/// Uniform call contract behind which every specialist lives.
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    async fn invoke(
        &self,
        invocation: &Invocation,
    ) -> std::result::Result<AgentContent, InvocationFailure>;
}

#[async_trait]
impl<T: AgentInvoker + ?Sized> AgentInvoker for Arc<T> {
    async fn invoke(
        &self,
        invocation: &Invocation,
    ) -> std::result::Result<AgentContent, InvocationFailure> {
        (**self).invoke(invocation).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_domain_labels() {
        assert_eq!(Capability::Audit.domain_label(), "security");
        assert_eq!(Capability::Generate.domain_label(), "implementation");
    }

    #[test]
    fn failure_kind_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&FailureKind::InvalidResponse).unwrap(),
            "\"invalid_response\""
        );
    }

    struct Echo;

    #[async_trait]
    impl AgentInvoker for Echo {
        async fn invoke(
            &self,
            invocation: &Invocation,
        ) -> std::result::Result<AgentContent, InvocationFailure> {
            Ok(AgentContent::text(format!("{}: {}", invocation.agent_name, invocation.task)))
        }
    }

    #[tokio::test]
    async fn arc_invoker_delegates() {
        let invoker: Arc<dyn AgentInvoker> = Arc::new(Echo);
        let invocation = Invocation {
            agent_name: "echo".into(),
            task: "ping".into(),
            context: Arc::new(ContextSnapshot::default()),
            budget: InvocationBudget::default(),
            allowed_tools: Vec::new(),
            cancel: CancellationToken::new(),
        };
        let content = invoker.invoke(&invocation).await.unwrap();
        assert_eq!(content.text, "echo: ping");
    }
}
