//! Recovery for failed phase invocations.
//!
//! Order of strategies:
//! 1. Invoke the backup agent for the failed agent's capability, once.
//! 2. Substitute generic guidance text; the phase succeeds as degraded.
//! 3. Give up; the phase fails.
//!
//! Cancellation is never recovered from.

use crate::executor::invoke_bounded;
use crate::plan::{InvocationResult, PhaseOutput};
use concierge_agents::{AgentRegistry, ToolGate};
use concierge_common::{
    AgentContent, AgentInvoker, Capability, FailureKind, Invocation, InvocationFailure,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Source of agent-agnostic guidance used when no agent could respond.
pub trait GuidanceProvider: Send + Sync {
    fn guidance(&self, capability: Capability, task: &str) -> Option<String>;
}

/// Built-in guidance text per capability.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticGuidance;

impl GuidanceProvider for StaticGuidance {
    fn guidance(&self, capability: Capability, _task: &str) -> Option<String> {
        let text = match capability {
            Capability::Review => {
                "Read the change top to bottom, check error handling on every fallible call, \
                 look for unhandled edge cases such as empty input and concurrent access, \
                 and make sure names describe what the code does."
            }
            Capability::Generate => {
                "Break the change into small steps, start from the public interface, \
                 validate inputs at the boundary, and keep each function focused on one job. \
                 Commit working increments so each step can be reviewed on its own."
            }
            Capability::Test => {
                "Cover the main success path first, then one test per failure mode. \
                 Include boundary values and keep each test independent of the others."
            }
            Capability::Audit => {
                "Validate and encode all untrusted input, use parameterized queries, \
                 keep secrets out of source control, and check authorization on every \
                 sensitive operation, not only at login."
            }
            Capability::Optimize => {
                "Measure before changing anything. Profile the slow path, fix the largest \
                 cost first, and confirm the gain with a benchmark."
            }
            Capability::Design => {
                "Separate the system into modules with narrow interfaces, keep data \
                 ownership in one place, and prefer simple synchronous flows until \
                 load requires otherwise."
            }
            Capability::General => {
                "I could not put together a full answer right now. Restate the question \
                 with the file or component it concerns and the outcome you expect, \
                 and try again in a moment."
            }
        };
        Some(text.to_string())
    }
}

/// Result of running one phase, including any recovery.
#[derive(Debug, Clone)]
pub struct PhaseRun {
    pub outcome: InvocationResult,

    /// Number of agent invocations made
    pub attempts: u32,

    /// Every failure observed along the way, in order
    pub failures: Vec<InvocationFailure>,
}

impl PhaseRun {
    pub fn success(responder: &str, content: AgentContent) -> Self {
        Self {
            outcome: InvocationResult::Success(PhaseOutput {
                responder: Some(responder.to_string()),
                content,
                degraded: false,
            }),
            attempts: 1,
            failures: Vec::new(),
        }
    }

    pub fn failure(failure: InvocationFailure, attempts: u32) -> Self {
        Self {
            outcome: InvocationResult::Failure(failure.clone()),
            attempts,
            failures: vec![failure],
        }
    }
}

/// Applies the recovery strategies to a failed phase.
pub struct FallbackCoordinator {
    registry: Arc<AgentRegistry>,
    backups: HashMap<String, String>,
    tools: Arc<ToolGate>,
    guidance: Arc<dyn GuidanceProvider>,
}

impl FallbackCoordinator {
    pub fn new(
        registry: Arc<AgentRegistry>,
        backups: HashMap<String, String>,
        tools: Arc<ToolGate>,
    ) -> Self {
        Self {
            registry,
            backups,
            tools,
            guidance: Arc::new(StaticGuidance),
        }
    }

    pub fn with_guidance(mut self, guidance: Arc<dyn GuidanceProvider>) -> Self {
        self.guidance = guidance;
        self
    }

    /// Recover from `failure` of the primary invocation.
    pub async fn recover(
        &self,
        invoker: &dyn AgentInvoker,
        invocation: &Invocation,
        capability: Capability,
        failure: InvocationFailure,
    ) -> PhaseRun {
        let mut failures = vec![failure];
        let mut attempts = 1;

        if let Some(backup) = self.registry.backup_for(&invocation.agent_name, &self.backups) {
            if invocation.cancel.is_cancelled() {
                return cancelled(failures, attempts);
            }

            info!(
                agent = %invocation.agent_name,
                backup = %backup.name,
                "Invoking backup agent"
            );

            let backup_invocation = Invocation {
                agent_name: backup.name.clone(),
                allowed_tools: self.tools.allowed_tools(&backup.name),
                ..invocation.clone()
            };

            attempts += 1;
            match invoke_bounded(invoker, &backup_invocation).await {
                Ok(content) => {
                    return PhaseRun {
                        outcome: InvocationResult::Success(PhaseOutput {
                            responder: Some(backup.name.clone()),
                            content,
                            degraded: false,
                        }),
                        attempts,
                        failures,
                    };
                }
                Err(e) if e.kind == FailureKind::Cancelled => {
                    failures.push(e);
                    return cancelled(failures, attempts);
                }
                Err(e) => {
                    warn!(backup = %backup.name, error = %e, "Backup agent failed");
                    failures.push(e);
                }
            }
        }

        if invocation.cancel.is_cancelled() {
            return cancelled(failures, attempts);
        }

        if let Some(text) = self.guidance.guidance(capability, &invocation.task) {
            warn!(
                agent = %invocation.agent_name,
                capability = ?capability,
                "Substituting generic guidance for failed phase"
            );
            return PhaseRun {
                outcome: InvocationResult::Success(PhaseOutput {
                    responder: None,
                    content: AgentContent::text(text),
                    degraded: true,
                }),
                attempts,
                failures,
            };
        }

        let last = failures
            .last()
            .cloned()
            .unwrap_or_else(|| InvocationFailure::new(FailureKind::Unknown, "no recovery available"));
        warn!(agent = %invocation.agent_name, error = %last, "Phase failed permanently");
        PhaseRun {
            outcome: InvocationResult::Failure(last),
            attempts,
            failures,
        }
    }
}

fn cancelled(mut failures: Vec<InvocationFailure>, attempts: u32) -> PhaseRun {
    let failure = InvocationFailure::new(FailureKind::Cancelled, "request cancelled");
    if failures.last().map(|f| f.kind) != Some(FailureKind::Cancelled) {
        failures.push(failure.clone());
    }
    PhaseRun {
        outcome: InvocationResult::Failure(failure),
        attempts,
        failures,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use concierge_common::{ContextSnapshot, InvocationBudget};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    /// Fails for the listed agents, answers for everyone else.
    struct Scripted {
        failing: Vec<&'static str>,
        calls: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(failing: Vec<&'static str>) -> Self {
            Self {
                failing,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl AgentInvoker for Scripted {
        async fn invoke(&self, invocation: &Invocation) -> Result<AgentContent, InvocationFailure> {
            self.calls.lock().unwrap().push(invocation.agent_name.clone());
            if self.failing.contains(&invocation.agent_name.as_str()) {
                Err(InvocationFailure::new(FailureKind::Unavailable, "down"))
            } else {
                Ok(AgentContent::text(format!("from {}", invocation.agent_name)))
            }
        }
    }

    struct NoGuidance;

    impl GuidanceProvider for NoGuidance {
        fn guidance(&self, _: Capability, _: &str) -> Option<String> {
            None
        }
    }

    fn invocation(agent: &str) -> Invocation {
        Invocation {
            agent_name: agent.to_string(),
            task: "task".to_string(),
            context: Arc::new(ContextSnapshot::default()),
            budget: InvocationBudget {
                timeout: Duration::from_secs(1),
            },
            allowed_tools: Vec::new(),
            cancel: CancellationToken::new(),
        }
    }

    fn fallback() -> FallbackCoordinator {
        let registry = Arc::new(AgentRegistry::with_default_catalog());
        let tools = Arc::new(ToolGate::from_registry(&registry, &HashMap::new()));
        FallbackCoordinator::new(registry, HashMap::new(), tools)
    }

    fn primary_failure() -> InvocationFailure {
        InvocationFailure::new(FailureKind::Timeout, "slow")
    }

    #[tokio::test]
    async fn test_backup_agent_answers() {
        let invoker = Scripted::new(vec!["security-auditor"]);
        let run = fallback()
            .recover(&invoker, &invocation("security-auditor"), Capability::Audit, primary_failure())
            .await;

        let output = run.outcome.output().unwrap();
        assert_eq!(output.responder.as_deref(), Some("code-reviewer"));
        assert!(!output.degraded);
        assert_eq!(run.attempts, 2);
        assert_eq!(run.failures.len(), 1);
        assert_eq!(*invoker.calls.lock().unwrap(), vec!["code-reviewer"]);
    }

    #[tokio::test]
    async fn test_guidance_after_backup_fails() {
        let invoker = Scripted::new(vec!["security-auditor", "code-reviewer"]);
        let run = fallback()
            .recover(&invoker, &invocation("security-auditor"), Capability::Audit, primary_failure())
            .await;

        let output = run.outcome.output().unwrap();
        assert!(output.degraded);
        assert!(output.responder.is_none());
        assert_eq!(run.failures.len(), 2);
    }

    #[tokio::test]
    async fn test_no_backup_goes_straight_to_guidance() {
        let invoker = Scripted::new(vec![]);
        let run = fallback()
            .recover(&invoker, &invocation("software-architect"), Capability::Design, primary_failure())
            .await;

        assert!(run.outcome.output().unwrap().degraded);
        assert!(invoker.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_permanent_failure_without_guidance() {
        let invoker = Scripted::new(vec!["security-auditor", "code-reviewer"]);
        let run = fallback()
            .with_guidance(Arc::new(NoGuidance))
            .recover(&invoker, &invocation("security-auditor"), Capability::Audit, primary_failure())
            .await;

        match run.outcome {
            InvocationResult::Failure(failure) => assert_eq!(failure.kind, FailureKind::Unavailable),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cancelled_request_is_not_recovered() {
        let invoker = Scripted::new(vec![]);
        let invocation = invocation("security-auditor");
        invocation.cancel.cancel();

        let run = fallback()
            .recover(&invoker, &invocation, Capability::Audit, primary_failure())
            .await;

        match run.outcome {
            InvocationResult::Failure(failure) => assert_eq!(failure.kind, FailureKind::Cancelled),
            other => panic!("expected cancellation, got {other:?}"),
        }
        assert!(invoker.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_every_capability_has_guidance() {
        for capability in [
            Capability::Review,
            Capability::Generate,
            Capability::Test,
            Capability::Audit,
            Capability::Optimize,
            Capability::Design,
            Capability::General,
        ] {
            assert!(StaticGuidance.guidance(capability, "x").is_some(), "{capability:?}");
        }
    }

    #[tokio::test]
    async fn test_general_agent_degrades_to_guidance() {
        let invoker = Scripted::new(vec!["general-assistant"]);
        let run = fallback()
            .recover(&invoker, &invocation("general-assistant"), Capability::General, primary_failure())
            .await;

        let output = run.outcome.output().unwrap();
        assert!(output.degraded);
        assert!(output.responder.is_none());
        // the general agent has no backup
        assert!(invoker.calls.lock().unwrap().is_empty());
    }
}
