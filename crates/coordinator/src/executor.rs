//! Workflow execution.
//!
//! Phases run as independent tasks. A phase starts once every dependency has
//! succeeded; all phases that become ready together run concurrently. A failed
//! or skipped dependency skips the phase, transitively. Each invocation is
//! bounded by the phase timeout and races the request's cancellation token.

use crate::fallback::{FallbackCoordinator, PhaseRun};
use crate::plan::{InvocationResult, Phase, PhaseStage, PhaseStatus, WorkflowPlan};
use concierge_agents::ToolGate;
use concierge_common::{
    AgentContent, AgentInvoker, Capability, ContextSnapshot, FailureKind, Invocation,
    InvocationBudget, InvocationFailure,
};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Output of an upstream phase carried into a dependent phase's task.
#[derive(Debug, Clone)]
pub struct HandoffRecord {
    pub from_phase: String,
    pub from_agent: String,
    pub to_phase: String,
    pub carried: String,
}

/// Final state of one phase.
#[derive(Debug, Clone, Serialize)]
pub struct PhaseReport {
    pub id: String,
    pub agent_name: String,
    pub capability: Capability,
    pub stage: PhaseStage,
    pub status: PhaseStatus,
    pub result: Option<InvocationResult>,
    pub failures: Vec<InvocationFailure>,
    pub attempts: u32,
    pub duration_ms: u64,
}

impl PhaseReport {
    fn pending(phase: &Phase) -> Self {
        Self {
            id: phase.id.clone(),
            agent_name: phase.agent_name.clone(),
            capability: phase.capability,
            stage: phase.stage,
            status: phase.status,
            result: None,
            failures: Vec::new(),
            attempts: 0,
            duration_ms: 0,
        }
    }

    /// Text produced by the phase, if it succeeded.
    pub fn content(&self) -> Option<&AgentContent> {
        self.result
            .as_ref()
            .and_then(|result| result.output())
            .map(|output| &output.content)
    }

    /// Agent that actually produced the content.
    pub fn responder(&self) -> Option<&str> {
        self.result
            .as_ref()
            .and_then(|result| result.output())
            .and_then(|output| output.responder.as_deref())
    }
}

/// Phase reports in declaration order.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    pub workflow: String,
    pub phases: Vec<PhaseReport>,
    pub cancelled: bool,
}

impl ExecutionReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &PhaseReport> {
        self.phases.iter().filter(|phase| phase.status.is_success())
    }
}

/// Invoke once, bounded by the budget and the cancellation token.
///
/// Empty content counts as an invalid response.
pub async fn invoke_bounded(
    invoker: &dyn AgentInvoker,
    invocation: &Invocation,
) -> Result<AgentContent, InvocationFailure> {
    let budget = invocation.budget.timeout;
    tokio::select! {
        biased;
        _ = invocation.cancel.cancelled() => {
            Err(InvocationFailure::new(FailureKind::Cancelled, "request cancelled"))
        }
        result = tokio::time::timeout(budget, invoker.invoke(invocation)) => match result {
            Ok(Ok(content)) if content.text.trim().is_empty() => Err(InvocationFailure::new(
                FailureKind::InvalidResponse,
                "agent returned empty content",
            )),
            Ok(result) => result,
            Err(_) => Err(InvocationFailure::new(
                FailureKind::Timeout,
                format!("no response within {}ms", budget.as_millis()),
            )),
        },
    }
}

/// Runs workflow plans.
pub struct WorkflowExecutor {
    invoker: Arc<dyn AgentInvoker>,
    fallback: Arc<FallbackCoordinator>,
    tools: Arc<ToolGate>,
    phase_timeout: Duration,
}

impl WorkflowExecutor {
    pub fn new(
        invoker: Arc<dyn AgentInvoker>,
        fallback: Arc<FallbackCoordinator>,
        tools: Arc<ToolGate>,
        phase_timeout: Duration,
    ) -> Self {
        Self {
            invoker,
            fallback,
            tools,
            phase_timeout,
        }
    }

    /// Execute every phase of `plan` to a terminal state.
    pub async fn execute(
        &self,
        plan: WorkflowPlan,
        snapshot: Arc<ContextSnapshot>,
        cancel: CancellationToken,
    ) -> ExecutionReport {
        let workflow = plan.name.clone();
        let (mut phases, order) = plan.into_parts();
        let mut reports: Vec<PhaseReport> = phases.iter().map(PhaseReport::pending).collect();
        let mut started_at: Vec<Option<Instant>> = vec![None; phases.len()];

        let mut running = FuturesUnordered::new();
        let mut cancelled = cancel.is_cancelled();

        info!(workflow = %workflow, phases = phases.len(), "Executing workflow");

        loop {
            if cancelled {
                for (phase, report) in phases.iter_mut().zip(reports.iter_mut()) {
                    if phase.status == PhaseStatus::Pending {
                        phase.status = PhaseStatus::Skipped;
                        report.status = PhaseStatus::Skipped;
                    }
                }
            } else {
                for &i in &order {
                    if phases[i].status != PhaseStatus::Pending {
                        continue;
                    }

                    let blocked = phases[i].depends_on.iter().any(|dep| {
                        phases
                            .iter()
                            .find(|p| &p.id == dep)
                            .is_some_and(|p| matches!(p.status, PhaseStatus::Failed | PhaseStatus::Skipped))
                    });
                    if blocked {
                        info!(phase = %phases[i].id, "Skipping phase, a dependency did not succeed");
                        phases[i].status = PhaseStatus::Skipped;
                        reports[i].status = PhaseStatus::Skipped;
                        continue;
                    }

                    let ready = phases[i].depends_on.iter().all(|dep| {
                        phases
                            .iter()
                            .find(|p| &p.id == dep)
                            .is_some_and(|p| p.status.is_success())
                    });
                    if !ready {
                        continue;
                    }

                    let handoffs = collect_handoffs(&phases, &reports, i);
                    let invocation = Invocation {
                        agent_name: phases[i].agent_name.clone(),
                        task: compose_task(&phases[i].task, &handoffs),
                        context: Arc::clone(&snapshot),
                        budget: InvocationBudget {
                            timeout: self.phase_timeout,
                        },
                        allowed_tools: self.tools.allowed_tools(&phases[i].agent_name),
                        cancel: cancel.clone(),
                    };

                    debug!(
                        phase = %phases[i].id,
                        agent = %phases[i].agent_name,
                        handoffs = handoffs.len(),
                        "Starting phase"
                    );
                    phases[i].status = PhaseStatus::Running;
                    reports[i].status = PhaseStatus::Running;
                    started_at[i] = Some(Instant::now());

                    let handle = tokio::spawn(run_phase(
                        Arc::clone(&self.invoker),
                        Arc::clone(&self.fallback),
                        invocation,
                        phases[i].capability,
                    ));
                    running.push(watch(i, handle));
                }
            }

            if running.is_empty() {
                break;
            }

            tokio::select! {
                Some((i, joined)) = running.next() => {
                    let run = joined.unwrap_or_else(|e| {
                        error!(phase = %phases[i].id, error = %e, "Phase task panicked");
                        PhaseRun::failure(
                            InvocationFailure::new(FailureKind::Unknown, format!("phase task failed: {e}")),
                            1,
                        )
                    });

                    let status = match &run.outcome {
                        InvocationResult::Success(output) => PhaseStatus::Succeeded {
                            degraded: output.degraded,
                        },
                        InvocationResult::Failure(_) => PhaseStatus::Failed,
                    };
                    let duration_ms = started_at[i]
                        .map(|started| started.elapsed().as_millis() as u64)
                        .unwrap_or(0);

                    match status {
                        PhaseStatus::Failed => warn!(
                            phase = %phases[i].id,
                            attempts = run.attempts,
                            duration_ms,
                            "Phase failed"
                        ),
                        _ => info!(
                            phase = %phases[i].id,
                            status = ?status,
                            attempts = run.attempts,
                            duration_ms,
                            "Phase completed"
                        ),
                    }

                    phases[i].status = status;
                    let report = &mut reports[i];
                    report.status = status;
                    report.attempts = run.attempts;
                    report.failures = run.failures;
                    report.result = Some(run.outcome);
                    report.duration_ms = duration_ms;
                }
                _ = cancel.cancelled(), if !cancelled => {
                    info!(workflow = %workflow, "Workflow cancelled");
                    cancelled = true;
                }
            }
        }

        ExecutionReport {
            workflow,
            phases: reports,
            cancelled,
        }
    }
}

fn watch(
    index: usize,
    handle: JoinHandle<PhaseRun>,
) -> impl std::future::Future<Output = (usize, Result<PhaseRun, tokio::task::JoinError>)> {
    async move { (index, handle.await) }
}

async fn run_phase(
    invoker: Arc<dyn AgentInvoker>,
    fallback: Arc<FallbackCoordinator>,
    invocation: Invocation,
    capability: Capability,
) -> PhaseRun {
    match invoke_bounded(invoker.as_ref(), &invocation).await {
        Ok(content) => PhaseRun::success(&invocation.agent_name, content),
        Err(failure) if failure.kind == FailureKind::Cancelled => PhaseRun::failure(failure, 1),
        Err(failure) => {
            warn!(
                agent = %invocation.agent_name,
                error = %failure,
                "Agent invocation failed, trying fallback"
            );
            fallback
                .recover(invoker.as_ref(), &invocation, capability, failure)
                .await
        }
    }
}

/// Outputs of `phases[index]`'s dependencies, in declaration order.
fn collect_handoffs(phases: &[Phase], reports: &[PhaseReport], index: usize) -> Vec<HandoffRecord> {
    let target = &phases[index];
    phases
        .iter()
        .zip(reports)
        .filter(|(phase, _)| target.depends_on.contains(&phase.id))
        .filter_map(|(phase, report)| {
            let content = report.content()?;
            let record = HandoffRecord {
                from_phase: phase.id.clone(),
                from_agent: report.responder().unwrap_or("general guidance").to_string(),
                to_phase: target.id.clone(),
                carried: content.text.clone(),
            };
            debug!(
                from = %record.from_phase,
                to = %record.to_phase,
                bytes = record.carried.len(),
                "Handing off phase output"
            );
            Some(record)
        })
        .collect()
}

fn compose_task(task: &str, handoffs: &[HandoffRecord]) -> String {
    let mut composed = task.to_string();
    for handoff in handoffs {
        composed.push_str(&format!(
            "\n\n--- Output from {} ({}) ---\n{}",
            handoff.from_agent, handoff.from_phase, handoff.carried
        ));
    }
    composed
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use concierge_agents::AgentRegistry;
    use proptest::prelude::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    /// Replies after a per-agent delay; agents in `failing` return an error.
    struct Delayed {
        delays: HashMap<&'static str, u64>,
        failing: Vec<&'static str>,
        tasks: Mutex<Vec<(String, String)>>,
    }

    impl Delayed {
        fn new(delays: &[(&'static str, u64)]) -> Self {
            Self {
                delays: delays.iter().copied().collect(),
                failing: Vec::new(),
                tasks: Mutex::new(Vec::new()),
            }
        }

        fn failing(mut self, agents: &[&'static str]) -> Self {
            self.failing = agents.to_vec();
            self
        }

        fn task_for(&self, agent: &str) -> Option<String> {
            self.tasks
                .lock()
                .unwrap()
                .iter()
                .find(|(name, _)| name == agent)
                .map(|(_, task)| task.clone())
        }
    }

    #[async_trait]
    impl AgentInvoker for Delayed {
        async fn invoke(&self, invocation: &Invocation) -> Result<AgentContent, InvocationFailure> {
            self.tasks
                .lock()
                .unwrap()
                .push((invocation.agent_name.clone(), invocation.task.clone()));
            let delay = self.delays.get(invocation.agent_name.as_str()).copied().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            if self.failing.contains(&invocation.agent_name.as_str()) {
                return Err(InvocationFailure::new(FailureKind::Unavailable, "down"));
            }
            Ok(AgentContent::text(format!("{} output", invocation.agent_name)))
        }
    }

    struct NoGuidance;

    impl crate::fallback::GuidanceProvider for NoGuidance {
        fn guidance(&self, _: Capability, _: &str) -> Option<String> {
            None
        }
    }

    fn executor(invoker: Arc<dyn AgentInvoker>, timeout_ms: u64, guidance: bool) -> WorkflowExecutor {
        let registry = Arc::new(AgentRegistry::with_default_catalog());
        let tools = Arc::new(ToolGate::from_registry(&registry, &HashMap::new()));
        let mut fallback = FallbackCoordinator::new(Arc::clone(&registry), HashMap::new(), Arc::clone(&tools));
        if !guidance {
            fallback = fallback.with_guidance(Arc::new(NoGuidance));
        }
        WorkflowExecutor::new(invoker, Arc::new(fallback), tools, Duration::from_millis(timeout_ms))
    }

    fn phase(id: &str, agent: &str, capability: Capability, deps: &[&str]) -> Phase {
        Phase::new(id, agent, capability, PhaseStage::Analysis, format!("task {id}"))
            .depends_on(deps.iter().copied())
    }

    fn diamond() -> WorkflowPlan {
        WorkflowPlan::new(
            "diamond",
            vec![
                phase("design", "software-architect", Capability::Design, &[]),
                phase("threats", "security-auditor", Capability::Audit, &[]),
                phase("build", "backend-developer", Capability::Generate, &["design", "threats"]),
                phase("tests", "test-engineer", Capability::Test, &["build"]),
            ],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_dependencies_complete_before_dependents_start() {
        let invoker = Arc::new(Delayed::new(&[("software-architect", 30), ("security-auditor", 5)]));
        let report = executor(invoker.clone(), 1_000, true)
            .execute(diamond(), Arc::new(ContextSnapshot::default()), CancellationToken::new())
            .await;

        assert!(report.phases.iter().all(|p| p.status == PhaseStatus::Succeeded { degraded: false }));
        let ids: Vec<&str> = report.phases.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["design", "threats", "build", "tests"]);

        let build_task = invoker.task_for("backend-developer").unwrap();
        let design_at = build_task.find("software-architect output").unwrap();
        let threats_at = build_task.find("security-auditor output").unwrap();
        assert!(design_at < threats_at);
        assert!(build_task.starts_with("task build"));

        let test_task = invoker.task_for("test-engineer").unwrap();
        assert!(test_task.contains("backend-developer output"));
        assert!(!test_task.contains("software-architect output"));
    }

    #[tokio::test]
    async fn test_failed_dependency_skips_transitively() {
        // no backup exists for the architect and guidance is disabled
        let invoker = Arc::new(Delayed::new(&[]).failing(&["software-architect"]));
        let report = executor(invoker.clone(), 1_000, false)
            .execute(diamond(), Arc::new(ContextSnapshot::default()), CancellationToken::new())
            .await;

        let status: Vec<PhaseStatus> = report.phases.iter().map(|p| p.status).collect();
        assert_eq!(
            status,
            vec![
                PhaseStatus::Failed,
                PhaseStatus::Succeeded { degraded: false },
                PhaseStatus::Skipped,
                PhaseStatus::Skipped,
            ]
        );
        assert!(invoker.task_for("backend-developer").is_none());
    }

    #[tokio::test]
    async fn test_timeout_recovers_through_backup() {
        let invoker = Arc::new(Delayed::new(&[("security-auditor", 500)]));
        let report = executor(invoker.clone(), 50, true)
            .execute(diamond(), Arc::new(ContextSnapshot::default()), CancellationToken::new())
            .await;

        let threats = &report.phases[1];
        assert_eq!(threats.status, PhaseStatus::Succeeded { degraded: false });
        assert_eq!(threats.responder(), Some("code-reviewer"));
        assert_eq!(threats.failures[0].kind, FailureKind::Timeout);
        assert_eq!(report.phases[3].status, PhaseStatus::Succeeded { degraded: false });
    }

    #[tokio::test]
    async fn test_empty_content_is_invalid() {
        struct Empty;

        #[async_trait]
        impl AgentInvoker for Empty {
            async fn invoke(&self, _: &Invocation) -> Result<AgentContent, InvocationFailure> {
                Ok(AgentContent::text("   "))
            }
        }

        let invocation = Invocation {
            agent_name: "code-reviewer".into(),
            task: "t".into(),
            context: Arc::new(ContextSnapshot::default()),
            budget: InvocationBudget::default(),
            allowed_tools: vec![],
            cancel: CancellationToken::new(),
        };
        let err = invoke_bounded(&Empty, &invocation).await.unwrap_err();
        assert_eq!(err.kind, FailureKind::InvalidResponse);
    }

    #[tokio::test]
    async fn test_cancellation_stops_workflow() {
        let invoker = Arc::new(Delayed::new(&[("software-architect", 5_000), ("security-auditor", 5_000)]));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let report = executor(invoker.clone(), 10_000, true)
            .execute(diamond(), Arc::new(ContextSnapshot::default()), cancel)
            .await;

        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(report.cancelled);
        let status: Vec<PhaseStatus> = report.phases.iter().map(|p| p.status).collect();
        assert_eq!(
            status,
            vec![
                PhaseStatus::Failed,
                PhaseStatus::Failed,
                PhaseStatus::Skipped,
                PhaseStatus::Skipped,
            ]
        );
        assert_eq!(report.phases[0].failures[0].kind, FailureKind::Cancelled);
        // no backup was tried after cancellation
        assert_eq!(invoker.tasks.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_compose_task_appends_in_order() {
        let handoffs = vec![
            HandoffRecord {
                from_phase: "a".into(),
                from_agent: "x".into(),
                to_phase: "c".into(),
                carried: "first".into(),
            },
            HandoffRecord {
                from_phase: "b".into(),
                from_agent: "y".into(),
                to_phase: "c".into(),
                carried: "second".into(),
            },
        ];
        let task = compose_task("base", &handoffs);
        assert_eq!(
            task,
            "base\n\n--- Output from x (a) ---\nfirst\n\n--- Output from y (b) ---\nsecond"
        );
    }

    /// Fails the named agents after a short per-agent delay and records every call.
    struct ByName {
        failing: HashSet<String>,
        delays: HashMap<String, u64>,
        invoked: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl AgentInvoker for ByName {
        async fn invoke(&self, invocation: &Invocation) -> Result<AgentContent, InvocationFailure> {
            self.invoked.lock().unwrap().push(invocation.agent_name.clone());
            let delay = self.delays.get(&invocation.agent_name).copied().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            if self.failing.contains(&invocation.agent_name) {
                return Err(InvocationFailure::new(FailureKind::Unavailable, "down"));
            }
            Ok(AgentContent::text(format!("{} output", invocation.agent_name)))
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        #[test]
        fn failed_phase_skips_everything_downstream(
            edges in crate::plan::tests::dag_strategy(),
            failing in proptest::collection::vec(any::<bool>(), 12),
            delays in proptest::collection::vec(0u64..4, 12),
        ) {
            // agents outside the registry have no backup; guidance is disabled
            let phases: Vec<Phase> = edges
                .iter()
                .enumerate()
                .map(|(i, deps)| {
                    Phase::new(
                        format!("p{i}"),
                        format!("agent-{i}"),
                        Capability::Review,
                        PhaseStage::Analysis,
                        format!("task p{i}"),
                    )
                    .depends_on(deps.iter().filter(|&&d| d < i).map(|d| format!("p{d}")))
                })
                .collect();

            // dependencies are always declared earlier, so one forward pass settles every status
            let mut expected: Vec<PhaseStatus> = Vec::with_capacity(phases.len());
            for (i, phase) in phases.iter().enumerate() {
                let upstream_ok = phase.depends_on.iter().all(|dep| {
                    let d: usize = dep[1..].parse().unwrap();
                    expected[d].is_success()
                });
                expected.push(if !upstream_ok {
                    PhaseStatus::Skipped
                } else if failing[i] {
                    PhaseStatus::Failed
                } else {
                    PhaseStatus::Succeeded { degraded: false }
                });
            }

            let invoker = Arc::new(ByName {
                failing: (0..phases.len()).filter(|&i| failing[i]).map(|i| format!("agent-{i}")).collect(),
                delays: (0..phases.len()).map(|i| (format!("agent-{i}"), delays[i])).collect(),
                invoked: Mutex::new(Vec::new()),
            });
            let plan = WorkflowPlan::new("random", phases).unwrap();

            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let report = runtime.block_on(
                executor(invoker.clone(), 1_000, false)
                    .execute(plan, Arc::new(ContextSnapshot::default()), CancellationToken::new()),
            );

            let actual: Vec<PhaseStatus> = report.phases.iter().map(|p| p.status).collect();
            prop_assert_eq!(&actual, &expected);

            let invoked = invoker.invoked.lock().unwrap().clone();
            for (i, status) in expected.iter().enumerate() {
                let called = invoked.contains(&format!("agent-{i}"));
                prop_assert_eq!(called, *status != PhaseStatus::Skipped, "phase p{}", i);
            }
        }
    }
}
