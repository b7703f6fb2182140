//! Workflow planning.
//!
//! A single-agent request becomes a one-phase plan. A multi-agent request is
//! expanded from a declarative template chosen by intent: each template step
//! names a capability, and expands into one phase per candidate agent with
//! that primary capability (or the registry default, for required steps).
//! When a step produces no phase, steps that depended on it inherit its own
//! dependencies.

use crate::classifier::{Classification, Intent};
use crate::plan::{Phase, PhaseStage, WorkflowPlan};
use concierge_agents::AgentRegistry;
use concierge_common::{Capability, CoordinationError, UserRequest};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// One step of a workflow template.
#[derive(Debug, Clone, Copy)]
pub struct StepTemplate {
    pub key: &'static str,
    pub capability: Capability,
    pub stage: PhaseStage,
    pub sub_goal: &'static str,
    pub depends_on: &'static [&'static str],
    /// Required steps fall back to the registry default when no candidate covers them
    pub required: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct WorkflowTemplate {
    pub name: &'static str,
    pub steps: &'static [StepTemplate],
}

const fn step(
    key: &'static str,
    capability: Capability,
    stage: PhaseStage,
    sub_goal: &'static str,
    depends_on: &'static [&'static str],
    required: bool,
) -> StepTemplate {
    StepTemplate {
        key,
        capability,
        stage,
        sub_goal,
        depends_on,
        required,
    }
}

pub const SECURE_FEATURE: WorkflowTemplate = WorkflowTemplate {
    name: "secure-feature",
    steps: &[
        step(
            "architecture",
            Capability::Design,
            PhaseStage::Analysis,
            "Outline the components, interfaces and data flow this feature needs.",
            &[],
            false,
        ),
        step(
            "security-analysis",
            Capability::Audit,
            PhaseStage::Analysis,
            "Identify the threats and security requirements the implementation must satisfy.",
            &[],
            true,
        ),
        step(
            "implementation",
            Capability::Generate,
            PhaseStage::Implementation,
            "Implement the feature, applying the analysis provided below.",
            &["architecture", "security-analysis"],
            true,
        ),
        step(
            "testing",
            Capability::Test,
            PhaseStage::Verification,
            "Write tests for the implementation below, including security edge cases.",
            &["implementation"],
            true,
        ),
    ],
};

pub const FEATURE: WorkflowTemplate = WorkflowTemplate {
    name: "feature",
    steps: &[
        step(
            "architecture",
            Capability::Design,
            PhaseStage::Analysis,
            "Outline the components, interfaces and data flow this feature needs.",
            &[],
            false,
        ),
        step(
            "implementation",
            Capability::Generate,
            PhaseStage::Implementation,
            "Implement the requested functionality.",
            &["architecture"],
            true,
        ),
        step(
            "testing",
            Capability::Test,
            PhaseStage::Verification,
            "Write tests that verify the implementation below.",
            &["implementation"],
            true,
        ),
        step(
            "performance-review",
            Capability::Optimize,
            PhaseStage::Review,
            "Review the implementation below for performance problems.",
            &["implementation"],
            false,
        ),
    ],
};

pub const SECURITY_AUDIT: WorkflowTemplate = WorkflowTemplate {
    name: "security-audit",
    steps: &[
        step(
            "security-audit",
            Capability::Audit,
            PhaseStage::Analysis,
            "Audit the code or design for vulnerabilities and unsafe practices.",
            &[],
            true,
        ),
        step(
            "code-review",
            Capability::Review,
            PhaseStage::Review,
            "Review the code for defects that could weaken security.",
            &[],
            false,
        ),
        step(
            "remediation",
            Capability::Generate,
            PhaseStage::Implementation,
            "Fix the issues identified below.",
            &["security-audit", "code-review"],
            false,
        ),
        step(
            "verification",
            Capability::Test,
            PhaseStage::Verification,
            "Write tests proving the fixes below close the reported issues.",
            &["remediation"],
            false,
        ),
    ],
};

pub const REVIEW: WorkflowTemplate = WorkflowTemplate {
    name: "review",
    steps: &[
        step(
            "code-review",
            Capability::Review,
            PhaseStage::Review,
            "Review the code for bugs, readability and maintainability.",
            &[],
            true,
        ),
        step(
            "security-review",
            Capability::Audit,
            PhaseStage::Review,
            "Review the code for security issues.",
            &[],
            false,
        ),
        step(
            "performance-review",
            Capability::Optimize,
            PhaseStage::Review,
            "Review the code for performance problems.",
            &[],
            false,
        ),
        step(
            "architecture-review",
            Capability::Design,
            PhaseStage::Review,
            "Review the structure and module boundaries of the code.",
            &[],
            false,
        ),
    ],
};

pub const OPTIMIZATION: WorkflowTemplate = WorkflowTemplate {
    name: "optimization",
    steps: &[
        step(
            "profiling",
            Capability::Optimize,
            PhaseStage::Analysis,
            "Find the bottlenecks and propose concrete optimizations.",
            &[],
            true,
        ),
        step(
            "optimization",
            Capability::Generate,
            PhaseStage::Implementation,
            "Apply the optimizations proposed below.",
            &["profiling"],
            false,
        ),
        step(
            "benchmark",
            Capability::Test,
            PhaseStage::Verification,
            "Write tests or benchmarks that confirm the optimized behavior.",
            &["optimization"],
            false,
        ),
    ],
};

pub const TEST_SUITE: WorkflowTemplate = WorkflowTemplate {
    name: "test-suite",
    steps: &[
        step(
            "test-analysis",
            Capability::Review,
            PhaseStage::Analysis,
            "Identify untested paths and risky behavior in the code.",
            &[],
            false,
        ),
        step(
            "test-authoring",
            Capability::Test,
            PhaseStage::Implementation,
            "Write the tests, covering the gaps identified below.",
            &["test-analysis"],
            true,
        ),
    ],
};

pub const ARCHITECTURE: WorkflowTemplate = WorkflowTemplate {
    name: "architecture",
    steps: &[
        step(
            "design",
            Capability::Design,
            PhaseStage::Analysis,
            "Propose the system structure, module boundaries and data flow.",
            &[],
            true,
        ),
        step(
            "security-review",
            Capability::Audit,
            PhaseStage::Review,
            "Review the design below for security weaknesses.",
            &["design"],
            false,
        ),
        step(
            "performance-review",
            Capability::Optimize,
            PhaseStage::Review,
            "Review the design below for scalability and performance risks.",
            &["design"],
            false,
        ),
    ],
};

/// Template used for a multi-agent request with the given intent and candidate domains.
///
/// `None` means every candidate is consulted independently.
pub fn select_template(
    intent: Intent,
    capabilities: &BTreeSet<Capability>,
) -> Option<&'static WorkflowTemplate> {
    match intent {
        Intent::Implement if capabilities.contains(&Capability::Audit) => Some(&SECURE_FEATURE),
        Intent::Implement => Some(&FEATURE),
        Intent::Security => Some(&SECURITY_AUDIT),
        Intent::Review => Some(&REVIEW),
        Intent::Optimize => Some(&OPTIMIZATION),
        Intent::Test => Some(&TEST_SUITE),
        Intent::Architecture => Some(&ARCHITECTURE),
        Intent::Unclassified => None,
    }
}

fn phase_id(step: &str, agent: &str) -> String {
    format!("{step}:{agent}")
}

/// Task text handed to one phase. Pure in its inputs.
pub fn render_task(request: &str, sub_goal: &str) -> String {
    format!("{}\n\nUser request:\n{}", sub_goal.trim(), request.trim())
}

const DIRECT_SUB_GOAL: &str = "Respond to the user request below.";
const CONSULT_SUB_GOAL: &str = "Address the parts of the user request below that fall in your domain.";

/// Builds workflow plans from classifications.
pub struct WorkflowPlanner {
    registry: Arc<AgentRegistry>,
}

impl WorkflowPlanner {
    pub fn new(registry: Arc<AgentRegistry>) -> Self {
        Self { registry }
    }

    /// Plan a request. Always returns a valid plan.
    pub fn plan(&self, request: &UserRequest, classification: &Classification) -> WorkflowPlan {
        if !classification.is_multi_agent() {
            return self.single_agent(request, &classification.selected_agent);
        }

        match select_template(classification.intent, &classification.capabilities()) {
            Some(template) => self.plan_from_template(request, classification, template),
            None => self.fan_out(request, classification),
        }
    }

    /// Expand a template for this request.
    ///
    /// A template that would yield an invalid graph is rejected and the request
    /// falls back to a single-agent plan carrying a `PlanCycleDetected` anomaly.
    pub fn plan_from_template(
        &self,
        request: &UserRequest,
        classification: &Classification,
        template: &WorkflowTemplate,
    ) -> WorkflowPlan {
        // Optional steps are included for every domain when the user asked for full coverage.
        let include_optional = classification.indicator_phrase.is_some();

        let assignments: Vec<(&StepTemplate, Vec<String>)> = template
            .steps
            .iter()
            .map(|step| (step, self.agents_for_step(step, classification, include_optional)))
            .collect();

        let step_phases: HashMap<&str, Vec<String>> = assignments
            .iter()
            .map(|(step, agents)| {
                let ids = agents.iter().map(|agent| phase_id(step.key, agent)).collect();
                (step.key, ids)
            })
            .collect();

        let mut phases = Vec::new();
        for (step, agents) in assignments {
            if agents.is_empty() {
                debug!(step = step.key, "No agent for template step, omitting");
                continue;
            }

            let depends_on = resolve_dependencies(template, step, &step_phases);
            for agent in agents {
                phases.push(
                    Phase::new(
                        phase_id(step.key, &agent),
                        agent,
                        step.capability,
                        step.stage,
                        render_task(&request.content, step.sub_goal),
                    )
                    .depends_on(depends_on.iter().cloned()),
                );
            }
        }

        if phases.len() <= 1 {
            debug!(template = template.name, "Template expanded to a single phase");
            return self.single_agent(request, &classification.selected_agent);
        }

        match WorkflowPlan::new(template.name, phases) {
            Ok(plan) => {
                debug!(
                    template = template.name,
                    phases = plan.len(),
                    "Built multi-agent plan"
                );
                plan
            }
            Err(e) => {
                warn!(
                    request_id = %request.id,
                    template = template.name,
                    error = %e,
                    "Rejected workflow plan, falling back to single agent"
                );
                self.single_agent(request, &classification.selected_agent)
                    .with_anomaly(CoordinationError::PlanCycleDetected {
                        reason: e.to_string(),
                    })
            }
        }
    }

    fn single_agent(&self, request: &UserRequest, agent: &str) -> WorkflowPlan {
        let capability = self
            .registry
            .lookup(agent)
            .map(|descriptor| descriptor.primary_capability())
            .unwrap_or(Capability::General);

        WorkflowPlan::single(Phase::new(
            format!("respond:{agent}"),
            agent,
            capability,
            PhaseStage::Direct,
            render_task(&request.content, DIRECT_SUB_GOAL),
        ))
    }

    /// One independent phase per candidate.
    fn fan_out(&self, request: &UserRequest, classification: &Classification) -> WorkflowPlan {
        if classification.candidates.len() < 2 {
            return self.single_agent(request, &classification.selected_agent);
        }

        let phases = classification
            .candidates
            .iter()
            .map(|candidate| {
                Phase::new(
                    format!("consult:{}", candidate.name),
                    candidate.name.clone(),
                    candidate.primary_capability,
                    PhaseStage::Analysis,
                    render_task(&request.content, CONSULT_SUB_GOAL),
                )
            })
            .collect();

        match WorkflowPlan::new("consult", phases) {
            Ok(plan) => plan,
            Err(e) => self
                .single_agent(request, &classification.selected_agent)
                .with_anomaly(CoordinationError::PlanCycleDetected {
                    reason: e.to_string(),
                }),
        }
    }

    fn agents_for_step(
        &self,
        step: &StepTemplate,
        classification: &Classification,
        include_optional: bool,
    ) -> Vec<String> {
        let matched: Vec<String> = classification
            .candidates
            .iter()
            .filter(|candidate| candidate.primary_capability == step.capability)
            .map(|candidate| candidate.name.clone())
            .collect();

        if !matched.is_empty() {
            return matched;
        }

        if step.required || include_optional {
            return self
                .registry
                .default_for(step.capability)
                .map(|descriptor| vec![descriptor.name.clone()])
                .unwrap_or_default();
        }

        Vec::new()
    }
}

/// Phase ids a step depends on, looking through omitted steps.
fn resolve_dependencies(
    template: &WorkflowTemplate,
    step: &StepTemplate,
    step_phases: &HashMap<&str, Vec<String>>,
) -> BTreeSet<String> {
    let mut resolved = BTreeSet::new();
    let mut visited = HashSet::new();
    let mut stack: Vec<&str> = step.depends_on.to_vec();

    while let Some(key) = stack.pop() {
        if !visited.insert(key) {
            continue;
        }
        match step_phases.get(key) {
            Some(ids) if !ids.is_empty() => resolved.extend(ids.iter().cloned()),
            _ => {
                if let Some(omitted) = template.steps.iter().find(|s| s.key == key) {
                    stack.extend(omitted.depends_on.iter().copied());
                }
            }
        }
    }

    resolved
}
