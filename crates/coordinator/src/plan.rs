//! Workflow plan: phases, dependency edges and their validation.

use concierge_common::{AgentContent, Capability, CoordinationError, InvocationFailure};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, VecDeque};
use thiserror::Error;

/// Where a phase sits in the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStage {
    Analysis,
    Implementation,
    Verification,
    Review,
    /// Sole phase of a single-agent plan
    Direct,
}

impl PhaseStage {
    pub fn label(&self) -> &'static str {
        match self {
            PhaseStage::Analysis => "analysis",
            PhaseStage::Implementation => "implementation",
            PhaseStage::Verification => "verification",
            PhaseStage::Review => "review",
            PhaseStage::Direct => "response",
        }
    }
}

/// Lifecycle of a phase. Only the executor moves a phase between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PhaseStatus {
    Pending,
    Running,
    Succeeded {
        /// Content came from generic guidance rather than an agent
        degraded: bool,
    },
    Failed,
    Skipped,
}

impl PhaseStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, PhaseStatus::Succeeded { .. })
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, PhaseStatus::Succeeded { degraded: true })
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PhaseStatus::Pending | PhaseStatus::Running)
    }
}

/// Content produced for one phase.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseOutput {
    /// Agent that produced the content; `None` for generic guidance
    pub responder: Option<String>,
    pub content: AgentContent,
    pub degraded: bool,
}

/// Outcome of one phase after any fallback.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum InvocationResult {
    Success(PhaseOutput),
    Failure(InvocationFailure),
}

impl InvocationResult {
    pub fn output(&self) -> Option<&PhaseOutput> {
        match self {
            InvocationResult::Success(output) => Some(output),
            InvocationResult::Failure(_) => None,
        }
    }
}

/// A unit of work assigned to one agent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Phase {
    pub id: String,
    pub agent_name: String,
    pub capability: Capability,
    pub stage: PhaseStage,
    pub task: String,
    pub depends_on: BTreeSet<String>,
    pub status: PhaseStatus,
}

impl Phase {
    pub fn new(
        id: impl Into<String>,
        agent_name: impl Into<String>,
        capability: Capability,
        stage: PhaseStage,
        task: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            agent_name: agent_name.into(),
            capability,
            stage,
            task: task.into(),
            depends_on: BTreeSet::new(),
            status: PhaseStatus::Pending,
        }
    }

    pub fn depends_on<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on.extend(ids.into_iter().map(Into::into));
        self
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("plan has no phases")]
    Empty,

    #[error("duplicate phase id '{0}'")]
    DuplicatePhase(String),

    #[error("phase '{phase}' depends on unknown phase '{dependency}'")]
    UnknownDependency { phase: String, dependency: String },

    #[error("dependency cycle among phases: {}", .phases.join(", "))]
    CycleDetected { phases: Vec<String> },
}

/// A validated, acyclic set of phases.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowPlan {
    /// Name of the template the plan was built from
    pub name: String,
    phases: Vec<Phase>,
    #[serde(skip)]
    order: Vec<usize>,
    #[serde(skip)]
    anomaly: Option<CoordinationError>,
}

impl WorkflowPlan {
    /// Validate and build a plan.
    pub fn new(name: impl Into<String>, phases: Vec<Phase>) -> Result<Self, PlanError> {
        let order = topological_order(&phases)?;
        Ok(Self {
            name: name.into(),
            phases,
            order,
            anomaly: None,
        })
    }

    /// A plan with one phase and no edges.
    pub fn single(phase: Phase) -> Self {
        Self {
            name: "single".to_string(),
            phases: vec![Phase {
                depends_on: BTreeSet::new(),
                ..phase
            }],
            order: vec![0],
            anomaly: None,
        }
    }

    pub fn with_anomaly(mut self, anomaly: CoordinationError) -> Self {
        self.anomaly = Some(anomaly);
        self
    }

    pub fn anomaly(&self) -> Option<&CoordinationError> {
        self.anomaly.as_ref()
    }

    /// Phases in declaration order.
    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    pub fn phase(&self, id: &str) -> Option<&Phase> {
        self.phases.iter().find(|phase| phase.id == id)
    }

    /// Phase indices in a dependency-respecting order.
    pub fn execution_order(&self) -> &[usize] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.phases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    pub fn is_single_agent(&self) -> bool {
        self.phases.len() == 1
    }

    pub fn into_parts(self) -> (Vec<Phase>, Vec<usize>) {
        (self.phases, self.order)
    }
}

/// Kahn's algorithm over the phase graph.
///
/// Ties are broken by declaration order, so the result is deterministic.
pub fn topological_order(phases: &[Phase]) -> Result<Vec<usize>, PlanError> {
    if phases.is_empty() {
        return Err(PlanError::Empty);
    }

    let mut index: HashMap<&str, usize> = HashMap::with_capacity(phases.len());
    for (i, phase) in phases.iter().enumerate() {
        if index.insert(phase.id.as_str(), i).is_some() {
            return Err(PlanError::DuplicatePhase(phase.id.clone()));
        }
    }

    let mut in_degree = vec![0usize; phases.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); phases.len()];
    for (i, phase) in phases.iter().enumerate() {
        for dep in &phase.depends_on {
            let Some(&d) = index.get(dep.as_str()) else {
                return Err(PlanError::UnknownDependency {
                    phase: phase.id.clone(),
                    dependency: dep.clone(),
                });
            };
            in_degree[i] += 1;
            dependents[d].push(i);
        }
    }

    let mut queue: VecDeque<usize> = (0..phases.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(phases.len());

    while let Some(i) = queue.pop_front() {
        order.push(i);
        for &next in &dependents[i] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                queue.push_back(next);
            }
        }
    }

    if order.len() != phases.len() {
        let phases = phases
            .iter()
            .enumerate()
            .filter(|(i, _)| in_degree[*i] > 0)
            .map(|(_, phase)| phase.id.clone())
            .collect();
        return Err(PlanError::CycleDetected { phases });
    }

    Ok(order)
}
