//! Merges phase results into one user-facing response.

use crate::classifier::{Complexity, Intent};
use crate::executor::{ExecutionReport, PhaseReport};
use crate::plan::{PhaseStage, PhaseStatus};
use concierge_common::{Capability, FailureKind};
use serde::Serialize;

const APOLOGY: &str = "Sorry, I couldn't complete this request right now. \
Please try again in a moment, or rephrase the request with more detail.";

/// Per-phase entry of the response trace.
#[derive(Debug, Clone, Serialize)]
pub struct PhaseTrace {
    pub id: String,
    pub agent: String,
    /// Agent that actually answered, when different from `agent` this was a backup
    #[serde(skip_serializing_if = "Option::is_none")]
    pub responder: Option<String>,
    pub capability: Capability,
    pub stage: PhaseStage,
    pub status: PhaseStatus,
    pub degraded: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    pub attempts: u32,
    pub duration_ms: u64,
}

impl From<&PhaseReport> for PhaseTrace {
    fn from(report: &PhaseReport) -> Self {
        Self {
            id: report.id.clone(),
            agent: report.agent_name.clone(),
            responder: report.responder().map(str::to_string),
            capability: report.capability,
            stage: report.stage,
            status: report.status,
            degraded: report.status.is_degraded(),
            errors: report.failures.iter().map(|f| f.to_string()).collect(),
            attempts: report.attempts,
            duration_ms: report.duration_ms,
        }
    }
}

/// The single response returned for a request.
#[derive(Debug, Clone, Serialize)]
pub struct AggregatedResponse {
    pub request_id: String,
    pub content: String,
    pub suggested_actions: Vec<String>,
    pub trace: Vec<PhaseTrace>,
    pub workflow: String,
    pub intent: Intent,
    pub complexity: Complexity,

    /// Some phase failed, was skipped, or answered with generic guidance
    pub degraded: bool,

    /// No phase produced content
    pub fully_degraded: bool,

    pub cancelled: bool,

    /// Non-fatal coordination anomalies, for diagnostics
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub anomalies: Vec<String>,
}

/// Stateless merger of execution reports.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseAggregator;

impl ResponseAggregator {
    pub fn new() -> Self {
        Self
    }

    /// Merge a report. Request id and anomalies are left for the caller to fill in.
    pub fn aggregate(
        &self,
        report: ExecutionReport,
        intent: Intent,
        complexity: Complexity,
    ) -> AggregatedResponse {
        let succeeded = report.succeeded().count();
        let fully_degraded = succeeded == 0;
        let degraded = report
            .phases
            .iter()
            .any(|phase| !matches!(phase.status, PhaseStatus::Succeeded { degraded: false }));

        let content = if fully_degraded {
            compose_apology(&report)
        } else if report.phases.len() == 1 {
            compose_single(&report.phases[0])
        } else {
            compose_sections(&report)
        };

        AggregatedResponse {
            request_id: String::new(),
            content,
            suggested_actions: suggest_actions(&report, intent),
            trace: report.phases.iter().map(PhaseTrace::from).collect(),
            workflow: report.workflow,
            intent,
            complexity,
            degraded,
            fully_degraded,
            cancelled: report.cancelled,
            anomalies: Vec::new(),
        }
    }
}

fn compose_single(phase: &PhaseReport) -> String {
    let text = phase.content().map(|c| c.text.trim()).unwrap_or_default();
    if phase.status.is_degraded() {
        format!("{}\n\n{}", degraded_note(phase), text)
    } else {
        text.to_string()
    }
}

fn compose_sections(report: &ExecutionReport) -> String {
    report
        .phases
        .iter()
        .map(|phase| match phase.content() {
            Some(content) => {
                let mut section = format!("## {}\n\n", capitalize(&step_name(phase)));
                if phase.status.is_degraded() {
                    section.push_str(&degraded_note(phase));
                    section.push_str("\n\n");
                }
                section.push_str(content.text.trim());
                section
            }
            None => incomplete_note(phase),
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn compose_apology(report: &ExecutionReport) -> String {
    if report.phases.len() <= 1 {
        return APOLOGY.to_string();
    }
    let notes: Vec<String> = report.phases.iter().map(incomplete_note).collect();
    format!("{}\n\n{}", APOLOGY, notes.join("\n"))
}

fn degraded_note(phase: &PhaseReport) -> String {
    match phase.capability {
        Capability::General => {
            "_The assistant was unavailable, so this is general guidance._".to_string()
        }
        capability => format!(
            "_The {} specialist was unavailable, so this is general guidance._",
            capability.domain_label()
        ),
    }
}

fn incomplete_note(phase: &PhaseReport) -> String {
    let reason = match phase.status {
        PhaseStatus::Skipped => " because an earlier step did not finish",
        _ => match phase.failures.last().map(|f| f.kind) {
            Some(FailureKind::Timeout) => " in time",
            Some(FailureKind::Cancelled) => " before the request was cancelled",
            _ => "",
        },
    };
    format!("_Note: the {} step could not complete{}._", step_name(phase), reason)
}

/// "security analysis", or just "implementation" when domain and stage coincide.
fn step_name(phase: &PhaseReport) -> String {
    let domain = phase.capability.domain_label();
    let stage = phase.stage.label();
    if domain == stage || phase.stage == PhaseStage::Direct {
        domain.to_string()
    } else {
        format!("{domain} {stage}")
    }
}

fn suggest_actions(report: &ExecutionReport, intent: Intent) -> Vec<String> {
    let mut actions: Vec<String> = Vec::new();
    let mut push = |action: String| {
        if !actions.contains(&action) {
            actions.push(action);
        }
    };

    for phase in report.succeeded() {
        if let Some(content) = phase.content() {
            for action in &content.actions {
                push(action.clone());
            }
        }
    }

    let has = |capability: Capability| report.phases.iter().any(|p| p.capability == capability);
    let writes_code = has(Capability::Generate)
        || matches!(intent, Intent::Implement | Intent::Optimize);

    if writes_code && !has(Capability::Test) {
        push("Add tests that cover the new behavior".to_string());
    }
    if has(Capability::Generate) && !has(Capability::Audit) {
        push("Run a security review of the generated code".to_string());
    }

    for phase in &report.phases {
        match phase.status {
            PhaseStatus::Failed | PhaseStatus::Skipped => {
                push(format!("Retry the {} step", step_name(phase)))
            }
            PhaseStatus::Succeeded { degraded: true } if phase.capability == Capability::General => {
                push("Try the request again in a moment".to_string())
            }
            PhaseStatus::Succeeded { degraded: true } => push(format!(
                "Ask again for a full {} answer once the {} agent is available",
                phase.capability.domain_label(),
                phase.agent_name
            )),
            _ => {}
        }
    }

    actions
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{InvocationResult, PhaseOutput};
    use concierge_common::{AgentContent, InvocationFailure};

    fn report(
        id: &str,
        capability: Capability,
        stage: PhaseStage,
        status: PhaseStatus,
        text: Option<&str>,
    ) -> PhaseReport {
        let result = match text {
            Some(text) => Some(InvocationResult::Success(PhaseOutput {
                responder: (!status.is_degraded()).then(|| format!("{id}-agent")),
                content: AgentContent::text(text),
                degraded: status.is_degraded(),
            })),
            None if status == PhaseStatus::Failed => Some(InvocationResult::Failure(
                InvocationFailure::new(FailureKind::Timeout, "slow"),
            )),
            None => None,
        };
        let failures = match status {
            PhaseStatus::Failed => vec![InvocationFailure::new(FailureKind::Timeout, "slow")],
            _ => Vec::new(),
        };
        PhaseReport {
            id: id.to_string(),
            agent_name: format!("{id}-agent"),
            capability,
            stage,
            status,
            result,
            failures,
            attempts: 1,
            duration_ms: 10,
        }
    }

    fn execution(phases: Vec<PhaseReport>) -> ExecutionReport {
        ExecutionReport {
            workflow: "test".into(),
            phases,
            cancelled: false,
        }
    }

    const OK: PhaseStatus = PhaseStatus::Succeeded { degraded: false };

    #[test]
    fn test_single_phase_is_returned_verbatim() {
        let response = ResponseAggregator::new().aggregate(
            execution(vec![report("r", Capability::Review, PhaseStage::Direct, OK, Some("Looks good."))]),
            Intent::Review,
            Complexity::Low,
        );
        assert_eq!(response.content, "Looks good.");
        assert!(!response.degraded);
        assert!(!response.fully_degraded);
        assert_eq!(response.trace.len(), 1);
    }

    #[test]
    fn test_sections_follow_declaration_order() {
        let response = ResponseAggregator::new().aggregate(
            execution(vec![
                report("design", Capability::Design, PhaseStage::Analysis, OK, Some("Design text")),
                report("build", Capability::Generate, PhaseStage::Implementation, OK, Some("Build text")),
                report("tests", Capability::Test, PhaseStage::Verification, OK, Some("Test text")),
            ]),
            Intent::Implement,
            Complexity::High,
        );

        let design = response.content.find("Design text").unwrap();
        let build = response.content.find("Build text").unwrap();
        let tests = response.content.find("Test text").unwrap();
        assert!(design < build && build < tests);
        assert!(response.content.contains("## Architecture analysis"));
        assert!(!response
            .suggested_actions
            .contains(&"Add tests that cover the new behavior".to_string()));
        assert!(response
            .suggested_actions
            .contains(&"Run a security review of the generated code".to_string()));
    }

    #[test]
    fn test_failed_and_degraded_phases_are_annotated() {
        let response = ResponseAggregator::new().aggregate(
            execution(vec![
                report("threats", Capability::Audit, PhaseStage::Analysis, PhaseStatus::Succeeded { degraded: true }, Some("Validate input.")),
                report("build", Capability::Generate, PhaseStage::Implementation, PhaseStatus::Failed, None),
                report("tests", Capability::Test, PhaseStage::Verification, PhaseStatus::Skipped, None),
            ]),
            Intent::Implement,
            Complexity::High,
        );

        assert!(response.degraded);
        assert!(!response.fully_degraded);
        assert!(response.content.contains("security specialist was unavailable"));
        assert!(response
            .content
            .contains("the implementation step could not complete in time"));
        assert!(response
            .content
            .contains("the testing verification step could not complete because an earlier step did not finish"));
        assert!(response
            .suggested_actions
            .contains(&"Retry the implementation step".to_string()));
        assert!(response.trace[0].degraded);
    }

    #[test]
    fn test_nothing_succeeded_yields_apology() {
        let response = ResponseAggregator::new().aggregate(
            execution(vec![report("r", Capability::General, PhaseStage::Direct, PhaseStatus::Failed, None)]),
            Intent::Unclassified,
            Complexity::Low,
        );
        assert!(response.fully_degraded);
        assert!(response.content.starts_with("Sorry"));
        assert!(response.content.contains("try again"));
    }

    #[test]
    fn test_agent_actions_are_deduplicated() {
        let mut first = report("a", Capability::Review, PhaseStage::Review, OK, Some("x"));
        let mut second = report("b", Capability::Audit, PhaseStage::Review, OK, Some("y"));
        for phase in [&mut first, &mut second] {
            if let Some(InvocationResult::Success(output)) = phase.result.as_mut() {
                output.content.actions = vec!["Run cargo audit".into()];
            }
        }

        let response = ResponseAggregator::new().aggregate(
            execution(vec![first, second]),
            Intent::Review,
            Complexity::High,
        );
        assert_eq!(
            response
                .suggested_actions
                .iter()
                .filter(|a| *a == "Run cargo audit")
                .count(),
            1
        );
    }

    #[test]
    fn test_missing_test_phase_suggests_tests() {
        let response = ResponseAggregator::new().aggregate(
            execution(vec![report("b", Capability::Generate, PhaseStage::Direct, OK, Some("code"))]),
            Intent::Implement,
            Complexity::Low,
        );
        assert_eq!(response.suggested_actions[0], "Add tests that cover the new behavior");
    }
}
