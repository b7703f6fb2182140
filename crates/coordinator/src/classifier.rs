//! Request classification: intent, complexity and ranked candidate agents.

use concierge_agents::signals::{contains_phrase, keyword_set, tokenize};
use concierge_agents::{AgentRegistry, CandidateMatch};
use concierge_common::{
    Capability, ContextSnapshot, CoordinationError, OperatingMode, UserRequest,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Requests longer than this many tokens are at least medium complexity.
const LONG_REQUEST_TOKENS: usize = 60;

/// What the user is trying to get done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Review,
    Implement,
    Test,
    Security,
    Optimize,
    Architecture,
    Unclassified,
}

impl From<OperatingMode> for Intent {
    fn from(mode: OperatingMode) -> Self {
        match mode {
            OperatingMode::Review => Intent::Review,
            OperatingMode::Implement => Intent::Implement,
            OperatingMode::Test => Intent::Test,
            OperatingMode::Security => Intent::Security,
            OperatingMode::Optimize => Intent::Optimize,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

/// Words that name an intent outright.
const INTENT_VOCABULARY: &[(Intent, &[&str])] = &[
    (
        Intent::Review,
        &["review", "reviews", "check", "inspect", "critique", "feedback", "bug", "bugs"],
    ),
    (
        Intent::Implement,
        &["build", "implement", "develop", "scaffold", "generate", "fix", "refactor", "migrate"],
    ),
    (
        Intent::Test,
        &["test", "tests", "testing", "coverage", "tdd", "e2e"],
    ),
    (
        Intent::Security,
        &[
            "security", "secure", "vulnerability", "vulnerabilities", "audit", "harden",
            "exploit", "owasp",
        ],
    ),
    (
        Intent::Optimize,
        &[
            "optimize", "optimise", "performance", "slow", "faster", "speed", "latency",
            "bottleneck", "profile",
        ],
    ),
    (
        Intent::Architecture,
        &["architecture", "architect", "design", "structure", "scalable", "scalability"],
    ),
];

/// Generic verbs that imply implementation only when nothing more specific appears.
const GENERIC_IMPLEMENT_VERBS: &[&str] = &["write", "add", "create", "make", "update"];

/// Result of classifying one request.
#[derive(Debug, Clone, Serialize)]
pub struct Classification {
    pub intent: Intent,
    pub complexity: Complexity,

    /// Ranked candidates, best first. Empty when nothing matched.
    pub candidates: Vec<CandidateMatch>,

    /// Indicator phrase that forced high complexity, if any
    pub indicator_phrase: Option<String>,

    /// Agent for the single-agent path: the top candidate, or the general agent
    pub selected_agent: String,

    #[serde(skip)]
    pub anomaly: Option<CoordinationError>,
}

impl Classification {
    /// Whether the request takes the multi-agent path.
    pub fn is_multi_agent(&self) -> bool {
        self.complexity == Complexity::High
    }

    /// Distinct primary capabilities among the candidates.
    pub fn capabilities(&self) -> BTreeSet<Capability> {
        self.candidates
            .iter()
            .map(|candidate| candidate.primary_capability)
            .collect()
    }
}

/// Keyword and file-type based classifier.
pub struct RequestClassifier {
    registry: Arc<AgentRegistry>,
    indicator_phrases: Vec<String>,
    coverage_threshold: f32,
}

impl RequestClassifier {
    pub fn new(
        registry: Arc<AgentRegistry>,
        indicator_phrases: Vec<String>,
        coverage_threshold: f32,
    ) -> Self {
        Self {
            registry,
            indicator_phrases,
            coverage_threshold,
        }
    }

    /// Classify a request. Never fails: with no candidates the general agent is
    /// selected and the ambiguity is recorded as an anomaly.
    pub fn classify(&self, request: &UserRequest, snapshot: &ContextSnapshot) -> Classification {
        let tokens = tokenize(&request.content);
        let keywords = keyword_set(&tokens);

        let file_ext = snapshot
            .selected_file
            .as_deref()
            .and_then(|path| path.extension())
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .or_else(|| request.file_extension());

        let candidates = self.registry.match_by_signal(&keywords, file_ext.as_deref());

        let intent = request
            .mode
            .map(Intent::from)
            .unwrap_or_else(|| detect_intent(&tokens));

        let indicator_phrase = self
            .indicator_phrases
            .iter()
            .find(|phrase| contains_phrase(&tokens, phrase))
            .cloned();

        let complexity = if indicator_phrase.is_some()
            || self.spans_uncovered_domains(&candidates)
        {
            Complexity::High
        } else if candidates.len() >= 2 || tokens.len() > LONG_REQUEST_TOKENS {
            Complexity::Medium
        } else {
            Complexity::Low
        };

        let (selected_agent, anomaly) = match candidates.first() {
            Some(top) => (top.name.clone(), None),
            None => {
                let general = self.registry.general_agent_name().to_string();
                warn!(
                    request_id = %request.id,
                    fallback_agent = %general,
                    "No candidate agent matched, routing to general agent"
                );
                (
                    general.clone(),
                    Some(CoordinationError::ClassificationAmbiguous {
                        fallback_agent: general,
                    }),
                )
            }
        };

        debug!(
            request_id = %request.id,
            ?intent,
            ?complexity,
            candidates = candidates.len(),
            selected = %selected_agent,
            "Classified request"
        );

        Classification {
            intent,
            complexity,
            candidates,
            indicator_phrase,
            selected_agent,
            anomaly,
        }
    }

    /// Candidates span two or more domains and no single one covers enough of
    /// what matched. A file-type match can rank first with no keyword hits, so
    /// coverage is taken from the strongest keyword match, not the first rank.
    fn spans_uncovered_domains(&self, candidates: &[CandidateMatch]) -> bool {
        let domains: BTreeSet<Capability> =
            candidates.iter().map(|c| c.primary_capability).collect();
        if domains.len() < 2 {
            return false;
        }

        let matched: BTreeSet<&String> = candidates
            .iter()
            .flat_map(|c| c.matched_keywords.iter())
            .collect();
        if matched.is_empty() {
            return false;
        }

        let top_hits = candidates
            .iter()
            .map(CandidateMatch::keyword_hits)
            .max()
            .unwrap_or(0);
        (top_hits as f32) < self.coverage_threshold * matched.len() as f32
    }
}

/// Intent named by the earliest intent word in the request.
fn detect_intent(tokens: &[String]) -> Intent {
    let specific = tokens.iter().find_map(|token| {
        INTENT_VOCABULARY
            .iter()
            .find(|(_, words)| words.contains(&token.as_str()))
            .map(|(intent, _)| *intent)
    });

    specific.unwrap_or_else(|| {
        if tokens
            .iter()
            .any(|token| GENERIC_IMPLEMENT_VERBS.contains(&token.as_str()))
        {
            Intent::Implement
        } else {
            Intent::Unclassified
        }
    })
}
