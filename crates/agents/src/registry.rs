//! Agent registry: the static catalog of available specialists.
//!
//! The registry is populated once at startup and is read-only afterwards.
//! Matching is a deterministic ranking over the catalog:
//!
//! 1. an exact file-type hint match outranks any keyword count,
//! 2. then the number of matched trigger keywords (descending),
//! 3. then the agent name (lexicographic).

use concierge_common::{Capability, ConciergeError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Immutable description of one specialist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDescriptor {
    /// Unique agent name
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub trigger_keywords: BTreeSet<String>,

    /// File extensions (without the dot) this agent specializes in
    #[serde(default)]
    pub file_type_hints: BTreeSet<String>,

    /// Declared capabilities; the first entry is the primary one
    pub capabilities: Vec<Capability>,
}

impl AgentDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            trigger_keywords: BTreeSet::new(),
            file_type_hints: BTreeSet::new(),
            capabilities: Vec::new(),
        }
    }

    pub fn with_keywords(mut self, keywords: &[&str]) -> Self {
        self.trigger_keywords
            .extend(keywords.iter().map(|k| k.to_lowercase()));
        self
    }

    pub fn with_file_types(mut self, extensions: &[&str]) -> Self {
        self.file_type_hints
            .extend(extensions.iter().map(|e| e.trim_start_matches('.').to_lowercase()));
        self
    }

    pub fn with_capabilities(mut self, capabilities: &[Capability]) -> Self {
        self.capabilities = capabilities.to_vec();
        self
    }

    pub fn primary_capability(&self) -> Capability {
        self.capabilities
            .first()
            .copied()
            .unwrap_or(Capability::General)
    }

    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

/// One ranked match produced by [`AgentRegistry::match_by_signal`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateMatch {
    pub name: String,
    pub primary_capability: Capability,
    pub matched_keywords: BTreeSet<String>,
    pub file_type_match: bool,
}

impl CandidateMatch {
    pub fn keyword_hits(&self) -> usize {
        self.matched_keywords.len()
    }
}

/// Read-only mapping from agent name to descriptor.
#[derive(Debug, Clone)]
pub struct AgentRegistry {
    agents: BTreeMap<String, AgentDescriptor>,
    general_agent: String,
}

impl AgentRegistry {
    /// Build a registry. Names must be unique and `general_agent` must be one of them.
    pub fn new(descriptors: Vec<AgentDescriptor>, general_agent: impl Into<String>) -> Result<Self> {
        let general_agent = general_agent.into();
        let mut agents = BTreeMap::new();

        for descriptor in descriptors {
            if descriptor.name.trim().is_empty() {
                return Err(ConciergeError::Config("Agent name must not be empty".into()));
            }
            if agents.contains_key(&descriptor.name) {
                return Err(ConciergeError::Config(format!(
                    "Duplicate agent name '{}'",
                    descriptor.name
                )));
            }
            agents.insert(descriptor.name.clone(), descriptor);
        }

        if !agents.contains_key(&general_agent) {
            return Err(ConciergeError::Config(format!(
                "General-purpose agent '{}' is not registered",
                general_agent
            )));
        }

        Ok(Self {
            agents,
            general_agent,
        })
    }

    /// Registry populated with the built-in specialist catalog.
    pub fn with_default_catalog() -> Self {
        Self {
            agents: crate::catalog::default_catalog()
                .into_iter()
                .map(|d| (d.name.clone(), d))
                .collect(),
            general_agent: crate::catalog::GENERAL_AGENT.to_string(),
        }
    }

    pub fn lookup(&self, name: &str) -> Result<&AgentDescriptor> {
        self.agents
            .get(name)
            .ok_or_else(|| ConciergeError::UnknownAgent(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.agents.contains_key(name)
    }

    /// The designated general-purpose agent.
    pub fn general_agent(&self) -> &AgentDescriptor {
        // Presence is checked at construction.
        &self.agents[&self.general_agent]
    }

    pub fn general_agent_name(&self) -> &str {
        &self.general_agent
    }

    pub fn iter(&self) -> impl Iterator<Item = &AgentDescriptor> {
        self.agents.values()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Rank agents by how well they match the request signals.
    ///
    /// `keywords` is the normalized keyword set of the request. Agents with
    /// neither a keyword hit nor a file-type match are not candidates.
    pub fn match_by_signal(
        &self,
        keywords: &BTreeSet<String>,
        file_ext: Option<&str>,
    ) -> Vec<CandidateMatch> {
        let file_ext = file_ext.map(|ext| ext.trim_start_matches('.').to_lowercase());

        let mut candidates: Vec<CandidateMatch> = self
            .agents
            .values()
            .filter_map(|agent| {
                let matched_keywords: BTreeSet<String> = agent
                    .trigger_keywords
                    .intersection(keywords)
                    .cloned()
                    .collect();
                let file_type_match = file_ext
                    .as_deref()
                    .is_some_and(|ext| agent.file_type_hints.contains(ext));

                if matched_keywords.is_empty() && !file_type_match {
                    return None;
                }

                Some(CandidateMatch {
                    name: agent.name.clone(),
                    primary_capability: agent.primary_capability(),
                    matched_keywords,
                    file_type_match,
                })
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.file_type_match
                .cmp(&a.file_type_match)
                .then_with(|| b.keyword_hits().cmp(&a.keyword_hits()))
                .then_with(|| a.name.cmp(&b.name))
        });

        candidates
    }

    /// First agent (by name) whose primary capability is `capability`.
    pub fn default_for(&self, capability: Capability) -> Option<&AgentDescriptor> {
        self.agents.values().find(|agent| {
            agent.name != self.general_agent && agent.primary_capability() == capability
        })
    }

    /// Backup agent sharing the primary capability of `name`.
    ///
    /// An override wins when it names a registered agent other than `name`.
    pub fn backup_for(
        &self,
        name: &str,
        overrides: &HashMap<String, String>,
    ) -> Option<&AgentDescriptor> {
        if let Some(backup) = overrides.get(name) {
            if backup != name {
                if let Some(descriptor) = self.agents.get(backup) {
                    return Some(descriptor);
                }
            }
        }

        let primary = self.agents.get(name)?.primary_capability();
        if primary == Capability::General {
            return None;
        }

        self.agents.values().find(|agent| {
            agent.name != name
                && agent.name != self.general_agent
                && agent.has_capability(primary)
        })
    }
}
