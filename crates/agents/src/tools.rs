//! Tool capability gate: which external tools each agent may use.
//!
//! The gate only computes allow-lists. Enforcement happens in the agent layer
//! that actually executes tools.

use crate::registry::AgentRegistry;
use concierge_common::Capability;
use std::collections::HashMap;

pub const CODE_SEARCH: &str = "code_search";
pub const FILE_READ: &str = "file_read";
pub const DEPENDENCY_LIST: &str = "dependency_list";
pub const TEST_RUNNER: &str = "test_runner";

#[derive(Debug, Clone, Default)]
pub struct ToolGate {
    allow: HashMap<String, Vec<String>>,
}

impl ToolGate {
    /// Compute allow-lists for every registered agent; `overrides` replace
    /// the derived list for the agents they name.
    pub fn from_registry(registry: &AgentRegistry, overrides: &HashMap<String, Vec<String>>) -> Self {
        let allow = registry
            .iter()
            .map(|agent| {
                let tools = match overrides.get(&agent.name) {
                    Some(list) => list.clone(),
                    None => default_tools(&agent.capabilities),
                };
                (agent.name.clone(), tools)
            })
            .collect();
        Self { allow }
    }

    /// Allow-list for `agent_name`; unknown agents get nothing.
    pub fn allowed_tools(&self, agent_name: &str) -> Vec<String> {
        self.allow.get(agent_name).cloned().unwrap_or_default()
    }
}

fn default_tools(capabilities: &[Capability]) -> Vec<String> {
    let mut tools = vec![CODE_SEARCH.to_string(), FILE_READ.to_string()];
    let needs_dependencies = capabilities
        .iter()
        .any(|c| matches!(c, Capability::Generate | Capability::Test | Capability::Audit));
    if needs_dependencies {
        tools.push(DEPENDENCY_LIST.to_string());
    }
    if capabilities.first() == Some(&Capability::Test) {
        tools.push(TEST_RUNNER.to_string());
    }
    tools
}
