//! Per-request context snapshot handed to every agent invocation.

use crate::message::ConversationTurn;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Detected facts about the project the user is working in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framework: Option<String>,

    #[serde(default)]
    pub dependencies: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl ProjectContext {
    pub fn is_empty(&self) -> bool {
        self.framework.is_none() && self.language.is_none() && self.dependencies.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityLevel {
    Relaxed,
    #[default]
    Standard,
    Strict,
}

/// Style, testing and security preferences of the user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserPreferences {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_style: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub testing_framework: Option<String>,

    /// Ask agents to include tests with generated code
    #[serde(default)]
    pub require_tests: bool,

    #[serde(default)]
    pub security_level: SecurityLevel,
}

/// Immutable, bounded view of conversation and project state.
///
/// Built once per request; every phase of a workflow shares the same snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextSnapshot {
    /// Most recent turns, oldest first
    pub history: Vec<ConversationTurn>,

    pub project: ProjectContext,

    pub preferences: UserPreferences,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_file: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub selected_files: Vec<PathBuf>,
}
