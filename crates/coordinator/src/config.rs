//! Configuration for the coordinator.
//!
//! Every field has a default, so an empty TOML file is a valid configuration.

use concierge_common::UserPreferences;
use concierge_llm::LlmConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// Main coordinator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Maximum number of conversation turns kept in memory
    pub history_cap: usize,

    /// Per-invocation timeout in milliseconds
    pub phase_timeout_ms: u64,

    /// Agent used when classification finds no candidate
    pub general_agent: String,

    /// A single agent covering at least this share of the matched keywords
    /// keeps a multi-domain request on the single-agent path
    pub coverage_threshold: f32,

    /// Phrases that always mark a request as high complexity
    pub indicator_phrases: Vec<String>,

    /// Agent name -> backup agent name overrides
    pub backups: HashMap<String, String>,

    /// Agent name -> tool allow-list overrides
    pub tools: HashMap<String, Vec<String>>,

    /// Base directory for relative file references
    pub workspace_root: Option<PathBuf>,

    pub preferences: UserPreferences,

    pub llm: LlmConfig,
}

pub fn default_indicator_phrases() -> Vec<String> {
    [
        "end to end",
        "end-to-end",
        "full stack",
        "full-stack",
        "full",
        "comprehensive",
        "entire",
        "whole system",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            history_cap: 10,
            phase_timeout_ms: 60_000,
            general_agent: concierge_agents::GENERAL_AGENT.to_string(),
            coverage_threshold: 0.8,
            indicator_phrases: default_indicator_phrases(),
            backups: HashMap::new(),
            tools: HashMap::new(),
            workspace_root: None,
            preferences: UserPreferences::default(),
            llm: LlmConfig::default(),
        }
    }
}

impl CoordinatorConfig {
    pub fn phase_timeout(&self) -> Duration {
        Duration::from_millis(self.phase_timeout_ms)
    }

    /// Reject values the coordinator cannot work with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.phase_timeout_ms == 0 {
            anyhow::bail!("phase_timeout_ms must be greater than zero");
        }
        if !(self.coverage_threshold > 0.0 && self.coverage_threshold <= 1.0) {
            anyhow::bail!(
                "coverage_threshold must be in (0, 1], got {}",
                self.coverage_threshold
            );
        }
        if self.general_agent.trim().is_empty() {
            anyhow::bail!("general_agent must not be empty");
        }
        Ok(())
    }

    /// Load configuration from a TOML file.
    ///
    /// On Unix the file must be a regular file and must not be world-writable.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();

        #[cfg(unix)]
        validate_config_file_permissions(path)?;

        let config = Self::from_file_unchecked(path)?;

        if config.llm.api_key.is_some() {
            warn!(
                "API key found in config file '{}'. Prefer the OPENAI_API_KEY environment variable.",
                path.display()
            );
        }

        Ok(config)
    }

    /// Load configuration without permission checks.
    pub fn from_file_unchecked(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(unix)]
fn validate_config_file_permissions(path: &std::path::Path) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = std::fs::symlink_metadata(path)
        .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e))?;

    if !metadata.is_file() {
        anyhow::bail!(
            "Config path '{}' is not a regular file. Symlinks and directories are not allowed.",
            path.display()
        );
    }

    let permission_bits = metadata.permissions().mode() & 0o777;
    if permission_bits & 0o002 != 0 {
        anyhow::bail!(
            "Config file '{}' is world-writable (mode {:04o}). Fix with: chmod o-w {}",
            path.display(),
            permission_bits,
            path.display()
        );
    }

    Ok(())
}
