//! Conversation history and per-request context snapshots.

use concierge_common::{
    ContextSnapshot, ConversationTurn, ProjectContext, UserPreferences, UserRequest,
};
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Mutable conversation state. Only [`ContextManager`] touches it.
#[derive(Debug, Default)]
struct ConversationState {
    turns: VecDeque<ConversationTurn>,
}

/// Owns the conversation history and produces immutable snapshots.
///
/// Snapshots are taken under a read lock and commits under a single write
/// lock, so a request never observes a partially committed exchange.
#[derive(Debug)]
pub struct ContextManager {
    state: RwLock<ConversationState>,
    history_cap: usize,
    project: ProjectContext,
    preferences: UserPreferences,
    workspace_root: Option<PathBuf>,
}

impl ContextManager {
    /// Create a manager. When a workspace root is given, project facts are
    /// detected from its manifest files.
    pub fn new(
        history_cap: usize,
        preferences: UserPreferences,
        workspace_root: Option<PathBuf>,
    ) -> Self {
        let project = workspace_root
            .as_deref()
            .map(detect_project)
            .unwrap_or_default();

        if !project.is_empty() {
            info!(
                language = ?project.language,
                framework = ?project.framework,
                dependencies = project.dependencies.len(),
                "Detected project context"
            );
        }

        Self {
            state: RwLock::new(ConversationState::default()),
            history_cap,
            project,
            preferences,
            workspace_root,
        }
    }

    /// Replace the detected project facts.
    pub fn with_project(mut self, project: ProjectContext) -> Self {
        self.project = project;
        self
    }

    pub fn history_cap(&self) -> usize {
        self.history_cap
    }

    pub fn history_len(&self) -> usize {
        self.state.read().turns.len()
    }

    pub fn project(&self) -> &ProjectContext {
        &self.project
    }

    /// Build the snapshot every phase of `request` will share.
    ///
    /// File references that cannot be resolved are left out.
    pub fn snapshot(&self, request: &UserRequest) -> ContextSnapshot {
        let history: Vec<ConversationTurn> = {
            let state = self.state.read();
            let skip = state.turns.len().saturating_sub(self.history_cap);
            state.turns.iter().skip(skip).cloned().collect()
        };

        let selected_file = request
            .selected_file
            .as_deref()
            .and_then(|raw| self.resolve_file(raw));

        let selected_files = request
            .selected_files
            .iter()
            .filter_map(|raw| self.resolve_file(raw))
            .collect();

        ContextSnapshot {
            history,
            project: self.project.clone(),
            preferences: self.preferences.clone(),
            selected_file,
            selected_files,
        }
    }

    /// Append one completed exchange, evicting the oldest turns past the cap.
    pub fn commit(&self, user_turn: ConversationTurn, assistant_turn: ConversationTurn) {
        let mut state = self.state.write();
        state.turns.push_back(user_turn);
        state.turns.push_back(assistant_turn);
        while state.turns.len() > self.history_cap {
            state.turns.pop_front();
        }
    }

    pub fn clear(&self) {
        self.state.write().turns.clear();
    }

    fn resolve_file(&self, raw: &str) -> Option<PathBuf> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        let path = Path::new(raw);
        let resolved = match (&self.workspace_root, path.is_relative()) {
            (Some(root), true) => root.join(path),
            _ => path.to_path_buf(),
        };

        if resolved.exists() {
            Some(resolved)
        } else {
            debug!(path = %resolved.display(), "Selected file not found, omitting from context");
            None
        }
    }
}

const JS_FRAMEWORKS: &[(&str, &str)] = &[
    ("next", "next"),
    ("react", "react"),
    ("vue", "vue"),
    ("svelte", "svelte"),
    ("@angular/core", "angular"),
    ("express", "express"),
];

const RUST_FRAMEWORKS: &[&str] = &["axum", "actix-web", "rocket", "warp", "leptos", "tauri", "bevy"];

/// Detect language, framework and dependencies from manifests under `root`.
///
/// Returns an empty context when no manifest is found or parsing fails.
pub fn detect_project(root: &Path) -> ProjectContext {
    let cargo = root.join("Cargo.toml");
    if cargo.is_file() {
        return detect_cargo(&cargo).unwrap_or_default();
    }

    let package = root.join("package.json");
    if package.is_file() {
        return detect_package_json(&package, root).unwrap_or_default();
    }

    ProjectContext::default()
}

fn detect_cargo(path: &Path) -> Option<ProjectContext> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| debug!(error = %e, "Failed to read Cargo.toml"))
        .ok()?;
    let manifest: toml::Table = toml::from_str(&content)
        .map_err(|e| debug!(error = %e, "Failed to parse Cargo.toml"))
        .ok()?;

    let tables = [
        manifest.get("dependencies"),
        manifest
            .get("workspace")
            .and_then(|workspace| workspace.get("dependencies")),
    ];
    let mut dependencies: Vec<String> = tables
        .into_iter()
        .flatten()
        .filter_map(|deps| deps.as_table())
        .flat_map(|deps| deps.keys().cloned())
        .collect();
    dependencies.sort();
    dependencies.dedup();

    let framework = RUST_FRAMEWORKS
        .iter()
        .find(|fw| dependencies.iter().any(|dep| dep == *fw))
        .map(|fw| fw.to_string());

    Some(ProjectContext {
        framework,
        dependencies,
        language: Some("rust".to_string()),
    })
}

fn detect_package_json(path: &Path, root: &Path) -> Option<ProjectContext> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| debug!(error = %e, "Failed to read package.json"))
        .ok()?;
    let manifest: serde_json::Value = serde_json::from_str(&content)
        .map_err(|e| debug!(error = %e, "Failed to parse package.json"))
        .ok()?;

    let mut dependencies: Vec<String> = ["dependencies", "devDependencies"]
        .iter()
        .filter_map(|key| manifest.get(*key).and_then(|deps| deps.as_object()))
        .flat_map(|deps| deps.keys().cloned())
        .collect();
    dependencies.sort();
    dependencies.dedup();

    let framework = JS_FRAMEWORKS
        .iter()
        .find(|(package, _)| dependencies.iter().any(|dep| dep == package))
        .map(|(_, name)| name.to_string());

    let typescript =
        dependencies.iter().any(|dep| dep == "typescript") || root.join("tsconfig.json").is_file();

    Some(ProjectContext {
        framework,
        dependencies,
        language: Some(if typescript { "typescript" } else { "javascript" }.to_string()),
    })
}
