//! LLM-backed implementation of the agent invocation contract.

use crate::prompts::{self, extract_actions};
use crate::registry::AgentRegistry;
use async_trait::async_trait;
use concierge_common::{
    AgentContent, AgentInvoker, ConciergeError, FailureKind, Invocation, InvocationFailure,
};
use concierge_llm::{ChatMessage, LlmClient, LlmRequest, Role};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Runs each specialist as a system prompt over a shared language model.
pub struct LlmAgentInvoker {
    client: Arc<dyn LlmClient>,
    registry: Arc<AgentRegistry>,
    prompt_overrides: HashMap<String, String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

impl LlmAgentInvoker {
    pub fn new(client: Arc<dyn LlmClient>, registry: Arc<AgentRegistry>) -> Self {
        Self {
            client,
            registry,
            prompt_overrides: HashMap::new(),
            temperature: None,
            max_tokens: None,
        }
    }

    /// Replace the system prompt of one agent.
    pub fn with_prompt(mut self, agent_name: impl Into<String>, prompt: impl Into<String>) -> Self {
        self.prompt_overrides
            .insert(agent_name.into(), prompts::with_action_instructions(prompt.into()));
        self
    }

    pub fn with_sampling(mut self, temperature: Option<f32>, max_tokens: Option<u32>) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    fn build_request(&self, invocation: &Invocation) -> Result<LlmRequest, InvocationFailure> {
        let descriptor = self.registry.lookup(&invocation.agent_name).map_err(|e| {
            InvocationFailure::new(FailureKind::Unavailable, e.to_string())
        })?;

        let system_prompt = self
            .prompt_overrides
            .get(&descriptor.name)
            .cloned()
            .unwrap_or_else(|| prompts::system_prompt(descriptor));

        let request = invocation
            .context
            .history
            .iter()
            .map(|turn| ChatMessage::new(Role::from(turn.role), turn.content.clone()))
            .fold(LlmRequest::for_agent(system_prompt), LlmRequest::message);

        Ok(request
            .message(ChatMessage::user(render_user_message(invocation)))
            .sampling(self.temperature, self.max_tokens)
            .timeout(invocation.budget.timeout))
    }
}

/// Compose the final user message: context sections followed by the task.
fn render_user_message(invocation: &Invocation) -> String {
    let context = &invocation.context;
    let mut out = String::new();

    if !context.project.is_empty() {
        out.push_str("## Project\n");
        if let Some(ref language) = context.project.language {
            out.push_str(&format!("Language: {}\n", language));
        }
        if let Some(ref framework) = context.project.framework {
            out.push_str(&format!("Framework: {}\n", framework));
        }
        if !context.project.dependencies.is_empty() {
            out.push_str(&format!(
                "Dependencies: {}\n",
                context.project.dependencies.join(", ")
            ));
        }
        out.push('\n');
    }

    let prefs = &context.preferences;
    out.push_str("## Preferences\n");
    out.push_str(&format!("Security level: {:?}\n", prefs.security_level));
    if let Some(ref style) = prefs.code_style {
        out.push_str(&format!("Code style: {}\n", style));
    }
    if let Some(ref framework) = prefs.testing_framework {
        out.push_str(&format!("Testing framework: {}\n", framework));
    }
    if prefs.require_tests {
        out.push_str("Include tests with any code you write.\n");
    }
    out.push('\n');

    let selected: Vec<_> = context
        .selected_file
        .iter()
        .chain(context.selected_files.iter())
        .collect();
    if !selected.is_empty() {
        out.push_str("## Selected files\n");
        for path in selected {
            out.push_str(&format!("- {}\n", path.display()));
        }
        out.push('\n');
    }

    if !invocation.allowed_tools.is_empty() {
        out.push_str(&format!(
            "## Available tools\n{}\n\n",
            invocation.allowed_tools.join(", ")
        ));
    }

    out.push_str("## Task\n");
    out.push_str(&invocation.task);
    out
}

/// Map a model-call error onto the invocation failure taxonomy.
pub fn failure_from_error(err: &ConciergeError) -> InvocationFailure {
    let kind = match err {
        ConciergeError::Timeout(_) => FailureKind::Timeout,
        ConciergeError::Provider { status, .. } => match *status {
            408 | 504 => FailureKind::Timeout,
            429 | 500..=599 => FailureKind::Unavailable,
            _ => FailureKind::Unknown,
        },
        ConciergeError::Transport(msg) if msg.to_lowercase().contains("timed out") => {
            FailureKind::Timeout
        }
        ConciergeError::Transport(_) | ConciergeError::UnknownAgent(_) => FailureKind::Unavailable,
        ConciergeError::InvalidResponse(_) | ConciergeError::Serialization(_) => {
            FailureKind::InvalidResponse
        }
        _ => FailureKind::Unknown,
    };
    InvocationFailure::new(kind, err.to_string())
}

#[async_trait]
impl AgentInvoker for LlmAgentInvoker {
    async fn invoke(
        &self,
        invocation: &Invocation,
    ) -> std::result::Result<AgentContent, InvocationFailure> {
        if invocation.cancel.is_cancelled() {
            return Err(InvocationFailure::new(
                FailureKind::Cancelled,
                "request cancelled before invocation",
            ));
        }

        let request = self.build_request(invocation)?;

        debug!(
            agent = %invocation.agent_name,
            model = %self.client.model_name(),
            messages = request.messages.len(),
            "Invoking agent"
        );

        let response = tokio::select! {
            result = self.client.complete(request) => result,
            _ = invocation.cancel.cancelled() => {
                return Err(InvocationFailure::new(
                    FailureKind::Cancelled,
                    "request cancelled during invocation",
                ));
            }
        };

        let response = response.map_err(|e| {
            let failure = failure_from_error(&e);
            warn!(agent = %invocation.agent_name, kind = ?failure.kind, error = %e, "Agent invocation failed");
            failure
        })?;

        if response.is_truncated() {
            warn!(agent = %invocation.agent_name, "Agent reply hit the token limit");
        }

        let (text, actions) = extract_actions(&response.content);
        if text.is_empty() {
            return Err(InvocationFailure::new(
                FailureKind::InvalidResponse,
                format!("{} returned empty content", invocation.agent_name),
            ));
        }

        Ok(AgentContent::text(text).with_actions(actions))
    }
}
