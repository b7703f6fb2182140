//! System prompts for the built-in specialists.

use crate::registry::AgentDescriptor;

/// Line prefix agents use to propose structured follow-up actions.
pub const ACTION_PREFIX: &str = "ACTION:";

const FRONTEND_PROMPT: &str = r#"You are a senior frontend engineer. Your role is to:

1. Build accessible, responsive UI components
2. Keep component state predictable and minimal
3. Follow the project's styling conventions
4. Call out browser compatibility concerns
"#;

const BACKEND_PROMPT: &str = r#"You are a senior backend engineer. Your role is to:

1. Design and implement APIs with clear contracts
2. Handle errors and edge cases explicitly
3. Keep persistence and business logic separated
4. Validate every external input
"#;

const SECURITY_PROMPT: &str = r#"You are an application security auditor. Your role is to:

1. Identify vulnerabilities (injection, XSS, CSRF, broken auth, secrets in code)
2. Rate each finding by severity and exploitability
3. Recommend concrete, minimal remediations
4. Flag insecure defaults in configuration

Focus on exploitable issues first.
"#;

const TESTING_PROMPT: &str = r#"You are a QA and testing specialist. Your role is to:

1. Write tests that pin down the requested behavior
2. Cover edge cases and error handling
3. Keep tests deterministic and fast
4. Match the project's existing test framework
"#;

const REVIEW_PROMPT: &str = r#"You are a senior code reviewer. Your role is to:

1. Review code for correctness, security, and maintainability
2. Identify bugs and code smells
3. Provide constructive, actionable feedback

Focus on high-impact issues first.
"#;

const PERFORMANCE_PROMPT: &str = r#"You are a performance engineer. Your role is to:

1. Locate likely hot paths and bottlenecks
2. Propose optimizations with their expected impact
3. Suggest how to measure before and after
"#;

const ARCHITECTURE_PROMPT: &str = r#"You are a software architect. Your role is to:

1. Propose module boundaries and data flow
2. Weigh trade-offs between candidate designs
3. Keep the design as simple as the requirements allow
"#;

const GENERAL_PROMPT: &str = r#"You are a helpful software development assistant.
Answer clearly and concisely, and say when a question needs a specialist.
"#;

/// Default system prompt for an agent.
pub fn system_prompt(descriptor: &AgentDescriptor) -> String {
    let base = match descriptor.name.as_str() {
        "frontend-developer" => FRONTEND_PROMPT.to_string(),
        "backend-developer" => BACKEND_PROMPT.to_string(),
        "security-auditor" => SECURITY_PROMPT.to_string(),
        "test-engineer" => TESTING_PROMPT.to_string(),
        "code-reviewer" => REVIEW_PROMPT.to_string(),
        "performance-optimizer" => PERFORMANCE_PROMPT.to_string(),
        "software-architect" => ARCHITECTURE_PROMPT.to_string(),
        "general-assistant" => GENERAL_PROMPT.to_string(),
        _ => format!(
            "You are the {} specialist. {}\n",
            descriptor.name, descriptor.description
        ),
    };
    with_action_instructions(base)
}

pub fn with_action_instructions(mut prompt: String) -> String {
    prompt.push_str(&format!(
        "\nIf you recommend follow-up work, list each item on its own line starting with `{}`.\n",
        ACTION_PREFIX
    ));
    prompt
}

/// Split `ACTION:` lines out of a response.
pub fn extract_actions(text: &str) -> (String, Vec<String>) {
    let mut body = Vec::new();
    let mut actions = Vec::new();

    for line in text.lines() {
        match line.trim_start().strip_prefix(ACTION_PREFIX) {
            Some(action) if !action.trim().is_empty() => actions.push(action.trim().to_string()),
            Some(_) => {}
            None => body.push(line),
        }
    }

    (body.join("\n").trim().to_string(), actions)
}
