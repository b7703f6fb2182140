//! Built-in specialist catalog.

use crate::registry::AgentDescriptor;
use concierge_common::Capability;

/// Name of the designated general-purpose agent.
pub const GENERAL_AGENT: &str = "general-assistant";

pub fn default_catalog() -> Vec<AgentDescriptor> {
    vec![
        AgentDescriptor::new(
            "frontend-developer",
            "Builds and fixes UI components, styling and client-side state",
        )
        .with_keywords(&[
            "ui", "frontend", "react", "vue", "svelte", "angular", "css", "layout",
            "responsive", "styling", "accessibility", "jsx", "tailwind", "html",
        ])
        .with_file_types(&["tsx", "jsx", "vue", "svelte", "css", "scss", "html"])
        .with_capabilities(&[Capability::Generate]),
        AgentDescriptor::new(
            "backend-developer",
            "Implements server-side APIs, persistence and service logic",
        )
        .with_keywords(&[
            "api", "endpoint", "server", "backend", "database", "authentication", "auth",
            "login", "rest", "graphql", "service", "query", "migration", "schema",
        ])
        .with_file_types(&["rs", "go", "py", "java", "rb", "sql"])
        .with_capabilities(&[Capability::Generate]),
        AgentDescriptor::new(
            "security-auditor",
            "Audits code and designs for vulnerabilities and unsafe practices",
        )
        .with_keywords(&[
            "security", "secure", "vulnerability", "vulnerabilities", "xss", "csrf",
            "injection", "encryption", "authentication", "authorization", "secret",
            "audit", "owasp", "permission",
        ])
        .with_capabilities(&[Capability::Audit]),
        AgentDescriptor::new(
            "test-engineer",
            "Designs and writes unit, integration and end-to-end tests",
        )
        .with_keywords(&[
            "test", "testing", "coverage", "unit", "integration", "e2e", "mock", "fixture",
            "regression", "tdd",
        ])
        .with_capabilities(&[Capability::Test]),
        AgentDescriptor::new(
            "code-reviewer",
            "Reviews changes for bugs, readability and maintainability",
        )
        .with_keywords(&[
            "review", "bug", "refactor", "quality", "smell", "lint", "cleanup",
            "readability", "maintainability",
        ])
        .with_capabilities(&[Capability::Review, Capability::Audit, Capability::Test]),
        AgentDescriptor::new(
            "performance-optimizer",
            "Profiles hot paths and proposes performance improvements",
        )
        .with_keywords(&[
            "performance", "optimize", "slow", "latency", "memory", "profile", "speed",
            "fast", "faster", "cache", "bottleneck", "benchmark",
        ])
        .with_capabilities(&[Capability::Optimize, Capability::Review]),
        AgentDescriptor::new(
            "software-architect",
            "Designs system structure, module boundaries and data flow",
        )
        .with_keywords(&[
            "architecture", "design", "system", "scalable", "scalability", "structure",
            "pattern", "microservice", "modular", "diagram",
        ])
        .with_capabilities(&[Capability::Design, Capability::Review]),
        AgentDescriptor::new(
            GENERAL_AGENT,
            "Answers general development questions when no specialist fits",
        )
        .with_capabilities(&[Capability::General]),
    ]
}
