//! Language-model client used by the LLM-backed specialist agents.

pub mod client;
pub mod config;
pub mod openai;

pub use client::{ChatMessage, LlmClient, LlmRequest, LlmResponse, Role, TokenUsage};
pub use config::{BoundedClient, LlmConfig, build_llm_client};
pub use openai::OpenAiClient;
