//! Error types for Concierge.

use thiserror::Error;

use crate::traits::{FailureKind, InvocationFailure};

#[derive(Error, Debug)]
pub enum ConciergeError {
    #[error("Agent error: {0}")]
    Agent(String),

    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Provider returned {status}: {message}")]
    Provider { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ConciergeError>;

/// Coordination anomalies and phase-local failures.
///
/// None of these abort a request. They are absorbed by the fallback path and
/// surfaced as annotations on the response trace.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoordinationError {
    #[error("no candidate agent matched the request; routed to {fallback_agent}")]
    ClassificationAmbiguous { fallback_agent: String },

    #[error("workflow plan rejected ({reason}); fell back to a single-agent plan")]
    PlanCycleDetected { reason: String },

    #[error("phase {phase} timed out: {message}")]
    PhaseTimeout { phase: String, message: String },

    #[error("phase {phase} agent unavailable: {message}")]
    PhaseUnavailable { phase: String, message: String },

    #[error("phase {phase} returned an invalid response: {message}")]
    PhaseInvalidResponse { phase: String, message: String },

    #[error("phase {phase} failed: {message}")]
    PhaseFailed { phase: String, message: String },

    #[error("phase {phase} was cancelled")]
    PhaseCancelled { phase: String },
}

impl CoordinationError {
    /// Classify an invocation failure for the given phase.
    pub fn from_failure(phase: impl Into<String>, failure: &InvocationFailure) -> Self {
        let phase = phase.into();
        let message = failure.message.clone();
        match failure.kind {
            FailureKind::Timeout => Self::PhaseTimeout { phase, message },
            FailureKind::Unavailable => Self::PhaseUnavailable { phase, message },
            FailureKind::InvalidResponse => Self::PhaseInvalidResponse { phase, message },
            FailureKind::Unknown => Self::PhaseFailed { phase, message },
            FailureKind::Cancelled => Self::PhaseCancelled { phase },
        }
    }
}
