//! Error types for the research, generation and review agents.

use thiserror::Error;

use crate::error::LlmError;
use crate::resilience::{Classify, FailureKind};

/// Errors that can occur during agent operations.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Research produced nothing usable.
    #[error("Research failed: {0}")]
    ResearchFailed(String),

    /// Generation produced nothing usable.
    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    /// Review could not reach a verdict.
    #[error("Review failed: {0}")]
    ReviewFailed(String),

    /// Error from the LLM provider.
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    /// Error parsing LLM response.
    #[error("Failed to parse LLM response: {0}")]
    ResponseParseError(String),

    /// Timeout during agent operation.
    #[error("Agent operation timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Classify for AgentError {
    fn failure_kind(&self) -> FailureKind {
        match self {
            AgentError::Llm(err) => err.failure_kind(),
            AgentError::Timeout { .. } => FailureKind::Timeout,
            AgentError::ResponseParseError(_) | AgentError::Json(_) => {
                FailureKind::InvalidResponse
            }
            AgentError::ResearchFailed(_)
            | AgentError::GenerationFailed(_)
            | AgentError::ReviewFailed(_) => FailureKind::Other,
        }
    }
}

/// Result type alias for agent operations.
pub type AgentResult<T> = Result<T, AgentError>;
