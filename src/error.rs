//! Error types shared across synth-forge subsystems.
//!
//! Subsystem errors live next to their code (`agents::error`,
//! `storage::error`, `pipeline::config`, `pipeline::orchestrator`). This
//! module holds the LLM client error, which both the client and the
//! LLM-backed agents use.

use thiserror::Error;

use crate::resilience::{Classify, FailureKind};

/// Errors that can occur when calling an LLM API.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing API key: LITELLM_API_KEY environment variable not set")]
    MissingApiKey,

    #[error("Missing API base URL: LITELLM_API_BASE environment variable not set")]
    MissingApiBase,

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Invalid model: {0}")]
    InvalidModel(String),

    #[error("Context length exceeded: {limit} tokens")]
    ContextLengthExceeded { limit: u32 },

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },
}

impl Classify for LlmError {
    fn failure_kind(&self) -> FailureKind {
        match self {
            LlmError::RequestFailed(_) => FailureKind::Transient,
            LlmError::Timeout(_) => FailureKind::Timeout,
            LlmError::RateLimited(_) => FailureKind::RateLimited,
            LlmError::ApiError { code: 429, .. } => FailureKind::RateLimited,
            LlmError::ApiError { code, .. } if *code >= 500 => FailureKind::Transient,
            LlmError::ParseError(_) => FailureKind::InvalidResponse,
            LlmError::MissingApiKey
            | LlmError::MissingApiBase
            | LlmError::InvalidModel(_)
            | LlmError::ContextLengthExceeded { .. }
            | LlmError::ApiError { .. } => FailureKind::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_llm_error_classification() {
        assert_eq!(
            LlmError::RateLimited("x".into()).failure_kind(),
            FailureKind::RateLimited
        );
        assert_eq!(
            LlmError::ApiError {
                code: 503,
                message: "unavailable".into()
            }
            .failure_kind(),
            FailureKind::Transient
        );
        assert_eq!(
            LlmError::ApiError {
                code: 400,
                message: "bad request".into()
            }
            .failure_kind(),
            FailureKind::Other
        );
        assert_eq!(
            LlmError::ParseError("eof".into()).failure_kind(),
            FailureKind::InvalidResponse
        );
    }

    #[test]
    fn test_llm_error_display() {
        let err = LlmError::ApiError {
            code: 502,
            message: "bad gateway".into(),
        };
        assert_eq!(err.to_string(), "API error (502): bad gateway");
    }
}
