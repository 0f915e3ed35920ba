//! Storage error types.

use thiserror::Error;

use crate::resilience::{Classify, FailureKind};

use super::migrations::MigrationError;

/// Errors raised by a [`QuestionStore`](super::QuestionStore).
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] MigrationError),

    #[error("Question {0} not found")]
    QuestionNotFound(i64),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid stored data: {0}")]
    InvalidData(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

impl Classify for StorageError {
    fn failure_kind(&self) -> FailureKind {
        match self {
            StorageError::Database(sqlx::Error::PoolTimedOut)
            | StorageError::Database(sqlx::Error::Io(_))
            | StorageError::Unavailable(_) => FailureKind::Transient,
            StorageError::QuestionNotFound(_) => FailureKind::NotFound,
            StorageError::Serialization(_) | StorageError::InvalidData(_) => {
                FailureKind::InvalidResponse
            }
            StorageError::Database(_) | StorageError::Migration(_) => FailureKind::Storage,
        }
    }
}

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
