//! Question and synthetic-data persistence.
//!
//! The pipeline talks to storage only through the [`QuestionStore`] trait.
//! Two implementations ship with the crate:
//!
//! - **SqliteStore**: sqlx-backed SQLite database with an idempotent
//!   migration runner
//! - **MemoryStore**: in-process store for tests and dry runs
//!
//! # Usage
//!
//! ```rust,ignore
//! use synth_forge::storage::{QuestionStore, SqliteStore, QuestionFilter, PipelineStage};
//!
//! let store = SqliteStore::open("synthetic.db").await?;
//! store.run_migrations().await?;
//!
//! let pending = store
//!     .list_questions(&QuestionFilter::new().with_stage(PipelineStage::Pending).with_limit(50))
//!     .await?;
//! ```

pub mod error;
pub mod memory;
pub mod migrations;
pub mod schema;
pub mod sqlite;
pub mod types;

use async_trait::async_trait;

use crate::agents::types::{ResearchPayload, ReviewOutcome};

pub use error::{StorageError, StorageResult};
pub use memory::MemoryStore;
pub use migrations::{AppliedMigration, MigrationError, MigrationRunner};
pub use sqlite::SqliteStore;
pub use types::{
    Classification, FinalRecord, ParseTrainingTypeError, PipelineStage, QuestionFilter,
    QuestionRecord, QuestionStatus, StoredRecord, TrainingType,
};

/// Narrow CRUD surface the pipeline needs from storage.
///
/// Implementations serialize their own writes; the pipeline may call any
/// method concurrently.
#[async_trait]
pub trait QuestionStore: Send + Sync {
    /// Inserts questions as `pending` and returns their ids in input order.
    async fn store_questions(
        &self,
        questions: &[String],
        classification: &Classification,
    ) -> StorageResult<Vec<i64>>;

    /// Fetches a question, or `None` if it does not exist.
    async fn get_question(&self, id: i64) -> StorageResult<Option<QuestionRecord>>;

    /// Attaches research output and moves the question to
    /// `researched` / `ready_for_generation`.
    async fn update_research_context(
        &self,
        id: i64,
        research: &ResearchPayload,
    ) -> StorageResult<()>;

    /// Records the review verdict and moves the question to `reviewed`.
    async fn update_review(&self, id: i64, review: &ReviewOutcome) -> StorageResult<()>;

    /// Persists an approved record and marks its question `approved`.
    /// Returns the new record id.
    async fn store_final(
        &self,
        training_type: TrainingType,
        record: &FinalRecord,
    ) -> StorageResult<i64>;

    /// Lists questions matching `filter`, oldest first.
    async fn list_questions(&self, filter: &QuestionFilter) -> StorageResult<Vec<QuestionRecord>>;
}

/// Status and stage a question moves to once reviewed.
pub(crate) fn status_for_review(review: &ReviewOutcome) -> QuestionStatus {
    use crate::agents::types::Verdict;

    match review.verdict {
        Verdict::Approved => QuestionStatus::Approved,
        Verdict::NeedsRevision => QuestionStatus::NeedsRevision,
        Verdict::Rejected => QuestionStatus::Rejected,
    }
}
