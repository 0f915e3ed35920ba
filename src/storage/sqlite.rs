//! SQLite-backed [`QuestionStore`].

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use crate::agents::types::{ContextSource, ResearchPayload, ReviewOutcome};

use super::migrations::MigrationRunner;
use super::types::{
    Classification, FinalRecord, PipelineStage, QuestionFilter, QuestionRecord, QuestionStatus,
    StoredRecord, TrainingType,
};
use super::{status_for_review, QuestionStore, StorageError, StorageResult};

const QUESTION_COLUMNS: &str = "id, question, topic, sub_topic, training_type, status, \
     pipeline_stage, ground_truth_context, synthesized_context, context_sources, \
     context_quality_score, review, created_at, updated_at";

/// Question store persisted in a SQLite database file.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Opens (creating if missing) the database at `location`.
    ///
    /// `location` is either a `sqlite:` URL or a plain file path.
    pub async fn open(location: &str) -> StorageResult<Self> {
        let url = if location.starts_with("sqlite:") {
            location.to_string()
        } else {
            format!("sqlite://{}", location)
        };

        let opts = SqliteConnectOptions::from_str(&url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(opts)
            .await?;

        info!(location = location, "Question store opened");
        Ok(Self { pool })
    }

    /// Wraps an existing pool.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Applies pending schema migrations. Returns how many were applied.
    pub async fn run_migrations(&self) -> StorageResult<usize> {
        Ok(MigrationRunner::new(self.pool.clone()).run_migrations().await?)
    }

    /// Returns a migration runner over this store's pool.
    pub fn migrations(&self) -> MigrationRunner {
        MigrationRunner::new(self.pool.clone())
    }

    /// Lists persisted synthetic records of one training type, newest first.
    pub async fn list_records(
        &self,
        training_type: TrainingType,
        limit: usize,
    ) -> StorageResult<Vec<StoredRecord>> {
        let rows = sqlx::query(
            "SELECT id, question_id, training_type, payload, quality_score, review_status, \
             reviewer_notes, created_at FROM synthetic_data WHERE training_type = ?1 \
             ORDER BY id DESC LIMIT ?2",
        )
        .bind(training_type.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(record_from_row).collect()
    }

    /// Closes the underlying pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn parse_column<T: FromStr<Err = E>, E: std::fmt::Display>(
    row: &SqliteRow,
    column: &str,
) -> StorageResult<T> {
    let raw: String = row.try_get(column)?;
    raw.parse()
        .map_err(|e: E| StorageError::InvalidData(format!("{}: {}", column, e)))
}

fn question_from_row(row: &SqliteRow) -> StorageResult<QuestionRecord> {
    let sources_json: String = row.try_get("context_sources")?;
    let context_sources: Vec<ContextSource> = serde_json::from_str(&sources_json)?;
    let review: Option<ReviewOutcome> = row
        .try_get::<Option<String>, _>("review")?
        .map(|json| serde_json::from_str(&json))
        .transpose()?;

    Ok(QuestionRecord {
        id: row.try_get("id")?,
        question: row.try_get("question")?,
        topic: row.try_get("topic")?,
        sub_topic: row.try_get("sub_topic")?,
        training_type: parse_column(row, "training_type")?,
        status: parse_column(row, "status")?,
        pipeline_stage: parse_column(row, "pipeline_stage")?,
        ground_truth_context: row.try_get("ground_truth_context")?,
        synthesized_context: row.try_get("synthesized_context")?,
        context_sources,
        context_quality_score: row.try_get("context_quality_score")?,
        review,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}

fn record_from_row(row: &SqliteRow) -> StorageResult<StoredRecord> {
    let payload: String = row.try_get("payload")?;
    Ok(StoredRecord {
        id: row.try_get("id")?,
        question_id: row.try_get("question_id")?,
        training_type: parse_column(row, "training_type")?,
        payload: serde_json::from_str(&payload)?,
        quality_score: row.try_get("quality_score")?,
        review_status: row.try_get("review_status")?,
        reviewer_notes: row.try_get("reviewer_notes")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}

#[async_trait]
impl QuestionStore for SqliteStore {
    async fn store_questions(
        &self,
        questions: &[String],
        classification: &Classification,
    ) -> StorageResult<Vec<i64>> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();
        let mut ids = Vec::with_capacity(questions.len());

        for question in questions {
            let result = sqlx::query(
                "INSERT INTO questions (question, topic, sub_topic, training_type, status, \
                 pipeline_stage, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            )
            .bind(question)
            .bind(&classification.topic)
            .bind(&classification.sub_topic)
            .bind(classification.training_type.as_str())
            .bind(QuestionStatus::Pending.as_str())
            .bind(PipelineStage::Pending.as_str())
            .bind(now)
            .execute(&mut *tx)
            .await?;
            ids.push(result.last_insert_rowid());
        }

        tx.commit().await?;
        debug!(count = ids.len(), "Stored questions");
        Ok(ids)
    }

    async fn get_question(&self, id: i64) -> StorageResult<Option<QuestionRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM questions WHERE id = ?1",
            QUESTION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(question_from_row).transpose()
    }

    async fn update_research_context(
        &self,
        id: i64,
        research: &ResearchPayload,
    ) -> StorageResult<()> {
        let sources = serde_json::to_string(&research.context_sources)?;
        let result = sqlx::query(
            "UPDATE questions SET ground_truth_context = ?1, synthesized_context = ?2, \
             context_sources = ?3, context_quality_score = ?4, status = ?5, \
             pipeline_stage = ?6, updated_at = ?7 WHERE id = ?8",
        )
        .bind(&research.ground_truth_context)
        .bind(&research.synthesized_context)
        .bind(sources)
        .bind(research.quality_score)
        .bind(QuestionStatus::Researched.as_str())
        .bind(PipelineStage::ReadyForGeneration.as_str())
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::QuestionNotFound(id));
        }
        Ok(())
    }

    async fn update_review(&self, id: i64, review: &ReviewOutcome) -> StorageResult<()> {
        let review_json = serde_json::to_string(review)?;
        let result = sqlx::query(
            "UPDATE questions SET review = ?1, status = ?2, pipeline_stage = ?3, \
             updated_at = ?4 WHERE id = ?5",
        )
        .bind(review_json)
        .bind(status_for_review(review).as_str())
        .bind(PipelineStage::Reviewed.as_str())
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::QuestionNotFound(id));
        }
        Ok(())
    }

    async fn store_final(
        &self,
        training_type: TrainingType,
        record: &FinalRecord,
    ) -> StorageResult<i64> {
        let question_id = record.question_id();
        let payload = serde_json::to_string(&record.record.fields)?;
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE questions SET status = ?1, pipeline_stage = ?2, updated_at = ?3 WHERE id = ?4",
        )
        .bind(QuestionStatus::Approved.as_str())
        .bind(PipelineStage::Approved.as_str())
        .bind(now)
        .bind(question_id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(StorageError::QuestionNotFound(question_id));
        }

        let inserted = sqlx::query(
            "INSERT INTO synthetic_data (question_id, training_type, payload, quality_score, \
             review_status, reviewer_notes, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(question_id)
        .bind(training_type.as_str())
        .bind(payload)
        .bind(record.review.quality_score)
        .bind(record.review.verdict.as_str())
        .bind(&record.review.reviewer_notes)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(inserted.last_insert_rowid())
    }

    async fn list_questions(&self, filter: &QuestionFilter) -> StorageResult<Vec<QuestionRecord>> {
        let mut query = format!("SELECT {} FROM questions", QUESTION_COLUMNS);
        let mut conditions = Vec::new();

        if filter.stage.is_some() {
            conditions.push("pipeline_stage = ?");
        }
        if filter.status.is_some() {
            conditions.push("status = ?");
        }
        if filter.topic.is_some() {
            conditions.push("topic = ?");
        }
        if filter.sub_topic.is_some() {
            conditions.push("sub_topic = ?");
        }
        if filter.training_type.is_some() {
            conditions.push("training_type = ?");
        }

        if !conditions.is_empty() {
            query.push_str(" WHERE ");
            query.push_str(&conditions.join(" AND "));
        }

        query.push_str(" ORDER BY id ASC");

        if filter.limit.is_some() {
            query.push_str(" LIMIT ?");
        }

        let mut sqlx_query = sqlx::query(&query);

        if let Some(stage) = filter.stage {
            sqlx_query = sqlx_query.bind(stage.as_str());
        }
        if let Some(status) = filter.status {
            sqlx_query = sqlx_query.bind(status.as_str());
        }
        if let Some(ref topic) = filter.topic {
            sqlx_query = sqlx_query.bind(topic);
        }
        if let Some(ref sub_topic) = filter.sub_topic {
            sqlx_query = sqlx_query.bind(sub_topic);
        }
        if let Some(training_type) = filter.training_type {
            sqlx_query = sqlx_query.bind(training_type.as_str());
        }
        if let Some(limit) = filter.limit {
            sqlx_query = sqlx_query.bind(limit as i64);
        }

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        rows.iter().map(question_from_row).collect()
    }
}
