//! Pipeline orchestrator for synthetic data generation.
//!
//! This module provides the main `PipelineOrchestrator` that sequences:
//! - Question storage
//! - Research (batched)
//! - Generation (batched)
//! - Review and approval gating (batched)
//! - Final storage of approved records (sequential)
//!
//! Stage 1 or 2 producing nothing aborts the run. Every other failure is
//! item-level: logged to the run's progress and dropped from later stages.

use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::agents::{Agents, GeneratedRecord, Verdict};
use crate::storage::{
    Classification, FinalRecord, PipelineStage, QuestionFilter, QuestionStore, StorageError,
    TrainingType,
};

use super::batch::{BatchExecutor, StageReport};
use super::config::{ConfigError, PipelineConfig};
use super::progress::{
    Counter, ErrorEntry, ErrorStage, GroupProgress, LoggingObserver, PipelineProgress,
    ProgressObserver, ProgressSummary,
};
use super::stages::{CircuitBreakers, StageOutcome, StageWorkers};

/// Errors that end a pipeline run early.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Storage error outside the per-item stages.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Stage 1 stored no questions.
    #[error("Failed to add questions to database")]
    NoQuestionsStored,

    /// Stage 2 researched no questions.
    #[error("No questions were successfully researched")]
    NothingResearched,
}

/// Final status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Every input question was approved and stored.
    Success,
    /// Some, but not all, questions were approved and stored.
    Partial,
    /// Nothing was stored, or the run aborted.
    Error,
}

impl RunStatus {
    /// Status for `approved` stored records out of `total` questions.
    pub fn from_counts(approved: usize, total: usize) -> Self {
        if approved == 0 {
            RunStatus::Error
        } else if approved >= total {
            RunStatus::Success
        } else {
            RunStatus::Partial
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Success => write!(f, "success"),
            RunStatus::Partial => write!(f, "partial"),
            RunStatus::Error => write!(f, "error"),
        }
    }
}

/// Input to [`PipelineOrchestrator::run_pipeline`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRequest {
    pub questions: Vec<String>,
    pub classification: Classification,
    /// Keep only the first `max_questions` questions.
    #[serde(default)]
    pub max_questions: Option<usize>,
    /// Overrides the configured auto-approve setting.
    #[serde(default)]
    pub auto_approve: Option<bool>,
    /// Overrides the configured batch size.
    #[serde(default)]
    pub batch_size: Option<usize>,
}

impl PipelineRequest {
    pub fn new(questions: Vec<String>, classification: Classification) -> Self {
        Self {
            questions,
            classification,
            max_questions: None,
            auto_approve: None,
            batch_size: None,
        }
    }

    pub fn with_max_questions(mut self, max: usize) -> Self {
        self.max_questions = Some(max);
        self
    }

    pub fn with_auto_approve(mut self, auto_approve: bool) -> Self {
        self.auto_approve = Some(auto_approve);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }
}

/// Filters for pulling already-stored `pending` questions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PendingRequest {
    pub topic: Option<String>,
    pub sub_topic: Option<String>,
    /// Training type to generate; defaults to that of the first pulled question.
    pub training_type: Option<TrainingType>,
    pub limit: Option<usize>,
    pub auto_approve: Option<bool>,
}

impl PendingRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    pub fn with_sub_topic(mut self, sub_topic: impl Into<String>) -> Self {
        self.sub_topic = Some(sub_topic.into());
        self
    }

    pub fn with_training_type(mut self, training_type: TrainingType) -> Self {
        self.training_type = Some(training_type);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_auto_approve(mut self, auto_approve: bool) -> Self {
        self.auto_approve = Some(auto_approve);
        self
    }

    fn filter(&self) -> QuestionFilter {
        let mut filter = QuestionFilter::new().with_stage(PipelineStage::Pending);
        filter.topic = self.topic.clone();
        filter.sub_topic = self.sub_topic.clone();
        filter.limit = self.limit;
        filter
    }
}

/// One stored training example.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemResult {
    pub question_id: i64,
    pub generated_id: i64,
    pub quality_score: Option<f64>,
    pub review_status: Verdict,
}

fn item_result(record: &FinalRecord, generated_id: i64) -> ItemResult {
    ItemResult {
        question_id: record.question_id(),
        generated_id,
        quality_score: record.review.quality_score,
        review_status: record.review.verdict,
    }
}

/// Aggregate statistics of a completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total_questions: usize,
    pub researched: usize,
    pub generated: usize,
    pub reviewed: usize,
    pub approved: usize,
    /// Reviewed but not stored.
    pub rejected: usize,
    pub failed: usize,
    /// `approved / total_questions * 100`.
    pub success_rate: f64,
}

impl RunSummary {
    pub fn from_progress(progress: &PipelineProgress) -> Self {
        let stages = progress.stages();
        Self {
            total_questions: progress.total_questions(),
            researched: stages.researched,
            generated: stages.generated,
            reviewed: stages.reviewed,
            approved: stages.approved,
            rejected: stages.reviewed.saturating_sub(stages.approved),
            failed: stages.failed,
            success_rate: progress.completion_percentage(),
        }
    }
}

/// Outcome of a pipeline entry point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRunResult {
    /// Identifies the run in logs.
    pub run_id: Uuid,
    pub status: RunStatus,
    pub progress: ProgressSummary,
    pub results: Vec<ItemResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<RunSummary>,
    pub errors: Vec<ErrorEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl PipelineRunResult {
    fn completed(progress: &PipelineProgress, results: Vec<ItemResult>) -> Self {
        Self {
            run_id: Uuid::nil(),
            status: RunStatus::from_counts(progress.stages().approved, progress.total_questions()),
            progress: progress.summary(),
            results,
            summary: Some(RunSummary::from_progress(progress)),
            errors: progress.errors().to_vec(),
            error: None,
            message: None,
        }
    }

    fn aborted(error: &PipelineError, progress: &PipelineProgress) -> Self {
        Self {
            run_id: Uuid::nil(),
            status: RunStatus::Error,
            progress: progress.summary(),
            results: Vec::new(),
            summary: None,
            errors: progress.errors().to_vec(),
            error: Some(error.to_string()),
            message: None,
        }
    }

    fn nothing_to_do(message: &str) -> Self {
        Self {
            run_id: Uuid::nil(),
            status: RunStatus::Success,
            progress: PipelineProgress::new(0).summary(),
            results: Vec::new(),
            summary: None,
            errors: Vec::new(),
            error: None,
            message: Some(message.to_string()),
        }
    }
}

/// Question counts per pipeline stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageCountsByStage {
    pub pending: usize,
    pub ready_for_generation: usize,
    pub generated: usize,
    pub reviewed: usize,
    pub approved: usize,
}

impl StageCountsByStage {
    fn set(&mut self, stage: PipelineStage, count: usize) {
        match stage {
            PipelineStage::Pending => self.pending = count,
            PipelineStage::ReadyForGeneration => self.ready_for_generation = count,
            PipelineStage::Generated => self.generated = count,
            PipelineStage::Reviewed => self.reviewed = count,
            PipelineStage::Approved => self.approved = count,
        }
    }
}

/// Result of [`PipelineOrchestrator::get_pipeline_status`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineStatus {
    pub stages: StageCountsByStage,
    pub topic: Option<String>,
    pub sub_topic: Option<String>,
}

/// Counts questions per pipeline stage in `store`.
pub async fn pipeline_status(
    store: &dyn QuestionStore,
    topic: Option<&str>,
    sub_topic: Option<&str>,
) -> Result<PipelineStatus, PipelineError> {
    let mut counts = StageCountsByStage::default();
    for stage in PipelineStage::REPORTED {
        let mut filter = QuestionFilter::new().with_stage(stage);
        filter.topic = topic.map(str::to_string);
        filter.sub_topic = sub_topic.map(str::to_string);
        counts.set(stage, store.list_questions(&filter).await?.len());
    }

    Ok(PipelineStatus {
        stages: counts,
        topic: topic.map(str::to_string),
        sub_topic: sub_topic.map(str::to_string),
    })
}

/// Runs `run` inside a span carrying a fresh run id, and stamps the id on
/// the result.
async fn traced(run: impl Future<Output = PipelineRunResult>) -> PipelineRunResult {
    let run_id = Uuid::new_v4();
    let mut result = run
        .instrument(info_span!("pipeline_run", run_id = %run_id))
        .await;
    result.run_id = run_id;
    result
}

/// Sequences the pipeline stages over a question store and agents.
///
/// Circuit breakers live as long as the orchestrator and are shared by
/// every run it executes.
pub struct PipelineOrchestrator {
    config: PipelineConfig,
    workers: StageWorkers,
    observer: Arc<dyn ProgressObserver>,
}

impl std::fmt::Debug for PipelineOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineOrchestrator")
            .field("config", &self.config)
            .field("workers", &self.workers)
            .finish_non_exhaustive()
    }
}

impl PipelineOrchestrator {
    /// Creates an orchestrator with fresh breakers built from `config`.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Config` if the configuration is invalid.
    pub fn new(
        config: PipelineConfig,
        store: Arc<dyn QuestionStore>,
        agents: Agents,
    ) -> Result<Self, PipelineError> {
        let breakers = CircuitBreakers::from_config(&config);
        Self::with_breakers(config, store, agents, breakers)
    }

    /// Creates an orchestrator that shares externally owned breakers.
    pub fn with_breakers(
        config: PipelineConfig,
        store: Arc<dyn QuestionStore>,
        agents: Agents,
        breakers: CircuitBreakers,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        let workers = StageWorkers::new(store, agents, breakers, &config);
        Ok(Self {
            config,
            workers,
            observer: Arc::new(LoggingObserver),
        })
    }

    /// Replaces the per-group progress observer.
    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn breakers(&self) -> &CircuitBreakers {
        self.workers.breakers()
    }

    /// Runs new questions through all five stages.
    pub async fn run_pipeline(&self, request: PipelineRequest) -> PipelineRunResult {
        traced(self.execute_pipeline(request)).await
    }

    /// Runs `pending` questions already in storage through stages 2-5.
    ///
    /// The questions are adopted by id, not re-inserted, so `questions_added`
    /// stays 0 in the returned progress.
    pub async fn process_pending(&self, request: PendingRequest) -> PipelineRunResult {
        traced(self.execute_pending(request, "No pending questions found")).await
    }

    /// Retries questions left in the `pending` stage.
    ///
    /// Failed items are not tracked separately, so this pulls the same
    /// questions as [`process_pending`](Self::process_pending).
    pub async fn resume_failed(&self, request: PendingRequest) -> PipelineRunResult {
        info!("Resuming failed questions from the pending stage");
        traced(self.execute_pending(request, "No failed questions to resume")).await
    }

    /// Counts questions per pipeline stage, optionally filtered by topic.
    pub async fn get_pipeline_status(
        &self,
        topic: Option<&str>,
        sub_topic: Option<&str>,
    ) -> Result<PipelineStatus, PipelineError> {
        pipeline_status(self.workers.store().as_ref(), topic, sub_topic).await
    }

    async fn execute_pipeline(&self, request: PipelineRequest) -> PipelineRunResult {
        let mut questions = request.questions;
        if let Some(max) = request.max_questions {
            questions.truncate(max);
        }

        let mut progress = PipelineProgress::new(questions.len());
        let classification = request.classification;
        info!(
            questions = questions.len(),
            topic = %classification.topic,
            sub_topic = %classification.sub_topic,
            training_type = %classification.training_type,
            "Starting pipeline run"
        );

        let ids = match self
            .store_questions(&questions, &classification, &mut progress)
            .await
        {
            Ok(ids) => ids,
            Err(err) => {
                warn!(error = %err, "Pipeline aborted");
                return PipelineRunResult::aborted(&err, &progress);
            }
        };

        self.run_stored(
            ids,
            classification.training_type,
            request.auto_approve.unwrap_or(self.config.auto_approve),
            request.batch_size.unwrap_or(self.config.batch_size),
            progress,
        )
        .await
    }

    async fn execute_pending(
        &self,
        request: PendingRequest,
        empty_message: &str,
    ) -> PipelineRunResult {
        let pending = match self.workers.store().list_questions(&request.filter()).await {
            Ok(pending) => pending,
            Err(err) => {
                let err = PipelineError::from(err);
                warn!(error = %err, "Failed to list pending questions");
                return PipelineRunResult::aborted(&err, &PipelineProgress::new(0));
            }
        };

        let Some(first) = pending.first() else {
            info!("{}", empty_message);
            return PipelineRunResult::nothing_to_do(empty_message);
        };

        let training_type = request.training_type.unwrap_or(first.training_type);
        let ids: Vec<i64> = pending.iter().map(|q| q.id).collect();
        info!(
            questions = ids.len(),
            topic = %request.topic.as_deref().unwrap_or(&first.topic),
            sub_topic = %request.sub_topic.as_deref().unwrap_or(&first.sub_topic),
            training_type = %training_type,
            "Processing pending questions"
        );

        self.run_stored(
            ids.clone(),
            training_type,
            request.auto_approve.unwrap_or(self.config.auto_approve),
            self.config.batch_size,
            PipelineProgress::new(ids.len()),
        )
        .await
    }

    /// Stage 1: persists the questions through retry and the storage breaker.
    async fn store_questions(
        &self,
        questions: &[String],
        classification: &Classification,
        progress: &mut PipelineProgress,
    ) -> Result<Vec<i64>, PipelineError> {
        let store = self.workers.store();
        let ids = match self
            .workers
            .guarded_storage("store_questions", move || {
                store.store_questions(questions, classification)
            })
            .await
        {
            Ok(ids) => ids,
            Err(err) => {
                warn!(error = %err, "Failed to store questions");
                Vec::new()
            }
        };

        if ids.is_empty() {
            return Err(PipelineError::NoQuestionsStored);
        }

        progress.record(Counter::QuestionsAdded, ids.len());
        info!(stored = ids.len(), "Stage 1/5: questions stored");
        Ok(ids)
    }

    async fn run_stored(
        &self,
        ids: Vec<i64>,
        training_type: TrainingType,
        auto_approve: bool,
        batch_size: usize,
        mut progress: PipelineProgress,
    ) -> PipelineRunResult {
        let executor = BatchExecutor::new(batch_size);
        match self
            .run_stages(&executor, ids, training_type, auto_approve, &mut progress)
            .await
        {
            Ok(results) => {
                let result = PipelineRunResult::completed(&progress, results);
                info!(
                    status = %result.status,
                    approved = progress.stages().approved,
                    total = progress.total_questions(),
                    failed = progress.stages().failed,
                    "Pipeline run finished"
                );
                result
            }
            Err(err) => {
                warn!(error = %err, "Pipeline aborted");
                PipelineRunResult::aborted(&err, &progress)
            }
        }
    }

    /// Stages 2-5.
    async fn run_stages(
        &self,
        executor: &BatchExecutor,
        ids: Vec<i64>,
        training_type: TrainingType,
        auto_approve: bool,
        progress: &mut PipelineProgress,
    ) -> Result<Vec<ItemResult>, PipelineError> {
        let workers = &self.workers;
        let observer = &*self.observer;
        let total = ids.len();

        let researched = executor
            .run(
                ids,
                |id| *id,
                move |id| workers.research_one(id),
                StageReport::new(ErrorStage::Research, Counter::Researched),
                progress,
                observer,
            )
            .await;
        info!(researched = researched.len(), total, "Stage 2/5: research complete");
        if researched.is_empty() {
            return Err(PipelineError::NothingResearched);
        }

        let generated = executor
            .run(
                researched,
                |id| *id,
                move |id| workers.generate_one(id, training_type),
                StageReport::new(ErrorStage::Generation, Counter::Generated),
                progress,
                observer,
            )
            .await;
        info!(generated = generated.len(), "Stage 3/5: generation complete");

        let reviewed = executor
            .run(
                generated,
                |record: &GeneratedRecord| record.question_id,
                move |record| workers.review_one(record),
                StageReport::new(ErrorStage::Review, Counter::Reviewed),
                progress,
                observer,
            )
            .await;
        let reviewed_count = reviewed.len();
        let retained: Vec<FinalRecord> = reviewed
            .into_iter()
            .filter(|record| record.review.verdict.passes_gate(auto_approve))
            .collect();
        info!(
            reviewed = reviewed_count,
            retained = retained.len(),
            auto_approve,
            "Stage 4/5: review complete"
        );

        let results = self
            .store_retained(retained, training_type, progress)
            .await;
        info!(stored = results.len(), "Stage 5/5: final storage complete");

        Ok(results)
    }

    /// Stage 5: persists retained records one at a time, in review order.
    async fn store_retained(
        &self,
        retained: Vec<FinalRecord>,
        training_type: TrainingType,
        progress: &mut PipelineProgress,
    ) -> Vec<ItemResult> {
        let mut results = Vec::with_capacity(retained.len());
        let mut failed = 0;
        for record in &retained {
            let stored = self.workers.store_one(training_type, record).await;
            match stored.outcome {
                StageOutcome::Success(generated_id) => {
                    progress.record(Counter::Approved, 1);
                    results.push(item_result(record, generated_id));
                }
                StageOutcome::Failure(message) => {
                    warn!(question_id = stored.question_id, error = %message, "Item dropped");
                    progress.add_error(stored.question_id, ErrorStage::Storage, message);
                    failed += 1;
                }
            }
        }

        self.observer.group_completed(&GroupProgress {
            stage: ErrorStage::Storage,
            group: 0,
            groups: 1,
            succeeded: results.len(),
            failed,
            summary: progress.summary(),
        });
        results
    }
}
