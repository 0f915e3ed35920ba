//! Per-item stage workers.
//!
//! Each worker makes its collaborator calls through retry wrapped around the
//! collaborator class's shared circuit breaker, so every attempt consults
//! the breaker. Workers never return `Err`; failures come back as
//! [`StageOutcome::Failure`] with a message for the error log.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::agents::{Agents, GeneratedRecord, GenerationTask, ResearchTask, ReviewTask};
use crate::resilience::{BreakerError, CircuitBreaker, RetryPolicy};
use crate::storage::{FinalRecord, QuestionRecord, QuestionStore, StorageError, TrainingType};

use super::config::PipelineConfig;

/// Result of one worker: a payload or a failure message.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome<T> {
    Success(T),
    Failure(String),
}

impl<T> StageOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, StageOutcome::Success(_))
    }
}

/// Uniform shape returned by every stage worker.
#[derive(Debug, Clone, PartialEq)]
pub struct StageResult<T> {
    pub question_id: i64,
    pub outcome: StageOutcome<T>,
}

impl<T> StageResult<T> {
    pub fn success(question_id: i64, value: T) -> Self {
        Self {
            question_id,
            outcome: StageOutcome::Success(value),
        }
    }

    pub fn failure(question_id: i64, message: impl Into<String>) -> Self {
        Self {
            question_id,
            outcome: StageOutcome::Failure(message.into()),
        }
    }

    /// Maps the success payload, keeping failures as they are.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> StageResult<U> {
        StageResult {
            question_id: self.question_id,
            outcome: match self.outcome {
                StageOutcome::Success(value) => StageOutcome::Success(f(value)),
                StageOutcome::Failure(message) => StageOutcome::Failure(message),
            },
        }
    }
}

/// One breaker per collaborator class, shared by every worker of an
/// orchestrator.
#[derive(Debug, Clone)]
pub struct CircuitBreakers {
    pub research: Arc<CircuitBreaker>,
    pub generation: Arc<CircuitBreaker>,
    pub review: Arc<CircuitBreaker>,
    pub storage: Arc<CircuitBreaker>,
}

impl CircuitBreakers {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            research: Arc::new(CircuitBreaker::new("research", config.research_breaker.clone())),
            generation: Arc::new(CircuitBreaker::new(
                "generation",
                config.generation_breaker.clone(),
            )),
            review: Arc::new(CircuitBreaker::new("review", config.review_breaker.clone())),
            storage: Arc::new(CircuitBreaker::new("storage", config.storage_breaker.clone())),
        }
    }
}

/// Collaborators and resilience settings shared by the stage workers.
#[derive(Clone)]
pub struct StageWorkers {
    store: Arc<dyn QuestionStore>,
    agents: Agents,
    breakers: CircuitBreakers,
    agent_retry: RetryPolicy,
    storage_retry: RetryPolicy,
    guard_ground_truth_lookup: bool,
}

impl std::fmt::Debug for StageWorkers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageWorkers")
            .field("breakers", &self.breakers)
            .field("agent_retry", &self.agent_retry)
            .field("storage_retry", &self.storage_retry)
            .field("guard_ground_truth_lookup", &self.guard_ground_truth_lookup)
            .finish_non_exhaustive()
    }
}

impl StageWorkers {
    pub fn new(
        store: Arc<dyn QuestionStore>,
        agents: Agents,
        breakers: CircuitBreakers,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            store,
            agents,
            breakers,
            agent_retry: config.agent_retry.clone(),
            storage_retry: config.storage_retry.clone(),
            guard_ground_truth_lookup: config.guard_ground_truth_lookup,
        }
    }

    pub fn store(&self) -> &Arc<dyn QuestionStore> {
        &self.store
    }

    pub fn breakers(&self) -> &CircuitBreakers {
        &self.breakers
    }

    /// Runs a storage call through the storage retry policy and breaker.
    pub async fn guarded_storage<T, F, Fut>(
        &self,
        operation: &str,
        call: F,
    ) -> Result<T, BreakerError<StorageError>>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, StorageError>>,
    {
        let breaker = &self.breakers.storage;
        let call = &call;
        self.storage_retry
            .run(operation, move || breaker.call_async(call))
            .await
    }

    async fn fetch_question(&self, question_id: i64) -> Result<QuestionRecord, String> {
        let store = &self.store;
        match self
            .guarded_storage("get_question", move || store.get_question(question_id))
            .await
        {
            Ok(Some(record)) => Ok(record),
            Ok(None) => Err(format!("Question {} not found", question_id)),
            Err(err) => Err(err.to_string()),
        }
    }

    /// Researches one question and persists its context.
    pub async fn research_one(&self, question_id: i64) -> StageResult<i64> {
        let question = match self.fetch_question(question_id).await {
            Ok(q) => q,
            Err(message) => return StageResult::failure(question_id, message),
        };

        let task = ResearchTask {
            question_id,
            question: question.question.clone(),
            classification: question.classification(),
        };
        let agent = &self.agents.research;
        let breaker = &self.breakers.research;
        let task = &task;
        let payload = match self
            .agent_retry
            .run("research", move || breaker.call_async(move || agent.research(task)))
            .await
        {
            Ok(payload) => payload,
            Err(err) => {
                warn!(question_id, error = %err, "Research failed");
                return StageResult::failure(question_id, err.to_string());
            }
        };

        let store = &self.store;
        let payload = &payload;
        match self
            .guarded_storage("update_research_context", move || {
                store.update_research_context(question_id, payload)
            })
            .await
        {
            Ok(()) => {
                debug!(question_id, "Research context stored");
                StageResult::success(question_id, question_id)
            }
            Err(err) => {
                warn!(question_id, error = %err, "Failed to store research context");
                StageResult::failure(question_id, err.to_string())
            }
        }
    }

    /// Generates a training example for one researched question.
    pub async fn generate_one(
        &self,
        question_id: i64,
        training_type: TrainingType,
    ) -> StageResult<GeneratedRecord> {
        let question = match self.fetch_question(question_id).await {
            Ok(q) => q,
            Err(message) => return StageResult::failure(question_id, message),
        };

        let task = GenerationTask {
            question,
            training_type,
        };
        let agent = &self.agents.generation;
        let breaker = &self.breakers.generation;
        let task = &task;
        match self
            .agent_retry
            .run("generate", move || breaker.call_async(move || agent.generate(task)))
            .await
        {
            Ok(record) => StageResult::success(question_id, record),
            Err(err) => {
                warn!(question_id, error = %err, "Generation failed");
                StageResult::failure(question_id, err.to_string())
            }
        }
    }

    /// Reviews one generated record and persists the verdict.
    pub async fn review_one(&self, record: GeneratedRecord) -> StageResult<FinalRecord> {
        let question_id = record.question_id;

        let ground_truth = if self.agents.review.capabilities().needs_ground_truth {
            match self.ground_truth(question_id).await {
                Ok(context) => context,
                Err(message) => return StageResult::failure(question_id, message),
            }
        } else {
            None
        };

        let task = ReviewTask {
            record,
            ground_truth,
        };
        let agent = &self.agents.review;
        let breaker = &self.breakers.review;
        let task_ref = &task;
        let review = match self
            .agent_retry
            .run("review", move || breaker.call_async(move || agent.review(task_ref)))
            .await
        {
            Ok(review) => review,
            Err(err) => {
                warn!(question_id, error = %err, "Review failed");
                return StageResult::failure(question_id, err.to_string());
            }
        };

        let store = &self.store;
        let review_ref = &review;
        if let Err(err) = self
            .guarded_storage("update_review", move || store.update_review(question_id, review_ref))
            .await
        {
            warn!(question_id, error = %err, "Failed to store review verdict");
            return StageResult::failure(question_id, err.to_string());
        }

        debug!(question_id, verdict = %review.verdict, "Record reviewed");
        StageResult::success(
            question_id,
            FinalRecord {
                record: task.record,
                review,
            },
        )
    }

    /// Ground-truth context for the reviewer. Read directly unless
    /// `guard_ground_truth_lookup` is set.
    async fn ground_truth(&self, question_id: i64) -> Result<Option<String>, String> {
        let question = if self.guard_ground_truth_lookup {
            let store = &self.store;
            self.guarded_storage("get_ground_truth", move || store.get_question(question_id))
                .await
                .map_err(|err| err.to_string())?
        } else {
            self.store
                .get_question(question_id)
                .await
                .map_err(|err| err.to_string())?
        };
        Ok(question.and_then(|q| q.ground_truth_context))
    }

    /// Persists one approved record. Succeeds with the new record id.
    pub async fn store_one(
        &self,
        training_type: TrainingType,
        record: &FinalRecord,
    ) -> StageResult<i64> {
        let question_id = record.question_id();
        let store = &self.store;
        match self
            .guarded_storage("store_final", move || store.store_final(training_type, record))
            .await
        {
            Ok(id) => StageResult::success(question_id, id),
            Err(err) => {
                warn!(question_id, error = %err, "Failed to store final record");
                StageResult::failure(question_id, err.to_string())
            }
        }
    }
}
