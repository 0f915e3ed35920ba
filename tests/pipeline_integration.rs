//! End-to-end tests for the pipeline orchestrator.
//!
//! Agents are scripted per question text and storage is in memory, so every
//! test runs offline.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use synth_forge::agents::{
    AgentError, AgentResult, Agents, GeneratedRecord, GenerationAgent, GenerationTask,
    ResearchAgent, ResearchPayload, ResearchTask, ReviewAgent, ReviewOutcome, ReviewTask,
    ReviewerCapabilities, Verdict,
};
use synth_forge::pipeline::{
    ErrorStage, GroupProgress, PendingRequest, PipelineConfig, PipelineOrchestrator,
    PipelineRequest, ProgressObserver, RunStatus,
};
use synth_forge::resilience::{CircuitBreakerConfig, CircuitState, RetryPolicy};
use synth_forge::storage::{
    Classification, FinalRecord, MemoryStore, PipelineStage, QuestionFilter, QuestionRecord,
    QuestionStatus, QuestionStore, StorageError, StorageResult, TrainingType,
};

// ============================================================================
// Scripted collaborators
// ============================================================================

#[derive(Default)]
struct ScriptedResearch {
    failing: HashSet<String>,
    calls: AtomicUsize,
}

impl ScriptedResearch {
    fn failing(questions: &[&str]) -> Self {
        Self {
            failing: questions.iter().map(|q| q.to_string()).collect(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ResearchAgent for ScriptedResearch {
    async fn research(&self, task: &ResearchTask) -> AgentResult<ResearchPayload> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(&task.question) {
            return Err(AgentError::ResearchFailed(format!(
                "no sources for '{}'",
                task.question
            )));
        }
        Ok(ResearchPayload {
            ground_truth_context: format!("Ground truth for {}", task.question),
            synthesized_context: format!("Context for {}", task.question),
            context_sources: Vec::new(),
            quality_score: Some(0.9),
        })
    }
}

#[derive(Default)]
struct ScriptedGeneration {
    failing: HashSet<String>,
    panicking: HashSet<String>,
    seen_types: Mutex<Vec<TrainingType>>,
}

#[async_trait]
impl GenerationAgent for ScriptedGeneration {
    async fn generate(&self, task: &GenerationTask) -> AgentResult<GeneratedRecord> {
        let question = &task.question.question;
        self.seen_types.lock().unwrap().push(task.training_type);
        if self.panicking.contains(question) {
            panic!("generator crashed on '{}'", question);
        }
        if self.failing.contains(question) {
            return Err(AgentError::GenerationFailed("model refused".into()));
        }

        let mut fields = Map::new();
        fields.insert("instruction".into(), Value::from(question.clone()));
        fields.insert("response".into(), Value::from(format!("Answer to {}", question)));
        Ok(GeneratedRecord::new(task.question.id, task.training_type, fields))
    }
}

#[derive(Default)]
struct ScriptedReview {
    verdicts: HashMap<String, Verdict>,
    ground_truths: Mutex<Vec<Option<String>>>,
}

impl ScriptedReview {
    fn with_verdicts(verdicts: &[(&str, Verdict)]) -> Self {
        Self {
            verdicts: verdicts.iter().map(|(q, v)| (q.to_string(), *v)).collect(),
            ground_truths: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ReviewAgent for ScriptedReview {
    fn capabilities(&self) -> ReviewerCapabilities {
        ReviewerCapabilities {
            needs_ground_truth: true,
        }
    }

    async fn review(&self, task: &ReviewTask) -> AgentResult<ReviewOutcome> {
        self.ground_truths.lock().unwrap().push(task.ground_truth.clone());
        let question = task
            .record
            .fields
            .get("instruction")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let verdict = self
            .verdicts
            .get(question)
            .copied()
            .unwrap_or(Verdict::Approved);
        Ok(ReviewOutcome::new(verdict)
            .with_quality_score(0.85)
            .with_notes("scripted"))
    }
}

/// Memory store with injectable failures.
#[derive(Default)]
struct FaultyStore {
    inner: MemoryStore,
    fail_store_questions: bool,
    fail_final_for: HashSet<i64>,
    final_in_flight: AtomicUsize,
    max_final_in_flight: AtomicUsize,
}

#[async_trait]
impl QuestionStore for FaultyStore {
    async fn store_questions(
        &self,
        questions: &[String],
        classification: &Classification,
    ) -> StorageResult<Vec<i64>> {
        if self.fail_store_questions {
            return Err(StorageError::Unavailable("database is locked".into()));
        }
        self.inner.store_questions(questions, classification).await
    }

    async fn get_question(&self, id: i64) -> StorageResult<Option<QuestionRecord>> {
        self.inner.get_question(id).await
    }

    async fn update_research_context(&self, id: i64, research: &ResearchPayload) -> StorageResult<()> {
        self.inner.update_research_context(id, research).await
    }

    async fn update_review(&self, id: i64, review: &ReviewOutcome) -> StorageResult<()> {
        self.inner.update_review(id, review).await
    }

    async fn store_final(&self, training_type: TrainingType, record: &FinalRecord) -> StorageResult<i64> {
        let in_flight = self.final_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_final_in_flight.fetch_max(in_flight, Ordering::SeqCst);
        // Give any concurrent caller a chance to enter.
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }

        let stored = if self.fail_final_for.contains(&record.question_id()) {
            Err(StorageError::InvalidData("payload rejected".into()))
        } else {
            self.inner.store_final(training_type, record).await
        };
        self.final_in_flight.fetch_sub(1, Ordering::SeqCst);
        stored
    }

    async fn list_questions(&self, filter: &QuestionFilter) -> StorageResult<Vec<QuestionRecord>> {
        self.inner.list_questions(filter).await
    }
}

#[derive(Default)]
struct RecordingObserver {
    events: Mutex<Vec<GroupProgress>>,
}

impl ProgressObserver for RecordingObserver {
    fn group_completed(&self, progress: &GroupProgress) {
        self.events.lock().unwrap().push(progress.clone());
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn fast_config() -> PipelineConfig {
    PipelineConfig::default()
        .with_agent_retry(RetryPolicy::no_retry())
        .with_storage_retry(RetryPolicy::no_retry())
}

fn classification() -> Classification {
    Classification::new("chemistry", "organic", TrainingType::Sft)
}

fn questions(names: &[&str]) -> Vec<String> {
    names.iter().map(|q| q.to_string()).collect()
}

fn agents(
    research: Arc<ScriptedResearch>,
    generation: Arc<ScriptedGeneration>,
    review: Arc<ScriptedReview>,
) -> Agents {
    Agents::new(research, generation, review)
}

fn default_agents() -> Agents {
    agents(
        Arc::new(ScriptedResearch::default()),
        Arc::new(ScriptedGeneration::default()),
        Arc::new(ScriptedReview::default()),
    )
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_all_questions_approved() {
    let store = Arc::new(MemoryStore::new());
    let review = Arc::new(ScriptedReview::default());
    let orchestrator = PipelineOrchestrator::new(
        fast_config(),
        store.clone(),
        agents(
            Arc::new(ScriptedResearch::default()),
            Arc::new(ScriptedGeneration::default()),
            review.clone(),
        ),
    )
    .unwrap();

    let result = orchestrator
        .run_pipeline(PipelineRequest::new(
            questions(&["Q1", "Q2", "Q3"]),
            classification(),
        ))
        .await;

    assert_eq!(result.status, RunStatus::Success);
    assert!(!result.run_id.is_nil());
    let summary = result.summary.expect("completed runs carry a summary");
    assert_eq!(summary.total_questions, 3);
    assert_eq!(summary.researched, 3);
    assert_eq!(summary.generated, 3);
    assert_eq!(summary.reviewed, 3);
    assert_eq!(summary.approved, 3);
    assert_eq!(summary.rejected, 0);
    assert_eq!(summary.success_rate, 100.0);
    assert!(result.errors.is_empty());
    assert_eq!(result.results.len(), 3);
    assert!(result
        .results
        .iter()
        .all(|item| item.review_status == Verdict::Approved && item.quality_score == Some(0.85)));

    let records = store.stored_records().await;
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| r.training_type == TrainingType::Sft));

    let approved = store
        .list_questions(&QuestionFilter::new().with_status(QuestionStatus::Approved))
        .await
        .unwrap();
    assert_eq!(approved.len(), 3);

    // The reviewer asked for ground truth and got the researched context.
    let ground_truths = review.ground_truths.lock().unwrap();
    assert_eq!(ground_truths.len(), 3);
    assert!(ground_truths
        .iter()
        .all(|gt| gt.as_deref().is_some_and(|s| s.starts_with("Ground truth for"))));
}

#[tokio::test(start_paused = true)]
async fn test_research_failure_drops_only_that_question() {
    let store = Arc::new(MemoryStore::new());
    let research = Arc::new(ScriptedResearch::failing(&["Q2"]));
    let generation = Arc::new(ScriptedGeneration::default());
    // Real agent backoff; paused time skips the delays.
    let config = PipelineConfig::default().with_storage_retry(RetryPolicy::no_retry());
    let orchestrator = PipelineOrchestrator::new(
        config,
        store.clone(),
        agents(research.clone(), generation.clone(), Arc::new(ScriptedReview::default())),
    )
    .unwrap();

    let result = orchestrator
        .run_pipeline(PipelineRequest::new(questions(&["Q1", "Q2"]), classification()))
        .await;

    assert_eq!(result.status, RunStatus::Partial);
    // One call for Q1, three attempts for Q2.
    assert_eq!(research.calls.load(Ordering::SeqCst), 4);

    let summary = result.summary.unwrap();
    assert_eq!(summary.researched, 1);
    assert_eq!(summary.generated, 1);
    assert_eq!(summary.approved, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.success_rate, 50.0);

    let q2 = store
        .list_questions(&QuestionFilter::new().with_stage(PipelineStage::Pending))
        .await
        .unwrap();
    assert_eq!(q2.len(), 1);
    assert_eq!(q2[0].question, "Q2");

    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].stage, ErrorStage::Research);
    assert_eq!(result.errors[0].question_id, q2[0].id);
    assert!(result.errors[0].error.contains("no sources"));

    assert_eq!(generation.seen_types.lock().unwrap().len(), 1);
    assert_eq!(result.results.len(), 1);
    assert_ne!(result.results[0].question_id, q2[0].id);
}

#[tokio::test]
async fn test_research_runs_in_groups_of_batch_size() {
    let store = Arc::new(MemoryStore::new());
    let observer = Arc::new(RecordingObserver::default());
    let orchestrator =
        PipelineOrchestrator::new(fast_config().with_batch_size(5), store, default_agents())
            .unwrap()
            .with_observer(observer.clone());

    let names: Vec<String> = (1..=12).map(|i| format!("Q{}", i)).collect();
    let result = orchestrator
        .run_pipeline(PipelineRequest::new(names, classification()))
        .await;
    assert_eq!(result.status, RunStatus::Success);

    let events = observer.events.lock().unwrap();
    let research: Vec<&GroupProgress> = events
        .iter()
        .filter(|e| e.stage == ErrorStage::Research)
        .collect();
    let sizes: Vec<usize> = research.iter().map(|e| e.succeeded + e.failed).collect();
    assert_eq!(sizes, vec![5, 5, 2]);
    let researched: Vec<usize> = research
        .iter()
        .map(|e| e.summary.stages.researched)
        .collect();
    assert_eq!(researched, vec![5, 10, 12]);

    // Batched stages report every group; final storage reports once.
    for stage in [ErrorStage::Generation, ErrorStage::Review] {
        assert_eq!(events.iter().filter(|e| e.stage == stage).count(), 3);
    }
    let storage: Vec<&GroupProgress> = events
        .iter()
        .filter(|e| e.stage == ErrorStage::Storage)
        .collect();
    assert_eq!(storage.len(), 1);
    assert_eq!(storage[0].succeeded, 12);
}

#[tokio::test]
async fn test_counters_never_decrease() {
    let observer = Arc::new(RecordingObserver::default());
    let research = Arc::new(ScriptedResearch::failing(&["Q3"]));
    let generation = Arc::new(ScriptedGeneration {
        failing: ["Q5".to_string()].into_iter().collect(),
        ..ScriptedGeneration::default()
    });
    let review = Arc::new(ScriptedReview::with_verdicts(&[("Q6", Verdict::Rejected)]));
    let orchestrator = PipelineOrchestrator::new(
        fast_config().with_batch_size(2),
        Arc::new(MemoryStore::new()),
        agents(research, generation, review),
    )
    .unwrap()
    .with_observer(observer.clone());

    let names: Vec<String> = (1..=7).map(|i| format!("Q{}", i)).collect();
    let result = orchestrator
        .run_pipeline(PipelineRequest::new(names, classification()))
        .await;
    assert_eq!(result.status, RunStatus::Partial);

    let events = observer.events.lock().unwrap();
    for pair in events.windows(2) {
        let (before, after) = (&pair[0].summary.stages, &pair[1].summary.stages);
        assert!(after.researched >= before.researched);
        assert!(after.generated >= before.generated);
        assert!(after.reviewed >= before.reviewed);
        assert!(after.approved >= before.approved);
        assert!(after.failed >= before.failed);
    }

    let summary = result.summary.unwrap();
    assert!(summary.approved <= summary.total_questions);
    assert_eq!(summary.approved, 4);
    assert_eq!(summary.rejected, 1);
    assert_eq!(summary.failed, 2);
}

// ============================================================================
// Approval gating
// ============================================================================

#[tokio::test]
async fn test_only_approved_records_are_stored() {
    let store = Arc::new(MemoryStore::new());
    let review = Arc::new(ScriptedReview::with_verdicts(&[
        ("Q2", Verdict::NeedsRevision),
        ("Q3", Verdict::Rejected),
    ]));
    let orchestrator = PipelineOrchestrator::new(
        fast_config(),
        store.clone(),
        agents(
            Arc::new(ScriptedResearch::default()),
            Arc::new(ScriptedGeneration::default()),
            review,
        ),
    )
    .unwrap();

    let result = orchestrator
        .run_pipeline(PipelineRequest::new(
            questions(&["Q1", "Q2", "Q3"]),
            classification(),
        ))
        .await;

    assert_eq!(result.status, RunStatus::Partial);
    let summary = result.summary.unwrap();
    assert_eq!(summary.reviewed, 3);
    assert_eq!(summary.approved, 1);
    assert_eq!(summary.rejected, 2);
    // Policy drops are not errors.
    assert!(result.errors.is_empty());

    let records = store.stored_records().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].payload["instruction"], "Q1");

    let needs_revision = store
        .list_questions(&QuestionFilter::new().with_status(QuestionStatus::NeedsRevision))
        .await
        .unwrap();
    assert_eq!(needs_revision.len(), 1);
    assert_eq!(needs_revision[0].pipeline_stage, PipelineStage::Reviewed);
}

#[tokio::test]
async fn test_auto_approve_stores_needs_revision_but_never_rejected() {
    let store = Arc::new(MemoryStore::new());
    let review = Arc::new(ScriptedReview::with_verdicts(&[
        ("Q2", Verdict::NeedsRevision),
        ("Q3", Verdict::Rejected),
    ]));
    let orchestrator = PipelineOrchestrator::new(
        fast_config(),
        store.clone(),
        agents(
            Arc::new(ScriptedResearch::default()),
            Arc::new(ScriptedGeneration::default()),
            review,
        ),
    )
    .unwrap();

    let result = orchestrator
        .run_pipeline(
            PipelineRequest::new(questions(&["Q1", "Q2", "Q3"]), classification())
                .with_auto_approve(true),
        )
        .await;

    assert_eq!(result.summary.unwrap().approved, 2);
    let mut stored: Vec<String> = store
        .stored_records()
        .await
        .iter()
        .map(|r| r.payload["instruction"].as_str().unwrap().to_string())
        .collect();
    stored.sort();
    assert_eq!(stored, vec!["Q1", "Q2"]);

    let statuses: Vec<Verdict> = result.results.iter().map(|r| r.review_status).collect();
    assert!(statuses.contains(&Verdict::NeedsRevision));
    assert!(!statuses.contains(&Verdict::Rejected));
}

// ============================================================================
// Aborts and item-level failures
// ============================================================================

#[tokio::test]
async fn test_stage_one_failure_aborts_before_research() {
    let store = Arc::new(FaultyStore {
        fail_store_questions: true,
        ..FaultyStore::default()
    });
    let research = Arc::new(ScriptedResearch::default());
    let orchestrator = PipelineOrchestrator::new(
        fast_config(),
        store,
        agents(
            research.clone(),
            Arc::new(ScriptedGeneration::default()),
            Arc::new(ScriptedReview::default()),
        ),
    )
    .unwrap();

    let result = orchestrator
        .run_pipeline(PipelineRequest::new(questions(&["Q1"]), classification()))
        .await;

    assert_eq!(result.status, RunStatus::Error);
    assert_eq!(
        result.error.as_deref(),
        Some("Failed to add questions to database")
    );
    assert!(result.summary.is_none());
    assert_eq!(research.calls.load(Ordering::SeqCst), 0);
    assert_eq!(result.progress.stages.questions_added, 0);
}

#[tokio::test]
async fn test_empty_input_is_an_error() {
    let orchestrator =
        PipelineOrchestrator::new(fast_config(), Arc::new(MemoryStore::new()), default_agents())
            .unwrap();

    let result = orchestrator
        .run_pipeline(PipelineRequest::new(Vec::new(), classification()))
        .await;

    assert_eq!(result.status, RunStatus::Error);
    assert_eq!(
        result.error.as_deref(),
        Some("Failed to add questions to database")
    );
}

#[tokio::test]
async fn test_nothing_researched_aborts() {
    let research = Arc::new(ScriptedResearch::failing(&["Q1", "Q2"]));
    let generation = Arc::new(ScriptedGeneration::default());
    let orchestrator = PipelineOrchestrator::new(
        fast_config(),
        Arc::new(MemoryStore::new()),
        agents(research, generation.clone(), Arc::new(ScriptedReview::default())),
    )
    .unwrap();

    let result = orchestrator
        .run_pipeline(PipelineRequest::new(questions(&["Q1", "Q2"]), classification()))
        .await;

    assert_eq!(result.status, RunStatus::Error);
    assert_eq!(
        result.error.as_deref(),
        Some("No questions were successfully researched")
    );
    assert_eq!(result.errors.len(), 2);
    assert!(result.errors.iter().all(|e| e.stage == ErrorStage::Research));
    assert!(generation.seen_types.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_zero_generated_still_completes() {
    let generation = Arc::new(ScriptedGeneration {
        failing: ["Q1".to_string(), "Q2".to_string()].into_iter().collect(),
        ..ScriptedGeneration::default()
    });
    let orchestrator = PipelineOrchestrator::new(
        fast_config(),
        Arc::new(MemoryStore::new()),
        agents(
            Arc::new(ScriptedResearch::default()),
            generation,
            Arc::new(ScriptedReview::default()),
        ),
    )
    .unwrap();

    let result = orchestrator
        .run_pipeline(PipelineRequest::new(questions(&["Q1", "Q2"]), classification()))
        .await;

    assert_eq!(result.status, RunStatus::Error);
    assert!(result.error.is_none());
    let summary = result.summary.expect("stage 3 never aborts");
    assert_eq!(summary.researched, 2);
    assert_eq!(summary.generated, 0);
    assert_eq!(summary.reviewed, 0);
    assert_eq!(summary.approved, 0);
    assert_eq!(result.errors.len(), 2);
    assert!(result.errors.iter().all(|e| e.stage == ErrorStage::Generation));
}

#[tokio::test]
async fn test_generation_panic_is_captured() {
    let generation = Arc::new(ScriptedGeneration {
        panicking: ["Q2".to_string()].into_iter().collect(),
        ..ScriptedGeneration::default()
    });
    let orchestrator = PipelineOrchestrator::new(
        fast_config(),
        Arc::new(MemoryStore::new()),
        agents(
            Arc::new(ScriptedResearch::default()),
            generation,
            Arc::new(ScriptedReview::default()),
        ),
    )
    .unwrap();

    let result = orchestrator
        .run_pipeline(PipelineRequest::new(questions(&["Q1", "Q2"]), classification()))
        .await;

    assert_eq!(result.status, RunStatus::Partial);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].stage, ErrorStage::Generation);
    assert!(result.errors[0].error.contains("generator crashed"));
}

#[tokio::test]
async fn test_final_storage_failure_is_logged() {
    // Ids are assigned from 1 in insertion order.
    let store = Arc::new(FaultyStore {
        fail_final_for: [2].into_iter().collect(),
        ..FaultyStore::default()
    });
    let orchestrator =
        PipelineOrchestrator::new(fast_config(), store.clone(), default_agents()).unwrap();

    let result = orchestrator
        .run_pipeline(PipelineRequest::new(questions(&["Q1", "Q2"]), classification()))
        .await;

    assert_eq!(result.status, RunStatus::Partial);
    let summary = result.summary.unwrap();
    assert_eq!(summary.reviewed, 2);
    assert_eq!(summary.approved, 1);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].stage, ErrorStage::Storage);
    assert_eq!(result.errors[0].question_id, 2);
    assert_eq!(store.inner.stored_records().await.len(), 1);
}

#[tokio::test]
async fn test_final_storage_is_sequential_and_ordered() {
    let store = Arc::new(FaultyStore {
        fail_final_for: [3].into_iter().collect(),
        ..FaultyStore::default()
    });
    let orchestrator = PipelineOrchestrator::new(
        fast_config().with_batch_size(5),
        store.clone(),
        default_agents(),
    )
    .unwrap();

    let result = orchestrator
        .run_pipeline(PipelineRequest::new(
            questions(&["Q1", "Q2", "Q3", "Q4", "Q5"]),
            classification(),
        ))
        .await;

    assert_eq!(store.max_final_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(result.summary.unwrap().approved, 4);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].stage, ErrorStage::Storage);

    // Results follow the order records were persisted in.
    let stored: Vec<i64> = store
        .inner
        .stored_records()
        .await
        .iter()
        .map(|r| r.question_id)
        .collect();
    let reported: Vec<i64> = result.results.iter().map(|r| r.question_id).collect();
    assert_eq!(reported, stored);
    let generated: Vec<i64> = result.results.iter().map(|r| r.generated_id).collect();
    assert_eq!(generated, vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn test_open_breaker_fails_fast_across_items() {
    let research = Arc::new(ScriptedResearch::failing(&["Q1", "Q2", "Q3"]));
    let config = fast_config()
        .with_batch_size(1)
        .with_agent_breakers(CircuitBreakerConfig::new(2, Duration::from_secs(60)));
    let orchestrator = PipelineOrchestrator::new(
        config,
        Arc::new(MemoryStore::new()),
        agents(
            research.clone(),
            Arc::new(ScriptedGeneration::default()),
            Arc::new(ScriptedReview::default()),
        ),
    )
    .unwrap();

    let result = orchestrator
        .run_pipeline(PipelineRequest::new(
            questions(&["Q1", "Q2", "Q3"]),
            classification(),
        ))
        .await;

    assert_eq!(result.status, RunStatus::Error);
    // The third question never reached the agent.
    assert_eq!(research.calls.load(Ordering::SeqCst), 2);
    assert_eq!(orchestrator.breakers().research.state(), CircuitState::Open);
    assert!(result.errors[2].error.contains("OPEN"));
}

#[tokio::test]
async fn test_max_questions_truncates_input() {
    let store = Arc::new(MemoryStore::new());
    let orchestrator =
        PipelineOrchestrator::new(fast_config(), store.clone(), default_agents()).unwrap();

    let result = orchestrator
        .run_pipeline(
            PipelineRequest::new(questions(&["Q1", "Q2", "Q3", "Q4"]), classification())
                .with_max_questions(2),
        )
        .await;

    assert_eq!(result.status, RunStatus::Success);
    assert_eq!(result.summary.unwrap().total_questions, 2);
    assert_eq!(store.question_count().await, 2);
}

// ============================================================================
// Auxiliary entry points
// ============================================================================

#[tokio::test]
async fn test_process_pending_uses_stored_questions() {
    let store = Arc::new(MemoryStore::new());
    let ids = store
        .store_questions(
            &questions(&["What is a gene?", "What is DNA?"]),
            &Classification::new("biology", "genetics", TrainingType::Qa),
        )
        .await
        .unwrap();
    let generation = Arc::new(ScriptedGeneration::default());
    let orchestrator = PipelineOrchestrator::new(
        fast_config(),
        store.clone(),
        agents(
            Arc::new(ScriptedResearch::default()),
            generation.clone(),
            Arc::new(ScriptedReview::default()),
        ),
    )
    .unwrap();

    let result = orchestrator
        .process_pending(PendingRequest::new().with_topic("biology"))
        .await;

    assert_eq!(result.status, RunStatus::Success);
    assert_eq!(result.summary.unwrap().approved, 2);
    // No duplicate questions were inserted.
    assert_eq!(store.question_count().await, 2);
    assert_eq!(result.progress.stages.questions_added, 0);
    let mut stored_ids: Vec<i64> = result.results.iter().map(|r| r.question_id).collect();
    stored_ids.sort();
    assert_eq!(stored_ids, ids);
    // Training type comes from the stored questions.
    assert!(generation
        .seen_types
        .lock()
        .unwrap()
        .iter()
        .all(|t| *t == TrainingType::Qa));

    let again = orchestrator.process_pending(PendingRequest::new()).await;
    assert_eq!(again.status, RunStatus::Success);
    assert_eq!(again.message.as_deref(), Some("No pending questions found"));
}

#[tokio::test]
async fn test_process_pending_honors_filters() {
    let store = Arc::new(MemoryStore::new());
    store
        .store_questions(&questions(&["Q1"]), &classification())
        .await
        .unwrap();
    store
        .store_questions(
            &questions(&["Q2", "Q3"]),
            &Classification::new("physics", "optics", TrainingType::Sft),
        )
        .await
        .unwrap();
    let generation = Arc::new(ScriptedGeneration::default());
    let orchestrator = PipelineOrchestrator::new(
        fast_config(),
        store.clone(),
        agents(
            Arc::new(ScriptedResearch::default()),
            generation.clone(),
            Arc::new(ScriptedReview::default()),
        ),
    )
    .unwrap();

    let result = orchestrator
        .process_pending(
            PendingRequest::new()
                .with_topic("physics")
                .with_limit(1)
                .with_training_type(TrainingType::Dpo),
        )
        .await;

    assert_eq!(result.summary.unwrap().total_questions, 1);
    assert_eq!(*generation.seen_types.lock().unwrap(), vec![TrainingType::Dpo]);

    let status = orchestrator.get_pipeline_status(None, None).await.unwrap();
    assert_eq!(status.stages.pending, 2);
    assert_eq!(status.stages.approved, 1);
}

#[tokio::test]
async fn test_resume_failed_with_nothing_pending() {
    let orchestrator =
        PipelineOrchestrator::new(fast_config(), Arc::new(MemoryStore::new()), default_agents())
            .unwrap();

    let result = orchestrator.resume_failed(PendingRequest::new()).await;

    assert_eq!(result.status, RunStatus::Success);
    assert_eq!(result.message.as_deref(), Some("No failed questions to resume"));
    assert!(result.results.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_resume_failed_picks_up_research_failures() {
    let store = Arc::new(MemoryStore::new());
    let first = PipelineOrchestrator::new(
        fast_config(),
        store.clone(),
        agents(
            Arc::new(ScriptedResearch::failing(&["Q2"])),
            Arc::new(ScriptedGeneration::default()),
            Arc::new(ScriptedReview::default()),
        ),
    )
    .unwrap();
    let result = first
        .run_pipeline(PipelineRequest::new(questions(&["Q1", "Q2"]), classification()))
        .await;
    assert_eq!(result.status, RunStatus::Partial);

    let second =
        PipelineOrchestrator::new(fast_config(), store.clone(), default_agents()).unwrap();
    let resumed = second.resume_failed(PendingRequest::new()).await;

    assert_eq!(resumed.status, RunStatus::Success);
    assert_eq!(resumed.summary.unwrap().total_questions, 1);
    assert_eq!(store.stored_records().await.len(), 2);
}

#[tokio::test]
async fn test_pipeline_status_counts_per_stage() {
    let store = Arc::new(MemoryStore::new());
    store
        .store_questions(&questions(&["Q1", "Q2"]), &classification())
        .await
        .unwrap();
    let ids = store
        .store_questions(
            &questions(&["Q3"]),
            &Classification::new("chemistry", "inorganic", TrainingType::Sft),
        )
        .await
        .unwrap();
    store
        .update_research_context(
            ids[0],
            &ResearchPayload {
                ground_truth_context: "facts".into(),
                synthesized_context: "summary".into(),
                context_sources: Vec::new(),
                quality_score: None,
            },
        )
        .await
        .unwrap();

    let orchestrator =
        PipelineOrchestrator::new(fast_config(), store, default_agents()).unwrap();

    let all = orchestrator.get_pipeline_status(None, None).await.unwrap();
    assert_eq!(all.stages.pending, 2);
    assert_eq!(all.stages.ready_for_generation, 1);
    assert_eq!(all.stages.generated, 0);

    let organic = orchestrator
        .get_pipeline_status(Some("chemistry"), Some("organic"))
        .await
        .unwrap();
    assert_eq!(organic.stages.pending, 2);
    assert_eq!(organic.stages.ready_for_generation, 0);
    assert_eq!(organic.topic.as_deref(), Some("chemistry"));

    let json = serde_json::to_value(&all).unwrap();
    assert_eq!(json["stages"]["ready_for_generation"], 1);
}
