//! In-process [`QuestionStore`] backed by a `tokio::sync::RwLock`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::agents::types::{ResearchPayload, ReviewOutcome};

use super::types::{
    Classification, FinalRecord, PipelineStage, QuestionFilter, QuestionRecord, QuestionStatus,
    StoredRecord, TrainingType,
};
use super::{status_for_review, QuestionStore, StorageError, StorageResult};

#[derive(Debug, Default)]
struct MemoryState {
    next_question_id: i64,
    next_record_id: i64,
    questions: BTreeMap<i64, QuestionRecord>,
    records: Vec<StoredRecord>,
}

/// Volatile store used by tests and `--dry-run`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All persisted synthetic records, in insertion order.
    pub async fn stored_records(&self) -> Vec<StoredRecord> {
        self.state.read().await.records.clone()
    }

    /// Number of questions held.
    pub async fn question_count(&self) -> usize {
        self.state.read().await.questions.len()
    }
}

#[async_trait]
impl QuestionStore for MemoryStore {
    async fn store_questions(
        &self,
        questions: &[String],
        classification: &Classification,
    ) -> StorageResult<Vec<i64>> {
        let mut state = self.state.write().await;
        let mut ids = Vec::with_capacity(questions.len());
        for question in questions {
            state.next_question_id += 1;
            let id = state.next_question_id;
            state
                .questions
                .insert(id, QuestionRecord::new(id, question.as_str(), classification));
            ids.push(id);
        }
        Ok(ids)
    }

    async fn get_question(&self, id: i64) -> StorageResult<Option<QuestionRecord>> {
        Ok(self.state.read().await.questions.get(&id).cloned())
    }

    async fn update_research_context(
        &self,
        id: i64,
        research: &ResearchPayload,
    ) -> StorageResult<()> {
        let mut state = self.state.write().await;
        let question = state
            .questions
            .get_mut(&id)
            .ok_or(StorageError::QuestionNotFound(id))?;

        question.ground_truth_context = Some(research.ground_truth_context.clone());
        question.synthesized_context = Some(research.synthesized_context.clone());
        question.context_sources = research.context_sources.clone();
        question.context_quality_score = research.quality_score;
        question.status = QuestionStatus::Researched;
        question.pipeline_stage = PipelineStage::ReadyForGeneration;
        question.updated_at = Utc::now();
        Ok(())
    }

    async fn update_review(&self, id: i64, review: &ReviewOutcome) -> StorageResult<()> {
        let mut state = self.state.write().await;
        let question = state
            .questions
            .get_mut(&id)
            .ok_or(StorageError::QuestionNotFound(id))?;

        question.review = Some(review.clone());
        question.status = status_for_review(review);
        question.pipeline_stage = PipelineStage::Reviewed;
        question.updated_at = Utc::now();
        Ok(())
    }

    async fn store_final(
        &self,
        training_type: TrainingType,
        record: &FinalRecord,
    ) -> StorageResult<i64> {
        let mut state = self.state.write().await;
        let question_id = record.question_id();
        let question = state
            .questions
            .get_mut(&question_id)
            .ok_or(StorageError::QuestionNotFound(question_id))?;
        question.status = QuestionStatus::Approved;
        question.pipeline_stage = PipelineStage::Approved;
        question.updated_at = Utc::now();

        state.next_record_id += 1;
        let id = state.next_record_id;
        state.records.push(StoredRecord {
            id,
            question_id,
            training_type,
            payload: serde_json::Value::Object(record.record.fields.clone()),
            quality_score: record.review.quality_score,
            review_status: record.review.verdict.as_str().to_string(),
            reviewer_notes: record.review.reviewer_notes.clone(),
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn list_questions(&self, filter: &QuestionFilter) -> StorageResult<Vec<QuestionRecord>> {
        let state = self.state.read().await;
        let matching = state.questions.values().filter(|q| filter.matches(q)).cloned();
        Ok(match filter.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::types::{GeneratedRecord, Verdict};

    fn classification() -> Classification {
        Classification::new("biology", "cellular", TrainingType::Sft)
    }

    fn research() -> ResearchPayload {
        ResearchPayload {
            ground_truth_context: "Mitochondria produce ATP.".into(),
            synthesized_context: "Energy organelle.".into(),
            context_sources: Vec::new(),
            quality_score: Some(0.9),
        }
    }

    #[tokio::test]
    async fn test_store_and_get_questions() {
        let store = MemoryStore::new();
        let ids = store
            .store_questions(&["Q1".to_string(), "Q2".to_string()], &classification())
            .await
            .unwrap();
        assert_eq!(ids, vec![1, 2]);

        let q = store.get_question(2).await.unwrap().unwrap();
        assert_eq!(q.question, "Q2");
        assert_eq!(q.pipeline_stage, PipelineStage::Pending);
        assert!(store.get_question(3).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_lifecycle_updates() {
        let store = MemoryStore::new();
        let ids = store
            .store_questions(&["Q1".to_string()], &classification())
            .await
            .unwrap();
        let id = ids[0];

        store.update_research_context(id, &research()).await.unwrap();
        let q = store.get_question(id).await.unwrap().unwrap();
        assert_eq!(q.status, QuestionStatus::Researched);
        assert_eq!(q.pipeline_stage, PipelineStage::ReadyForGeneration);
        assert_eq!(q.ground_truth_context.as_deref(), Some("Mitochondria produce ATP."));

        let review = ReviewOutcome::new(Verdict::Approved).with_quality_score(0.8);
        store.update_review(id, &review).await.unwrap();
        assert_eq!(
            store.get_question(id).await.unwrap().unwrap().pipeline_stage,
            PipelineStage::Reviewed
        );

        let final_record = FinalRecord {
            record: GeneratedRecord::new(id, TrainingType::Sft, serde_json::Map::new()),
            review,
        };
        let record_id = store.store_final(TrainingType::Sft, &final_record).await.unwrap();
        assert_eq!(record_id, 1);

        let q = store.get_question(id).await.unwrap().unwrap();
        assert_eq!(q.status, QuestionStatus::Approved);
        assert_eq!(q.pipeline_stage, PipelineStage::Approved);
        assert_eq!(store.stored_records().await[0].review_status, "approved");
    }

    #[tokio::test]
    async fn test_update_missing_question_fails() {
        let store = MemoryStore::new();
        let err = store.update_research_context(9, &research()).await.unwrap_err();
        assert!(matches!(err, StorageError::QuestionNotFound(9)));
    }

    #[tokio::test]
    async fn test_list_questions_filters_and_limits() {
        let store = MemoryStore::new();
        let questions: Vec<String> = (1..=4).map(|i| format!("Q{}", i)).collect();
        store.store_questions(&questions, &classification()).await.unwrap();
        store
            .store_questions(
                &["Other".to_string()],
                &Classification::new("physics", "optics", TrainingType::Dpo),
            )
            .await
            .unwrap();
        store.update_research_context(1, &research()).await.unwrap();

        let pending_bio = store
            .list_questions(
                &QuestionFilter::new()
                    .with_stage(PipelineStage::Pending)
                    .with_topic("biology"),
            )
            .await
            .unwrap();
        assert_eq!(
            pending_bio.iter().map(|q| q.id).collect::<Vec<_>>(),
            vec![2, 3, 4]
        );

        let limited = store
            .list_questions(&QuestionFilter::new().with_limit(2))
            .await
            .unwrap();
        assert_eq!(limited.len(), 2);
    }
}
