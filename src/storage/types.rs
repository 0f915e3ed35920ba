//! Records owned by the storage layer.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::agents::types::{ContextSource, GeneratedRecord, ReviewOutcome};

/// Post-training format a question is produced for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TrainingType {
    /// Supervised fine-tuning pairs.
    #[default]
    Sft,
    /// Direct preference optimisation triples.
    Dpo,
    /// Proximal policy optimisation prompts.
    Ppo,
    /// Group relative policy optimisation prompts.
    Grpo,
    /// Reward-model preference data.
    Rlhf,
    /// Kahneman-Tversky optimisation labels.
    Kto,
    /// Odds-ratio preference optimisation triples.
    Orpo,
    /// Multi-turn chat transcripts.
    Chat,
    /// Question answering pairs.
    Qa,
}

impl TrainingType {
    /// All training types, in declaration order.
    pub const ALL: [TrainingType; 9] = [
        TrainingType::Sft,
        TrainingType::Dpo,
        TrainingType::Ppo,
        TrainingType::Grpo,
        TrainingType::Rlhf,
        TrainingType::Kto,
        TrainingType::Orpo,
        TrainingType::Chat,
        TrainingType::Qa,
    ];

    /// Lowercase identifier stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            TrainingType::Sft => "sft",
            TrainingType::Dpo => "dpo",
            TrainingType::Ppo => "ppo",
            TrainingType::Grpo => "grpo",
            TrainingType::Rlhf => "rlhf",
            TrainingType::Kto => "kto",
            TrainingType::Orpo => "orpo",
            TrainingType::Chat => "chat",
            TrainingType::Qa => "qa",
        }
    }

    /// Fields a generated record of this type must carry.
    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            TrainingType::Sft => &["instruction", "response"],
            TrainingType::Dpo | TrainingType::Orpo => &["prompt", "chosen", "rejected"],
            TrainingType::Ppo => &["prompt", "response", "reward"],
            TrainingType::Grpo => &["prompt", "group_id", "response"],
            TrainingType::Rlhf => &["prompt"],
            TrainingType::Kto => &["prompt", "response", "is_desirable"],
            TrainingType::Chat => &["messages"],
            TrainingType::Qa => &["question", "answer"],
        }
    }
}

impl fmt::Display for TrainingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string is not a known training type.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("unknown training type '{0}' (expected one of sft, dpo, ppo, grpo, rlhf, kto, orpo, chat, qa)")]
pub struct ParseTrainingTypeError(pub String);

impl FromStr for TrainingType {
    type Err = ParseTrainingTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        TrainingType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == lowered)
            .ok_or_else(|| ParseTrainingTypeError(s.to_string()))
    }
}

/// Coarse lifecycle status of a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QuestionStatus {
    #[default]
    Pending,
    Researched,
    Approved,
    Rejected,
    NeedsRevision,
    Failed,
}

/// Fine-grained pipeline position of a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    #[default]
    Pending,
    ReadyForGeneration,
    Generated,
    Reviewed,
    Approved,
}

impl PipelineStage {
    /// Stages reported by the pipeline status query, in pipeline order.
    pub const REPORTED: [PipelineStage; 5] = [
        PipelineStage::Pending,
        PipelineStage::ReadyForGeneration,
        PipelineStage::Generated,
        PipelineStage::Reviewed,
        PipelineStage::Approved,
    ];
}

macro_rules! string_enum {
    ($ty:ident, $err:literal, { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $ty {
            /// Identifier stored in the database.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $name,)+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok($ty::$variant),)+
                    other => Err(format!(concat!($err, " '{}'"), other)),
                }
            }
        }
    };
}

string_enum!(QuestionStatus, "unknown question status", {
    Pending => "pending",
    Researched => "researched",
    Approved => "approved",
    Rejected => "rejected",
    NeedsRevision => "needs_revision",
    Failed => "failed",
});

string_enum!(PipelineStage, "unknown pipeline stage", {
    Pending => "pending",
    ReadyForGeneration => "ready_for_generation",
    Generated => "generated",
    Reviewed => "reviewed",
    Approved => "approved",
});

/// Topic classification shared by every question of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub topic: String,
    pub sub_topic: String,
    pub training_type: TrainingType,
}

impl Classification {
    pub fn new(
        topic: impl Into<String>,
        sub_topic: impl Into<String>,
        training_type: TrainingType,
    ) -> Self {
        Self {
            topic: topic.into(),
            sub_topic: sub_topic.into(),
            training_type,
        }
    }
}

/// A question and everything the pipeline has attached to it so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionRecord {
    pub id: i64,
    pub question: String,
    pub topic: String,
    pub sub_topic: String,
    pub training_type: TrainingType,
    pub status: QuestionStatus,
    pub pipeline_stage: PipelineStage,
    pub ground_truth_context: Option<String>,
    pub synthesized_context: Option<String>,
    #[serde(default)]
    pub context_sources: Vec<ContextSource>,
    pub context_quality_score: Option<f64>,
    pub review: Option<ReviewOutcome>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl QuestionRecord {
    /// Creates a fresh `pending` record.
    pub fn new(id: i64, question: impl Into<String>, classification: &Classification) -> Self {
        let now = Utc::now();
        Self {
            id,
            question: question.into(),
            topic: classification.topic.clone(),
            sub_topic: classification.sub_topic.clone(),
            training_type: classification.training_type,
            status: QuestionStatus::Pending,
            pipeline_stage: PipelineStage::Pending,
            ground_truth_context: None,
            synthesized_context: None,
            context_sources: Vec::new(),
            context_quality_score: None,
            review: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Classification of this record.
    pub fn classification(&self) -> Classification {
        Classification::new(&self.topic, &self.sub_topic, self.training_type)
    }
}

/// Filter for listing questions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuestionFilter {
    pub stage: Option<PipelineStage>,
    pub status: Option<QuestionStatus>,
    pub topic: Option<String>,
    pub sub_topic: Option<String>,
    pub training_type: Option<TrainingType>,
    pub limit: Option<usize>,
}

impl QuestionFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stage(mut self, stage: PipelineStage) -> Self {
        self.stage = Some(stage);
        self
    }

    pub fn with_status(mut self, status: QuestionStatus) -> Self {
        self.status = Some(status);
        self
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

    /// Returns true if `record` satisfies every set criterion except `limit`.
    pub fn matches(&self, record: &QuestionRecord) -> bool {
        self.stage.map_or(true, |s| record.pipeline_stage == s)
            && self.status.map_or(true, |s| record.status == s)
            && self.topic.as_deref().map_or(true, |t| record.topic == t)
            && self
                .sub_topic
                .as_deref()
                .map_or(true, |t| record.sub_topic == t)
            && self
                .training_type
                .map_or(true, |t| record.training_type == t)
    }
}

/// A reviewed record that passed the approval gate and is ready to persist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalRecord {
    pub record: GeneratedRecord,
    pub review: ReviewOutcome,
}

impl FinalRecord {
    pub fn question_id(&self) -> i64 {
        self.record.question_id
    }
}

/// A persisted synthetic training example.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: i64,
    pub question_id: i64,
    pub training_type: TrainingType,
    pub payload: serde_json::Value,
    pub quality_score: Option<f64>,
    pub review_status: String,
    pub reviewer_notes: Option<String>,
    pub created_at: DateTime<Utc>,
}
