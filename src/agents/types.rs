//! Payloads exchanged with the research, generation and review agents.
//!
//! The pipeline forwards these between stages without interpreting them,
//! apart from [`ReviewOutcome::verdict`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::storage::types::{Classification, QuestionRecord, TrainingType};

/// A reference gathered while researching a question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSource {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

/// Output of the research stage, persisted on the question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchPayload {
    /// Authoritative facts the reviewer checks generated content against.
    pub ground_truth_context: String,
    /// Condensed context handed to the generator.
    pub synthesized_context: String,
    #[serde(default)]
    pub context_sources: Vec<ContextSource>,
    #[serde(default)]
    pub quality_score: Option<f64>,
}

/// A generated training example, shaped by its training type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedRecord {
    pub question_id: i64,
    pub training_type: TrainingType,
    /// Format-specific fields (`prompt`/`response`, `chosen`/`rejected`, ...).
    pub fields: Map<String, Value>,
}

impl GeneratedRecord {
    pub fn new(question_id: i64, training_type: TrainingType, fields: Map<String, Value>) -> Self {
        Self {
            question_id,
            training_type,
            fields,
        }
    }
}

/// Review decision for a generated record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Approved,
    NeedsRevision,
    Rejected,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Approved => "approved",
            Verdict::NeedsRevision => "needs_revision",
            Verdict::Rejected => "rejected",
        }
    }

    /// Whether a record with this verdict goes to final storage.
    pub fn passes_gate(&self, auto_approve: bool) -> bool {
        match self {
            Verdict::Approved => true,
            Verdict::NeedsRevision => auto_approve,
            Verdict::Rejected => false,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verdict {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace([' ', '-'], "_").as_str() {
            "approved" => Ok(Verdict::Approved),
            "needs_revision" => Ok(Verdict::NeedsRevision),
            "rejected" => Ok(Verdict::Rejected),
            other => Err(format!("unknown review verdict '{}'", other)),
        }
    }
}

/// Output of the review stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewOutcome {
    pub verdict: Verdict,
    #[serde(default)]
    pub quality_score: Option<f64>,
    #[serde(default)]
    pub reviewer_notes: Option<String>,
}

impl ReviewOutcome {
    pub fn new(verdict: Verdict) -> Self {
        Self {
            verdict,
            quality_score: None,
            reviewer_notes: None,
        }
    }

    pub fn with_quality_score(mut self, score: f64) -> Self {
        self.quality_score = Some(score);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.reviewer_notes = Some(notes.into());
        self
    }
}

/// Input to the research agent.
#[derive(Debug, Clone, PartialEq)]
pub struct ResearchTask {
    pub question_id: i64,
    pub question: String,
    pub classification: Classification,
}

/// Input to the generation agent: the researched question.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationTask {
    pub question: QuestionRecord,
    pub training_type: TrainingType,
}

/// Input to the review agent.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewTask {
    pub record: GeneratedRecord,
    /// Present only when the reviewer declares it needs ground truth.
    pub ground_truth: Option<String>,
}

/// Optional dependencies a reviewer declares up front.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReviewerCapabilities {
    /// Fetch the question's ground-truth context before reviewing.
    pub needs_ground_truth: bool,
}
