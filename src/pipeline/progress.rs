//! Per-run progress counters and error log.
//!
//! A [`PipelineProgress`] lives for one orchestrator run. Stage code bumps
//! its counters after each batch group and appends an [`ErrorEntry`] for
//! every item it drops. Observers get a [`GroupProgress`] after each group.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stage an item was dropped in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorStage {
    Research,
    Generation,
    Review,
    Storage,
}

impl ErrorStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorStage::Research => "research",
            ErrorStage::Generation => "generation",
            ErrorStage::Review => "review",
            ErrorStage::Storage => "storage",
        }
    }
}

impl fmt::Display for ErrorStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One dropped item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub question_id: i64,
    pub stage: ErrorStage,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

/// Counter that a stage advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    QuestionsAdded,
    Researched,
    Generated,
    Reviewed,
    Approved,
}

/// Stage counters of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageCounts {
    pub questions_added: usize,
    pub researched: usize,
    pub generated: usize,
    pub reviewed: usize,
    pub approved: usize,
    pub failed: usize,
}

/// Mutable progress of a single pipeline run.
///
/// Counters only move forward and `approved` never exceeds
/// `total_questions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineProgress {
    total_questions: usize,
    stages: StageCounts,
    errors: Vec<ErrorEntry>,
}

/// Compact view of a [`PipelineProgress`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSummary {
    pub total: usize,
    pub stages: StageCounts,
    /// Number of logged errors.
    pub errors: usize,
    /// `approved / total * 100`, or 0 for an empty run.
    pub completion_percentage: f64,
}

impl PipelineProgress {
    pub fn new(total_questions: usize) -> Self {
        Self {
            total_questions,
            stages: StageCounts::default(),
            errors: Vec::new(),
        }
    }

    pub fn total_questions(&self) -> usize {
        self.total_questions
    }

    pub fn stages(&self) -> &StageCounts {
        &self.stages
    }

    pub fn errors(&self) -> &[ErrorEntry] {
        &self.errors
    }

    /// Advances `counter` by `n`.
    pub fn record(&mut self, counter: Counter, n: usize) {
        match counter {
            Counter::QuestionsAdded => self.stages.questions_added += n,
            Counter::Researched => self.stages.researched += n,
            Counter::Generated => self.stages.generated += n,
            Counter::Reviewed => self.stages.reviewed += n,
            Counter::Approved => {
                self.stages.approved = (self.stages.approved + n).min(self.total_questions)
            }
        }
    }

    /// Logs a dropped item and counts it as failed.
    pub fn add_error(&mut self, question_id: i64, stage: ErrorStage, error: impl Into<String>) {
        self.errors.push(ErrorEntry {
            question_id,
            stage,
            error: error.into(),
            timestamp: Utc::now(),
        });
        self.stages.failed += 1;
    }

    pub fn completion_percentage(&self) -> f64 {
        if self.total_questions == 0 {
            return 0.0;
        }
        self.stages.approved as f64 / self.total_questions as f64 * 100.0
    }

    pub fn summary(&self) -> ProgressSummary {
        ProgressSummary {
            total: self.total_questions,
            stages: self.stages.clone(),
            errors: self.errors.len(),
            completion_percentage: self.completion_percentage(),
        }
    }
}

/// Notification sent after each batch group completes.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupProgress {
    pub stage: ErrorStage,
    /// Zero-based group index.
    pub group: usize,
    pub groups: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub summary: ProgressSummary,
}

/// Receives per-group progress. Must not block.
pub trait ProgressObserver: Send + Sync {
    fn group_completed(&self, progress: &GroupProgress);
}

/// Observer that emits one `info!` event per group.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingObserver;

impl ProgressObserver for LoggingObserver {
    fn group_completed(&self, progress: &GroupProgress) {
        tracing::info!(
            stage = %progress.stage,
            group = progress.group + 1,
            groups = progress.groups,
            succeeded = progress.succeeded,
            failed = progress.failed,
            researched = progress.summary.stages.researched,
            reviewed = progress.summary.stages.reviewed,
            approved = progress.summary.stages.approved,
            progress_pct = format!("{:.1}%", progress.summary.completion_percentage),
            "Batch group completed"
        );
    }
}
