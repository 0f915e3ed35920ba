//! Collaborator traits for the three content-producing stages.

use async_trait::async_trait;

use super::error::AgentResult;
use super::types::{
    GeneratedRecord, GenerationTask, ResearchPayload, ResearchTask, ReviewOutcome, ReviewTask,
    ReviewerCapabilities,
};

/// Gathers ground truth and context for a question.
#[async_trait]
pub trait ResearchAgent: Send + Sync {
    async fn research(&self, task: &ResearchTask) -> AgentResult<ResearchPayload>;
}

/// Produces a training example from a researched question.
#[async_trait]
pub trait GenerationAgent: Send + Sync {
    async fn generate(&self, task: &GenerationTask) -> AgentResult<GeneratedRecord>;
}

/// Judges a generated training example.
#[async_trait]
pub trait ReviewAgent: Send + Sync {
    /// Optional inputs this reviewer wants. Defaults to none.
    fn capabilities(&self) -> ReviewerCapabilities {
        ReviewerCapabilities::default()
    }

    async fn review(&self, task: &ReviewTask) -> AgentResult<ReviewOutcome>;
}
