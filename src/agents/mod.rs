//! Content-producing collaborators: research, generation and review.
//!
//! The pipeline depends only on the [`ResearchAgent`], [`GenerationAgent`]
//! and [`ReviewAgent`] traits. The `llm` module provides implementations
//! backed by any [`LlmProvider`](crate::llm::LlmProvider).

pub mod error;
pub mod llm;
pub mod traits;
pub mod types;

use std::sync::Arc;

pub use error::{AgentError, AgentResult};
pub use llm::{LlmAgentConfig, LlmGenerationAgent, LlmResearchAgent, LlmReviewAgent};
pub use traits::{GenerationAgent, ResearchAgent, ReviewAgent};
pub use types::{
    ContextSource, GeneratedRecord, GenerationTask, ResearchPayload, ResearchTask,
    ReviewOutcome, ReviewTask, ReviewerCapabilities, Verdict,
};

/// The three stage collaborators, shared by every worker of a run.
#[derive(Clone)]
pub struct Agents {
    pub research: Arc<dyn ResearchAgent>,
    pub generation: Arc<dyn GenerationAgent>,
    pub review: Arc<dyn ReviewAgent>,
}

impl std::fmt::Debug for Agents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agents").finish_non_exhaustive()
    }
}

impl Agents {
    pub fn new(
        research: Arc<dyn ResearchAgent>,
        generation: Arc<dyn GenerationAgent>,
        review: Arc<dyn ReviewAgent>,
    ) -> Self {
        Self {
            research,
            generation,
            review,
        }
    }

    /// LLM-backed agents sharing one provider.
    pub fn from_llm(llm: Arc<dyn crate::llm::LlmProvider>, config: LlmAgentConfig) -> Self {
        Self::new(
            Arc::new(LlmResearchAgent::new(llm.clone(), config.clone())),
            Arc::new(LlmGenerationAgent::new(llm.clone(), config.clone())),
            Arc::new(LlmReviewAgent::new(llm, config)),
        )
    }
}
