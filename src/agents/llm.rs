//! LLM-backed research, generation and review agents.
//!
//! Each agent sends one chat completion asking for a JSON object, extracts
//! it with [`extract_json_object`] and maps it onto the stage payload.
//!
//! # Example
//!
//! ```ignore
//! use synth_forge::agents::{LlmAgentConfig, LlmResearchAgent};
//! use synth_forge::llm::LiteLlmClient;
//! use std::sync::Arc;
//!
//! let client = Arc::new(LiteLlmClient::from_env()?);
//! let researcher = LlmResearchAgent::new(client, LlmAgentConfig::default());
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::llm::{GenerationRequest, LlmProvider, Message};
use crate::utils::json_extraction::extract_json_object;

use super::error::{AgentError, AgentResult};
use super::traits::{GenerationAgent, ResearchAgent, ReviewAgent};
use super::types::{
    ContextSource, GeneratedRecord, GenerationTask, ResearchPayload, ResearchTask,
    ReviewOutcome, ReviewTask, ReviewerCapabilities, Verdict,
};

const RESEARCH_SYSTEM: &str = r#"You are a meticulous research assistant preparing ground truth for LLM training data.
Answer ONLY with a JSON object of the form:
{"ground_truth_context": "...", "synthesized_context": "...", "context_sources": [{"title": "...", "url": "...", "snippet": "..."}], "quality_score": 0.0}
ground_truth_context holds verifiable facts; synthesized_context is a concise summary for a writer; quality_score is your confidence between 0 and 1."#;

const GENERATION_SYSTEM: &str = r#"You write high-quality post-training examples.
Answer ONLY with a JSON object containing exactly the requested fields. Ground every statement in the provided context."#;

const REVIEW_SYSTEM: &str = r#"You review post-training examples for factual accuracy, clarity and format.
Answer ONLY with a JSON object of the form:
{"verdict": "approved" | "needs_revision" | "rejected", "quality_score": 0.0, "reviewer_notes": "..."}"#;

/// Sampling settings shared by the LLM-backed agents.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmAgentConfig {
    /// Model name; empty uses the client's default.
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl Default for LlmAgentConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            temperature: 0.7,
            max_tokens: 4000,
        }
    }
}

impl LlmAgentConfig {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the temperature, clamped to 0.0-2.0.
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature.clamp(0.0, 2.0);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

async fn complete_json(
    llm: &dyn LlmProvider,
    config: &LlmAgentConfig,
    temperature: f64,
    system: &str,
    prompt: String,
) -> AgentResult<Map<String, Value>> {
    let request = GenerationRequest::new(
        config.model.clone(),
        vec![Message::system(system), Message::user(prompt)],
    )
    .with_temperature(temperature)
    .with_max_tokens(config.max_tokens);

    let response = llm.generate(request).await?;
    let content = response
        .first_content()
        .ok_or_else(|| AgentError::ResponseParseError("Empty response from LLM".to_string()))?;

    extract_json_object(content).map_err(|e| AgentError::ResponseParseError(e.to_string()))
}

// ============================================================================
// Research
// ============================================================================

#[derive(Debug, Deserialize)]
struct LlmResearchResponse {
    ground_truth_context: String,
    #[serde(default)]
    synthesized_context: String,
    #[serde(default)]
    context_sources: Vec<ContextSource>,
    #[serde(default)]
    quality_score: Option<f64>,
}

/// Research agent that asks an LLM for ground truth and context.
pub struct LlmResearchAgent {
    llm_client: Arc<dyn LlmProvider>,
    config: LlmAgentConfig,
}

impl std::fmt::Debug for LlmResearchAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmResearchAgent")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl LlmResearchAgent {
    pub fn new(llm_client: Arc<dyn LlmProvider>, config: LlmAgentConfig) -> Self {
        Self { llm_client, config }
    }

    fn build_prompt(task: &ResearchTask) -> String {
        format!(
            "Topic: {}\nSub-topic: {}\nTarget format: {}\n\nResearch this question:\n{}",
            task.classification.topic,
            task.classification.sub_topic,
            task.classification.training_type,
            task.question
        )
    }
}

#[async_trait]
impl ResearchAgent for LlmResearchAgent {
    async fn research(&self, task: &ResearchTask) -> AgentResult<ResearchPayload> {
        // Research wants factual, low-variance answers.
        let temperature = self.config.temperature.min(0.3);
        let object = complete_json(
            self.llm_client.as_ref(),
            &self.config,
            temperature,
            RESEARCH_SYSTEM,
            Self::build_prompt(task),
        )
        .await?;

        let parsed: LlmResearchResponse = serde_json::from_value(Value::Object(object))?;
        if parsed.ground_truth_context.trim().is_empty() {
            return Err(AgentError::ResearchFailed(format!(
                "empty ground truth for question {}",
                task.question_id
            )));
        }

        debug!(
            question_id = task.question_id,
            sources = parsed.context_sources.len(),
            "Research complete"
        );

        Ok(ResearchPayload {
            ground_truth_context: parsed.ground_truth_context,
            synthesized_context: parsed.synthesized_context,
            context_sources: parsed.context_sources,
            quality_score: parsed.quality_score.map(|s| s.clamp(0.0, 1.0)),
        })
    }
}

// ============================================================================
// Generation
// ============================================================================

/// Generation agent producing records in the question's training format.
pub struct LlmGenerationAgent {
    llm_client: Arc<dyn LlmProvider>,
    config: LlmAgentConfig,
}

impl std::fmt::Debug for LlmGenerationAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmGenerationAgent")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl LlmGenerationAgent {
    pub fn new(llm_client: Arc<dyn LlmProvider>, config: LlmAgentConfig) -> Self {
        Self { llm_client, config }
    }

    fn build_prompt(task: &GenerationTask) -> String {
        let question = &task.question;
        format!(
            "Training format: {}\nRequired fields: {}\nTopic: {} / {}\n\nQuestion:\n{}\n\nGround truth:\n{}\n\nContext:\n{}",
            task.training_type,
            task.training_type.required_fields().join(", "),
            question.topic,
            question.sub_topic,
            question.question,
            question.ground_truth_context.as_deref().unwrap_or(""),
            question.synthesized_context.as_deref().unwrap_or(""),
        )
    }
}

#[async_trait]
impl GenerationAgent for LlmGenerationAgent {
    async fn generate(&self, task: &GenerationTask) -> AgentResult<GeneratedRecord> {
        let fields = complete_json(
            self.llm_client.as_ref(),
            &self.config,
            self.config.temperature,
            GENERATION_SYSTEM,
            Self::build_prompt(task),
        )
        .await?;

        let missing: Vec<&str> = task
            .training_type
            .required_fields()
            .iter()
            .copied()
            .filter(|field| fields.get(*field).map_or(true, Value::is_null))
            .collect();
        if !missing.is_empty() {
            return Err(AgentError::GenerationFailed(format!(
                "{} record missing fields: {}",
                task.training_type,
                missing.join(", ")
            )));
        }

        Ok(GeneratedRecord::new(
            task.question.id,
            task.training_type,
            fields,
        ))
    }
}

// ============================================================================
// Review
// ============================================================================

#[derive(Debug, Deserialize)]
struct LlmReviewResponse {
    verdict: String,
    #[serde(default)]
    quality_score: Option<f64>,
    #[serde(default)]
    reviewer_notes: Option<String>,
}

/// Review agent that checks records against the question's ground truth.
pub struct LlmReviewAgent {
    llm_client: Arc<dyn LlmProvider>,
    config: LlmAgentConfig,
}

impl std::fmt::Debug for LlmReviewAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmReviewAgent")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl LlmReviewAgent {
    pub fn new(llm_client: Arc<dyn LlmProvider>, config: LlmAgentConfig) -> Self {
        Self { llm_client, config }
    }

    fn build_prompt(task: &ReviewTask) -> AgentResult<String> {
        let record = serde_json::to_string_pretty(&task.record.fields)?;
        Ok(format!(
            "Training format: {}\n\nGround truth:\n{}\n\nRecord to review:\n{}",
            task.record.training_type,
            task.ground_truth.as_deref().unwrap_or("(none available)"),
            record
        ))
    }
}

#[async_trait]
impl ReviewAgent for LlmReviewAgent {
    fn capabilities(&self) -> ReviewerCapabilities {
        ReviewerCapabilities {
            needs_ground_truth: true,
        }
    }

    async fn review(&self, task: &ReviewTask) -> AgentResult<ReviewOutcome> {
        let object = complete_json(
            self.llm_client.as_ref(),
            &self.config,
            self.config.temperature.min(0.2),
            REVIEW_SYSTEM,
            Self::build_prompt(task)?,
        )
        .await?;

        let parsed: LlmReviewResponse = serde_json::from_value(Value::Object(object))?;
        let verdict: Verdict = parsed
            .verdict
            .parse()
            .map_err(AgentError::ReviewFailed)?;

        Ok(ReviewOutcome {
            verdict,
            quality_score: parsed.quality_score.map(|s| s.clamp(0.0, 1.0)),
            reviewer_notes: parsed.reviewer_notes,
        })
    }
}
