//! synth-forge: Synthetic post-training data pipeline for LLMs.
//!
//! Questions move through research, generation, review and storage, with
//! retry and circuit breakers around every collaborator call and bounded
//! concurrent batches within each stage.

// Core modules
pub mod agents;
pub mod cli;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod resilience;
pub mod storage;
pub mod utils;

// Re-export commonly used error types
pub use agents::AgentError;
pub use error::LlmError;
pub use pipeline::{ConfigError, PipelineError};
pub use storage::StorageError;
