//! Pipeline orchestration for synthetic data generation.
//!
//! # Architecture
//!
//! - **Orchestrator**: sequences the five stages and computes the final status
//! - **Stages**: per-item workers wrapping one collaborator call each in
//!   retry and a shared circuit breaker
//! - **Batch**: runs workers in fixed-size concurrent groups
//! - **Progress**: per-run counters and error log
//! - **Config**: configuration for all pipeline components
//!
//! # Pipeline Flow
//!
//! 1. **Store**: questions are inserted as `pending`
//! 2. **Research**: ground truth and context are attached to each question
//! 3. **Generate**: a training example is produced per researched question
//! 4. **Review**: each example gets a verdict; approved ones are retained
//! 5. **Final storage**: retained examples are persisted
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use synth_forge::agents::Agents;
//! use synth_forge::pipeline::{PipelineConfig, PipelineOrchestrator, PipelineRequest};
//! use synth_forge::storage::{Classification, SqliteStore, TrainingType};
//!
//! let config = PipelineConfig::from_env()?.with_batch_size(5);
//! let store = SqliteStore::open(&config.database_url).await?;
//! store.run_migrations().await?;
//!
//! let orchestrator = PipelineOrchestrator::new(config, Arc::new(store), agents)?;
//! let request = PipelineRequest::new(
//!     vec!["What is a covalent bond?".to_string()],
//!     Classification::new("chemistry", "bonding", TrainingType::Sft),
//! );
//! let result = orchestrator.run_pipeline(request).await;
//! println!("{}: {} approved", result.status, result.progress.stages.approved);
//! ```

pub mod batch;
pub mod config;
pub mod orchestrator;
pub mod progress;
pub mod stages;

pub use batch::{BatchExecutor, StageReport};
pub use config::{ConfigError, PipelineConfig, DEFAULT_BATCH_SIZE, DEFAULT_DATABASE_URL};
pub use orchestrator::{
    pipeline_status, ItemResult, PendingRequest, PipelineError, PipelineOrchestrator,
    PipelineRequest, PipelineRunResult, PipelineStatus, RunStatus, RunSummary,
    StageCountsByStage,
};
pub use progress::{
    Counter, ErrorEntry, ErrorStage, GroupProgress, LoggingObserver, PipelineProgress,
    ProgressObserver, ProgressSummary, StageCounts,
};
pub use stages::{CircuitBreakers, StageOutcome, StageResult, StageWorkers};
