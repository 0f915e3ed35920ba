//! Pipeline configuration module.
//!
//! Provides configuration structures for the synthetic data pipeline,
//! with support for loading from environment variables.

use std::time::Duration;

use thiserror::Error;

use crate::llm::DEFAULT_MODEL;
use crate::resilience::{CircuitBreakerConfig, RetryPolicy};

/// Default number of questions processed concurrently per group.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Default database location.
pub const DEFAULT_DATABASE_URL: &str = "synthetic_data.db";

/// Errors that can occur during configuration loading or validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Invalid value for a configuration field.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration for a pipeline orchestrator.
///
/// Retry policies and breaker thresholds are per collaborator class. The
/// breakers themselves are built from these values once per orchestrator.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum questions processed concurrently within a stage.
    pub batch_size: usize,

    /// Whether `needs_revision` verdicts are stored as if approved.
    pub auto_approve: bool,

    /// Retry policy for research, generation and review calls.
    pub agent_retry: RetryPolicy,

    /// Retry policy for storage calls.
    pub storage_retry: RetryPolicy,

    pub research_breaker: CircuitBreakerConfig,
    pub generation_breaker: CircuitBreakerConfig,
    pub review_breaker: CircuitBreakerConfig,
    pub storage_breaker: CircuitBreakerConfig,

    /// Route the review-stage ground-truth read through retry and the
    /// storage breaker instead of reading directly.
    pub guard_ground_truth_lookup: bool,

    /// SQLite path or `sqlite:` URL.
    pub database_url: String,

    /// Model used by the LLM-backed agents.
    pub model: String,

    /// Sampling temperature for generation.
    pub temperature: f64,

    /// Completion token limit for agent calls.
    pub max_tokens: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            auto_approve: false,
            agent_retry: RetryPolicy::for_agents(),
            storage_retry: RetryPolicy::for_storage(),
            research_breaker: CircuitBreakerConfig::default(),
            generation_breaker: CircuitBreakerConfig::default(),
            review_breaker: CircuitBreakerConfig::default(),
            storage_breaker: CircuitBreakerConfig::new(3, Duration::from_secs(30)),
            guard_ground_truth_lookup: false,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.7,
            max_tokens: 4000,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `DATABASE_URL`: SQLite path or URL (default: synthetic_data.db)
    /// - `PIPELINE_BATCH_SIZE`: Questions per concurrent group (default: 10)
    /// - `PIPELINE_AUTO_APPROVE`: Store `needs_revision` records (default: false)
    /// - `PIPELINE_AGENT_MAX_ATTEMPTS`: Attempts per agent call (default: 3)
    /// - `PIPELINE_AGENT_INITIAL_DELAY_SECS`: First agent backoff (default: 2)
    /// - `PIPELINE_AGENT_MAX_DELAY_SECS`: Agent backoff cap (default: 10)
    /// - `PIPELINE_STORAGE_MAX_ATTEMPTS`: Attempts per storage call (default: 3)
    /// - `PIPELINE_STORAGE_INITIAL_DELAY_SECS`: First storage backoff (default: 1)
    /// - `PIPELINE_STORAGE_MAX_DELAY_SECS`: Storage backoff cap (default: 5)
    /// - `PIPELINE_AGENT_FAILURE_THRESHOLD`: Agent breaker threshold (default: 5)
    /// - `PIPELINE_AGENT_RECOVERY_SECS`: Agent breaker cooldown (default: 60)
    /// - `PIPELINE_STORAGE_FAILURE_THRESHOLD`: Storage breaker threshold (default: 3)
    /// - `PIPELINE_STORAGE_RECOVERY_SECS`: Storage breaker cooldown (default: 30)
    /// - `PIPELINE_GUARD_GROUND_TRUTH`: Guard ground-truth reads (default: false)
    /// - `PIPELINE_MODEL`: Agent model (default: gpt-4o-mini)
    /// - `PIPELINE_TEMPERATURE`: Sampling temperature (default: 0.7)
    /// - `PIPELINE_MAX_TOKENS`: Completion token limit (default: 4000)
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("DATABASE_URL") {
            if !val.trim().is_empty() {
                config.database_url = val;
            }
        }

        if let Ok(val) = std::env::var("PIPELINE_BATCH_SIZE") {
            config.batch_size = parse_env_value(&val, "PIPELINE_BATCH_SIZE")?;
        }

        if let Ok(val) = std::env::var("PIPELINE_AUTO_APPROVE") {
            config.auto_approve = parse_env_bool(&val, "PIPELINE_AUTO_APPROVE")?;
        }

        if let Ok(val) = std::env::var("PIPELINE_AGENT_MAX_ATTEMPTS") {
            config.agent_retry.max_attempts = parse_env_value(&val, "PIPELINE_AGENT_MAX_ATTEMPTS")?;
        }

        if let Ok(val) = std::env::var("PIPELINE_AGENT_INITIAL_DELAY_SECS") {
            config.agent_retry.initial_delay =
                parse_env_secs(&val, "PIPELINE_AGENT_INITIAL_DELAY_SECS")?;
        }

        if let Ok(val) = std::env::var("PIPELINE_AGENT_MAX_DELAY_SECS") {
            config.agent_retry.max_delay = parse_env_secs(&val, "PIPELINE_AGENT_MAX_DELAY_SECS")?;
        }

        if let Ok(val) = std::env::var("PIPELINE_STORAGE_MAX_ATTEMPTS") {
            config.storage_retry.max_attempts =
                parse_env_value(&val, "PIPELINE_STORAGE_MAX_ATTEMPTS")?;
        }

        if let Ok(val) = std::env::var("PIPELINE_STORAGE_INITIAL_DELAY_SECS") {
            config.storage_retry.initial_delay =
                parse_env_secs(&val, "PIPELINE_STORAGE_INITIAL_DELAY_SECS")?;
        }

        if let Ok(val) = std::env::var("PIPELINE_STORAGE_MAX_DELAY_SECS") {
            config.storage_retry.max_delay =
                parse_env_secs(&val, "PIPELINE_STORAGE_MAX_DELAY_SECS")?;
        }

        if let Ok(val) = std::env::var("PIPELINE_AGENT_FAILURE_THRESHOLD") {
            let threshold: u32 = parse_env_value(&val, "PIPELINE_AGENT_FAILURE_THRESHOLD")?;
            config.research_breaker.failure_threshold = threshold;
            config.generation_breaker.failure_threshold = threshold;
            config.review_breaker.failure_threshold = threshold;
        }

        if let Ok(val) = std::env::var("PIPELINE_AGENT_RECOVERY_SECS") {
            let timeout = parse_env_secs(&val, "PIPELINE_AGENT_RECOVERY_SECS")?;
            config.research_breaker.recovery_timeout = timeout;
            config.generation_breaker.recovery_timeout = timeout;
            config.review_breaker.recovery_timeout = timeout;
        }

        if let Ok(val) = std::env::var("PIPELINE_STORAGE_FAILURE_THRESHOLD") {
            config.storage_breaker.failure_threshold =
                parse_env_value(&val, "PIPELINE_STORAGE_FAILURE_THRESHOLD")?;
        }

        if let Ok(val) = std::env::var("PIPELINE_STORAGE_RECOVERY_SECS") {
            config.storage_breaker.recovery_timeout =
                parse_env_secs(&val, "PIPELINE_STORAGE_RECOVERY_SECS")?;
        }

        if let Ok(val) = std::env::var("PIPELINE_GUARD_GROUND_TRUTH") {
            config.guard_ground_truth_lookup = parse_env_bool(&val, "PIPELINE_GUARD_GROUND_TRUTH")?;
        }

        if let Ok(val) = std::env::var("PIPELINE_MODEL") {
            config.model = val;
        }

        if let Ok(val) = std::env::var("PIPELINE_TEMPERATURE") {
            config.temperature = parse_env_value(&val, "PIPELINE_TEMPERATURE")?;
        }

        if let Ok(val) = std::env::var("PIPELINE_MAX_TOKENS") {
            config.max_tokens = parse_env_value(&val, "PIPELINE_MAX_TOKENS")?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::ValidationFailed(
                "batch_size must be greater than 0".to_string(),
            ));
        }

        for (name, policy) in [("agent_retry", &self.agent_retry), ("storage_retry", &self.storage_retry)] {
            if policy.max_attempts == 0 {
                return Err(ConfigError::ValidationFailed(format!(
                    "{}.max_attempts must be greater than 0",
                    name
                )));
            }
            if policy.exponential_base < 1.0 {
                return Err(ConfigError::ValidationFailed(format!(
                    "{}.exponential_base must be at least 1.0",
                    name
                )));
            }
            if policy.max_delay < policy.initial_delay {
                return Err(ConfigError::ValidationFailed(format!(
                    "{}.max_delay must not be less than initial_delay",
                    name
                )));
            }
        }

        for (name, breaker) in [
            ("research_breaker", &self.research_breaker),
            ("generation_breaker", &self.generation_breaker),
            ("review_breaker", &self.review_breaker),
            ("storage_breaker", &self.storage_breaker),
        ] {
            if breaker.failure_threshold == 0 {
                return Err(ConfigError::ValidationFailed(format!(
                    "{}.failure_threshold must be greater than 0",
                    name
                )));
            }
        }

        if self.database_url.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "database_url cannot be empty".to_string(),
            ));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationFailed(
                "temperature must be between 0.0 and 2.0".to_string(),
            ));
        }

        if self.max_tokens == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_tokens must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Builder method to set batch size.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Builder method to set auto-approve.
    pub fn with_auto_approve(mut self, auto_approve: bool) -> Self {
        self.auto_approve = auto_approve;
        self
    }

    /// Builder method to set the agent retry policy.
    pub fn with_agent_retry(mut self, policy: RetryPolicy) -> Self {
        self.agent_retry = policy;
        self
    }

    /// Builder method to set the storage retry policy.
    pub fn with_storage_retry(mut self, policy: RetryPolicy) -> Self {
        self.storage_retry = policy;
        self
    }

    /// Builder method to set the research, generation and review breakers at once.
    pub fn with_agent_breakers(mut self, config: CircuitBreakerConfig) -> Self {
        self.research_breaker = config.clone();
        self.generation_breaker = config.clone();
        self.review_breaker = config;
        self
    }

    /// Builder method to set the storage breaker.
    pub fn with_storage_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.storage_breaker = config;
        self
    }

    /// Builder method to guard ground-truth reads.
    pub fn with_guard_ground_truth_lookup(mut self, guard: bool) -> Self {
        self.guard_ground_truth_lookup = guard;
        self
    }

    /// Builder method to set the database URL.
    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = url.into();
        self
    }

    /// Builder method to set the agent model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Builder method to set temperature.
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    /// Builder method to set the completion token limit.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Parse an environment variable value into the target type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

/// Parse a non-negative number of seconds, fractions allowed.
fn parse_env_secs(value: &str, key: &str) -> Result<Duration, ConfigError> {
    let secs: f64 = parse_env_value(value, key)?;
    Duration::try_from_secs_f64(secs).map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("expected a non-negative number of seconds, got '{}'", value),
    })
}

/// Parse a boolean from environment variable.
fn parse_env_bool(value: &str, key: &str) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected boolean value, got '{}'", value),
        }),
    }
}
