//! LLM integration.
//!
//! ```ignore
//! use synth_forge::llm::{LiteLlmClient, LlmProvider, Message, GenerationRequest};
//!
//! let client = LiteLlmClient::from_env()?;
//! let request = GenerationRequest::new("", vec![Message::user("Hello")]);
//! let response = client.generate(request).await?;
//! ```

pub mod litellm;

pub use litellm::{
    Choice, GenerationRequest, GenerationResponse, LiteLlmClient, LlmProvider, Message, Usage,
    DEFAULT_MODEL, DEFAULT_TIMEOUT,
};
