//! LiteLLM-compatible chat completions client.
//!
//! Any OpenAI-compatible endpoint works (LiteLLM proxy, OpenRouter, vLLM).

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::error::LlmError;

/// Default model when neither the request nor the environment names one.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Default HTTP timeout for a single completion.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// A message in a conversation with an LLM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender (e.g., "system", "user", "assistant").
    pub role: String,
    /// Content of the message.
    pub content: String,
}

impl Message {
    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Request for text generation from an LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Model identifier. Empty means the client's default model.
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl GenerationRequest {
    /// Create a new generation request with default parameters.
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Response from an LLM generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub id: String,
    pub model: String,
    pub choices: Vec<Choice>,
    pub usage: Usage,
}

impl GenerationResponse {
    /// Get the content of the first choice, if available.
    pub fn first_content(&self) -> Option<&str> {
        self.choices.first().map(|c| c.message.content.as_str())
    }
}

/// A single generated choice from the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub index: u32,
    pub message: Message,
    pub finish_reason: String,
}

/// Token usage statistics for a generation request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Trait for LLM providers that can generate text.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate a response for the given request.
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError>;
}

/// Client for LiteLLM-compatible APIs.
pub struct LiteLlmClient {
    api_base: String,
    api_key: Option<String>,
    default_model: String,
    http_client: Client,
}

impl std::fmt::Debug for LiteLlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiteLlmClient")
            .field("api_base", &self.api_base)
            .field("default_model", &self.default_model)
            .field("has_api_key", &self.api_key.is_some())
            .finish_non_exhaustive()
    }
}

impl LiteLlmClient {
    /// Create a client with explicit configuration.
    ///
    /// # Arguments
    ///
    /// * `api_base` - Base URL for the API (e.g., "http://localhost:4000")
    /// * `api_key` - Optional API key for authentication
    /// * `default_model` - Model used when a request leaves `model` empty
    pub fn new(
        api_base: impl Into<String>,
        api_key: Option<String>,
        default_model: impl Into<String>,
    ) -> Result<Self, LlmError> {
        Self::with_timeout(api_base, api_key, default_model, DEFAULT_TIMEOUT)
    }

    /// Create a client with a custom HTTP timeout.
    pub fn with_timeout(
        api_base: impl Into<String>,
        api_key: Option<String>,
        default_model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::RequestFailed(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key,
            default_model: default_model.into(),
            http_client,
        })
    }

    /// Create a client from environment variables.
    ///
    /// - `LITELLM_API_BASE`: Base URL for the API (required)
    /// - `LITELLM_API_KEY`: API key for authentication (optional)
    /// - `LITELLM_DEFAULT_MODEL`: Default model (defaults to [`DEFAULT_MODEL`])
    pub fn from_env() -> Result<Self, LlmError> {
        let api_base = env::var("LITELLM_API_BASE").map_err(|_| LlmError::MissingApiBase)?;
        let api_key = env::var("LITELLM_API_KEY").ok();
        let default_model =
            env::var("LITELLM_DEFAULT_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        Self::new(api_base, api_key, default_model)
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    id: String,
    #[serde(default)]
    model: String,
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    #[serde(default)]
    index: u32,
    message: Message,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

#[async_trait]
impl LlmProvider for LiteLlmClient {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError> {
        let model = if request.model.is_empty() {
            self.default_model.clone()
        } else {
            request.model
        };

        let api_request = ApiRequest {
            model,
            messages: request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let url = format!("{}/chat/completions", self.api_base);

        let mut http_request = self
            .http_client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("X-Title", "synth-forge");

        if let Some(ref api_key) = self.api_key {
            http_request = http_request.header("Authorization", format!("Bearer {}", api_key));
        }

        let http_response = http_request.json(&api_request).send().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::Timeout(e.to_string())
            } else {
                LlmError::RequestFailed(e.to_string())
            }
        })?;

        let status = http_response.status();

        if !status.is_success() {
            let status_code = status.as_u16();
            let error_text = http_response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());

            let message = serde_json::from_str::<ApiErrorResponse>(&error_text)
                .map(|parsed| parsed.error.message)
                .unwrap_or(error_text);

            if status_code == 429 {
                return Err(LlmError::RateLimited(message));
            }
            return Err(LlmError::ApiError {
                code: status_code,
                message,
            });
        }

        let api_response: ApiResponse = http_response
            .json()
            .await
            .map_err(|e| LlmError::ParseError(format!("Failed to parse API response: {}", e)))?;

        let choices = api_response
            .choices
            .into_iter()
            .map(|choice| Choice {
                index: choice.index,
                message: choice.message,
                finish_reason: choice.finish_reason.unwrap_or_else(|| "stop".to_string()),
            })
            .collect();

        Ok(GenerationResponse {
            id: api_response.id,
            model: api_response.model,
            choices,
            usage: api_response.usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_constructors() {
        let system = Message::system("You are helpful.");
        assert_eq!(system.role, "system");
        assert_eq!(system.content, "You are helpful.");

        assert_eq!(Message::user("Hello").role, "user");
        assert_eq!(Message::assistant("Hi there!").role, "assistant");
    }

    #[test]
    fn test_generation_request_builder() {
        let request = GenerationRequest::new("gpt-4", vec![Message::user("test")])
            .with_temperature(0.7)
            .with_max_tokens(1000);

        assert_eq!(request.model, "gpt-4");
        assert_eq!(request.temperature, Some(0.7));
        assert_eq!(request.max_tokens, Some(1000));

        let json = serde_json::to_value(&GenerationRequest::new("m", vec![])).unwrap();
        assert!(json.get("temperature").is_none());
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = LiteLlmClient::new("http://localhost:4000/", None, "m").unwrap();
        assert_eq!(client.api_base(), "http://localhost:4000");
        assert_eq!(client.default_model(), "m");
        assert!(!client.has_api_key());
    }

    #[test]
    fn test_api_response_tolerates_missing_fields() {
        let parsed: ApiResponse = serde_json::from_str(
            r#"{"choices": [{"message": {"role": "assistant", "content": "hi"}, "finish_reason": null}]}"#,
        )
        .unwrap();
        assert_eq!(parsed.choices.len(), 1);
        assert_eq!(parsed.usage.total_tokens, 0);
    }

    #[test]
    fn test_generation_response_first_content() {
        let response = GenerationResponse {
            id: "test-id".to_string(),
            model: "gpt-4".to_string(),
            choices: vec![Choice {
                index: 0,
                message: Message::assistant("Hello!"),
                finish_reason: "stop".to_string(),
            }],
            usage: Usage::default(),
        };
        assert_eq!(response.first_content(), Some("Hello!"));
    }
}
