//! OpenRouter LLM Client - Real LLM Provider Integration
//!
//! Implements the [`LanguageModel`] trait using OpenRouter's
//! OpenAI-compatible API. Supports free models for development and
//! testing.
//!
//! # Usage
//!
//! ```text
//! let client = OpenRouterClient::new(
//!     "your-api-key".to_string(),
//!     LlmModel::GoogleGemini2Flash,
//! );
//! let text = client.generate("Classify this question ...").await?;
//! ```

use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::llm::LanguageModel;

/// OpenRouter API base URL
const OPENROUTER_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Models available on OpenRouter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmModel {
    /// Google Gemini 2.0 Flash Experimental (Free)
    GoogleGemini2Flash,
    /// Meta Llama 3.3 70B Instruct (Free)
    MetaLlama3_3_70B,
    /// DeepSeek R1 0528 (Free)
    DeepSeekR1,
    /// Custom model ID
    Custom(String),
}

impl LlmModel {
    /// Get the model ID string for the API
    pub fn model_id(&self) -> &str {
        match self {
            Self::GoogleGemini2Flash => "google/gemini-2.0-flash-exp:free",
            Self::MetaLlama3_3_70B => "meta-llama/llama-3.3-70b-instruct:free",
            Self::DeepSeekR1 => "deepseek/deepseek-r1-0528:free",
            Self::Custom(id) => id,
        }
    }

    /// Get human-readable name
    pub fn display_name(&self) -> &str {
        match self {
            Self::GoogleGemini2Flash => "Google Gemini 2.0 Flash",
            Self::MetaLlama3_3_70B => "Meta Llama 3.3 70B",
            Self::DeepSeekR1 => "DeepSeek R1",
            Self::Custom(id) => id,
        }
    }
}

/// OpenRouter API request
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

/// Chat message
#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

/// OpenRouter API response
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

/// Chat choice
#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// OpenRouter LLM Client
///
/// Safe for concurrent use: the underlying `reqwest::Client` is an
/// `Arc` around a connection pool, so one instance can be shared
/// across concurrent questions.
pub struct OpenRouterClient {
    /// API key for OpenRouter
    api_key: String,

    /// Model to use
    model: LlmModel,

    /// HTTP client
    http_client: reqwest::Client,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    temperature: f64,

    /// Max tokens per response
    max_tokens: u32,
}

impl OpenRouterClient {
    /// Create a new OpenRouter client
    pub fn new(api_key: String, model: LlmModel) -> Self {
        Self {
            api_key,
            model,
            http_client: reqwest::Client::new(),
            temperature: 0.2, // Low temperature for query generation
            max_tokens: 1024,
        }
    }

    /// Set temperature
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set max tokens
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Send a chat completion request to OpenRouter
    async fn request_completion(&self, prompt: &str) -> Result<String, LlmError> {
        let request = ChatCompletionRequest {
            model: self.model.model_id().to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            max_tokens: Some(self.max_tokens),
            temperature: Some(self.temperature),
        };

        let response = self
            .http_client
            .post(OPENROUTER_API_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or(LlmError::EmptyCompletion)
    }
}

impl std::fmt::Debug for OpenRouterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenRouterClient")
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

#[async_trait::async_trait]
impl LanguageModel for OpenRouterClient {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        tracing::debug!(model = self.model.model_id(), "requesting completion");
        self.request_completion(prompt).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_ids_are_stable() {
        assert_eq!(
            LlmModel::GoogleGemini2Flash.model_id(),
            "google/gemini-2.0-flash-exp:free"
        );
        assert_eq!(
            LlmModel::Custom("acme/model-x".to_string()).model_id(),
            "acme/model-x"
        );
    }

    #[test]
    fn request_serializes_without_null_fields() {
        let request = ChatCompletionRequest {
            model: "m".to_string(),
            messages: vec![],
            max_tokens: None,
            temperature: Some(0.2),
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(!json.contains("max_tokens"));
        assert!(json.contains("temperature"));
    }
}
