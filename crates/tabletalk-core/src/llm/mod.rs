//! Language model abstraction
//!
//! The engine never talks to a provider directly; it goes through the
//! [`LanguageModel`] trait so the orchestrator and generators can be
//! exercised with scripted clients in tests. The client object is
//! constructed once and shared by reference into every component that
//! needs it.

pub mod openrouter;

use crate::error::LlmError;

pub use openrouter::{LlmModel, OpenRouterClient};

/// Abstract interface for any prompt-in/text-out language model.
#[async_trait::async_trait]
pub trait LanguageModel: Send + Sync + std::fmt::Debug {
    /// Generate a completion for a single prompt.
    async fn generate(&self, prompt: &str) -> Result<String, LlmError>;
}
