//! LLM provider abstraction.
//!
//! Provides a trait-based abstraction over chat-completions endpoints so
//! the classification pipeline depends only on the capability, not the
//! transport. The single shipped implementation speaks the
//! OpenAI-compatible wire format.

pub mod openai_compat;

use crate::error::LlmError;

/// Parameters controlling a completion request.
#[derive(Debug, Clone)]
pub struct ChatOptions {
    /// Maximum number of tokens to generate.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
    /// Request a JSON-object response (`response_format: json_object`).
    pub json_mode: bool,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            max_tokens: 4096,
            temperature: 0.3,
            json_mode: false,
        }
    }
}

/// Response from a completion request.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    /// The generated text content.
    pub text: String,
    /// The model that produced this response.
    pub model: String,
}

/// Trait abstracting the chat-completions transport.
///
/// Object-safe for use as `Arc<dyn LlmProvider>`.
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send a completion request with a system and a user message.
    async fn complete(
        &self,
        system: &str,
        user_message: &str,
        options: &ChatOptions,
    ) -> Result<LlmResponse, LlmError>;

    /// Check that the endpoint is reachable and configured correctly.
    async fn health_check(&self) -> Result<(), LlmError>;
}
