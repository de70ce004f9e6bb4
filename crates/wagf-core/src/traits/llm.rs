//! The single capability the core needs from an LLM provider

use async_trait::async_trait;
use thiserror::Error;

use crate::proposal::TokenCounts;

/// Raw completion plus the provider's token accounting.
#[derive(Debug, Clone)]
pub struct LlmReply {
    pub text: String,
    pub tokens: TokenCounts,
}

impl LlmReply {
    pub fn new(text: impl Into<String>, tokens: TokenCounts) -> Self {
        Self {
            text: text.into(),
            tokens,
        }
    }
}

/// `invoke(prompt) -> text` is the only contract; concrete HTTP clients for
/// Ollama, Anthropic, OpenAI or Gemini live outside the core and are
/// injected at experiment build time.
#[async_trait]
pub trait LlmInvoke: Send + Sync {
    async fn invoke(&self, prompt: &str) -> std::result::Result<LlmReply, LlmError>;

    /// Used for model-family preprocessing dispatch (substring match).
    fn model_name(&self) -> &str {
        "unknown"
    }
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("invocation timed out after {0}s")]
    Timeout(u64),

    #[error("provider error: {0}")]
    Provider(String),
}

impl LlmError {
    /// Every invocation failure counts as one failed attempt; none are fatal
    /// to the decision loop.
    pub fn is_retryable(&self) -> bool {
        true
    }
}
