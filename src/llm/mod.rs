//! LLM client abstraction.
//!
//! The orchestrator only ever needs one operation: a system prompt and a user
//! prompt in, text out. Providers implement [`LlmClient`]; the default
//! implementation speaks the OpenAI-compatible chat completions protocol.

mod openai;

pub use openai::OpenAiCompatibleClient;

use async_trait::async_trait;
use thiserror::Error;

/// Errors surfaced by LLM providers.
///
/// These never reach users directly: the classifier and planner recover from
/// them with heuristic fallbacks, and tools fold them into their markdown
/// error reports.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("completion contained no content")]
    EmptyResponse,
}

/// Generation parameters for a single completion.
#[derive(Debug, Clone, Copy)]
pub struct CompletionOptions {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            temperature: 0.2,
        }
    }
}

/// A text-completion provider.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Run a single completion and return the response text.
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        options: CompletionOptions,
    ) -> Result<String, LlmError>;
}
