//! The LLM boundary. Callers hand over a composed [`Prompt`] and the prior
//! conversation; implementations convert both to their own wire format.
//!
//! No retries happen here. `Unavailable` is retryable by the caller;
//! `Unconfigured` and `Malformed` are final for the call.

use async_trait::async_trait;

use crate::prompt::Prompt;
use crate::session::ConversationHistory;

#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Generate a reply to `prompt`, with `history` as the preceding turns.
    async fn generate(
        &self,
        prompt: &Prompt,
        history: &ConversationHistory,
    ) -> Result<String, GenerationError>;
}

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("generation backend is not configured: {0}")]
    Unconfigured(String),
    #[error("generation backend unavailable: {0}")]
    Unavailable(String),
    #[error("generation backend returned an unusable response: {0}")]
    Malformed(String),
}

impl GenerationError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, GenerationError::Unavailable(_))
    }
}
