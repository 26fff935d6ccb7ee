//! Embedding backend trait. The same implementation must embed both the
//! indexed chunks and the questions asked against them.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// A backend that turns text into fixed-dimension vectors.
///
/// [`model_id`](Embedder::model_id) names the embedding space. An index built
/// with one model id must only ever be queried with vectors from the same id.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Identifier of the embedding space (backend + model name).
    fn model_id(&self) -> &str;

    /// Largest input, in characters, the backend accepts. `None` if unknown.
    fn max_input_chars(&self) -> Option<usize> {
        None
    }

    /// Embed a single string.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;

    /// Embed several strings, one vector per input, in input order.
    ///
    /// The default calls [`embed`](Embedder::embed) sequentially; backends with
    /// native batching should override it.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("embedding request failed: {0}")]
    Request(String),
    #[error("embedding request timed out after {0:?}")]
    Timeout(Duration),
    #[error("embedding backend returned no vector")]
    EmptyResponse,
}
