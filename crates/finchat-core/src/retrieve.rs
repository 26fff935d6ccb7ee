//! Question → top-k chunks, checked against the index's embedding space.

use std::sync::Arc;

use tracing::{debug, error};

use crate::embed::Embedder;
use crate::index::{search_store, IndexError, IndexHandle, RetrievedSet};

/// Embeds questions and searches an [`IndexHandle`] with them.
///
/// The retriever carries its own embedder; it refuses to search an index whose
/// vectors came from a different embedding model instead of returning
/// meaningless scores.
#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self { embedder }
    }

    /// Return the `k` chunks of `index` nearest to `question`.
    ///
    /// Fewer than `k` results only when the index holds fewer chunks.
    pub async fn retrieve(
        &self,
        question: &str,
        k: usize,
        index: &IndexHandle,
    ) -> Result<RetrievedSet, RetrieveError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RetrieveError::InvalidQuery("question is empty"));
        }
        if k == 0 {
            return Err(RetrieveError::InvalidQuery("k must be greater than zero"));
        }

        let store = index.snapshot().await?;
        if store.model() != self.embedder.model_id() {
            error!(
                index_model = store.model(),
                query_model = self.embedder.model_id(),
                "embedding space mismatch between index and retriever"
            );
            return Err(IndexError::Consistency {
                index_model: store.model().to_string(),
                query_model: self.embedder.model_id().to_string(),
            }
            .into());
        }

        let vector = self.embedder.embed(question).await.map_err(IndexError::from)?;
        let set = search_store(&store, &vector, k).inspect_err(|e| {
            if let IndexError::DimensionMismatch { .. } = e {
                error!(error = %e, "query vector does not fit the index");
            }
        })?;
        debug!(k, hits = set.len(), label = %set.label, version = set.version, "retrieved chunks");
        Ok(set)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RetrieveError {
    #[error("invalid query: {0}")]
    InvalidQuery(&'static str),
    #[error(transparent)]
    Index(#[from] IndexError),
}
