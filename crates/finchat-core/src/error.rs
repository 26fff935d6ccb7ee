//! User-facing error taxonomy. Every module error converts into one of five
//! categories, which decide whether a request may be retried and how it is
//! reported.

use tracing::error;

use crate::chunks::ChunkError;
use crate::config::ConfigError;
use crate::document::ExtractError;
use crate::embed::EmbedError;
use crate::generation::GenerationError;
use crate::index::IndexError;
use crate::market::CatalogError;
use crate::ollama::OllamaError;
use crate::retrieve::RetrieveError;
use crate::sentiment::{FormatError, SentimentError};
use crate::session::SessionError;
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum AssistantError {
    /// The request itself is unusable; retrying it unchanged will fail again.
    #[error("{0}")]
    Input(String),
    /// A backend (embedding, generation, extraction) failed; may succeed later.
    #[error("service unavailable: {0}")]
    Service(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Stored state does not fit the running setup (embedding space, file contents).
    #[error("inconsistent state: {0}")]
    Consistency(String),
    #[error("unexpected response format: {0}")]
    Format(String),
}

impl AssistantError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, AssistantError::Service(_))
    }
}

impl From<ChunkError> for AssistantError {
    fn from(e: ChunkError) -> Self {
        AssistantError::Input(e.to_string())
    }
}

impl From<SessionError> for AssistantError {
    fn from(e: SessionError) -> Self {
        AssistantError::Input(e.to_string())
    }
}

impl From<ExtractError> for AssistantError {
    fn from(e: ExtractError) -> Self {
        match e {
            ExtractError::UnsupportedFormat(_) => AssistantError::Input(e.to_string()),
            ExtractError::ExtractionFailed(_) => AssistantError::Service(e.to_string()),
        }
    }
}

impl From<EmbedError> for AssistantError {
    fn from(e: EmbedError) -> Self {
        AssistantError::Service(e.to_string())
    }
}

impl From<StoreError> for AssistantError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Io(..) => AssistantError::Configuration(e.to_string()),
            _ => AssistantError::Consistency(e.to_string()),
        }
    }
}

impl From<IndexError> for AssistantError {
    fn from(e: IndexError) -> Self {
        match e {
            IndexError::EmptyInput | IndexError::NotReady => AssistantError::Input(e.to_string()),
            IndexError::EmbeddingService(inner) => inner.into(),
            IndexError::Consistency { .. } | IndexError::DimensionMismatch { .. } => {
                error!(error = %e, "embedding space mismatch");
                AssistantError::Consistency(e.to_string())
            }
            IndexError::Store(inner) => inner.into(),
            IndexError::Commit(_) => {
                error!(error = %e, "index commit aborted");
                AssistantError::Consistency(e.to_string())
            }
        }
    }
}

impl From<RetrieveError> for AssistantError {
    fn from(e: RetrieveError) -> Self {
        match e {
            RetrieveError::InvalidQuery(_) => AssistantError::Input(e.to_string()),
            RetrieveError::Index(inner) => inner.into(),
        }
    }
}

impl From<GenerationError> for AssistantError {
    fn from(e: GenerationError) -> Self {
        match e {
            GenerationError::Unconfigured(_) => AssistantError::Configuration(e.to_string()),
            GenerationError::Unavailable(_) => AssistantError::Service(e.to_string()),
            GenerationError::Malformed(_) => AssistantError::Format(e.to_string()),
        }
    }
}

impl From<FormatError> for AssistantError {
    fn from(e: FormatError) -> Self {
        AssistantError::Format(e.to_string())
    }
}

impl From<SentimentError> for AssistantError {
    fn from(e: SentimentError) -> Self {
        match e {
            SentimentError::Generation(inner) => inner.into(),
            SentimentError::Format(inner) => inner.into(),
        }
    }
}

impl From<ConfigError> for AssistantError {
    fn from(e: ConfigError) -> Self {
        AssistantError::Configuration(e.to_string())
    }
}

impl From<CatalogError> for AssistantError {
    fn from(e: CatalogError) -> Self {
        AssistantError::Configuration(e.to_string())
    }
}

impl From<OllamaError> for AssistantError {
    fn from(e: OllamaError) -> Self {
        AssistantError::Configuration(e.to_string())
    }
}
