//! All backend logic independent of how the app is run.
//!
//! A processed document is chunked, embedded and published behind an
//! [`IndexHandle`]; questions are answered from retrieved chunks, company facts
//! and news through an LLM. FinChat stores only config and persisted indexes in
//! its own app data directory (see [app_data]).

pub mod app_data;
pub mod assistant;
pub mod chunks;
pub mod config;
pub mod context;
pub mod document;
pub mod embed;
pub mod error;
pub mod generation;
pub mod index;
pub mod market;
pub mod ollama;
pub mod prompt;
pub mod retrieve;
pub mod sentiment;
pub mod session;
pub mod store;

#[cfg(test)]
mod test_util;

pub use app_data::{app_data_dir, index_dir};
pub use assistant::{AnalyzedNews, Answer, Assistant, IngestReport, NO_DOCUMENT_PROCESSED};
pub use chunks::{chunk_text, Chunk, ChunkError, DEFAULT_MAX_CHARS, DEFAULT_OVERLAP};
pub use config::{load_config, Config, ConfigError};
pub use context::{aggregate, ContextBlob, ContextSources, SectionKind};
pub use document::{Document, DocumentKind, ExtractError, FileExtractor, TextExtractor};
pub use embed::{EmbedError, Embedder};
pub use error::AssistantError;
pub use generation::{GenerationClient, GenerationError};
pub use index::{IndexError, IndexHandle, IndexRegistry, RetrievedSet};
pub use market::{CompanyFacts, CuratedCatalog, FactValue, FactsSource, NewsItem, NewsSource};
pub use ollama::{OllamaClient, OllamaError};
pub use prompt::{compose, Prompt, PromptKind};
pub use retrieve::{RetrieveError, Retriever};
pub use sentiment::{ArticleInsight, Sentiment};
pub use session::{ConversationHistory, ConversationSession, ConversationTurn, Role};
pub use store::{ScoredChunk, VectorStore};

/// Returns a short status string. Used to verify the backend is wired up.
pub fn status() -> &'static str {
    "finchat-core ready"
}
