//! Request flows: process a document, then answer questions, chat about a
//! company, analyse an IPO, draft a retirement plan, summarise the document
//! and classify news.
//!
//! The [`Assistant`] holds no per-conversation state. Multi-turn flows take the
//! caller's [`ConversationSession`] and record a turn only when generation
//! succeeds.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::chunks::{chunk_text, strip_overlap, Chunk};
use crate::config::Config;
use crate::context::{aggregate, ContextBlob, ContextSources, SectionKind};
use crate::document::{Document, FileExtractor, TextExtractor};
use crate::error::AssistantError;
use crate::generation::GenerationClient;
use crate::index::{IndexError, IndexHandle, RetrievedSet};
use crate::market::{merge_news, CuratedCatalog, FactsSource, NewsItem, NewsSource, NoLiveNews};
use crate::prompt::{compose, PromptKind};
use crate::retrieve::{RetrieveError, Retriever};
use crate::sentiment::{analyze_article, ArticleInsight, SentimentError};
use crate::session::{ConversationSession, Topic};
use crate::store::ScoredChunk;

/// Reply to a document question asked before any document was processed.
pub const NO_DOCUMENT_PROCESSED: &str =
    "No document has been processed yet. Upload and process a document first.";

const SUMMARY_FOCUS: &str = "The entire document";

/// Outcome of processing one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub label: String,
    pub version: u64,
    pub chunk_count: usize,
    pub char_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Answer {
    pub text: String,
    /// Context was cut to fit the budget.
    pub truncated_context: bool,
    /// Context sections the answer was grounded on.
    pub sources: Vec<SectionKind>,
}

impl Answer {
    fn fixed(text: &str) -> Self {
        Self {
            text: text.to_string(),
            truncated_context: false,
            sources: Vec::new(),
        }
    }

    fn generated(text: String, context: &ContextBlob) -> Self {
        Self {
            text,
            truncated_context: context.truncated,
            sources: context.sections.clone(),
        }
    }
}

/// A news item with its sentiment reading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalyzedNews {
    pub item: NewsItem,
    pub insight: ArticleInsight,
    /// The reading is the neutral fallback, not a model classification.
    pub fallback: bool,
}

pub struct Assistant {
    config: Config,
    extractor: Arc<dyn TextExtractor>,
    index: IndexHandle,
    retriever: Retriever,
    generator: Arc<dyn GenerationClient>,
    news: Arc<dyn NewsSource>,
    facts: Arc<dyn FactsSource>,
    catalog: Arc<CuratedCatalog>,
}

impl Assistant {
    /// Wire an assistant around `index`. Questions are embedded with the
    /// index's own embedder.
    ///
    /// Fails if the config is invalid or its chunk size exceeds what the
    /// embedder accepts.
    pub fn new(
        config: Config,
        index: IndexHandle,
        generator: Arc<dyn GenerationClient>,
    ) -> Result<Self, AssistantError> {
        config.validate()?;
        let embedder = Arc::clone(index.embedder());
        if let Some(limit) = embedder.max_input_chars() {
            if config.chunking.max_chars > limit {
                return Err(AssistantError::Configuration(format!(
                    "chunking.max_chars ({}) exceeds the {} character input limit of {}",
                    config.chunking.max_chars,
                    limit,
                    embedder.model_id()
                )));
            }
        }
        let catalog = Arc::new(CuratedCatalog::default());
        Ok(Self {
            config,
            extractor: Arc::new(FileExtractor),
            index,
            retriever: Retriever::new(embedder),
            generator,
            news: Arc::new(NoLiveNews),
            facts: Arc::clone(&catalog) as Arc<dyn FactsSource>,
            catalog,
        })
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_news_source(mut self, news: Arc<dyn NewsSource>) -> Self {
        self.news = news;
        self
    }

    /// Use `catalog` for curated news and, unless overridden, company facts.
    pub fn with_catalog(mut self, catalog: CuratedCatalog) -> Self {
        let catalog = Arc::new(catalog);
        self.facts = Arc::clone(&catalog) as Arc<dyn FactsSource>;
        self.catalog = catalog;
        self
    }

    pub fn with_facts_source(mut self, facts: Arc<dyn FactsSource>) -> Self {
        self.facts = facts;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn index(&self) -> &IndexHandle {
        &self.index
    }

    pub fn catalog(&self) -> &CuratedCatalog {
        &self.catalog
    }

    /// Extract, chunk and index `document`, replacing the previous index.
    ///
    /// On failure the previously processed document stays queryable.
    pub async fn process_document(
        &self,
        document: &Document,
    ) -> Result<IngestReport, AssistantError> {
        let text = self.extractor.extract(document).await?;
        let char_count = text.chars().count();
        let chunking = &self.config.chunking;
        let chunks = chunk_text(&text, chunking.max_chars, chunking.overlap)?;
        drop(text);
        if chunks.is_empty() {
            return Err(AssistantError::Input(format!("{} contains no text", document.name)));
        }
        let store = self.index.build(&document.name, chunks).await?;
        info!(
            label = %document.name,
            version = store.version(),
            chunk_count = store.len(),
            "processed document"
        );
        Ok(IngestReport {
            label: store.label().to_string(),
            version: store.version(),
            chunk_count: store.len(),
            char_count,
        })
    }

    /// Answer `question` from the processed document.
    ///
    /// Returns [`NO_DOCUMENT_PROCESSED`] without calling the model when nothing
    /// has been indexed. A new document version starts a fresh conversation.
    pub async fn ask_document(
        &self,
        session: &mut ConversationSession,
        question: &str,
    ) -> Result<Answer, AssistantError> {
        let retrieved = match self.retrieve(question).await {
            Ok(set) => set,
            Err(RetrieveError::Index(IndexError::NotReady)) => {
                debug!("document question without a processed document");
                return Ok(Answer::fixed(NO_DOCUMENT_PROCESSED));
            }
            Err(e) => return Err(e.into()),
        };
        session.bind_topic(Topic::Document {
            label: retrieved.label.clone(),
            version: retrieved.version,
        });
        let sources = ContextSources {
            retrieved,
            ..Default::default()
        };
        let context = aggregate(&sources, self.config.context.budget_chars);
        self.converse(session, PromptKind::DocumentQa, &context, question).await
    }

    /// Finance chat about `ticker`, grounded on company facts, curated and live
    /// news, and the processed document when there is one.
    pub async fn chat(
        &self,
        session: &mut ConversationSession,
        ticker: &str,
        question: &str,
    ) -> Result<Answer, AssistantError> {
        let ticker = ticker.trim().to_uppercase();
        let (retrieved, document) = match self.retrieve(question).await {
            Ok(set) => {
                let document = Some((set.label.clone(), set.version));
                (set, document)
            }
            Err(RetrieveError::Index(IndexError::NotReady)) => (RetrievedSet::default(), None),
            Err(e) => return Err(e.into()),
        };
        session.bind_topic(Topic::Company {
            ticker: ticker.clone(),
            document,
        });
        let sources = ContextSources {
            facts: Some(self.facts.fetch_company_facts(&ticker).await),
            retrieved,
            curated_news: self.catalog.curated_news(&ticker),
            live_news: self.news.fetch_news(&ticker).await,
        };
        let context = aggregate(&sources, self.config.context.budget_chars);
        self.converse(session, PromptKind::GeneralChat, &context, question).await
    }

    /// Structured, neutral analysis of an upcoming IPO.
    pub async fn ipo_analysis(
        &self,
        name: &str,
        details: Option<&str>,
    ) -> Result<Answer, AssistantError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AssistantError::Input("IPO name is empty".into()));
        }
        let sources = ContextSources {
            curated_news: self.catalog.curated_news(name),
            live_news: self.news.fetch_news(name).await,
            ..Default::default()
        };
        let context = aggregate(&sources, self.config.context.budget_chars);
        let subject = match details.map(str::trim).filter(|d| !d.is_empty()) {
            Some(d) => format!("{name}\nDetails provided: {d}"),
            None => name.to_string(),
        };
        self.one_shot(PromptKind::IpoAnalysis, &context, &subject).await
    }

    /// Retirement plan for an investor described in free text.
    pub async fn retirement_plan(&self, profile: &str) -> Result<Answer, AssistantError> {
        if profile.trim().is_empty() {
            return Err(AssistantError::Input("investor profile is empty".into()));
        }
        self.one_shot(PromptKind::RetirementPlan, &ContextBlob::default(), profile).await
    }

    /// Structured summary of the processed document, in document order.
    pub async fn summarize_document(&self, focus: Option<&str>) -> Result<Answer, AssistantError> {
        let store = match self.index.snapshot().await {
            Ok(store) => store,
            Err(IndexError::NotReady) => return Ok(Answer::fixed(NO_DOCUMENT_PROCESSED)),
            Err(e) => return Err(e.into()),
        };
        let chunks: Vec<Chunk> = store.records().iter().map(|r| r.chunk.clone()).collect();
        let retrieved = RetrievedSet {
            hits: strip_overlap(&chunks)
                .into_iter()
                .map(|chunk| ScoredChunk { chunk, score: 1.0 })
                .collect(),
            label: store.label().to_string(),
            version: store.version(),
        };
        let sources = ContextSources {
            retrieved,
            ..Default::default()
        };
        let context = aggregate(&sources, self.config.context.budget_chars);
        if context.truncated {
            warn!(
                label = store.label(),
                "document longer than the context budget; summary covers its beginning"
            );
        }
        let focus = focus.map(str::trim).filter(|f| !f.is_empty()).unwrap_or(SUMMARY_FOCUS);
        self.one_shot(PromptKind::DocumentSummary, &context, focus).await
    }

    /// Curated and live news for `ticker`, each with a sentiment reading.
    ///
    /// A reply that does not decode falls back to a neutral reading; a backend
    /// failure aborts the whole analysis.
    pub async fn analyze_news(&self, ticker: &str) -> Result<Vec<AnalyzedNews>, AssistantError> {
        let ticker = ticker.trim().to_uppercase();
        let live = self.news.fetch_news(&ticker).await;
        let items = merge_news(self.catalog.curated_news(&ticker), live);
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            let analysis = analyze_article(self.generator.as_ref(), &item, &ticker).await;
            let (insight, fallback) = match analysis {
                Ok(insight) => (insight, false),
                Err(SentimentError::Format(e)) => {
                    warn!(
                        headline = %item.headline,
                        error = %e,
                        "undecodable sentiment reply; using neutral"
                    );
                    (ArticleInsight::neutral(), true)
                }
                Err(e) => return Err(e.into()),
            };
            out.push(AnalyzedNews { item, insight, fallback });
        }
        Ok(out)
    }

    async fn retrieve(&self, question: &str) -> Result<RetrievedSet, RetrieveError> {
        self.retriever
            .retrieve(question, self.config.retrieval.top_k, &self.index)
            .await
    }

    /// Record `question`, generate against the prior history, and commit the
    /// reply. Any failure leaves the session as it was.
    async fn converse(
        &self,
        session: &mut ConversationSession,
        kind: PromptKind,
        context: &ContextBlob,
        question: &str,
    ) -> Result<Answer, AssistantError> {
        let pending = session.begin_turn(question)?;
        let prompt = compose(kind, context, question, pending.prior_history());
        let reply = self
            .generator
            .generate(&prompt, pending.prior_history())
            .await
            .inspect_err(|e| warn!(%kind, error = %e, "generation failed"))?;
        pending.commit(reply.clone());
        Ok(Answer::generated(reply, context))
    }

    async fn one_shot(
        &self,
        kind: PromptKind,
        context: &ContextBlob,
        subject: &str,
    ) -> Result<Answer, AssistantError> {
        let prompt = compose(kind, context, subject, &[]);
        let reply = self
            .generator
            .generate(&prompt, &[])
            .await
            .inspect_err(|e| warn!(%kind, error = %e, "generation failed"))?;
        Ok(Answer::generated(reply, context))
    }
}
