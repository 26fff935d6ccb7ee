//! Builds the grounding context for one prompt from company facts, retrieved
//! document chunks, curated news and live news, within a character budget.
//!
//! Sections are laid out in priority order and never reordered internally.
//! The section that crosses the budget is cut short; sections after it are
//! dropped and the blob is flagged as truncated.

use std::collections::HashSet;

use serde::Serialize;

use crate::index::RetrievedSet;
use crate::market::{CompanyFacts, NewsItem};

/// Default context budget in characters.
pub const DEFAULT_BUDGET_CHARS: usize = 24_000;

const SECTION_SEPARATOR: &str = "\n\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SectionKind {
    CompanyFacts,
    DocumentExcerpts,
    CuratedNews,
    LiveNews,
}

impl SectionKind {
    fn title(self) -> &'static str {
        match self {
            SectionKind::CompanyFacts => "COMPANY FACTS",
            SectionKind::DocumentExcerpts => "DOCUMENT EXCERPTS",
            SectionKind::CuratedNews => "CURATED NEWS",
            SectionKind::LiveNews => "LIVE NEWS",
        }
    }
}

/// Everything that may go into a context, highest priority first.
#[derive(Debug, Clone, Default)]
pub struct ContextSources {
    pub facts: Option<CompanyFacts>,
    pub retrieved: RetrievedSet,
    pub curated_news: Vec<NewsItem>,
    pub live_news: Vec<NewsItem>,
}

/// The rendered context handed to the prompt composer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContextBlob {
    pub text: String,
    /// Set when any content was cut or omitted to stay within budget.
    pub truncated: bool,
    /// Sections that made it into `text`, fully or partly.
    pub sections: Vec<SectionKind>,
}

impl ContextBlob {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Length in characters.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Merge `sources` into a blob of at most `budget` characters.
pub fn aggregate(sources: &ContextSources, budget: usize) -> ContextBlob {
    let mut blob = ContextBlob::default();
    let mut remaining = budget;

    for (kind, body) in render_sections(sources) {
        let piece = if blob.text.is_empty() {
            format!("## {}\n{body}", kind.title())
        } else {
            format!("{SECTION_SEPARATOR}## {}\n{body}", kind.title())
        };
        if remaining == 0 {
            blob.truncated = true;
            break;
        }
        let len = piece.chars().count();
        if len <= remaining {
            blob.text.push_str(&piece);
            remaining -= len;
        } else {
            blob.text.extend(piece.chars().take(remaining));
            remaining = 0;
            blob.truncated = true;
        }
        blob.sections.push(kind);
    }
    blob
}

/// Non-empty sections in priority order, news deduplicated.
fn render_sections(sources: &ContextSources) -> Vec<(SectionKind, String)> {
    let mut sections = Vec::new();

    if let Some(facts) = sources.facts.as_ref().filter(|f| !f.is_empty()) {
        sections.push((SectionKind::CompanyFacts, facts.render()));
    }

    if !sources.retrieved.is_empty() {
        let body = sources
            .retrieved
            .hits
            .iter()
            .enumerate()
            .map(|(rank, hit)| format!("[{}] {}\n", rank + 1, hit.chunk.text.trim()))
            .collect();
        sections.push((SectionKind::DocumentExcerpts, body));
    }

    let mut seen = HashSet::new();
    let curated = dedup_news(sources.curated_news.iter(), &mut seen);
    if !curated.is_empty() {
        sections.push((SectionKind::CuratedNews, render_news(&curated)));
    }

    let mut live: Vec<&NewsItem> = sources.live_news.iter().collect();
    // Most recent first; undated items last. Stable, so equal dates keep feed order.
    live.sort_by(|a, b| b.published_at.cmp(&a.published_at));
    let live = dedup_news(live.into_iter(), &mut seen);
    if !live.is_empty() {
        sections.push((SectionKind::LiveNews, render_news(&live)));
    }

    sections
}

fn dedup_news<'a>(
    items: impl Iterator<Item = &'a NewsItem>,
    seen: &mut HashSet<String>,
) -> Vec<&'a NewsItem> {
    items.filter(|n| seen.insert(n.normalized_headline())).collect()
}

fn render_news(items: &[&NewsItem]) -> String {
    items
        .iter()
        .map(|n| {
            let date = n
                .published_at
                .map_or_else(|| "undated".to_string(), |d| d.format("%Y-%m-%d").to_string());
            let mut line = format!("- {} ({}, {})", n.headline.trim(), n.source, date);
            if !n.summary.trim().is_empty() {
                line.push_str(": ");
                line.push_str(n.summary.trim());
            }
            line.push('\n');
            line
        })
        .collect()
}
