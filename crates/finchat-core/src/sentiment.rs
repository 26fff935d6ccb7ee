//! News sentiment classification through the LLM.
//!
//! The model's reply is decoded strictly into [`ArticleInsight`]; anything
//! else is a [`FormatError`]. Falling back to a neutral reading is the
//! caller's decision (see [`ArticleInsight::neutral`]), since it is only
//! acceptable for non-critical classification.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::context::ContextBlob;
use crate::generation::{GenerationClient, GenerationError};
use crate::market::NewsItem;
use crate::prompt::{compose, PromptKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Sentiment::Positive => "positive",
            Sentiment::Negative => "negative",
            Sentiment::Neutral => "neutral",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArticleInsight {
    pub sentiment: Sentiment,
    pub summary: String,
}

impl ArticleInsight {
    /// The reading used when classification failed.
    pub fn neutral() -> Self {
        Self {
            sentiment: Sentiment::Neutral,
            summary: "Could not analyze this article.".to_string(),
        }
    }
}

/// Decode a model reply into an [`ArticleInsight`].
///
/// Accepts a bare JSON object, or one wrapped in a single Markdown code fence
/// (optionally tagged `json`) with nothing outside it.
pub fn decode_insight(raw: &str) -> Result<ArticleInsight, FormatError> {
    let body = unfence(raw.trim()).ok_or(FormatError::UnterminatedFence)?;
    let insight: ArticleInsight = serde_json::from_str(body).map_err(FormatError::Json)?;
    if insight.summary.trim().is_empty() {
        return Err(FormatError::EmptySummary);
    }
    Ok(insight)
}

/// Strip one enclosing code fence. `None` if a fence is opened but not closed.
fn unfence(s: &str) -> Option<&str> {
    let Some(rest) = s.strip_prefix("```") else {
        return Some(s);
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").map(str::trim)
}

/// Ask `client` for the sentiment of `item` with respect to `subject`.
pub async fn analyze_article(
    client: &dyn GenerationClient,
    item: &NewsItem,
    subject: &str,
) -> Result<ArticleInsight, SentimentError> {
    let article = format!(
        "Company: {subject}\nHeadline: \"{}\"\nContent: \"{}\"",
        item.headline.trim(),
        item.summary.trim()
    );
    let prompt = compose(PromptKind::NewsSentiment, &ContextBlob::default(), &article, &[]);
    let reply = client.generate(&prompt, &[]).await?;
    Ok(decode_insight(&reply)?)
}

#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("reply is not a valid insight object: {0}")]
    Json(serde_json::Error),
    #[error("reply opens a code fence without closing it")]
    UnterminatedFence,
    #[error("insight summary is empty")]
    EmptySummary,
}

#[derive(Debug, thiserror::Error)]
pub enum SentimentError {
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error(transparent)]
    Format(#[from] FormatError),
}
