//! Company facts and news: the data types, the collaborator traits that supply
//! them, and a curated catalog read from a TOML file.
//!
//! Both collaborators are best effort. A news source that fails returns an
//! empty list; a facts source marks what it does not know as
//! [`FactValue::Unavailable`] instead of leaving it out.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Fields every [`CompanyFacts`] carries, in display order.
pub const FACT_FIELDS: [&str; 5] = ["ticker", "name", "sector", "exchange", "country"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsItem {
    pub headline: String,
    pub summary: String,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    pub source: String,
}

impl NewsItem {
    /// Headline reduced to lowercase alphanumerics and single spaces, used to
    /// recognise the same story from different sources.
    pub fn normalized_headline(&self) -> String {
        self.headline
            .chars()
            .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { ' ' })
            .collect::<String>()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Curated items first, then live items whose headline is not already present.
pub fn merge_news(curated: Vec<NewsItem>, live: Vec<NewsItem>) -> Vec<NewsItem> {
    let mut seen = HashSet::new();
    curated
        .into_iter()
        .chain(live)
        .filter(|n| seen.insert(n.normalized_headline()))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FactValue {
    Available(String),
    Unavailable,
}

impl fmt::Display for FactValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FactValue::Available(v) => f.write_str(v),
            FactValue::Unavailable => f.write_str("unavailable"),
        }
    }
}

/// Named facts about one company, ordered by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyFacts {
    fields: BTreeMap<String, FactValue>,
}

impl CompanyFacts {
    /// Facts for an unknown company: every standard field unavailable.
    pub fn unavailable(ticker: &str) -> Self {
        let mut facts = Self::default();
        for field in FACT_FIELDS {
            facts.fields.insert(field.to_string(), FactValue::Unavailable);
        }
        facts.set("ticker", ticker);
        facts
    }

    /// Set a field; empty values are recorded as unavailable.
    pub fn set(&mut self, field: &str, value: &str) {
        let value = value.trim();
        let value = if value.is_empty() {
            FactValue::Unavailable
        } else {
            FactValue::Available(value.to_string())
        };
        self.fields.insert(field.to_string(), value);
    }

    pub fn get(&self, field: &str) -> Option<&FactValue> {
        self.fields.get(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FactValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// `name: value` lines, one per field.
    pub fn render(&self) -> String {
        self.iter().map(|(k, v)| format!("{k}: {v}\n")).collect()
    }
}

/// Live news provider. `subject` is opaque (ticker, company name, …).
#[async_trait]
pub trait NewsSource: Send + Sync {
    /// Never fails: errors are logged by the implementation and yield an empty list.
    async fn fetch_news(&self, subject: &str) -> Vec<NewsItem>;
}

/// Structured company data provider.
#[async_trait]
pub trait FactsSource: Send + Sync {
    /// Never fails: unknown fields are [`FactValue::Unavailable`].
    async fn fetch_company_facts(&self, ticker: &str) -> CompanyFacts;
}

/// News source for setups without a live feed.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLiveNews;

#[async_trait]
impl NewsSource for NoLiveNews {
    async fn fetch_news(&self, _subject: &str) -> Vec<NewsItem> {
        Vec::new()
    }
}

/// One company entry in the curated catalog.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    #[serde(default)]
    pub sector: String,
    #[serde(default)]
    pub exchange: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub news: Vec<CuratedNews>,
}

/// A hand-picked news item; dates are plain `YYYY-MM-DD`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CuratedNews {
    pub headline: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default = "default_curated_source")]
    pub source: String,
}

fn default_curated_source() -> String {
    "Curated".to_string()
}

impl From<&CuratedNews> for NewsItem {
    fn from(n: &CuratedNews) -> Self {
        NewsItem {
            headline: n.headline.clone(),
            summary: n.summary.clone(),
            published_at: n
                .date
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| dt.and_utc()),
            source: n.source.clone(),
        }
    }
}

/// Curated company database keyed by ticker.
///
/// ```toml
/// [companies."RELIANCE.NS"]
/// name = "Reliance Industries"
/// sector = "Oil & Gas"
/// exchange = "NSE"
/// country = "India"
///
/// [[companies."RELIANCE.NS".news]]
/// headline = "Reliance announces green energy push"
/// date = "2024-06-01"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CuratedCatalog {
    #[serde(default)]
    companies: BTreeMap<String, CatalogEntry>,
}

impl CuratedCatalog {
    pub fn from_toml_str(s: &str) -> Result<Self, CatalogError> {
        let mut catalog: Self = toml::from_str(s).map_err(CatalogError::Parse)?;
        // Tickers are matched case-insensitively.
        catalog.companies = catalog
            .companies
            .into_iter()
            .map(|(k, v)| (k.to_uppercase(), v))
            .collect();
        Ok(catalog)
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let s = std::fs::read_to_string(path)
            .map_err(|e| CatalogError::Read(path.to_path_buf(), e))?;
        Self::from_toml_str(&s)
    }

    pub fn insert(&mut self, ticker: &str, entry: CatalogEntry) {
        self.companies.insert(ticker.to_uppercase(), entry);
    }

    pub fn get(&self, ticker: &str) -> Option<&CatalogEntry> {
        self.companies.get(&ticker.trim().to_uppercase())
    }

    pub fn len(&self) -> usize {
        self.companies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.companies.is_empty()
    }

    /// Tickers whose symbol or company name contains `query` (case-insensitive).
    pub fn search(&self, query: &str) -> Vec<(&str, &CatalogEntry)> {
        let q = query.trim().to_lowercase();
        if q.is_empty() {
            return Vec::new();
        }
        self.companies
            .iter()
            .filter(|(ticker, entry)| {
                ticker.to_lowercase().contains(&q) || entry.name.to_lowercase().contains(&q)
            })
            .map(|(t, e)| (t.as_str(), e))
            .collect()
    }

    /// Curated news for `ticker`, in catalog order.
    pub fn curated_news(&self, ticker: &str) -> Vec<NewsItem> {
        self.get(ticker)
            .map(|e| e.news.iter().map(NewsItem::from).collect())
            .unwrap_or_default()
    }

    /// Facts for `ticker`; all fields unavailable if the ticker is unknown.
    pub fn facts(&self, ticker: &str) -> CompanyFacts {
        let mut facts = CompanyFacts::unavailable(&ticker.trim().to_uppercase());
        match self.get(ticker) {
            Some(entry) => {
                facts.set("name", &entry.name);
                facts.set("sector", &entry.sector);
                facts.set("exchange", &entry.exchange);
                facts.set("country", &entry.country);
            }
            None => debug!(ticker, "ticker not in curated catalog"),
        }
        facts
    }
}

#[async_trait]
impl FactsSource for CuratedCatalog {
    async fn fetch_company_facts(&self, ticker: &str) -> CompanyFacts {
        self.facts(ticker)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to read catalog {0}: {1}")]
    Read(std::path::PathBuf, std::io::Error),
    #[error("invalid catalog: {0}")]
    Parse(toml::de::Error),
}
