//! Fakes shared by the integration tests.

#![allow(dead_code)]

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use finchat_core::{
    ConversationHistory, Document, DocumentKind, EmbedError, Embedder, ExtractError,
    GenerationClient, GenerationError, Prompt, TextExtractor,
};

const DIM: usize = 512;

/// Deterministic bag-of-words embedder; words shorter than four letters are ignored.
pub struct WordEmbedder {
    model: String,
    delay: Duration,
}

impl WordEmbedder {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            delay: Duration::ZERO,
        }
    }

    /// Sleeps `delay` before every embedding call.
    pub fn slow(model: &str, delay: Duration) -> Self {
        Self {
            model: model.to_string(),
            delay,
        }
    }
}

#[async_trait]
impl Embedder for WordEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let mut v = vec![0.0f32; DIM];
        v[0] = 0.01;
        for word in text.to_lowercase().split(|c: char| !c.is_alphanumeric()) {
            if word.len() >= 4 && word != "what" {
                let h = word.bytes().fold(5381usize, |h, b| h.wrapping_mul(33) ^ usize::from(b));
                v[1 + h % (DIM - 1)] += 1.0;
            }
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        Ok(v.into_iter().map(|x| x / norm).collect())
    }
}

/// Treats PDF bytes as UTF-8 pages separated by form feeds.
pub struct PagedPdfExtractor;

#[async_trait]
impl TextExtractor for PagedPdfExtractor {
    async fn extract(&self, document: &Document) -> Result<String, ExtractError> {
        if document.kind != DocumentKind::Pdf {
            return Err(ExtractError::UnsupportedFormat(document.name.clone()));
        }
        let text = String::from_utf8(document.bytes.clone())
            .map_err(|e| ExtractError::ExtractionFailed(e.to_string()))?;
        Ok(text.split('\u{c}').collect::<Vec<_>>().join("\n\n"))
    }
}

/// Answers with the top-ranked document excerpt in the prompt.
#[derive(Default)]
pub struct ExtractiveGenerator {
    pub calls: Mutex<usize>,
}

#[async_trait]
impl GenerationClient for ExtractiveGenerator {
    async fn generate(
        &self,
        prompt: &Prompt,
        _history: &ConversationHistory,
    ) -> Result<String, GenerationError> {
        *self.calls.lock().unwrap() += 1;
        let start = prompt
            .user
            .find("[1] ")
            .ok_or_else(|| GenerationError::Malformed("no excerpts in prompt".into()))?;
        let excerpt = &prompt.user[start + 4..];
        let end = excerpt.find("\n[2] ").or_else(|| excerpt.find("\n---")).unwrap_or(excerpt.len());
        Ok(excerpt[..end].trim().to_string())
    }
}

/// Replies "ok" until switched to failing with `Unavailable`.
#[derive(Default)]
pub struct FlakyGenerator {
    pub down: Mutex<bool>,
    pub calls: Mutex<usize>,
}

impl FlakyGenerator {
    pub fn set_down(&self, down: bool) {
        *self.down.lock().unwrap() = down;
    }
}

#[async_trait]
impl GenerationClient for FlakyGenerator {
    async fn generate(
        &self,
        _prompt: &Prompt,
        history: &ConversationHistory,
    ) -> Result<String, GenerationError> {
        *self.calls.lock().unwrap() += 1;
        if *self.down.lock().unwrap() {
            return Err(GenerationError::Unavailable("connection reset".into()));
        }
        Ok(format!("answer #{}", history.len() / 2 + 1))
    }
}
