//! Deterministic fakes for the embedding and generation backends.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::embed::{EmbedError, Embedder};
use crate::generation::{GenerationClient, GenerationError};
use crate::prompt::Prompt;
use crate::session::ConversationHistory;

const HASH_DIM: usize = 1024;

const STOPWORDS: &[&str] = &[
    "the", "was", "what", "and", "for", "are", "how", "why", "did", "does", "with", "that", "this",
    "from", "its", "has", "have", "were", "which", "who", "into",
];

/// Bag-of-words embedding: each content word lands in one of [`HASH_DIM`] buckets.
pub fn hash_embed(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; HASH_DIM];
    let lower = text.to_lowercase();
    let words = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= 3 && !STOPWORDS.contains(w));
    let mut any = false;
    for word in words {
        v[fnv1a(word) % HASH_DIM] += 1.0;
        any = true;
    }
    if !any {
        v[0] = 1.0;
    }
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    v.iter_mut().for_each(|x| *x /= norm);
    v
}

fn fnv1a(s: &str) -> usize {
    let mut h: u64 = 0xcbf2_9ce4_8422_2325;
    for b in s.bytes() {
        h ^= u64::from(b);
        h = h.wrapping_mul(0x0100_0000_01b3);
    }
    h as usize
}

pub struct HashEmbedder {
    model: String,
}

impl HashEmbedder {
    pub fn new(model: &str) -> Self {
        Self { model: model.to_string() }
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        Ok(hash_embed(text))
    }
}

/// Always fails, as an unreachable backend would.
pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    fn model_id(&self) -> &str {
        "m"
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
        Err(EmbedError::Request("connection refused".into()))
    }
}

/// Hash embedder that sleeps before every call.
pub struct SlowEmbedder {
    inner: HashEmbedder,
    delay: Duration,
}

impl SlowEmbedder {
    pub fn new(model: &str, delay: Duration) -> Self {
        Self {
            inner: HashEmbedder::new(model),
            delay,
        }
    }
}

#[async_trait]
impl Embedder for SlowEmbedder {
    fn model_id(&self) -> &str {
        self.inner.model_id()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        tokio::time::sleep(self.delay).await;
        self.inner.embed(text).await
    }
}

/// Returns constant vectors of a fixed width.
pub struct FixedDimEmbedder {
    model: String,
    dim: usize,
}

impl FixedDimEmbedder {
    pub fn new(model: &str, dim: usize) -> Self {
        Self {
            model: model.to_string(),
            dim,
        }
    }
}

#[async_trait]
impl Embedder for FixedDimEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
        Ok(vec![1.0; self.dim])
    }
}

enum Reply {
    Text(String),
    Unavailable(String),
    Malformed(String),
}

/// Generator that answers every prompt the same way and records what it was sent.
pub struct ScriptedGenerator {
    reply: Reply,
    prompts: Mutex<Vec<Prompt>>,
    histories: Mutex<Vec<usize>>,
}

impl ScriptedGenerator {
    fn with(reply: Reply) -> Self {
        Self {
            reply,
            prompts: Mutex::new(Vec::new()),
            histories: Mutex::new(Vec::new()),
        }
    }

    pub fn replying(reply: &str) -> Self {
        Self::with(Reply::Text(reply.to_string()))
    }

    pub fn unavailable(message: &str) -> Self {
        Self::with(Reply::Unavailable(message.to_string()))
    }

    pub fn malformed(message: &str) -> Self {
        Self::with(Reply::Malformed(message.to_string()))
    }

    pub fn prompts(&self) -> Vec<Prompt> {
        self.prompts.lock().unwrap().clone()
    }

    /// History length passed with each call.
    pub fn history_lens(&self) -> Vec<usize> {
        self.histories.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl GenerationClient for ScriptedGenerator {
    async fn generate(
        &self,
        prompt: &Prompt,
        history: &ConversationHistory,
    ) -> Result<String, GenerationError> {
        self.prompts.lock().unwrap().push(prompt.clone());
        self.histories.lock().unwrap().push(history.len());
        match &self.reply {
            Reply::Text(t) => Ok(t.clone()),
            Reply::Unavailable(m) => Err(GenerationError::Unavailable(m.clone())),
            Reply::Malformed(m) => Err(GenerationError::Malformed(m.clone())),
        }
    }
}
