//! Ollama backend for embeddings and chat. Wraps ollama-rs behind the
//! [`Embedder`] and [`GenerationClient`] traits.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use ollama_rs::generation::chat::request::ChatMessageRequest;
use ollama_rs::generation::chat::ChatMessage;
use ollama_rs::generation::embeddings::request::{EmbeddingsInput, GenerateEmbeddingsRequest};
use ollama_rs::Ollama;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::OllamaConfig;
use crate::embed::{EmbedError, Embedder};
use crate::generation::{GenerationClient, GenerationError};
use crate::prompt::Prompt;
use crate::session::{ConversationHistory, Role};

pub const DEFAULT_EMBED_MODEL: &str = "nomic-embed-text";
pub const DEFAULT_CHAT_MODEL: &str = "llama3.1";
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// `nomic-embed-text` has an 8192-token window; this stays well inside it.
const EMBED_MAX_INPUT_CHARS: usize = 8_000;

/// One Ollama server used for both embeddings and chat.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    inner: Ollama,
    embed_model: String,
    /// `ollama/<embed_model>`, the embedding space id.
    model_id: String,
    chat_model: String,
    timeout: Duration,
}

impl OllamaClient {
    /// Create from URL string, with the default models and timeout.
    pub fn from_url(url: &str) -> Result<Self, OllamaError> {
        let inner = Ollama::try_new(url).map_err(OllamaError::ParseUrl)?;
        Ok(Self {
            inner,
            embed_model: DEFAULT_EMBED_MODEL.to_string(),
            model_id: model_id(DEFAULT_EMBED_MODEL),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        })
    }

    pub fn from_config(config: &OllamaConfig) -> Result<Self, OllamaError> {
        Ok(Self::from_url(&config.base_url)?
            .with_embed_model(&config.embed_model)
            .with_chat_model(&config.chat_model)
            .with_timeout(Duration::from_secs(config.timeout_secs)))
    }

    /// Set the embedding model (e.g. `nomic-embed-text`, `all-minilm`).
    pub fn with_embed_model(mut self, model: impl Into<String>) -> Self {
        self.embed_model = model.into();
        self.model_id = model_id(&self.embed_model);
        self
    }

    /// Set the chat model. An empty name leaves generation unconfigured.
    pub fn with_chat_model(mut self, model: impl Into<String>) -> Self {
        self.chat_model = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn with_deadline<T, F>(
        &self,
        fut: F,
    ) -> Result<Result<T, ollama_rs::error::OllamaError>, Duration>
    where
        F: Future<Output = Result<T, ollama_rs::error::OllamaError>>,
    {
        tokio::time::timeout(self.timeout, fut).await.map_err(|_| self.timeout)
    }
}

fn model_id(embed_model: &str) -> String {
    format!("ollama/{embed_model}")
}

#[async_trait]
impl Embedder for OllamaClient {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn max_input_chars(&self) -> Option<usize> {
        Some(EMBED_MAX_INPUT_CHARS)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let input = EmbeddingsInput::Single(text.to_string());
        let req = GenerateEmbeddingsRequest::new(self.embed_model.clone(), input);
        let res = self
            .with_deadline(self.inner.generate_embeddings(req))
            .await
            .map_err(EmbedError::Timeout)?
            .map_err(|e| EmbedError::Request(e.to_string()))?;
        res.embeddings.into_iter().next().ok_or(EmbedError::EmptyResponse)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let input = EmbeddingsInput::Multiple(texts.to_vec());
        let req = GenerateEmbeddingsRequest::new(self.embed_model.clone(), input);
        let res = self
            .with_deadline(self.inner.generate_embeddings(req))
            .await
            .map_err(EmbedError::Timeout)?
            .map_err(|e| EmbedError::Request(e.to_string()))?;
        if res.embeddings.len() != texts.len() {
            return Err(EmbedError::Request(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                res.embeddings.len()
            )));
        }
        Ok(res.embeddings)
    }
}

#[async_trait]
impl GenerationClient for OllamaClient {
    async fn generate(
        &self,
        prompt: &Prompt,
        history: &ConversationHistory,
    ) -> Result<String, GenerationError> {
        if self.chat_model.trim().is_empty() {
            return Err(GenerationError::Unconfigured("no chat model set".into()));
        }
        let messages = chat_messages(prompt, history);
        debug!(
            kind = %prompt.kind,
            model = %self.chat_model,
            turns = messages.len(),
            "sending chat request"
        );
        let req = ChatMessageRequest::new(self.chat_model.clone(), messages);
        let res = self
            .with_deadline(self.inner.send_chat_messages(req))
            .await
            .map_err(|t| GenerationError::Unavailable(format!("no reply within {t:?}")))?
            .map_err(|e| {
                warn!(error = %e, "chat request failed");
                GenerationError::Unavailable(e.to_string())
            })?;
        let content = res.message.content;
        if content.trim().is_empty() {
            return Err(GenerationError::Malformed("empty reply".into()));
        }
        Ok(content)
    }
}

/// System framing, then prior turns, then the composed user message.
fn chat_messages(prompt: &Prompt, history: &ConversationHistory) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(prompt.system.clone()));
    messages.extend(history.iter().map(|turn| match turn.role {
        Role::User => ChatMessage::user(turn.content.clone()),
        Role::Assistant => ChatMessage::assistant(turn.content.clone()),
    }));
    messages.push(ChatMessage::user(prompt.user.clone()));
    messages
}

#[derive(Debug, Error)]
pub enum OllamaError {
    #[error("invalid Ollama URL: {0}")]
    ParseUrl(#[from] url::ParseError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::PromptKind;
    use crate::session::ConversationTurn;

    #[test]
    fn model_id_names_the_backend() {
        let c = OllamaClient::from_url(DEFAULT_BASE_URL).unwrap().with_embed_model("all-minilm");
        assert_eq!(Embedder::model_id(&c), "ollama/all-minilm");
        assert_eq!(c.max_input_chars(), Some(EMBED_MAX_INPUT_CHARS));
    }

    #[test]
    fn invalid_url_is_rejected() {
        assert!(matches!(OllamaClient::from_url("not a url"), Err(OllamaError::ParseUrl(_))));
    }

    #[test]
    fn history_sits_between_system_and_question() {
        let prompt = Prompt {
            kind: PromptKind::GeneralChat,
            system: "sys".into(),
            user: "now?".into(),
        };
        let history = vec![ConversationTurn::user("q1"), ConversationTurn::assistant("a1")];
        let msgs = chat_messages(&prompt, &history);
        let contents: Vec<&str> = msgs.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["sys", "q1", "a1", "now?"]);
    }

    #[tokio::test]
    async fn empty_chat_model_is_unconfigured() {
        let c = OllamaClient::from_url(DEFAULT_BASE_URL).unwrap().with_chat_model("");
        let prompt = Prompt {
            kind: PromptKind::GeneralChat,
            system: String::new(),
            user: "hi".into(),
        };
        assert!(matches!(c.generate(&prompt, &[]).await, Err(GenerationError::Unconfigured(_))));
    }
}
