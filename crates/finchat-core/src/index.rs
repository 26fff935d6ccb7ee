//! Index pipeline: chunks → embed → store, published through an [`IndexHandle`].
//!
//! A handle owns at most one complete [`VectorStore`]. Building a new one never
//! disturbs the current store: the replacement is embedded, assembled and
//! persisted off to the side, then swapped in with a single pointer write.
//! Queries clone the current `Arc` and search it without holding the lock, so
//! a reader sees either the old store or the new one, never a mix.
//!
//! Builds on one handle commit one at a time: version, file and pointer are
//! written under the handle's writer lock, so the persisted file always holds
//! the published store. Dropping a `build` future while it is still embedding
//! publishes nothing; once the vectors are in, the commit runs to completion.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::chunks::Chunk;
use crate::embed::{EmbedError, Embedder};
use crate::store::{ScoredChunk, StoreError, VectorStore};

/// Default number of chunks returned by a query.
pub const DEFAULT_TOP_K: usize = 5;

/// Ordered query results: highest score first, ties in document order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrievedSet {
    pub hits: Vec<ScoredChunk>,
    /// Label of the document the hits were drawn from.
    pub label: String,
    /// Version of the store the hits were drawn from.
    pub version: u64,
}

impl RetrievedSet {
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// Chunk texts in rank order.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.hits.iter().map(|h| h.chunk.text.as_str())
    }
}

/// Shared, cheaply clonable handle to one document index.
#[derive(Clone)]
pub struct IndexHandle {
    inner: Arc<Slot>,
}

struct Slot {
    embedder: Arc<dyn Embedder>,
    current: RwLock<Option<Arc<VectorStore>>>,
    /// Next version to assign. Held for a whole commit, which makes it the
    /// handle's writer lock.
    next_version: Mutex<u64>,
    /// Backing file, if the index is persisted.
    path: Option<PathBuf>,
}

impl IndexHandle {
    /// An in-memory handle with nothing built yet.
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self::with_slot(embedder, None, None, 1)
    }

    /// A handle persisted at `path`. Loads the store already there, if any.
    ///
    /// A saved store that cannot be read, or that was built with a different
    /// embedding model than `embedder`, is left unpublished: the handle starts
    /// not ready and the next `build` overwrites the file.
    pub fn open(embedder: Arc<dyn Embedder>, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if !path.exists() {
            return Self::with_slot(embedder, Some(path), None, 1);
        }
        let store = match VectorStore::load(&path) {
            Ok(store) => store,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unreadable index");
                return Self::with_slot(embedder, Some(path), None, 1);
            }
        };
        let next_version = store.version() + 1;
        if store.model() != embedder.model_id() {
            warn!(
                path = %path.display(),
                index_model = store.model(),
                embed_model = embedder.model_id(),
                "saved index uses another embedding model; process the document again"
            );
            return Self::with_slot(embedder, Some(path), None, next_version);
        }
        info!(
            path = %path.display(),
            label = store.label(),
            chunk_count = store.len(),
            "loaded index"
        );
        Self::with_slot(embedder, Some(path), Some(store), next_version)
    }

    fn with_slot(
        embedder: Arc<dyn Embedder>,
        path: Option<PathBuf>,
        existing: Option<VectorStore>,
        next_version: u64,
    ) -> Self {
        Self {
            inner: Arc::new(Slot {
                embedder,
                current: RwLock::new(existing.map(Arc::new)),
                next_version: Mutex::new(next_version),
                path,
            }),
        }
    }

    /// The embedding backend this index was (and will be) built with.
    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.inner.embedder
    }

    pub fn path(&self) -> Option<&Path> {
        self.inner.path.as_deref()
    }

    /// Embed `chunks` and replace the current store with the result.
    ///
    /// On any error the previous store stays published.
    pub async fn build(
        &self,
        label: &str,
        chunks: Vec<Chunk>,
    ) -> Result<Arc<VectorStore>, IndexError> {
        if chunks.is_empty() {
            return Err(IndexError::EmptyInput);
        }
        let embedder = &self.inner.embedder;
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        debug!(
            label,
            chunk_count = texts.len(),
            model = embedder.model_id(),
            "embedding chunks"
        );
        let embeddings = embedder.embed_batch(&texts).await?;

        let dimension = embeddings.first().map_or(0, Vec::len);
        if dimension == 0 {
            return Err(IndexError::EmbeddingService(EmbedError::EmptyResponse));
        }
        let mut store = VectorStore::new(embedder.model_id(), dimension, label);
        store.add_batch(chunks, embeddings).map_err(|e| {
            warn!(label, error = %e, "embedding backend returned inconsistent vectors");
            IndexError::EmbeddingService(EmbedError::Request(e.to_string()))
        })?;

        let slot = Arc::clone(&self.inner);
        let store = tokio::spawn(async move { slot.commit(store).await }).await??;
        info!(
            label,
            version = store.version(),
            chunk_count = store.len(),
            "published index"
        );
        Ok(store)
    }

    /// The currently published store.
    pub async fn snapshot(&self) -> Result<Arc<VectorStore>, IndexError> {
        self.inner.current.read().await.clone().ok_or(IndexError::NotReady)
    }

    pub async fn is_ready(&self) -> bool {
        self.inner.current.read().await.is_some()
    }

    /// Embed `text` with this index's own embedder and return the `k` nearest chunks.
    pub async fn query(&self, text: &str, k: usize) -> Result<RetrievedSet, IndexError> {
        let store = self.snapshot().await?;
        let vector = self.inner.embedder.embed(text).await?;
        search_store(&store, &vector, k)
    }

    /// Drop the published store. Does not touch the backing file.
    pub async fn clear(&self) {
        *self.inner.current.write().await = None;
    }
}

impl Slot {
    /// Number, persist and publish `store` while holding the writer lock.
    async fn commit(&self, mut store: VectorStore) -> Result<Arc<VectorStore>, IndexError> {
        let mut next_version = self.next_version.lock().await;
        store.set_version(*next_version);
        let store = Arc::new(store);
        if let Some(path) = self.path.clone() {
            let to_save = Arc::clone(&store);
            tokio::task::spawn_blocking(move || to_save.save(&path)).await??;
        }
        *self.current.write().await = Some(Arc::clone(&store));
        *next_version += 1;
        Ok(store)
    }
}

/// Search one store snapshot, mapping a dimension mismatch to a consistency error.
pub(crate) fn search_store(
    store: &VectorStore,
    vector: &[f32],
    k: usize,
) -> Result<RetrievedSet, IndexError> {
    let hits = store.search(vector, k).map_err(|e| match e {
        StoreError::DimensionMismatch { expected, actual } => {
            IndexError::DimensionMismatch { expected, actual }
        }
        other => IndexError::Store(other),
    })?;
    Ok(RetrievedSet {
        hits,
        label: store.label().to_string(),
        version: store.version(),
    })
}

/// Index handles keyed by scope (a session or document id), so several
/// documents can be indexed side by side without sharing state.
pub struct IndexRegistry {
    embedder: Arc<dyn Embedder>,
    /// Directory for persisted indexes; `None` keeps everything in memory.
    root: Option<PathBuf>,
    handles: Mutex<HashMap<String, IndexHandle>>,
}

impl IndexRegistry {
    pub fn new(embedder: Arc<dyn Embedder>, root: Option<PathBuf>) -> Self {
        Self {
            embedder,
            root,
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// The handle for `scope`, created (and loaded from disk, if persisted) on first use.
    pub async fn handle(&self, scope: &str) -> IndexHandle {
        let mut handles = self.handles.lock().await;
        if let Some(h) = handles.get(scope) {
            return h.clone();
        }
        let handle = match &self.root {
            Some(root) => {
                IndexHandle::open(Arc::clone(&self.embedder), root.join(store_file_name(scope)))
            }
            None => IndexHandle::new(Arc::clone(&self.embedder)),
        };
        handles.insert(scope.to_string(), handle.clone());
        handle
    }

    /// Forget the handle for `scope`. Its persisted file is left in place.
    pub async fn remove(&self, scope: &str) -> Option<IndexHandle> {
        self.handles.lock().await.remove(scope)
    }
}

/// File name for a scope's persisted index; anything but `[A-Za-z0-9_-]` becomes `_`.
pub fn store_file_name(scope: &str) -> String {
    let safe: String = scope
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let safe = if safe.is_empty() { "default".to_string() } else { safe };
    format!("{safe}.json")
}

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("no chunks to index")]
    EmptyInput,
    #[error("no document has been indexed yet")]
    NotReady,
    #[error("embedding service error: {0}")]
    EmbeddingService(#[from] EmbedError),
    #[error(
        "index was built with embedding model '{index_model}' but queried with '{query_model}'"
    )]
    Consistency { index_model: String, query_model: String },
    #[error("query vector dimension {actual} does not match index dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("index store error: {0}")]
    Store(#[from] StoreError),
    #[error("index commit did not finish: {0}")]
    Commit(#[from] tokio::task::JoinError),
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::chunks::chunk_text;
    use crate::test_util::{FailingEmbedder, HashEmbedder, SlowEmbedder};

    fn chunks(texts: &[&str]) -> Vec<Chunk> {
        texts
            .iter()
            .enumerate()
            .map(|(id, t)| Chunk {
                id,
                text: t.to_string(),
                source_offset: id * 100,
            })
            .collect()
    }

    #[tokio::test]
    async fn query_before_build_is_not_ready() {
        let handle = IndexHandle::new(Arc::new(HashEmbedder::new("m")));
        assert!(matches!(handle.query("revenue", 5).await, Err(IndexError::NotReady)));
        assert!(!handle.is_ready().await);
    }

    #[tokio::test]
    async fn empty_build_is_rejected_and_keeps_old_index() {
        let handle = IndexHandle::new(Arc::new(HashEmbedder::new("m")));
        handle.build("a.txt", chunks(&["alpha beta"])).await.unwrap();
        assert!(matches!(handle.build("b.txt", Vec::new()).await, Err(IndexError::EmptyInput)));
        assert_eq!(handle.snapshot().await.unwrap().label(), "a.txt");
    }

    #[tokio::test]
    async fn failed_build_keeps_old_index() {
        let handle = IndexHandle::new(Arc::new(HashEmbedder::new("m")));
        handle.build("a.txt", chunks(&["alpha"])).await.unwrap();

        let failing = IndexHandle {
            inner: Arc::new(Slot {
                embedder: Arc::new(FailingEmbedder),
                current: RwLock::new(handle.inner.current.read().await.clone()),
                next_version: Mutex::new(2),
                path: None,
            }),
        };
        assert!(matches!(
            failing.build("b.txt", chunks(&["beta"])).await,
            Err(IndexError::EmbeddingService(_))
        ));
        assert_eq!(failing.snapshot().await.unwrap().label(), "a.txt");
    }

    #[tokio::test]
    async fn rebuild_replaces_rather_than_merges() {
        let handle = IndexHandle::new(Arc::new(HashEmbedder::new("m")));
        handle.build("a.txt", chunks(&["alpha one", "alpha two"])).await.unwrap();
        let b = handle.build("b.txt", chunks(&["beta"])).await.unwrap();
        assert_eq!(b.len(), 1);
        assert_eq!(b.version(), 2);
        let res = handle.query("alpha", 5).await.unwrap();
        assert_eq!(res.len(), 1);
        assert_eq!(res.label, "b.txt");
    }

    #[tokio::test]
    async fn query_returns_at_most_index_size() {
        let handle = IndexHandle::new(Arc::new(HashEmbedder::new("m")));
        handle.build("a.txt", chunks(&["one", "two"])).await.unwrap();
        assert_eq!(handle.query("one", 5).await.unwrap().len(), 2);
        assert_eq!(handle.query("one", 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn query_is_deterministic() {
        let handle = IndexHandle::new(Arc::new(HashEmbedder::new("m")));
        let text =
            "Revenue grew 20% to $5M in Q3. Costs were flat. Headcount rose by ten. ".repeat(20);
        handle.build("r.txt", chunk_text(&text, 120, 20).unwrap()).await.unwrap();
        let a = handle.query("revenue growth", 5).await.unwrap();
        let b = handle.query("revenue growth", 5).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn cancelled_build_publishes_nothing() {
        let handle = IndexHandle::new(Arc::new(SlowEmbedder::new("m", Duration::from_secs(60))));
        let build = handle.build("a.txt", chunks(&["alpha"]));
        let res = tokio::time::timeout(Duration::from_millis(20), build).await;
        assert!(res.is_err());
        assert!(!handle.is_ready().await);
    }

    #[tokio::test]
    async fn persisted_index_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let handle = IndexHandle::open(Arc::new(HashEmbedder::new("m")), &path);
        handle.build("a.txt", chunks(&["alpha", "beta"])).await.unwrap();

        let reopened = IndexHandle::open(Arc::new(HashEmbedder::new("m")), &path);
        assert_eq!(reopened.path(), Some(path.as_path()));
        let store = reopened.snapshot().await.unwrap();
        assert_eq!(store.label(), "a.txt");
        assert_eq!(store.len(), 2);
        let next = reopened.build("b.txt", chunks(&["gamma"])).await.unwrap();
        assert_eq!(next.version(), 2);

    }

    #[tokio::test]
    async fn changed_embedding_model_can_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        let root = Some(dir.path().to_path_buf());
        let registry = IndexRegistry::new(Arc::new(HashEmbedder::new("ollama/old")), root.clone());
        let old = registry.handle("default").await;
        old.build("a.txt", chunks(&["alpha"])).await.unwrap();

        let registry = IndexRegistry::new(Arc::new(HashEmbedder::new("ollama/new")), root);
        let handle = registry.handle("default").await;
        assert!(!handle.is_ready().await);

        let rebuilt = handle.build("b.txt", chunks(&["beta"])).await.unwrap();
        assert_eq!(rebuilt.model(), "ollama/new");
        assert_eq!(rebuilt.version(), 2);
        assert_eq!(VectorStore::load(&dir.path().join("default.json")).unwrap().label(), "b.txt");
    }

    #[tokio::test]
    async fn unreadable_index_file_starts_not_ready() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("default.json");
        std::fs::write(&path, "{ not json").unwrap();
        let handle = IndexHandle::open(Arc::new(HashEmbedder::new("m")), &path);
        assert!(!handle.is_ready().await);
        handle.build("a.txt", chunks(&["alpha"])).await.unwrap();
        assert_eq!(VectorStore::load(&path).unwrap().label(), "a.txt");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_builds_keep_file_and_memory_in_step() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("default.json");
        let handle = IndexHandle::open(Arc::new(HashEmbedder::new("m")), &path);
        for round in 0..25 {
            let (a, b) = (handle.clone(), handle.clone());
            let first = tokio::spawn(async move {
                a.build("a.txt", chunks(&["alpha one", "alpha two"])).await
            });
            let second = tokio::spawn(async move { b.build("b.txt", chunks(&["beta"])).await });
            let first = first.await.unwrap().unwrap();
            let second = second.await.unwrap().unwrap();
            assert_ne!(first.version(), second.version());

            let published = handle.snapshot().await.unwrap();
            let on_disk = VectorStore::load(&path).unwrap();
            assert_eq!(published.version(), first.version().max(second.version()));
            assert_eq!(on_disk.version(), published.version(), "round {round}");
            assert_eq!(on_disk.label(), published.label());
        }
        assert_eq!(handle.snapshot().await.unwrap().version(), 50);
    }

    #[tokio::test]
    async fn registry_keeps_scopes_apart() {
        let registry = IndexRegistry::new(Arc::new(HashEmbedder::new("m")), None);
        let a = registry.handle("alice").await;
        let b = registry.handle("bob").await;
        a.build("a.txt", chunks(&["alpha"])).await.unwrap();
        assert!(!b.is_ready().await);
        assert!(registry.handle("alice").await.is_ready().await);

        registry.remove("alice").await.unwrap().clear().await;
        assert!(!a.is_ready().await);
        assert!(!registry.handle("alice").await.is_ready().await);
    }

    #[test]
    fn store_file_names_are_sanitized() {
        assert_eq!(store_file_name("user/42 doc"), "user_42_doc.json");
        assert_eq!(store_file_name(""), "default.json");
    }
}
