//! In-memory vector store for chunk embeddings. Supports similarity search and
//! persistence to a single JSON file.
//!
//! A store is one immutable index instance: it is built whole from a document's
//! chunks and never updated afterwards.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use serde::{Deserialize, Serialize};

use crate::chunks::Chunk;

/// A chunk with its embedding, stored for similarity search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub chunk: Chunk,
    /// Normalized embedding vector (unit length for cosine similarity via dot product).
    vector: Vec<f32>,
}

/// A retrieved chunk paired with its cosine similarity to the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// In-memory vector store. Holds one record per chunk, all of the same dimension.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStore {
    /// Embedding space the vectors belong to (see `Embedder::model_id`).
    model: String,
    dimension: usize,
    /// Human-readable name of the indexed document.
    label: String,
    /// Monotonic build number assigned by the owning handle.
    version: u64,
    records: Vec<EmbeddingRecord>,
}

impl VectorStore {
    /// Create an empty store for vectors of `dimension` from embedding space `model`.
    pub fn new(model: impl Into<String>, dimension: usize, label: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            dimension,
            label: label.into(),
            version: 0,
            records: Vec::new(),
        }
    }

    /// Add a chunk with its embedding. Embedding is normalized before storage.
    pub fn add(&mut self, chunk: Chunk, embedding: Vec<f32>) -> Result<(), StoreError> {
        if embedding.len() != self.dimension {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }
        self.records.push(EmbeddingRecord {
            chunk,
            vector: normalize(&embedding),
        });
        Ok(())
    }

    /// Add multiple chunks with embeddings in one batch.
    pub fn add_batch(
        &mut self,
        chunks: Vec<Chunk>,
        embeddings: Vec<Vec<f32>>,
    ) -> Result<(), StoreError> {
        if chunks.len() != embeddings.len() {
            return Err(StoreError::CountMismatch {
                chunks: chunks.len(),
                embeddings: embeddings.len(),
            });
        }
        for (chunk, embedding) in chunks.into_iter().zip(embeddings) {
            self.add(chunk, embedding)?;
        }
        Ok(())
    }

    /// Search for chunks most similar to the query embedding. Returns up to k results,
    /// highest score first; equal scores keep document order (lower chunk id first).
    pub fn search(
        &self,
        query_embedding: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredChunk>, StoreError> {
        if query_embedding.len() != self.dimension {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimension,
                actual: query_embedding.len(),
            });
        }
        let q_norm = normalize(query_embedding);
        let mut scored: Vec<ScoredChunk> = self
            .records
            .iter()
            .map(|r| ScoredChunk {
                chunk: r.chunk.clone(),
                score: dot(&q_norm, &r.vector),
            })
            .collect();
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then(a.chunk.id.cmp(&b.chunk.id))
        });
        scored.truncate(k);
        Ok(scored)
    }

    /// Records in document order.
    pub fn records(&self) -> &[EmbeddingRecord] {
        &self.records
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub(crate) fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    /// Number of indexed chunks.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Write the store to `path`. Writes a sibling temp file and renames it over
    /// the target, so readers never see a half-written index.
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Io(parent.to_path_buf(), e))?;
        }
        let json = serde_json::to_vec(self).map_err(StoreError::Serialize)?;
        let tmp = path.with_extension(format!(
            "json.{}-{}.tmp",
            std::process::id(),
            SAVE_SEQ.fetch_add(1, AtomicOrdering::Relaxed)
        ));
        std::fs::write(&tmp, json).map_err(|e| StoreError::Io(tmp.clone(), e))?;
        std::fs::rename(&tmp, path).map_err(|e| StoreError::Io(path.to_path_buf(), e))
    }

    /// Read a store previously written by [`save`](VectorStore::save).
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let bytes = std::fs::read(path).map_err(|e| StoreError::Io(path.to_path_buf(), e))?;
        let store: Self = serde_json::from_slice(&bytes).map_err(StoreError::Serialize)?;
        if let Some(bad) = store.records.iter().find(|r| r.vector.len() != store.dimension) {
            return Err(StoreError::DimensionMismatch {
                expected: store.dimension,
                actual: bad.vector.len(),
            });
        }
        Ok(store)
    }
}

/// Distinguishes temp files of saves running at the same time.
static SAVE_SEQ: AtomicU64 = AtomicU64::new(0);

fn normalize(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm <= 0.0 {
        return v.to_vec();
    }
    v.iter().map(|x| x / norm).collect()
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("vector dimension {actual} does not match index dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("{chunks} chunks but {embeddings} embeddings")]
    CountMismatch { chunks: usize, embeddings: usize },
    #[error("failed to (de)serialize index: {0}")]
    Serialize(serde_json::Error),
    #[error("index file error for {0}: {1}")]
    Io(PathBuf, std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: usize, text: &str) -> Chunk {
        Chunk {
            id,
            text: text.to_string(),
            source_offset: id * 10,
        }
    }

    fn store() -> VectorStore {
        let mut s = VectorStore::new("test-model", 2, "report.pdf");
        s.add_batch(
            vec![chunk(0, "east"), chunk(1, "north"), chunk(2, "north-east")],
            vec![vec![1.0, 0.0], vec![0.0, 3.0], vec![1.0, 1.0]],
        )
        .unwrap();
        s
    }

    #[test]
    fn search_orders_by_score() {
        let hits = store().search(&[0.0, 1.0], 3).unwrap();
        let ids: Vec<usize> = hits.iter().map(|h| h.chunk.id).collect();
        assert_eq!(ids, vec![1, 2, 0]);
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn equal_scores_keep_document_order() {
        let mut s = VectorStore::new("m", 2, "doc");
        s.add(chunk(1, "b"), vec![2.0, 0.0]).unwrap();
        s.add(chunk(0, "a"), vec![1.0, 0.0]).unwrap();
        s.add(chunk(2, "c"), vec![5.0, 0.0]).unwrap();
        let hits = s.search(&[1.0, 0.0], 3).unwrap();
        let ids: Vec<usize> = hits.iter().map(|h| h.chunk.id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn search_never_pads() {
        assert_eq!(store().search(&[1.0, 0.0], 10).unwrap().len(), 3);
    }

    #[test]
    fn rejects_wrong_dimension() {
        let mut s = store();
        assert!(matches!(
            s.add(chunk(3, "x"), vec![1.0, 2.0, 3.0]),
            Err(StoreError::DimensionMismatch { expected: 2, actual: 3 })
        ));
        assert!(s.search(&[1.0], 1).is_err());
    }

    #[test]
    fn rejects_count_mismatch() {
        let mut s = VectorStore::new("m", 2, "doc");
        assert!(matches!(
            s.add_batch(vec![chunk(0, "a")], vec![]),
            Err(StoreError::CountMismatch { chunks: 1, embeddings: 0 })
        ));
    }

    #[test]
    fn save_and_load_keep_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("indexes").join("default.json");
        let mut s = store();
        s.set_version(7);
        s.save(&path).unwrap();

        let loaded = VectorStore::load(&path).unwrap();
        assert_eq!(loaded.model(), "test-model");
        assert_eq!(loaded.label(), "report.pdf");
        assert_eq!(loaded.version(), 7);
        assert_eq!(loaded.len(), 3);
        assert_eq!(
            loaded.search(&[0.0, 1.0], 1).unwrap()[0].chunk.text,
            "north"
        );
    }
}
