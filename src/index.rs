//! Vector index abstraction and the in-memory implementation.
//!
//! The [`VectorIndex`] persists chunk embeddings and answers workspace-scoped
//! nearest-neighbor queries by cosine similarity. Queries never cross
//! workspace boundaries — tenant isolation is enforced at this seam, not
//! left to callers.
//!
//! Writes are document-scoped: concurrent ingestions of different documents
//! never disturb each other's vectors, and [`VectorIndex::upsert_document`]
//! makes a document's full embedding set visible in one step so readers
//! never observe a partial commit.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::RwLock;

use crate::embedding::cosine_similarity;

/// Metadata stored alongside each vector; everything retrieval needs to
/// build a result without a second store round-trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkPayload {
    /// The chunk's text.
    pub text: String,
    /// Source document title (for citations).
    pub title: String,
    /// Source document creation time, used as the final ordering tiebreak.
    pub document_created_at: i64,
}

/// One vector queued for a document commit.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub chunk_index: usize,
    pub vector: Vec<f32>,
    pub payload: ChunkPayload,
}

/// A ranked match from [`VectorIndex::query`].
#[derive(Debug, Clone)]
pub struct IndexMatch {
    pub document_id: String,
    pub chunk_index: usize,
    /// Cosine similarity against the query vector.
    pub score: f32,
    pub payload: ChunkPayload,
}

/// Persistent embedding store with workspace-scoped similarity lookup.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or replace a single chunk vector.
    async fn upsert(
        &self,
        workspace_id: &str,
        document_id: &str,
        chunk_index: usize,
        vector: &[f32],
        payload: &ChunkPayload,
    ) -> Result<()>;

    /// Replace all vectors for a document in one atomic step. The default
    /// loops [`upsert`](VectorIndex::upsert); implementations should
    /// override it with a genuinely atomic swap where the backend allows.
    async fn upsert_document(
        &self,
        workspace_id: &str,
        document_id: &str,
        entries: &[IndexEntry],
    ) -> Result<()> {
        for entry in entries {
            self.upsert(
                workspace_id,
                document_id,
                entry.chunk_index,
                &entry.vector,
                &entry.payload,
            )
            .await?;
        }
        Ok(())
    }

    /// Nearest neighbors to `query_vector` within one workspace, ranked by
    /// descending cosine similarity.
    async fn query(
        &self,
        workspace_id: &str,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<IndexMatch>>;

    /// Remove every vector belonging to a document.
    async fn delete_document(&self, document_id: &str) -> Result<()>;
}

struct StoredVector {
    workspace_id: String,
    document_id: String,
    chunk_index: usize,
    vector: Vec<f32>,
    payload: ChunkPayload,
}

/// Brute-force in-memory index for tests and small deployments.
#[derive(Default)]
pub struct InMemoryVectorIndex {
    vectors: RwLock<Vec<StoredVector>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.vectors.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn upsert(
        &self,
        workspace_id: &str,
        document_id: &str,
        chunk_index: usize,
        vector: &[f32],
        payload: &ChunkPayload,
    ) -> Result<()> {
        let mut vectors = self.vectors.write().unwrap();
        vectors.retain(|sv| !(sv.document_id == document_id && sv.chunk_index == chunk_index));
        vectors.push(StoredVector {
            workspace_id: workspace_id.to_string(),
            document_id: document_id.to_string(),
            chunk_index,
            vector: vector.to_vec(),
            payload: payload.clone(),
        });
        Ok(())
    }

    async fn upsert_document(
        &self,
        workspace_id: &str,
        document_id: &str,
        entries: &[IndexEntry],
    ) -> Result<()> {
        // Single write lock: the old vector set is swapped for the new one
        // in one step, so a concurrent reader sees either all or nothing.
        let mut vectors = self.vectors.write().unwrap();
        vectors.retain(|sv| sv.document_id != document_id);
        for entry in entries {
            vectors.push(StoredVector {
                workspace_id: workspace_id.to_string(),
                document_id: document_id.to_string(),
                chunk_index: entry.chunk_index,
                vector: entry.vector.clone(),
                payload: entry.payload.clone(),
            });
        }
        Ok(())
    }

    async fn query(
        &self,
        workspace_id: &str,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<IndexMatch>> {
        let vectors = self.vectors.read().unwrap();
        let mut matches: Vec<IndexMatch> = vectors
            .iter()
            .filter(|sv| sv.workspace_id == workspace_id)
            .map(|sv| IndexMatch {
                document_id: sv.document_id.clone(),
                chunk_index: sv.chunk_index,
                score: cosine_similarity(query_vector, &sv.vector),
                payload: sv.payload.clone(),
            })
            .collect();
        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(top_k);
        Ok(matches)
    }

    async fn delete_document(&self, document_id: &str) -> Result<()> {
        self.vectors
            .write()
            .unwrap()
            .retain(|sv| sv.document_id != document_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(text: &str) -> ChunkPayload {
        ChunkPayload {
            text: text.to_string(),
            title: "doc".to_string(),
            document_created_at: 0,
        }
    }

    fn entry(chunk_index: usize, vector: Vec<f32>, text: &str) -> IndexEntry {
        IndexEntry {
            chunk_index,
            vector,
            payload: payload(text),
        }
    }

    #[tokio::test]
    async fn query_is_workspace_scoped() {
        let index = InMemoryVectorIndex::new();
        index
            .upsert_document("ws-a", "d1", &[entry(0, vec![1.0, 0.0], "a")])
            .await
            .unwrap();
        index
            .upsert_document("ws-b", "d2", &[entry(0, vec![1.0, 0.0], "b")])
            .await
            .unwrap();

        let matches = index.query("ws-a", &[1.0, 0.0], 10).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].document_id, "d1");
    }

    #[tokio::test]
    async fn query_ranks_by_similarity() {
        let index = InMemoryVectorIndex::new();
        index
            .upsert_document(
                "ws",
                "d1",
                &[
                    entry(0, vec![1.0, 0.0], "aligned"),
                    entry(1, vec![0.0, 1.0], "orthogonal"),
                    entry(2, vec![0.7, 0.7], "diagonal"),
                ],
            )
            .await
            .unwrap();

        let matches = index.query("ws", &[1.0, 0.0], 10).await.unwrap();
        assert_eq!(matches[0].payload.text, "aligned");
        assert_eq!(matches[1].payload.text, "diagonal");
        assert_eq!(matches[2].payload.text, "orthogonal");
        for pair in matches.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[tokio::test]
    async fn upsert_document_replaces_previous_vectors() {
        let index = InMemoryVectorIndex::new();
        index
            .upsert_document(
                "ws",
                "d1",
                &[entry(0, vec![1.0, 0.0], "v1"), entry(1, vec![1.0, 0.0], "v1")],
            )
            .await
            .unwrap();
        index
            .upsert_document("ws", "d1", &[entry(0, vec![0.0, 1.0], "v2")])
            .await
            .unwrap();

        assert_eq!(index.len(), 1);
        let matches = index.query("ws", &[0.0, 1.0], 10).await.unwrap();
        assert_eq!(matches[0].payload.text, "v2");
    }

    #[tokio::test]
    async fn concurrent_writes_to_different_documents_do_not_interfere() {
        let index = std::sync::Arc::new(InMemoryVectorIndex::new());
        let mut handles = Vec::new();
        for doc in 0..8 {
            let index = index.clone();
            handles.push(tokio::spawn(async move {
                let doc_id = format!("d{}", doc);
                let entries: Vec<IndexEntry> = (0..16)
                    .map(|i| entry(i, vec![doc as f32, i as f32], "chunk"))
                    .collect();
                index.upsert_document("ws", &doc_id, &entries).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(index.len(), 8 * 16);
    }

    #[tokio::test]
    async fn delete_document_removes_all_vectors() {
        let index = InMemoryVectorIndex::new();
        index
            .upsert_document(
                "ws",
                "d1",
                &[entry(0, vec![1.0], "a"), entry(1, vec![1.0], "b")],
            )
            .await
            .unwrap();
        index
            .upsert_document("ws", "d2", &[entry(0, vec![1.0], "c")])
            .await
            .unwrap();

        index.delete_document("d1").await.unwrap();
        assert_eq!(index.len(), 1);
        let matches = index.query("ws", &[1.0], 10).await.unwrap();
        assert_eq!(matches[0].document_id, "d2");
    }

    #[tokio::test]
    async fn single_upsert_replaces_matching_chunk() {
        let index = InMemoryVectorIndex::new();
        index
            .upsert("ws", "d1", 0, &[1.0, 0.0], &payload("old"))
            .await
            .unwrap();
        index
            .upsert("ws", "d1", 0, &[0.0, 1.0], &payload("new"))
            .await
            .unwrap();
        assert_eq!(index.len(), 1);
        let matches = index.query("ws", &[0.0, 1.0], 1).await.unwrap();
        assert_eq!(matches[0].payload.text, "new");
    }
}
