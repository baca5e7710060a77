//! Ingestion pipeline orchestration.
//!
//! Coordinates the full upload flow: archive → extraction → summary/tags →
//! chunking → embedding → index commit. The pipeline is a plain service
//! object holding its collaborators behind `Arc`s — no module-level state —
//! so independent documents ingest concurrently.
//!
//! Ordering is the load-bearing part: a document becomes searchable only
//! after every one of its chunks has an embedding and the full set has been
//! committed to the index in one step. Any fatal failure after the archive
//! write rolls the archive back, so a failed ingestion leaves nothing
//! behind.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::chunk::split_text;
use crate::config::Config;
use crate::embedding::EmbeddingProvider;
use crate::error::IngestError;
use crate::extract;
use crate::index::{ChunkPayload, IndexEntry, VectorIndex};
use crate::models::{DocumentMetadata, ProcessedDocument, TextChunk, UploadedFile};
use crate::storage::BlobStorage;
use crate::summarize::SummaryTagger;

/// Pipeline-level attempts for the embedding step (the provider retries
/// transient HTTP failures internally; this bounds whole-step re-runs).
const EMBED_ATTEMPTS: u32 = 3;
/// Base backoff between pipeline-level retry attempts.
const RETRY_BACKOFF_MS: u64 = 250;

/// Function words used by the coarse language heuristic.
const ENGLISH_FUNCTION_WORDS: [&str; 8] = ["the", "and", "is", "to", "a", "of", "in", "for"];

/// Orchestrates document ingestion end to end.
pub struct IngestionPipeline {
    storage: Arc<dyn BlobStorage>,
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    tagger: SummaryTagger,
    config: Config,
}

impl IngestionPipeline {
    pub fn new(
        storage: Arc<dyn BlobStorage>,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        tagger: SummaryTagger,
        config: Config,
    ) -> Self {
        Self {
            storage,
            embedder,
            index,
            tagger,
            config,
        }
    }

    /// Process one upload into a committed, searchable document.
    ///
    /// On any error the workspace is left exactly as it was: no archived
    /// blob, no index entries, no partially-embedded document.
    pub async fn process(
        &self,
        file: UploadedFile,
        workspace_id: &str,
        user_id: &str,
    ) -> Result<ProcessedDocument, IngestError> {
        // Upload boundary: size and type are rejected before any work.
        let max = self.config.upload.max_file_size_bytes;
        if file.size > max {
            return Err(IngestError::FileTooLarge {
                size: file.size,
                max,
            });
        }
        if !extract::is_supported(&file.mime_type) {
            return Err(IngestError::UnsupportedFormat {
                mime_type: file.mime_type.clone(),
            });
        }

        let document_id = Uuid::new_v4().to_string();
        let blob_path = format!("{}/{}/{}-{}", workspace_id, user_id, document_id, file.name);

        // 1. Archive raw bytes. Must succeed before anything else happens.
        let storage_url = self.archive_with_retries(&blob_path, &file.bytes).await?;
        debug!(%document_id, %blob_path, "archived upload");

        // 2. Extract text. Permanent failures abort; the archive is rolled
        // back so nothing references the dead upload.
        let content = match extract::extract_text(&file.bytes, &file.mime_type) {
            Ok(content) => content,
            Err(e) => {
                self.rollback_blob(&blob_path).await;
                return Err(e);
            }
        };
        debug!(%document_id, bytes = content.len(), "extracted text");

        // 3. Summary and tags — independently fault-tolerant, never abort.
        let (summary, tag_outcome) =
            tokio::join!(self.tagger.summarize(&content), self.tagger.tag(&content));
        let tags = tag_outcome.into_tags();

        // 4. Chunk.
        let chunk_texts = split_text(
            &content,
            self.config.chunking.chunk_size,
            self.config.chunking.overlap,
        );

        // 5. Embed every chunk, whole-step retries with backoff.
        let vectors = match self.embed_with_retries(&chunk_texts).await {
            Ok(vectors) => vectors,
            Err(e) => {
                self.rollback_blob(&blob_path).await;
                return Err(IngestError::Embedding(e.to_string()));
            }
        };

        let chunks: Vec<TextChunk> = chunk_texts
            .into_iter()
            .zip(vectors)
            .enumerate()
            .map(|(index, (text, embedding))| TextChunk {
                index,
                text,
                embedding,
            })
            .collect();

        // 6. Commit all vectors atomically; only now does the document
        // become visible to retrieval.
        let created_at = Utc::now();
        let entries: Vec<IndexEntry> = chunks
            .iter()
            .map(|chunk| IndexEntry {
                chunk_index: chunk.index,
                vector: chunk.embedding.clone(),
                payload: ChunkPayload {
                    text: chunk.text.clone(),
                    title: file.name.clone(),
                    document_created_at: created_at.timestamp(),
                },
            })
            .collect();
        if let Err(e) = self
            .index
            .upsert_document(workspace_id, &document_id, &entries)
            .await
        {
            if let Err(cleanup) = self.index.delete_document(&document_id).await {
                warn!(%document_id, error = %cleanup, "index cleanup after failed commit");
            }
            self.rollback_blob(&blob_path).await;
            return Err(IngestError::Index(e.to_string()));
        }

        let metadata = DocumentMetadata {
            word_count: word_count(&content),
            detected_language: detect_language(&content).to_string(),
            chunk_count: chunks.len(),
            extracted_at: created_at,
        };
        debug!(
            %document_id,
            chunks = metadata.chunk_count,
            words = metadata.word_count,
            "document committed"
        );

        Ok(ProcessedDocument {
            id: document_id,
            workspace_id: workspace_id.to_string(),
            storage_url,
            content,
            summary,
            tags,
            chunks,
            metadata,
        })
    }

    async fn archive_with_retries(&self, path: &str, bytes: &[u8]) -> Result<String, IngestError> {
        let mut last_err = None;
        for attempt in 0..=self.config.upload.storage_max_retries {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(RETRY_BACKOFF_MS << (attempt - 1))).await;
            }
            match self.storage.put(path, bytes).await {
                Ok(url) => return Ok(url),
                Err(e) => {
                    warn!(%path, attempt, error = %e, "blob write failed");
                    last_err = Some(e);
                }
            }
        }
        Err(IngestError::Storage(
            last_err.map(|e| e.to_string()).unwrap_or_default(),
        ))
    }

    async fn embed_with_retries(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut last_err = None;
        for attempt in 0..EMBED_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(RETRY_BACKOFF_MS << (attempt - 1))).await;
            }
            match self.embedder.embed(texts).await {
                Ok(vectors) => {
                    verify_vectors(&vectors, texts.len(), self.embedder.dims())?;
                    return Ok(vectors);
                }
                Err(e) => {
                    warn!(attempt, error = %e, "embedding attempt failed");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("embedding failed")))
    }

    /// Best-effort removal of an archived blob during rollback.
    async fn rollback_blob(&self, path: &str) {
        if let Err(e) = self.storage.delete(path).await {
            warn!(%path, error = %e, "failed to roll back archived blob");
        }
    }
}

/// Every chunk must come back with a vector of the provider's declared
/// dimensionality — a mismatch would poison similarity scores silently.
fn verify_vectors(vectors: &[Vec<f32>], expected: usize, dims: usize) -> anyhow::Result<()> {
    if vectors.len() != expected {
        anyhow::bail!(
            "provider returned {} vectors for {} chunks",
            vectors.len(),
            expected
        );
    }
    for v in vectors {
        if v.len() != dims {
            anyhow::bail!("vector of {} dims, expected {}", v.len(), dims);
        }
    }
    Ok(())
}

/// Whitespace-separated word count of the extracted text.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Coarse language heuristic: counts common English function words in the
/// first hundred words. Distinguishes "confidently English" from "unknown",
/// nothing more.
pub fn detect_language(text: &str) -> &'static str {
    let hits = text
        .to_lowercase()
        .split_whitespace()
        .take(100)
        .filter(|w| ENGLISH_FUNCTION_WORDS.contains(w))
        .count();
    if hits > 5 {
        "en"
    } else {
        "unknown"
    }
}
