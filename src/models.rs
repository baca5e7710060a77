//! Core data models for the ingestion and retrieval pipeline.
//!
//! These types flow between the pipeline stages: an [`UploadedFile`] enters,
//! a [`ProcessedDocument`] with embedded [`TextChunk`]s comes out, and the
//! read path produces [`RetrievalResult`]s that the conversation layer
//! attaches to assistant messages as [`GroundingSource`]s.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A raw upload as received at the API boundary. Ephemeral — exists only
/// for the duration of one ingestion.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub name: String,
    pub mime_type: String,
    pub size: u64,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            size: bytes.len() as u64,
            bytes,
        }
    }
}

/// A bounded substring of a document's extracted text, the unit of
/// embedding and retrieval. Every chunk's embedding has the same
/// dimensionality as every other chunk's across the system.
#[derive(Debug, Clone)]
pub struct TextChunk {
    /// Position within the document, contiguous from 0.
    pub index: usize,
    pub text: String,
    pub embedding: Vec<f32>,
}

/// Deterministic facts computed from the final extracted text.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentMetadata {
    pub word_count: usize,
    /// Coarse heuristic: `"en"` or `"unknown"`.
    pub detected_language: String,
    pub chunk_count: usize,
    pub extracted_at: DateTime<Utc>,
}

/// The durable output of a successful ingestion.
///
/// Invariants: `chunks` is non-empty whenever `content` is non-empty, and
/// `chunks.len() == metadata.chunk_count`.
#[derive(Debug, Clone)]
pub struct ProcessedDocument {
    pub id: String,
    pub workspace_id: String,
    /// Opaque reference to the archived raw bytes.
    pub storage_url: String,
    /// Full extracted text.
    pub content: String,
    pub summary: String,
    /// 3–5 topical tags; order is irrelevant.
    pub tags: Vec<String>,
    /// Ordered by `index`.
    pub chunks: Vec<TextChunk>,
    pub metadata: DocumentMetadata,
}

/// One ranked snippet returned from a retrieval query. Created per query,
/// never persisted on its own — only referenced from conversation message
/// metadata.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalResult {
    pub source_document_id: String,
    pub chunk_index: usize,
    /// Chunk text trimmed to a display-friendly excerpt.
    pub snippet: String,
    /// Higher is more relevant; comparable only within one query's results.
    pub relevance_score: f32,
}

/// The citation contract consumed by the chat/answer-generation boundary.
#[derive(Debug, Clone, Serialize)]
pub struct GroundingSource {
    pub title: String,
    pub snippet: String,
    pub relevance_score: f32,
}

/// Retrieval output packaged for the conversation gateway: the ranked
/// sources plus a pre-formatted context block for the reply prompt.
#[derive(Debug, Clone, Serialize)]
pub struct GroundingContext {
    pub sources: Vec<GroundingSource>,
    pub summary: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uploaded_file_size_tracks_bytes() {
        let file = UploadedFile::new("notes.txt", "text/plain", b"hello".to_vec());
        assert_eq!(file.size, 5);
        assert_eq!(file.mime_type, "text/plain");
    }
}
