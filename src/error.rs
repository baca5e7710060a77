//! Error taxonomy for the ingestion pipeline.
//!
//! Variants are split by retry policy: format and extraction failures are
//! permanent (retrying the same bytes cannot succeed), storage and embedding
//! failures are only surfaced after the pipeline's bounded retries are
//! exhausted. Summarization and tagging failures never appear here — they
//! degrade to sentinel values inside [`crate::summarize`].
//!
//! Retrieval has no error type of its own: the read path degrades to an
//! empty result list (see [`crate::retrieve`]).

use thiserror::Error;

/// A fatal ingestion failure. No partially-visible document remains after
/// any of these is returned.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The declared MIME type is outside the supported set. Not retried.
    #[error("unsupported file type: {mime_type}")]
    UnsupportedFormat { mime_type: String },

    /// A parser failed on a supported type (corrupt or truncated file).
    #[error("text extraction failed: {0}")]
    Extraction(String),

    /// The upload exceeds the configured size limit. Rejected before any
    /// extraction work begins.
    #[error("file of {size} bytes exceeds the {max} byte limit")]
    FileTooLarge { size: u64, max: u64 },

    /// The raw-bytes archive write failed after bounded retries.
    #[error("blob storage write failed: {0}")]
    Storage(String),

    /// The embedding provider failed after bounded retries. Any archived
    /// blob has been rolled back.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// The vector index rejected the commit after embeddings succeeded.
    /// Blob and any partial index writes have been rolled back.
    #[error("vector index write failed: {0}")]
    Index(String),
}

impl IngestError {
    /// Whether retrying the same upload could ever succeed.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            IngestError::UnsupportedFormat { .. }
                | IngestError::Extraction(_)
                | IngestError::FileTooLarge { .. }
        )
    }
}
