//! # Knowledge Pipeline
//!
//! Document ingestion and retrieval-augmented generation core for workspace
//! knowledge bases.
//!
//! The crate accepts arbitrary uploaded files, normalizes them to text,
//! derives a summary and tags, splits the text into overlapping chunks,
//! embeds every chunk, and commits the result to a vector index. The read
//! path embeds a query, runs a workspace-scoped similarity search, and
//! returns ranked snippets with provenance for grounding a chat reply.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────────────────────┐   ┌─────────────┐
//! │  Upload   │──▶│      IngestionPipeline       │──▶│ VectorIndex │
//! │ (bytes +  │   │ extract → summarize/tag →    │   │  (write)    │
//! │  MIME)    │   │ chunk → embed → commit       │   └──────┬──────┘
//! └──────────┘   └──────────────────────────────┘          │
//!                                                           ▼
//! ┌──────────┐   ┌──────────────────────────────┐   ┌─────────────┐
//! │   Chat    │──▶│      RetrievalService        │──▶│ VectorIndex │
//! │  query    │   │ embed → rank → trim → budget │   │   (read)    │
//! └──────────┘   └──────────────────────────────┘   └─────────────┘
//! ```
//!
//! External collaborators (embedding provider, language-model provider,
//! blob storage, vector index) sit behind traits; the surrounding platform
//! injects concrete implementations at construction time.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`models`] | Core data types |
//! | [`error`] | Ingestion error taxonomy |
//! | [`extract`] | Multi-format text extraction |
//! | [`chunk`] | Overlapping text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`llm`] | Language-model provider abstraction |
//! | [`summarize`] | Summary and tag derivation |
//! | [`storage`] | Blob storage for archived uploads |
//! | [`index`] | Vector index abstraction |
//! | [`ingest`] | Ingestion pipeline orchestration |
//! | [`retrieve`] | Retrieval-augmented generation read path |

pub mod chunk;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod retrieve;
pub mod storage;
pub mod summarize;

/// Install a `tracing` subscriber honoring `RUST_LOG`. Intended for hosts
/// that do not configure their own; calling it twice is a no-op.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}
