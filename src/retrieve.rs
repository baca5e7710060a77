//! Retrieval-augmented generation read path.
//!
//! Embeds a query with the same provider used at ingestion time, asks the
//! workspace-scoped vector index for nearest neighbors, and turns the
//! matches into ranked, budgeted snippets with provenance.
//!
//! Grounding is best-effort: any provider or index failure degrades to an
//! empty result list so the enclosing chat request can still produce an
//! answer. An empty return value therefore means "no source material was
//! relevant (or retrieval was unavailable)", never a hard failure.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::RetrievalConfig;
use crate::embedding::EmbeddingProvider;
use crate::index::{IndexMatch, VectorIndex};
use crate::models::{GroundingContext, GroundingSource, RetrievalResult};

/// Workspace-scoped semantic retrieval over ingested documents.
pub struct RetrievalService {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    config: RetrievalConfig,
}

impl RetrievalService {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            embedder,
            index,
            config,
        }
    }

    /// Return the most relevant chunks for `query` within a workspace,
    /// ordered by descending relevance. `conversation_id` scopes logging
    /// today and is reserved for conversation-local retrieval filters.
    pub async fn retrieve(
        &self,
        query: &str,
        workspace_id: &str,
        conversation_id: Option<&str>,
        top_k: Option<usize>,
    ) -> Vec<RetrievalResult> {
        self.retrieve_annotated(query, workspace_id, conversation_id, top_k)
            .await
            .into_iter()
            .map(|(result, _)| result)
            .collect()
    }

    /// Like [`retrieve`](Self::retrieve), but each result is paired with
    /// its source document title for citation rendering.
    async fn retrieve_annotated(
        &self,
        query: &str,
        workspace_id: &str,
        conversation_id: Option<&str>,
        top_k: Option<usize>,
    ) -> Vec<(RetrievalResult, String)> {
        match self
            .try_retrieve(query, workspace_id, top_k.unwrap_or(self.config.top_k))
            .await
        {
            Ok(results) => {
                debug!(
                    workspace_id,
                    conversation_id = conversation_id.unwrap_or("-"),
                    results = results.len(),
                    "retrieval complete"
                );
                results
            }
            Err(e) => {
                warn!(workspace_id, error = %e, "retrieval degraded to empty result set");
                Vec::new()
            }
        }
    }

    async fn try_retrieve(
        &self,
        query: &str,
        workspace_id: &str,
        top_k: usize,
    ) -> anyhow::Result<Vec<(RetrievalResult, String)>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let query_vector = self.embedder.embed_one(query).await?;

        let candidate_k = self.config.candidate_k.max(top_k);
        let mut matches = self
            .index
            .query(workspace_id, &query_vector, candidate_k)
            .await?;

        // Below-threshold results are dropped outright — an empty answer is
        // more honest than padding with irrelevant material.
        matches.retain(|m| m.score >= self.config.min_score);

        rank(&mut matches);
        matches.truncate(top_k);

        let mut results = Vec::with_capacity(matches.len());
        let mut budget_used = 0usize;
        for m in matches {
            let snippet = trim_snippet(&m.payload.text, self.config.snippet_max_chars);
            if budget_used + snippet.len() > self.config.context_budget_chars {
                break;
            }
            budget_used += snippet.len();
            results.push((
                RetrievalResult {
                    source_document_id: m.document_id,
                    chunk_index: m.chunk_index,
                    snippet,
                    relevance_score: m.score,
                },
                m.payload.title,
            ));
        }
        Ok(results)
    }

    /// Retrieval output packaged for the conversation gateway: citation
    /// sources plus a formatted context block. `conversation_context`, when
    /// present, is the gateway-supplied transcript of recent messages and is
    /// prepended to the block.
    pub async fn grounding_context(
        &self,
        query: &str,
        workspace_id: &str,
        conversation_context: Option<&str>,
    ) -> GroundingContext {
        let annotated = self
            .retrieve_annotated(query, workspace_id, None, None)
            .await;

        let sources: Vec<GroundingSource> = annotated
            .iter()
            .map(|(r, title)| GroundingSource {
                title: title.clone(),
                snippet: r.snippet.clone(),
                relevance_score: r.relevance_score,
            })
            .collect();

        let summary = build_context_block(&sources, conversation_context);
        GroundingContext { sources, summary }
    }
}

/// Deterministic ordering: score descending, then earlier chunk, then
/// earlier document creation time, then document id as a stable fallback.
fn rank(matches: &mut [IndexMatch]) {
    matches.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.chunk_index.cmp(&b.chunk_index))
            .then(
                a.payload
                    .document_created_at
                    .cmp(&b.payload.document_created_at),
            )
            .then(a.document_id.cmp(&b.document_id))
    });
}

/// Trim chunk text to a display-friendly excerpt, cutting on a word
/// boundary and appending an ellipsis when text was dropped.
fn trim_snippet(text: &str, max_chars: usize) -> String {
    let flattened = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flattened.chars().count() <= max_chars {
        return flattened;
    }

    let cut: String = flattened.chars().take(max_chars).collect();
    let trimmed = match cut.rfind(' ') {
        Some(pos) if pos > 0 => &cut[..pos],
        _ => cut.as_str(),
    };
    format!("{}…", trimmed)
}

/// Numbered-source context block for the reply prompt.
fn build_context_block(sources: &[GroundingSource], conversation_context: Option<&str>) -> String {
    if sources.is_empty() {
        return conversation_context
            .map(|c| format!("Previous conversation context:\n{}", c))
            .unwrap_or_default();
    }

    let listing = sources
        .iter()
        .enumerate()
        .map(|(i, s)| {
            format!(
                "Source {} ({}, relevance: {}%): {}",
                i + 1,
                s.title,
                (s.relevance_score * 100.0).round() as i64,
                s.snippet
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    let mut block = format!("Based on {} relevant documents:\n\n{}", sources.len(), listing);
    if let Some(context) = conversation_context {
        block = format!("Previous conversation context:\n{}\n\n{}", context, block);
    }
    block
}
