//! Embedding provider abstraction and the OpenAI implementation.
//!
//! The [`EmbeddingProvider`] trait is the seam between the pipeline and the
//! external embedding service. Ingestion and retrieval must share one
//! provider instance: mixing embedding spaces produces meaningless
//! similarity scores.
//!
//! # Retry strategy
//!
//! Transient failures use exponential backoff:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors and timeouts → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::config::EmbeddingConfig;

const OPENAI_EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";

/// Turns text into fixed-dimension vectors. Implementations must report a
/// stable dimensionality across calls.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text (e.g. a search query).
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let texts = [text.to_string()];
        let mut vectors = self.embed(&texts).await?;
        vectors
            .pop()
            .ok_or_else(|| anyhow::anyhow!("empty embedding response"))
    }

    /// Vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;

    /// Model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
}

/// Instantiate the provider named by the configuration.
pub fn create_embedding_provider(
    config: &EmbeddingConfig,
) -> Result<std::sync::Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "openai" => Ok(std::sync::Arc::new(OpenAiEmbeddingProvider::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// Embedding provider backed by the OpenAI embeddings API.
///
/// Batches are capped at `batch_size` texts per request; oversized inputs
/// are sub-batched rather than rejected. Every call is bounded by the
/// configured timeout.
pub struct OpenAiEmbeddingProvider {
    model: String,
    dims: usize,
    batch_size: usize,
    max_retries: u32,
    api_url: String,
    client: reqwest::Client,
}

impl OpenAiEmbeddingProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for OpenAI provider"))?;

        if std::env::var("OPENAI_API_KEY").is_err() {
            bail!("OPENAI_API_KEY environment variable not set");
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model,
            dims,
            batch_size: config.batch_size,
            max_retries: config.max_retries,
            api_url: config
                .api_url
                .clone()
                .unwrap_or_else(|| OPENAI_EMBEDDINGS_URL.to_string()),
            client,
        })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY not set"))?;

        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&self.api_url)
                .header("Authorization", format!("Bearer {}", api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        let vectors = parse_embeddings_response(&json)?;
                        self.check_dims(&vectors)?;
                        return Ok(vectors);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err =
                            Some(anyhow::anyhow!("OpenAI API error {}: {}", status, body_text));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    bail!("OpenAI API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("embedding failed after retries")))
    }

    fn check_dims(&self, vectors: &[Vec<f32>]) -> Result<()> {
        for v in vectors {
            if v.len() != self.dims {
                bail!(
                    "provider returned {}-dimensional vector, expected {}",
                    v.len(),
                    self.dims
                );
            }
        }
        Ok(())
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size.max(1)) {
            vectors.extend(self.embed_batch(batch).await?);
        }
        Ok(vectors)
    }

    fn dims(&self) -> usize {
        self.dims
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Extract `data[].embedding` arrays from an OpenAI embeddings response,
/// in input order.
fn parse_embeddings_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid embeddings response: missing data array"))?;

    let mut embeddings = Vec::with_capacity(data.len());
    for item in data {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow::anyhow!("Invalid embeddings response: missing embedding"))?;
        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        embeddings.push(vec);
    }
    Ok(embeddings)
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`; `0.0` for empty vectors or vectors of
/// different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_response_extracts_vectors_in_order() {
        let json = serde_json::json!({
            "data": [
                { "index": 0, "embedding": [1.0, 0.0] },
                { "index": 1, "embedding": [0.0, 1.0] },
            ]
        });
        let vectors = parse_embeddings_response(&json).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn parse_response_rejects_missing_data() {
        let json = serde_json::json!({ "error": "nope" });
        assert!(parse_embeddings_response(&json).is_err());
    }

    #[test]
    fn cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn cosine_opposite() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_empty_or_mismatched_is_zero() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }
}
