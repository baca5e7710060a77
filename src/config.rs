use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UploadConfig {
    #[serde(default = "default_max_file_size")]
    pub max_file_size_bytes: u64,
    /// Additional attempts for the raw-bytes archive write.
    #[serde(default = "default_storage_retries")]
    pub storage_max_retries: u32,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size_bytes: default_max_file_size(),
            storage_max_retries: default_storage_retries(),
        }
    }
}

fn default_max_file_size() -> u64 {
    10 * 1024 * 1024
}
fn default_storage_retries() -> u32 {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Maximum texts sent in one provider request; larger documents are
    /// sub-batched rather than rejected.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_embed_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Override the provider endpoint (tests, proxies).
    #[serde(default)]
    pub api_url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_embed_retries(),
            timeout_secs: default_timeout_secs(),
            api_url: None,
        }
    }
}

fn default_embedding_provider() -> String {
    "openai".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_embed_retries() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    /// `"openai"` or `"anthropic"` — chosen explicitly, never inferred
    /// from which API keys happen to be present.
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_llm_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Character cap on the document prefix sent for summarization.
    #[serde(default = "default_summary_prefix")]
    pub summary_prefix_chars: usize,
    /// Character cap on the document prefix sent for tagging.
    #[serde(default = "default_tag_prefix")]
    pub tag_prefix_chars: usize,
    #[serde(default = "default_summary_max_tokens")]
    pub summary_max_tokens: usize,
    #[serde(default = "default_tag_max_tokens")]
    pub tag_max_tokens: usize,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub api_url: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: None,
            max_retries: default_llm_retries(),
            timeout_secs: default_timeout_secs(),
            summary_prefix_chars: default_summary_prefix(),
            tag_prefix_chars: default_tag_prefix(),
            summary_max_tokens: default_summary_max_tokens(),
            tag_max_tokens: default_tag_max_tokens(),
            temperature: default_temperature(),
            api_url: None,
        }
    }
}

fn default_llm_provider() -> String {
    "openai".to_string()
}
fn default_llm_retries() -> u32 {
    1
}
fn default_summary_prefix() -> usize {
    4000
}
fn default_tag_prefix() -> usize {
    2000
}
fn default_summary_max_tokens() -> usize {
    150
}
fn default_tag_max_tokens() -> usize {
    50
}
fn default_temperature() -> f32 {
    0.3
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Neighbors fetched from the index before threshold filtering.
    #[serde(default = "default_candidate_k")]
    pub candidate_k: usize,
    /// Results scoring below this are dropped, not padded back in.
    #[serde(default = "default_min_score")]
    pub min_score: f32,
    #[serde(default = "default_snippet_max_chars")]
    pub snippet_max_chars: usize,
    /// Cap on the combined snippet length of one query's results.
    #[serde(default = "default_context_budget")]
    pub context_budget_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            candidate_k: default_candidate_k(),
            min_score: default_min_score(),
            snippet_max_chars: default_snippet_max_chars(),
            context_budget_chars: default_context_budget(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_candidate_k() -> usize {
    15
}
fn default_min_score() -> f32 {
    0.2
}
fn default_snippet_max_chars() -> usize {
    200
}
fn default_context_budget() -> usize {
    2000
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.chunk_size {
        anyhow::bail!("chunking.overlap must be strictly less than chunking.chunk_size");
    }

    if config.upload.max_file_size_bytes == 0 {
        anyhow::bail!("upload.max_file_size_bytes must be > 0");
    }

    match config.embedding.provider.as_str() {
        "openai" => {}
        other => anyhow::bail!("Unknown embedding provider: '{}'. Must be openai.", other),
    }
    if config.embedding.dims == Some(0) {
        anyhow::bail!("embedding.dims must be > 0");
    }
    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }

    match config.llm.provider.as_str() {
        "openai" | "anthropic" => {}
        other => anyhow::bail!(
            "Unknown llm provider: '{}'. Must be openai or anthropic.",
            other
        ),
    }

    if config.retrieval.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if !(-1.0..=1.0).contains(&config.retrieval.min_score) {
        anyhow::bail!("retrieval.min_score must be in [-1.0, 1.0]");
    }
    if config.retrieval.snippet_max_chars == 0 {
        anyhow::bail!("retrieval.snippet_max_chars must be > 0");
    }

    Ok(())
}
