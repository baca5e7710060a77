//! Language-model provider abstraction for summary and tag generation.
//!
//! Two concrete providers implement [`LanguageModelProvider`]: the OpenAI
//! chat completions API and the Anthropic messages API. Which one is used
//! is an explicit configuration choice (`llm.provider`), never inferred
//! from which API keys happen to be present in the environment.
//!
//! Calls are bounded by the configured timeout; HTTP 429/5xx responses are
//! retried with exponential backoff, other client errors fail immediately.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::LlmConfig;

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";
const ANTHROPIC_MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// External completion capability consumed by [`crate::summarize`].
#[async_trait]
pub trait LanguageModelProvider: Send + Sync {
    async fn complete(&self, prompt: &str, max_tokens: usize, temperature: f32) -> Result<String>;

    fn model_name(&self) -> &str;
}

/// Instantiate the provider named by the configuration.
pub fn create_llm_provider(
    config: &LlmConfig,
) -> Result<std::sync::Arc<dyn LanguageModelProvider>> {
    match config.provider.as_str() {
        "openai" => Ok(std::sync::Arc::new(OpenAiChatProvider::new(config)?)),
        "anthropic" => Ok(std::sync::Arc::new(AnthropicProvider::new(config)?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}

async fn post_with_backoff(
    build: impl Fn() -> reqwest::RequestBuilder,
    max_retries: u32,
    label: &str,
) -> Result<serde_json::Value> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        match build().send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return response
                        .json()
                        .await
                        .with_context(|| format!("failed to parse {} response", label));
                }
                if status.as_u16() == 429 || status.is_server_error() {
                    let body_text = response.text().await.unwrap_or_default();
                    last_err = Some(anyhow::anyhow!("{} error {}: {}", label, status, body_text));
                    continue;
                }
                let body_text = response.text().await.unwrap_or_default();
                bail!("{} error {}: {}", label, status, body_text);
            }
            Err(e) => {
                last_err = Some(e.into());
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("{} failed after retries", label)))
}

// ============ OpenAI chat completions ============

pub struct OpenAiChatProvider {
    model: String,
    max_retries: u32,
    api_url: String,
    client: reqwest::Client,
}

impl OpenAiChatProvider {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("llm.model required for OpenAI provider"))?;
        if std::env::var("OPENAI_API_KEY").is_err() {
            bail!("OPENAI_API_KEY environment variable not set");
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            model,
            max_retries: config.max_retries,
            api_url: config
                .api_url
                .clone()
                .unwrap_or_else(|| OPENAI_CHAT_URL.to_string()),
            client,
        })
    }
}

#[async_trait]
impl LanguageModelProvider for OpenAiChatProvider {
    async fn complete(&self, prompt: &str, max_tokens: usize, temperature: f32) -> Result<String> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY not set"))?;

        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "max_tokens": max_tokens,
            "temperature": temperature,
        });

        let json = post_with_backoff(
            || {
                self.client
                    .post(&self.api_url)
                    .header("Authorization", format!("Bearer {}", api_key))
                    .header("Content-Type", "application/json")
                    .json(&body)
            },
            self.max_retries,
            "OpenAI chat API",
        )
        .await?;

        let content = json
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .ok_or_else(|| anyhow::anyhow!("OpenAI response missing message content"))?;
        Ok(content.trim().to_string())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ============ Anthropic messages ============

pub struct AnthropicProvider {
    model: String,
    max_retries: u32,
    api_url: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("llm.model required for Anthropic provider"))?;
        if std::env::var("ANTHROPIC_API_KEY").is_err() {
            bail!("ANTHROPIC_API_KEY environment variable not set");
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            model,
            max_retries: config.max_retries,
            api_url: config
                .api_url
                .clone()
                .unwrap_or_else(|| ANTHROPIC_MESSAGES_URL.to_string()),
            client,
        })
    }
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: usize,
    temperature: f32,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicResponseBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicResponseBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[async_trait]
impl LanguageModelProvider for AnthropicProvider {
    async fn complete(&self, prompt: &str, max_tokens: usize, temperature: f32) -> Result<String> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| anyhow::anyhow!("ANTHROPIC_API_KEY not set"))?;

        let body = AnthropicRequest {
            model: &self.model,
            max_tokens,
            temperature,
            messages: vec![AnthropicMessage {
                role: "user",
                content: prompt,
            }],
        };
        let body = serde_json::to_value(&body)?;

        let json = post_with_backoff(
            || {
                self.client
                    .post(&self.api_url)
                    .header("x-api-key", api_key.trim())
                    .header("anthropic-version", ANTHROPIC_VERSION)
                    .header("Content-Type", "application/json")
                    .json(&body)
            },
            self.max_retries,
            "Anthropic messages API",
        )
        .await?;

        let parsed: AnthropicResponse = serde_json::from_value(json)
            .context("failed to parse Anthropic response structure")?;
        let answer = parsed
            .content
            .into_iter()
            .filter_map(|block| match block {
                AnthropicResponseBlock::Text { text } => Some(text),
                AnthropicResponseBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n");
        if answer.is_empty() {
            bail!("Anthropic response missing text content");
        }
        Ok(answer.trim().to_string())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anthropic_response_blocks_deserialize() {
        let json = serde_json::json!({
            "content": [
                { "type": "text", "text": "hello" },
                { "type": "tool_use", "id": "x", "name": "y", "input": {} },
                { "type": "text", "text": "world" }
            ]
        });
        let parsed: AnthropicResponse = serde_json::from_value(json).unwrap();
        let texts: Vec<String> = parsed
            .content
            .into_iter()
            .filter_map(|b| match b {
                AnthropicResponseBlock::Text { text } => Some(text),
                AnthropicResponseBlock::Other => None,
            })
            .collect();
        assert_eq!(texts, vec!["hello".to_string(), "world".to_string()]);
    }

    #[test]
    fn anthropic_request_serializes_messages() {
        let req = AnthropicRequest {
            model: "claude-3-5-haiku-latest",
            max_tokens: 50,
            temperature: 0.3,
            messages: vec![AnthropicMessage {
                role: "user",
                content: "Summarize this",
            }],
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["messages"][0]["role"], "user");
        assert_eq!(value["max_tokens"], 50);
    }
}
