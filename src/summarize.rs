//! Summary and tag derivation via the language-model provider.
//!
//! Both operations send only a bounded prefix of the document (the full
//! text is covered by chunk embeddings instead) and both are tolerant:
//! a provider failure degrades to sentinel values rather than failing the
//! ingestion that requested them.

use std::sync::Arc;

use tracing::warn;

use crate::config::LlmConfig;
use crate::llm::LanguageModelProvider;

/// Sentinel summary stored when the provider call fails.
pub const SUMMARY_UNAVAILABLE: &str = "Summary unavailable";

/// Maximum number of tags kept per document.
const MAX_TAGS: usize = 5;

/// How the provider's tag response was interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagOutcome {
    /// The response parsed as a JSON string array.
    Parsed(Vec<String>),
    /// The response was split on commas as a best effort.
    Fallback(Vec<String>),
}

impl TagOutcome {
    pub fn into_tags(self) -> Vec<String> {
        match self {
            TagOutcome::Parsed(tags) | TagOutcome::Fallback(tags) => tags,
        }
    }
}

/// Derives a short summary and a small tag set from extracted text.
pub struct SummaryTagger {
    provider: Arc<dyn LanguageModelProvider>,
    config: LlmConfig,
}

impl SummaryTagger {
    pub fn new(provider: Arc<dyn LanguageModelProvider>, config: LlmConfig) -> Self {
        Self { provider, config }
    }

    /// Summarize the document's leading text. Never fails: provider errors
    /// degrade to [`SUMMARY_UNAVAILABLE`].
    pub async fn summarize(&self, text: &str) -> String {
        let prefix = truncate_chars(text, self.config.summary_prefix_chars);
        if prefix.trim().is_empty() {
            return SUMMARY_UNAVAILABLE.to_string();
        }

        let prompt = format!(
            "Summarize this document in 2-3 sentences, focusing on key points.\n\n{}",
            prefix
        );
        match self
            .provider
            .complete(&prompt, self.config.summary_max_tokens, self.config.temperature)
            .await
        {
            Ok(summary) if !summary.trim().is_empty() => summary.trim().to_string(),
            Ok(_) => SUMMARY_UNAVAILABLE.to_string(),
            Err(e) => {
                warn!(model = self.provider.model_name(), error = %e, "summarization failed");
                SUMMARY_UNAVAILABLE.to_string()
            }
        }
    }

    /// Derive 3–5 topical tags from the document's leading text. Never
    /// fails: unparseable responses fall back to comma splitting, provider
    /// errors degrade to an empty set.
    pub async fn tag(&self, text: &str) -> TagOutcome {
        let prefix = truncate_chars(text, self.config.tag_prefix_chars);
        if prefix.trim().is_empty() {
            return TagOutcome::Parsed(Vec::new());
        }

        let prompt = format!(
            "Generate 3-5 relevant topical tags for this document. \
             Return only a JSON array of strings.\n\n{}",
            prefix
        );
        match self
            .provider
            .complete(&prompt, self.config.tag_max_tokens, self.config.temperature)
            .await
        {
            Ok(response) => parse_tags(&response),
            Err(e) => {
                warn!(model = self.provider.model_name(), error = %e, "tagging failed");
                TagOutcome::Fallback(Vec::new())
            }
        }
    }
}

/// Interpret a tag response: JSON string array first, comma-split fallback
/// otherwise. Tags are trimmed, deduplicated (first occurrence wins,
/// case-insensitive), and capped at [`MAX_TAGS`].
pub fn parse_tags(response: &str) -> TagOutcome {
    let trimmed = response.trim();

    if let Ok(serde_json::Value::Array(items)) = serde_json::from_str(trimmed) {
        let tags: Vec<String> = items
            .into_iter()
            .filter_map(|v| v.as_str().map(|s| s.trim().to_string()))
            .filter(|s| !s.is_empty())
            .collect();
        return TagOutcome::Parsed(normalize_tags(tags));
    }

    let tags: Vec<String> = trimmed
        .replace(['[', ']', '"'], "")
        .split(',')
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();
    TagOutcome::Fallback(normalize_tags(tags))
}

fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    tags.into_iter()
        .filter(|t| seen.insert(t.to_lowercase()))
        .take(MAX_TAGS)
        .collect()
}

/// Cut `text` to at most `max_chars` characters on a char boundary.
fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;

    /// Scripted provider: returns the canned response or an error.
    struct ScriptedProvider {
        response: Option<String>,
    }

    #[async_trait]
    impl LanguageModelProvider for ScriptedProvider {
        async fn complete(&self, _: &str, _: usize, _: f32) -> Result<String> {
            match &self.response {
                Some(r) => Ok(r.clone()),
                None => anyhow::bail!("provider unreachable"),
            }
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    fn tagger(response: Option<&str>) -> SummaryTagger {
        SummaryTagger::new(
            Arc::new(ScriptedProvider {
                response: response.map(String::from),
            }),
            LlmConfig::default(),
        )
    }

    #[test]
    fn json_array_parses_as_parsed() {
        let outcome = parse_tags(r#"["sales", "outreach", "planning"]"#);
        assert_eq!(
            outcome,
            TagOutcome::Parsed(vec![
                "sales".to_string(),
                "outreach".to_string(),
                "planning".to_string()
            ])
        );
    }

    #[test]
    fn comma_separated_response_falls_back() {
        let outcome = parse_tags("sales, outreach, Q4 planning");
        assert_eq!(
            outcome,
            TagOutcome::Fallback(vec![
                "sales".to_string(),
                "outreach".to_string(),
                "Q4 planning".to_string()
            ])
        );
    }

    #[test]
    fn bracketed_non_json_is_stripped() {
        let outcome = parse_tags(r#"["sales", "outreach",]"#);
        assert_eq!(
            outcome.into_tags(),
            vec!["sales".to_string(), "outreach".to_string()]
        );
    }

    #[test]
    fn tags_are_deduplicated_and_capped() {
        let outcome = parse_tags("a, b, A, c, d, e, f, g");
        let tags = outcome.into_tags();
        assert_eq!(tags, vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn empty_response_yields_no_tags() {
        assert!(parse_tags("").into_tags().is_empty());
        assert!(parse_tags("[]").into_tags().is_empty());
    }

    #[tokio::test]
    async fn provider_error_degrades_to_sentinel_summary() {
        let tagger = tagger(None);
        let summary = tagger.summarize("Some document text.").await;
        assert_eq!(summary, SUMMARY_UNAVAILABLE);
    }

    #[tokio::test]
    async fn provider_error_degrades_to_empty_tags() {
        let tagger = tagger(None);
        let outcome = tagger.tag("Some document text.").await;
        assert!(outcome.into_tags().is_empty());
    }

    #[tokio::test]
    async fn successful_summary_is_trimmed() {
        let tagger = tagger(Some("  A concise summary.  "));
        let summary = tagger.summarize("Some document text.").await;
        assert_eq!(summary, "A concise summary.");
    }

    #[tokio::test]
    async fn empty_text_short_circuits() {
        let tagger = tagger(Some("should not be used"));
        assert_eq!(tagger.summarize("   ").await, SUMMARY_UNAVAILABLE);
        assert!(tagger.tag("").await.into_tags().is_empty());
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let text = "héllo wörld";
        let cut = truncate_chars(text, 4);
        assert_eq!(cut, "héll");
        assert_eq!(truncate_chars("short", 100), "short");
    }
}
