//! Optional abstractive summaries.
//!
//! The summarizer is best effort. [`summarize_or_fallback`] is the only way
//! the pipeline calls it, and it never lets a failure escape.

use async_trait::async_trait;
use handlebars::Handlebars;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

/// Text shown when a summary could not be produced.
pub const FALLBACK_SUMMARY: &str = "AI summary unavailable.";

/// Anthropic API endpoint.
const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";

/// Anthropic API version.
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Default model.
pub const DEFAULT_MODEL: &str = "claude-3-5-haiku-20241022";

const MAX_TOKENS: u32 = 200;

#[derive(Debug, Error)]
pub enum SummarizeError {
    #[error("Invalid summary prompt template: {0}")]
    Template(#[from] handlebars::TemplateError),

    #[error("Failed to build summary prompt: {0}")]
    Prompt(#[from] handlebars::RenderError),

    #[error("Summary request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Summary API returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Summary API returned no text")]
    Empty,
}

/// Produces a short summary of abstract text.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, text: &str) -> Result<String, SummarizeError>;
}

/// Summary attached to a digest item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Summary {
    Generated(String),
    Fallback,
}

impl Summary {
    pub fn text(&self) -> &str {
        match self {
            Self::Generated(text) => text,
            Self::Fallback => FALLBACK_SUMMARY,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback)
    }
}

/// Ask for a summary, degrading any failure to [`Summary::Fallback`].
pub async fn summarize_or_fallback(summarizer: &dyn Summarizer, text: &str) -> Summary {
    match summarizer.summarize(text).await {
        Ok(summary) if !summary.trim().is_empty() => Summary::Generated(summary.trim().to_string()),
        Ok(_) => {
            tracing::warn!("Summarizer returned empty text, using fallback");
            Summary::Fallback
        }
        Err(e) => {
            tracing::warn!(error = %e, "Summarizer failed, using fallback");
            Summary::Fallback
        }
    }
}

const SUMMARY_PROMPT: &str = r"Summarize the findings of this biomedical abstract for a busy clinician.

Write one or two plain sentences. State the main result and the population studied.
Do not add facts that are not in the abstract.

## Abstract
{{abstract}}
";

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type", default)]
    block_type: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Summarizer backed by the Anthropic Messages API.
pub struct AnthropicSummarizer {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    prompts: Handlebars<'static>,
}

impl AnthropicSummarizer {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, SummarizeError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        let mut prompts = Handlebars::new();
        prompts.register_escape_fn(handlebars::no_escape);
        prompts.register_template_string("summary", SUMMARY_PROMPT)?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
            base_url: ANTHROPIC_API_URL.to_string(),
            prompts,
        })
    }

    /// Point at a different Messages endpoint.
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

#[async_trait]
impl Summarizer for AnthropicSummarizer {
    async fn summarize(&self, text: &str) -> Result<String, SummarizeError> {
        let prompt = self.prompts.render("summary", &json!({ "abstract": text }))?;
        let body = json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let response = self
            .client
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let raw = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&raw)
                .map(|e| e.error.message)
                .unwrap_or(raw);
            return Err(SummarizeError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: MessagesResponse = response.json().await?;
        let text = parsed
            .content
            .into_iter()
            .filter(|block| block.block_type == "text")
            .map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");
        if text.trim().is_empty() {
            return Err(SummarizeError::Empty);
        }
        Ok(text.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Failing;

    #[async_trait]
    impl Summarizer for Failing {
        async fn summarize(&self, _text: &str) -> Result<String, SummarizeError> {
            Err(SummarizeError::Empty)
        }
    }

    #[tokio::test]
    async fn test_failure_degrades_to_fallback() {
        let summary = summarize_or_fallback(&Failing, "abstract").await;
        assert_eq!(summary, Summary::Fallback);
        assert_eq!(summary.text(), FALLBACK_SUMMARY);
    }

    #[tokio::test]
    async fn test_anthropic_summary() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("x-api-key", "test-key"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .and(body_string_contains("Stimulation reduced pain"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [{"type": "text", "text": " Pain dropped in adults. "}],
                "model": "claude-3-5-haiku-20241022"
            })))
            .mount(&server)
            .await;

        let summarizer = AnthropicSummarizer::new("test-key", DEFAULT_MODEL)
            .unwrap()
            .with_base_url(format!("{}/v1/messages", server.uri()));
        let summary = summarize_or_fallback(&summarizer, "Stimulation reduced pain.").await;
        assert_eq!(summary, Summary::Generated("Pain dropped in adults.".to_string()));
    }

    #[tokio::test]
    async fn test_anthropic_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(529).set_body_json(json!({
                "type": "error",
                "error": {"type": "overloaded_error", "message": "Overloaded"}
            })))
            .mount(&server)
            .await;

        let summarizer = AnthropicSummarizer::new("k", DEFAULT_MODEL)
            .unwrap()
            .with_base_url(server.uri());
        let err = summarizer.summarize("text").await.unwrap_err();
        assert!(matches!(err, SummarizeError::Status { status: 529, ref message } if message == "Overloaded"));
        assert!(summarize_or_fallback(&summarizer, "text").await.is_fallback());
    }
}
