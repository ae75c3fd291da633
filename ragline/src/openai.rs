//! OpenAI-compatible embedding and generation clients.
//!
//! Works against api.openai.com as well as local servers exposing the same
//! `/embeddings` and `/chat/completions` routes (LM Studio, vLLM, llama.cpp).
//!
//! This module is only available when the `openai` feature is enabled.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::deadline::Deadline;
use crate::embedding::EmbeddingClient;
use crate::error::{RagError, Result};
use crate::generation::{Completion, GenerationClient, Prompt, first_candidate};
use crate::http::{HttpClient, expect_batch_len, expect_non_empty, model_name};

const PROVIDER: &str = "openai";

/// The public OpenAI API base URL.
pub const OPENAI_API_URL: &str = "https://api.openai.com/v1";

/// Finish reason reported when the provider's content filter cut the reply.
const CONTENT_FILTER: &str = "content_filter";

/// Finish reason recorded when a choice carries an explicit refusal.
const REFUSAL: &str = "refusal";

/// An [`EmbeddingClient`] backed by an OpenAI-compatible `/embeddings` endpoint.
///
/// # Configuration
///
/// - `base_url` – e.g. [`OPENAI_API_URL`] or `http://localhost:1234/v1`.
/// - `model` – the embedding model name, also used as the vector tag.
/// - `api_key` – optional bearer token; local servers usually need none.
/// - `dimensions` – optional Matryoshka dimension override.
///
/// # Example
///
/// ```rust,ignore
/// use ragline::openai::{OPENAI_API_URL, OpenAIEmbeddingClient};
///
/// let client = OpenAIEmbeddingClient::new(OPENAI_API_URL, "text-embedding-3-small")?
///     .with_api_key("sk-...");
/// let vector = client.embed("hello world", &deadline).await?;
/// ```
#[derive(Debug, Clone)]
pub struct OpenAIEmbeddingClient {
    http: HttpClient,
    model: String,
    /// If set, passed to the API for Matryoshka dimension truncation.
    dimensions: Option<usize>,
}

impl OpenAIEmbeddingClient {
    /// Create a client for `model` served at `base_url`.
    pub fn new(base_url: &str, model: impl Into<String>) -> Result<Self> {
        Ok(Self {
            http: HttpClient::new(PROVIDER, base_url)?,
            model: model_name(PROVIDER, model)?,
            dimensions: None,
        })
    }

    /// Send `api_key` as a bearer token. An empty key sends none.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.http.set_api_key(api_key);
        self
    }

    /// Set the upper bound for a single request.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.http.set_call_timeout(timeout);
        self
    }

    /// Ask the API to truncate embeddings to `dims` dimensions.
    pub fn with_dimensions(mut self, dims: usize) -> Self {
        self.dimensions = Some(dims);
        self
    }
}

// ── OpenAI API request/response types ──────────────────────────────

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

impl From<Choice> for Completion {
    fn from(choice: Choice) -> Self {
        match choice.message.refusal.filter(|r| !r.trim().is_empty()) {
            Some(refusal) => Completion { text: refusal, finish_reason: Some(REFUSAL.to_string()) },
            None => Completion {
                text: choice.message.content.unwrap_or_default(),
                finish_reason: choice.finish_reason,
            },
        }
    }
}

// ── EmbeddingClient implementation ─────────────────────────────────

#[async_trait]
impl EmbeddingClient for OpenAIEmbeddingClient {
    async fn embed(&self, text: &str, deadline: &Deadline) -> Result<Vec<f32>> {
        debug!(provider = PROVIDER, text_len = text.len(), "embedding single text");

        let results = self.embed_batch(&[text], deadline).await?;
        results.into_iter().next().ok_or_else(|| RagError::UpstreamError {
            provider: PROVIDER.into(),
            message: "API returned empty response".into(),
        })
    }

    async fn embed_batch(&self, texts: &[&str], deadline: &Deadline) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            provider = PROVIDER,
            batch_size = texts.len(),
            model = %self.model,
            "embedding batch"
        );

        let request =
            EmbeddingRequest { model: &self.model, input: texts, dimensions: self.dimensions };
        let mut response: EmbeddingResponse =
            self.http.post("/embeddings", &request, deadline).await?;

        expect_batch_len(PROVIDER, texts.len(), response.data.len())?;

        // Servers are allowed to return items out of order; `index` is authoritative.
        response.data.sort_by_key(|d| d.index);
        if response.data.iter().enumerate().any(|(i, d)| d.index != i) {
            return Err(RagError::UpstreamError {
                provider: PROVIDER.into(),
                message: "response indices do not cover the input batch".into(),
            });
        }

        let vectors: Vec<Vec<f32>> = response.data.into_iter().map(|d| d.embedding).collect();
        expect_non_empty(PROVIDER, &vectors)?;
        Ok(vectors)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// A [`GenerationClient`] backed by an OpenAI-compatible `/chat/completions` endpoint.
///
/// Only the first choice is used. A choice stopped by the content filter or
/// carrying a `refusal` is reported as [`RagError::UpstreamRefused`], as is an
/// HTTP 400 with code `content_policy_violation`.
#[derive(Debug, Clone)]
pub struct OpenAIGenerationClient {
    http: HttpClient,
    model: String,
}

impl OpenAIGenerationClient {
    /// Create a client for `model` served at `base_url`.
    pub fn new(base_url: &str, model: impl Into<String>) -> Result<Self> {
        Ok(Self { http: HttpClient::new(PROVIDER, base_url)?, model: model_name(PROVIDER, model)? })
    }

    /// Send `api_key` as a bearer token. An empty key sends none.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.http.set_api_key(api_key);
        self
    }

    /// Set the upper bound for a single request.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.http.set_call_timeout(timeout);
        self
    }
}

#[async_trait]
impl GenerationClient for OpenAIGenerationClient {
    async fn generate(&self, prompt: &Prompt, deadline: &Deadline) -> Result<Completion> {
        debug!(provider = PROVIDER, model = %self.model, turns = prompt.turns.len(), "generating");

        let request = ChatRequest {
            model: &self.model,
            messages: prompt
                .turns
                .iter()
                .map(|turn| ChatMessage { role: turn.role.as_str(), content: &turn.text })
                .collect(),
            max_tokens: prompt.params.max_tokens,
            temperature: prompt.params.temperature,
            top_p: prompt.params.top_p,
        };
        let response: ChatResponse =
            self.http.post("/chat/completions", &request, deadline).await?;

        let completion =
            first_candidate(PROVIDER, response.choices.into_iter().map(Completion::from))?;
        match completion.finish_reason.as_deref() {
            Some(REFUSAL) => {
                warn!(provider = PROVIDER, "model refused the prompt");
                Err(RagError::UpstreamRefused {
                    provider: PROVIDER.into(),
                    message: completion.text,
                })
            }
            Some(CONTENT_FILTER) => {
                warn!(provider = PROVIDER, "reply stopped by content filter");
                Err(RagError::UpstreamRefused {
                    provider: PROVIDER.into(),
                    message: "reply was stopped by the content filter".into(),
                })
            }
            _ => Ok(completion),
        }
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn choice(content: Option<&str>, refusal: Option<&str>, finish: Option<&str>) -> Choice {
        Choice {
            message: ChoiceMessage {
                content: content.map(str::to_string),
                refusal: refusal.map(str::to_string),
            },
            finish_reason: finish.map(str::to_string),
        }
    }

    #[test]
    fn refusal_takes_precedence_over_content() {
        let completion =
            Completion::from(choice(Some(""), Some("I can't help with that"), Some("stop")));
        assert_eq!(completion.finish_reason.as_deref(), Some(REFUSAL));
        assert_eq!(completion.text, "I can't help with that");
    }

    #[test]
    fn blank_refusal_is_ignored() {
        let completion = Completion::from(choice(Some("42"), Some("  "), Some("stop")));
        assert_eq!(completion.text, "42");
        assert_eq!(completion.finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn missing_content_is_empty_text() {
        let completion = Completion::from(choice(None, None, Some("length")));
        assert_eq!(completion.text, "");
    }
}
