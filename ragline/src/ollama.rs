//! Ollama embedding and generation clients.
//!
//! This module is only available when the `ollama` feature is enabled.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::deadline::Deadline;
use crate::embedding::EmbeddingClient;
use crate::error::{RagError, Result};
use crate::generation::{Completion, GenerationClient, Prompt};
use crate::http::{HttpClient, expect_batch_len, expect_non_empty, model_name};

const PROVIDER: &str = "ollama";

/// An [`EmbeddingClient`] backed by Ollama's `/api/embed` endpoint.
///
/// Batches are sent as a single request.
///
/// # Example
///
/// ```rust,ignore
/// use ragline::ollama::OllamaEmbeddingClient;
///
/// let client = OllamaEmbeddingClient::new("http://localhost:11434", "mxbai-embed-large")?;
/// let vector = client.embed("hello world", &deadline).await?;
/// ```
#[derive(Debug, Clone)]
pub struct OllamaEmbeddingClient {
    http: HttpClient,
    model: String,
}

impl OllamaEmbeddingClient {
    /// Create a client for `model` served at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfiguration`] if the URL is not http(s)
    /// or the model name is empty.
    pub fn new(base_url: &str, model: impl Into<String>) -> Result<Self> {
        Ok(Self { http: HttpClient::new(PROVIDER, base_url)?, model: model_name(PROVIDER, model)? })
    }

    /// Set the upper bound for a single request.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.http.set_call_timeout(timeout);
        self
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[async_trait]
impl EmbeddingClient for OllamaEmbeddingClient {
    async fn embed(&self, text: &str, deadline: &Deadline) -> Result<Vec<f32>> {
        let vectors = self.embed_batch(&[text], deadline).await?;
        vectors.into_iter().next().ok_or_else(|| RagError::UpstreamError {
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

        let request = EmbedRequest { model: &self.model, input: texts };
        let response: EmbedResponse = self.http.post("/api/embed", &request, deadline).await?;

        expect_batch_len(PROVIDER, texts.len(), response.embeddings.len())?;
        expect_non_empty(PROVIDER, &response.embeddings)?;
        Ok(response.embeddings)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// A [`GenerationClient`] backed by Ollama's non-streaming `/api/chat` endpoint.
#[derive(Debug, Clone)]
pub struct OllamaGenerationClient {
    http: HttpClient,
    model: String,
}

impl OllamaGenerationClient {
    /// Create a client for `model` served at `base_url`.
    pub fn new(base_url: &str, model: impl Into<String>) -> Result<Self> {
        Ok(Self { http: HttpClient::new(PROVIDER, base_url)?, model: model_name(PROVIDER, model)? })
    }

    /// Set the upper bound for a single request.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.http.set_call_timeout(timeout);
        self
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    options: ChatOptions,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatOptions {
    num_predict: u32,
    temperature: f32,
    top_p: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
    #[serde(default)]
    done_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: String,
}

#[async_trait]
impl GenerationClient for OllamaGenerationClient {
    async fn generate(&self, prompt: &Prompt, deadline: &Deadline) -> Result<Completion> {
        debug!(provider = PROVIDER, model = %self.model, turns = prompt.turns.len(), "generating");

        let request = ChatRequest {
            model: &self.model,
            messages: prompt
                .turns
                .iter()
                .map(|turn| ChatMessage { role: turn.role.as_str(), content: &turn.text })
                .collect(),
            stream: false,
            options: ChatOptions {
                num_predict: prompt.params.max_tokens,
                temperature: prompt.params.temperature,
                top_p: prompt.params.top_p,
            },
        };
        let response: ChatResponse = self.http.post("/api/chat", &request, deadline).await?;

        Ok(Completion { text: response.message.content, finish_reason: response.done_reason })
    }

    fn model(&self) -> &str {
        &self.model
    }
}
