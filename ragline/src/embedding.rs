//! Embedding client trait for turning text into vectors.

use async_trait::async_trait;

use crate::deadline::Deadline;
use crate::error::Result;

/// A remote service that turns text into embedding vectors.
///
/// Implementations wrap specific backends (Ollama, OpenAI-compatible servers,
/// test doubles) behind one async interface and are selected when the
/// orchestrator is built. The default [`embed_batch`](EmbeddingClient::embed_batch)
/// calls [`embed`](EmbeddingClient::embed) sequentially; backends with native
/// batching should override it and must return vectors in input order.
///
/// Every call receives the caller's [`Deadline`]. Implementations must not
/// outlive it: HTTP backends cap their request timeout at the remaining
/// budget and run the request inside [`Deadline::run`].
///
/// # Errors
///
/// - [`RagError::UpstreamUnavailable`](crate::RagError::UpstreamUnavailable) on connection
///   failure or timeout
/// - [`RagError::UpstreamError`](crate::RagError::UpstreamError) on a non-2xx or malformed response
/// - [`RagError::DeadlineExceeded`](crate::RagError::DeadlineExceeded) when `deadline`
///   expires first
///
/// # Example
///
/// ```rust,ignore
/// use ragline::{Deadline, EmbeddingClient};
///
/// let client = OllamaEmbeddingClient::new("http://localhost:11434", "mxbai-embed-large")?;
/// let vector = client.embed("hello world", &Deadline::after(Duration::from_secs(5))).await?;
/// ```
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Generate an embedding vector for a single text input.
    async fn embed(&self, text: &str, deadline: &Deadline) -> Result<Vec<f32>>;

    /// Generate embedding vectors for a batch of text inputs, in input order.
    async fn embed_batch(&self, texts: &[&str], deadline: &Deadline) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text, deadline).await?);
        }
        Ok(results)
    }

    /// The model tag stored alongside every vector this client produces.
    fn model(&self) -> &str;
}
