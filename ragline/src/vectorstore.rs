//! Vector store trait and the similarity contract shared by its backends.

use std::cmp::Ordering;

use async_trait::async_trait;

use crate::deadline::Deadline;
use crate::document::{FragmentId, NewFragment, RetrievedFragment};
use crate::error::{RagError, Result};

/// A storage backend for embedded text fragments with similarity search.
///
/// Every fragment carries the tag of the model that embedded it and searches
/// only ever compare against fragments with the same tag, so vectors from
/// different models never meet. Within one tag all vectors share a single
/// dimensionality; a mismatching insert or query fails with
/// [`RagError::StorageError`].
///
/// Implementations must make each insert and each search individually atomic:
/// a concurrent search never observes a half-written fragment.
///
/// # Example
///
/// ```rust,ignore
/// use ragline::{InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new();
/// let id = store.insert(fragment, &deadline).await?;
/// let results = store.search(&query_vector, 3, "mxbai-embed-large", &deadline).await?;
/// ```
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Persist a fragment and return its store-assigned identifier.
    async fn insert(&self, fragment: NewFragment, deadline: &Deadline) -> Result<FragmentId>;

    /// Return at most `k` fragments tagged `model`, most similar first.
    ///
    /// Scores are non-increasing along the result. An empty store, or one
    /// holding nothing for `model`, yields an empty `Vec` rather than an error.
    /// Identical inputs against identical contents always rank identically.
    async fn search(
        &self,
        query: &[f32],
        k: usize,
        model: &str,
        deadline: &Deadline,
    ) -> Result<Vec<RetrievedFragment>>;
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude or the result is not finite.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let score = dot / (norm_a * norm_b);
    if score.is_finite() { score } else { 0.0 }
}

/// Sort by descending score and keep the first `k`.
///
/// The sort is stable, so callers that feed results in a fixed order (such as
/// insertion order) get a deterministic tie-break.
pub fn rank(mut results: Vec<RetrievedFragment>, k: usize) -> Vec<RetrievedFragment> {
    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    results.truncate(k);
    results
}

/// Fail with [`RagError::StorageError`] unless `got == expected`.
pub(crate) fn check_dimensions(
    backend: &str,
    model: &str,
    expected: usize,
    got: usize,
) -> Result<()> {
    if expected == got {
        return Ok(());
    }
    Err(RagError::StorageError {
        backend: backend.to_string(),
        message: format!(
            "vector has {got} dimensions but model '{model}' is stored with {expected}"
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Metadata, StoredFragment};

    fn retrieved(id: &str, score: f32) -> RetrievedFragment {
        RetrievedFragment {
            fragment: StoredFragment {
                id: id.to_string(),
                text: id.to_string(),
                vector: Vec::new(),
                metadata: Metadata::new(),
                model: "m".to_string(),
            },
            score,
        }
    }

    #[test]
    fn cosine_of_parallel_vectors_is_one() {
        let score = cosine_similarity(&[1.0, 2.0, 3.0], &[2.0, 4.0, 6.0]);
        assert!((score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_of_zero_vector_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn rank_keeps_input_order_on_ties() {
        let scored = vec![
            retrieved("a", 0.5),
            retrieved("b", 0.9),
            retrieved("c", 0.5),
            retrieved("d", 0.1),
        ];
        let ranked = rank(scored, 3);
        let ids: Vec<_> = ranked.iter().map(|r| r.fragment.id.as_str()).collect();
        assert_eq!(ids, ["b", "a", "c"]);
    }
}
