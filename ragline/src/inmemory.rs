//! In-memory vector store using cosine similarity.
//!
//! This module provides [`InMemoryVectorStore`], a dependency-free vector store
//! backed by a `HashMap` protected by a `tokio::sync::RwLock`. It is suitable
//! for development, testing, and small-scale use cases.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::deadline::Deadline;
use crate::document::{FragmentId, NewFragment, RetrievedFragment, StoredFragment};
use crate::error::{RagError, Result};
use crate::vectorstore::{VectorStore, check_dimensions, cosine_similarity, rank};

const BACKEND: &str = "in-memory";

/// All fragments embedded by one model.
#[derive(Debug)]
struct Partition {
    dimensions: usize,
    fragments: Vec<StoredFragment>,
}

/// An in-memory vector store using cosine similarity for search.
///
/// Fragments are partitioned by model tag. The first insert for a tag pins
/// that tag's dimensionality. Fragments are kept in insertion order, which is
/// also the tie-break order for equal scores.
///
/// Inserts take the write lock and searches the read lock, so a search sees
/// each fragment either completely or not at all.
///
/// # Example
///
/// ```rust,ignore
/// use ragline::{InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.insert(fragment, &deadline).await?;
/// ```
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    partitions: RwLock<HashMap<String, Partition>>,
}

impl InMemoryVectorStore {
    /// Create a new empty in-memory vector store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of fragments stored for `model`.
    pub async fn len(&self, model: &str) -> usize {
        self.partitions.read().await.get(model).map_or(0, |p| p.fragments.len())
    }

    /// Whether nothing is stored for `model`.
    pub async fn is_empty(&self, model: &str) -> bool {
        self.len(model).await == 0
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn insert(&self, fragment: NewFragment, deadline: &Deadline) -> Result<FragmentId> {
        deadline
            .run("vector store insert", async move {
                if fragment.vector.is_empty() {
                    return Err(RagError::StorageError {
                        backend: BACKEND.to_string(),
                        message: "cannot insert an empty vector".to_string(),
                    });
                }

                let mut partitions = self.partitions.write().await;
                let partition = partitions.entry(fragment.model.clone()).or_insert_with(|| {
                    Partition { dimensions: fragment.vector.len(), fragments: Vec::new() }
                });
                check_dimensions(
                    BACKEND,
                    &fragment.model,
                    partition.dimensions,
                    fragment.vector.len(),
                )?;

                let id = Uuid::new_v4().to_string();
                partition.fragments.push(StoredFragment {
                    id: id.clone(),
                    text: fragment.text,
                    vector: fragment.vector,
                    metadata: fragment.metadata,
                    model: fragment.model,
                });
                debug!(backend = BACKEND, fragment.id = %id, "inserted fragment");
                Ok(id)
            })
            .await
    }

    async fn search(
        &self,
        query: &[f32],
        k: usize,
        model: &str,
        deadline: &Deadline,
    ) -> Result<Vec<RetrievedFragment>> {
        deadline
            .run("vector store search", async move {
                let partitions = self.partitions.read().await;
                let Some(partition) = partitions.get(model) else {
                    return Ok(Vec::new());
                };
                check_dimensions(BACKEND, model, partition.dimensions, query.len())?;

                let scored = partition
                    .fragments
                    .iter()
                    .map(|fragment| RetrievedFragment {
                        score: cosine_similarity(&fragment.vector, query),
                        fragment: fragment.clone(),
                    })
                    .collect();
                Ok(rank(scored, k))
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::document::Metadata;
    use crate::error::ErrorKind;

    fn deadline() -> Deadline {
        Deadline::after(Duration::from_secs(5))
    }

    fn fragment(text: &str, vector: Vec<f32>, model: &str) -> NewFragment {
        NewFragment { text: text.into(), vector, metadata: Metadata::new(), model: model.into() }
    }

    #[tokio::test]
    async fn search_on_unknown_model_is_empty() {
        let store = InMemoryVectorStore::new();
        store.insert(fragment("a", vec![1.0, 0.0], "model-a"), &deadline()).await.unwrap();

        let results = store.search(&[1.0, 0.0], 3, "model-b", &deadline()).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn models_are_isolated() {
        let store = InMemoryVectorStore::new();
        store.insert(fragment("a", vec![1.0, 0.0], "model-a"), &deadline()).await.unwrap();
        store.insert(fragment("b", vec![1.0, 0.0, 0.0], "model-b"), &deadline()).await.unwrap();

        let results = store.search(&[1.0, 0.0, 0.0], 3, "model-b", &deadline()).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].text(), "b");
        assert_eq!(store.len("model-a").await, 1);
    }

    #[tokio::test]
    async fn dimension_mismatch_is_storage_error() {
        let store = InMemoryVectorStore::new();
        store.insert(fragment("a", vec![1.0, 0.0], "m"), &deadline()).await.unwrap();

        let err =
            store.insert(fragment("b", vec![1.0, 0.0, 0.0], "m"), &deadline()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StorageError);

        let err = store.search(&[1.0], 3, "m", &deadline()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StorageError);
    }

    #[tokio::test]
    async fn empty_vector_is_rejected() {
        let store = InMemoryVectorStore::new();
        let err = store.insert(fragment("a", Vec::new(), "m"), &deadline()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StorageError);
        assert!(store.is_empty("m").await);
    }

    #[tokio::test]
    async fn search_returns_at_most_k() {
        let store = InMemoryVectorStore::new();
        for i in 0..5 {
            let v = vec![1.0, i as f32];
            store.insert(fragment(&format!("f{i}"), v, "m"), &deadline()).await.unwrap();
        }
        let results = store.search(&[1.0, 0.0], 2, "m", &deadline()).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].text(), "f0");
    }
}
