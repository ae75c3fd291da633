//! RAG orchestrator.
//!
//! The [`RagOrchestrator`] coordinates the answer workflow
//! (embed → retrieve → assemble → generate) and the ingestion workflow
//! (chunk → embed → insert) by composing an [`EmbeddingClient`], a
//! [`VectorStore`] and a [`GenerationClient`].
//!
//! # Example
//!
//! ```rust,ignore
//! use ragline::{InMemoryVectorStore, RagConfig, RagOrchestrator};
//!
//! let orchestrator = RagOrchestrator::builder()
//!     .config(RagConfig::default())
//!     .embedding_client(Arc::new(embedder))
//!     .vector_store(Arc::new(InMemoryVectorStore::new()))
//!     .generation_client(Arc::new(generator))
//!     .build()?;
//!
//! let report = orchestrator.ingest(&document).await?;
//! let text = orchestrator.answer("When was the moon landing?").await?;
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::chunking::Chunker;
use crate::config::RagConfig;
use crate::context::ContextAssembler;
use crate::deadline::Deadline;
use crate::document::{Chunk, Document, FragmentId, NewFragment, RetrievedFragment};
use crate::embedding::EmbeddingClient;
use crate::error::{RagError, Result, Stage};
use crate::generation::GenerationClient;
use crate::vectorstore::VectorStore;

/// A generated answer together with the fragments that grounded it.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    /// The generated text.
    pub text: String,
    /// Fragments included in the prompt context, best first.
    pub sources: Vec<RetrievedFragment>,
    /// Why the backend stopped generating, if it said.
    pub finish_reason: Option<String>,
}

/// Outcome of ingesting one document.
///
/// A failed chunk never aborts the others. Re-submit `failed` through
/// [`RagOrchestrator::ingest_chunks`] to resume.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Number of chunks embedded and stored.
    pub succeeded: usize,
    /// Indices of chunks that failed, ascending.
    pub failed: Vec<usize>,
    /// Ids of the stored fragments, in chunk order.
    pub fragment_ids: Vec<FragmentId>,
}

impl IngestReport {
    /// Whether every chunk was stored.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// The RAG orchestrator.
///
/// Construct one via [`RagOrchestrator::builder()`]. The orchestrator holds no
/// mutable state of its own, so one instance can serve concurrent calls.
/// It never retries; every failure is returned to the caller tagged with the
/// stage that produced it.
pub struct RagOrchestrator {
    config: RagConfig,
    embedder: Arc<dyn EmbeddingClient>,
    store: Arc<dyn VectorStore>,
    generator: Arc<dyn GenerationClient>,
    chunker: Arc<dyn Chunker>,
    assembler: ContextAssembler,
}

impl RagOrchestrator {
    /// Create a new [`RagOrchestratorBuilder`].
    pub fn builder() -> RagOrchestratorBuilder {
        RagOrchestratorBuilder::default()
    }

    /// Return a reference to the orchestrator configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// The model tag stored with ingested fragments and used to filter searches.
    pub fn model_tag(&self) -> &str {
        self.embedder.model()
    }

    /// Answer `query`, returning only the generated text.
    ///
    /// The whole call is bounded by [`RagConfig::request_timeout`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::StageFailed`] tagged with the first stage that
    /// failed. Use [`RagError::kind`] to decide whether to retry.
    pub async fn answer(&self, query: &str) -> Result<String> {
        Ok(self.query(query).await?.text)
    }

    /// Answer `query`, returning the text together with its sources.
    pub async fn query(&self, query: &str) -> Result<Answer> {
        self.query_with_deadline(query, Deadline::after(self.config.request_timeout)).await
    }

    /// Answer `query` within a caller-supplied `deadline`.
    ///
    /// The deadline is subdivided: embedding gets a third of the budget,
    /// retrieval half of what is then left, generation the remainder.
    pub async fn query_with_deadline(&self, query: &str, deadline: Deadline) -> Result<Answer> {
        let span = info_span!("answer", model = %self.embedder.model(), query_len = query.len());
        self.run_answer(query, deadline).instrument(span).await
    }

    async fn run_answer(&self, query: &str, deadline: Deadline) -> Result<Answer> {
        // Embedding
        debug!(stage = %Stage::Embedding, "stage started");
        let budget = deadline.share(3);
        let vector = budget
            .run("query embedding", self.embedder.embed(query, &budget))
            .await
            .map_err(|e| stage_failed(Stage::Embedding, e))?;

        // Retrieving
        debug!(stage = %Stage::Retrieving, "stage started");
        let budget = deadline.share(2);
        let mut fragments = budget
            .run(
                "similarity search",
                self.store.search(&vector, self.config.top_k, self.embedder.model(), &budget),
            )
            .await
            .map_err(|e| stage_failed(Stage::Retrieving, e))?;

        let retrieved = fragments.len();
        if let Some(floor) = self.config.min_score {
            fragments.retain(|f| f.score >= floor);
        }
        debug!(retrieved, kept = fragments.len(), "retrieval completed");

        // Assembling
        debug!(stage = %Stage::Assembling, "stage started");
        let max_context_length = self.config.max_context_length;
        let prompt = self
            .assembler
            .combine(query, &fragments, max_context_length)
            .map_err(|e| stage_failed(Stage::Assembling, e))?;
        fragments.truncate(self.assembler.fit(&fragments, max_context_length));

        // Generating
        debug!(stage = %Stage::Generating, "stage started");
        let completion = deadline
            .run("generation", self.generator.generate(&prompt, &deadline))
            .await
            .map_err(|e| stage_failed(Stage::Generating, e))?;

        info!(
            sources = fragments.len(),
            finish_reason = completion.finish_reason.as_deref().unwrap_or("unknown"),
            "answer completed"
        );

        Ok(Answer {
            text: completion.text,
            sources: fragments,
            finish_reason: completion.finish_reason,
        })
    }

    /// Ingest a document: split → (embed, insert) per chunk.
    ///
    /// Chunks are processed concurrently, at most
    /// [`RagConfig::ingest_concurrency`] at a time, each under its own
    /// [`RagConfig::request_timeout`]. Every stored fragment carries the
    /// document metadata plus `chunk_index` and `source_offset`.
    ///
    /// Per-chunk failures are logged and reported in the [`IngestReport`];
    /// they never fail the call.
    pub async fn ingest(&self, document: &Document) -> Result<IngestReport> {
        let chunks = self.chunker.chunk(&document.content);
        self.ingest_selected(document, chunks).await
    }

    /// Re-run ingestion for the chunks of `document` at `indices` only.
    ///
    /// Chunking is deterministic, so indices reported in
    /// [`IngestReport::failed`] refer to the same chunks on every call.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfiguration`] if an index does not exist.
    pub async fn ingest_chunks(
        &self,
        document: &Document,
        indices: &[usize],
    ) -> Result<IngestReport> {
        let wanted: BTreeSet<usize> = indices.iter().copied().collect();
        let chunks = self.chunker.chunk(&document.content);
        if let Some(missing) = wanted.iter().find(|&&i| i >= chunks.len()) {
            return Err(RagError::config(format!(
                "chunk index {missing} out of range, document has {} chunks",
                chunks.len()
            )));
        }

        let selected = chunks.into_iter().filter(|c| wanted.contains(&c.index)).collect();
        self.ingest_selected(document, selected).await
    }

    async fn ingest_selected(
        &self,
        document: &Document,
        chunks: Vec<Chunk>,
    ) -> Result<IngestReport> {
        let chunk_count = chunks.len();
        if chunk_count == 0 {
            info!(chunk_count = 0, "ingested document (empty)");
            return Ok(IngestReport::default());
        }

        let mut outcomes: Vec<(usize, Result<FragmentId>)> = stream::iter(chunks)
            .map(|chunk| self.ingest_chunk(document, chunk))
            .buffer_unordered(self.config.ingest_concurrency)
            .collect()
            .await;
        outcomes.sort_by_key(|(index, _)| *index);

        let mut report = IngestReport::default();
        for (index, outcome) in outcomes {
            match outcome {
                Ok(id) => {
                    report.succeeded += 1;
                    report.fragment_ids.push(id);
                }
                Err(e) => {
                    warn!(
                        chunk_index = index,
                        kind = ?e.kind(),
                        error = %e,
                        "chunk ingestion failed"
                    );
                    report.failed.push(index);
                }
            }
        }

        info!(
            chunk_count,
            succeeded = report.succeeded,
            failed = report.failed.len(),
            "ingested document"
        );
        Ok(report)
    }

    async fn ingest_chunk(&self, document: &Document, chunk: Chunk) -> (usize, Result<FragmentId>) {
        let deadline = Deadline::after(self.config.request_timeout);
        let index = chunk.index;

        let result: Result<FragmentId> = async {
            let vector = deadline
                .run("chunk embedding", self.embedder.embed(&chunk.text, &deadline))
                .await?;

            let mut metadata = document.metadata.clone();
            metadata.insert("chunk_index".to_string(), chunk.index.into());
            metadata.insert("source_offset".to_string(), chunk.source_offset.into());

            let fragment = NewFragment {
                text: chunk.text,
                vector,
                metadata,
                model: self.embedder.model().to_string(),
            };
            deadline.run("fragment insert", self.store.insert(fragment, &deadline)).await
        }
        .await;

        debug!(chunk_index = index, ok = result.is_ok(), "chunk processed");
        (index, result)
    }
}

fn stage_failed(stage: Stage, e: RagError) -> RagError {
    error!(stage = %stage, kind = ?e.kind(), error = %e, "stage failed");
    e.at_stage(stage)
}

/// Builder for constructing a [`RagOrchestrator`].
///
/// The embedding client, vector store and generation client are required.
/// The configuration defaults to [`RagConfig::default`]; the chunker and
/// context assembler are derived from it unless set explicitly.
///
/// # Example
///
/// ```rust,ignore
/// let orchestrator = RagOrchestrator::builder()
///     .config(config)
///     .embedding_client(Arc::new(embedder))
///     .vector_store(Arc::new(store))
///     .generation_client(Arc::new(generator))
///     .chunker(Arc::new(chunker))  // optional
///     .build()?;
/// ```
#[derive(Default)]
pub struct RagOrchestratorBuilder {
    config: Option<RagConfig>,
    embedder: Option<Arc<dyn EmbeddingClient>>,
    store: Option<Arc<dyn VectorStore>>,
    generator: Option<Arc<dyn GenerationClient>>,
    chunker: Option<Arc<dyn Chunker>>,
    assembler: Option<ContextAssembler>,
}

impl RagOrchestratorBuilder {
    /// Set the orchestrator configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding client.
    pub fn embedding_client(mut self, client: Arc<dyn EmbeddingClient>) -> Self {
        self.embedder = Some(client);
        self
    }

    /// Set the vector store backend.
    pub fn vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the generation client.
    pub fn generation_client(mut self, client: Arc<dyn GenerationClient>) -> Self {
        self.generator = Some(client);
        self
    }

    /// Override the chunker selected by [`RagConfig::chunking`].
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Override the context assembler derived from the configuration.
    pub fn context_assembler(mut self, assembler: ContextAssembler) -> Self {
        self.assembler = Some(assembler);
        self
    }

    /// Build the [`RagOrchestrator`], validating the configuration and that
    /// all required fields are set.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfiguration`] if a required field is
    /// missing or the configuration is invalid.
    pub fn build(self) -> Result<RagOrchestrator> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let embedder =
            self.embedder.ok_or_else(|| RagError::config("embedding_client is required"))?;
        let store = self.store.ok_or_else(|| RagError::config("vector_store is required"))?;
        let generator =
            self.generator.ok_or_else(|| RagError::config("generation_client is required"))?;

        let chunker = match self.chunker {
            Some(chunker) => chunker,
            None => config.chunking.build(config.chunk_size, config.chunk_overlap)?,
        };
        let assembler = self.assembler.unwrap_or_else(|| {
            ContextAssembler::new(config.system_instruction.clone(), config.target_language.clone())
                .with_delimiter(config.context_delimiter.clone())
                .with_params(config.generation)
        });

        Ok(RagOrchestrator { config, embedder, store, generator, chunker, assembler })
    }
}
