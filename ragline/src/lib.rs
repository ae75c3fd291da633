//! # ragline
//!
//! Retrieval-augmented question answering over interchangeable embedding,
//! vector store and generation backends.
//!
//! ## Overview
//!
//! [`RagOrchestrator`] turns a free-text query into a grounded answer:
//!
//! 1. embed the query with an [`EmbeddingClient`]
//! 2. retrieve the closest fragments from a [`VectorStore`]
//! 3. build a bounded two-turn [`Prompt`] with the [`ContextAssembler`]
//! 4. generate the reply with a [`GenerationClient`]
//!
//! Each stage runs under a share of one request [`Deadline`], and a failure
//! is returned as a [`RagError`] tagged with the [`Stage`] that produced it.
//! Ingestion splits a [`Document`] into chunks and embeds and stores them
//! concurrently, reporting failed chunks instead of aborting.
//!
//! ## Backends
//!
//! | Component | Implementation | Feature |
//! |-----------|----------------|---------|
//! | Embedding / generation | [`ollama`] (`/api/embed`, `/api/chat`) | `ollama` (default) |
//! | Embedding / generation | [`openai`] (`/embeddings`, `/chat/completions`) | `openai` |
//! | Vector store | [`InMemoryVectorStore`] | always |
//! | Vector store | [`pgvector`] (PostgreSQL) | `pgvector` |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ragline::ollama::{OllamaEmbeddingClient, OllamaGenerationClient};
//! use ragline::{Document, InMemoryVectorStore, RagConfig, RagOrchestrator};
//!
//! let orchestrator = RagOrchestrator::builder()
//!     .config(RagConfig::default())
//!     .embedding_client(Arc::new(OllamaEmbeddingClient::new(url, "mxbai-embed-large")?))
//!     .vector_store(Arc::new(InMemoryVectorStore::new()))
//!     .generation_client(Arc::new(OllamaGenerationClient::new(url, "llama3")?))
//!     .build()?;
//!
//! orchestrator.ingest(&Document::new(text)).await?;
//! let answer = orchestrator.answer("When was the moon landing?").await?;
//! ```

pub mod chunking;
pub mod config;
pub mod context;
pub mod deadline;
pub mod document;
pub mod embedding;
pub mod error;
pub mod generation;
#[cfg(any(feature = "ollama", feature = "openai"))]
mod http;
pub mod inmemory;
#[cfg(feature = "ollama")]
pub mod ollama;
#[cfg(feature = "openai")]
pub mod openai;
pub mod orchestrator;
#[cfg(feature = "pgvector")]
pub mod pgvector;
pub mod vectorstore;

pub use chunking::{Chunker, ChunkingStrategy, RecursiveChunker, TextChunker, split};
pub use config::{Backend, RagConfig, RagConfigBuilder, ServiceConfig};
pub use context::{ContextAssembler, DEFAULT_SYSTEM_INSTRUCTION, NO_CONTEXT_INSTRUCTION};
pub use deadline::Deadline;
pub use document::{
    Chunk, Document, FragmentId, Metadata, MetadataValue, NewFragment, RetrievedFragment,
    StoredFragment,
};
pub use embedding::EmbeddingClient;
pub use error::{ErrorKind, Failure, RagError, Result, Stage};
pub use generation::{
    Completion, GenerationClient, GenerationParams, Prompt, Role, Turn, first_candidate,
};
pub use inmemory::InMemoryVectorStore;
pub use orchestrator::{Answer, IngestReport, RagOrchestrator, RagOrchestratorBuilder};
pub use vectorstore::{VectorStore, cosine_similarity, rank};
