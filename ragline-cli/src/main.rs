//! `ragline` command-line entry point.
//!
//! ```bash
//! ragline ingest notes.txt --meta team=research
//! ragline ask "When was the moon landing?" --ingest apollo.txt
//! ```
//!
//! Endpoints and models come from `RAGLINE_*` environment variables, read
//! from a `.env` file when one is present.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ragline::ollama::{OllamaEmbeddingClient, OllamaGenerationClient};
use ragline::openai::{OpenAIEmbeddingClient, OpenAIGenerationClient};
use ragline::pgvector::PgVectorStore;
use ragline::{
    Backend, Deadline, Document, EmbeddingClient, GenerationClient, InMemoryVectorStore,
    RagConfig, RagError, RagOrchestrator, ServiceConfig, VectorStore,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ragline", version, about = "Retrieval-augmented question answering")]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Chunk, embed and store plain-text files
    Ingest {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Extra metadata attached to every chunk
        #[arg(long = "meta", value_name = "KEY=VALUE", value_parser = parse_meta)]
        meta: Vec<(String, String)>,
    },
    /// Answer a question from stored fragments
    Ask {
        query: String,

        /// Ingest these files before answering
        #[arg(long = "ingest", value_name = "FILE")]
        ingest: Vec<PathBuf>,

        /// Print the fragments the answer was grounded on
        #[arg(long)]
        sources: bool,
    },
}

fn parse_meta(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{raw}'")),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.json);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            match e.downcast_ref::<RagError>() {
                Some(rag) => eprintln!(
                    "error: {rag}\n  kind: {:?}\n  stage: {}\n  retryable: {}",
                    rag.kind(),
                    rag.stage().map_or("-", |s| s.as_str()),
                    rag.is_retryable(),
                ),
                None => eprintln!("error: {e:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ragline=info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let service = ServiceConfig::from_env()?;
    let config = RagConfig::from_env()?;
    tracing::debug!(?service, "loaded service configuration");

    let orchestrator = build_orchestrator(&service, config).await?;

    match cli.command {
        Command::Ingest { files, meta } => {
            let complete = ingest_files(&orchestrator, &files, &meta).await?;
            Ok(if complete { ExitCode::SUCCESS } else { ExitCode::FAILURE })
        }
        Command::Ask { query, ingest, sources } => {
            ingest_files(&orchestrator, &ingest, &[]).await?;
            let answer = orchestrator.query(&query).await?;

            println!("{}", answer.text.trim());
            if sources {
                println!();
                for (rank, source) in answer.sources.iter().enumerate() {
                    let origin = source
                        .fragment
                        .metadata
                        .get("source")
                        .map(ToString::to_string)
                        .unwrap_or_else(|| source.fragment.id.clone());
                    println!("[{}] {origin} (score {:.3})", rank + 1, source.score);
                }
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn build_orchestrator(service: &ServiceConfig, config: RagConfig) -> Result<RagOrchestrator> {
    let (embedder, generator): (Arc<dyn EmbeddingClient>, Arc<dyn GenerationClient>) =
        match service.backend {
            Backend::Ollama => (
                Arc::new(
                    OllamaEmbeddingClient::new(&service.embedding_url, &service.embedding_model)?
                        .with_timeout(config.call_timeout),
                ),
                Arc::new(
                    OllamaGenerationClient::new(&service.generation_url, &service.generation_model)?
                        .with_timeout(config.call_timeout),
                ),
            ),
            Backend::OpenAi => {
                let api_key = service.api_key.clone().unwrap_or_default();
                (
                    Arc::new(
                        OpenAIEmbeddingClient::new(
                            &service.embedding_url,
                            &service.embedding_model,
                        )?
                        .with_api_key(api_key.clone())
                        .with_timeout(config.call_timeout),
                    ),
                    Arc::new(
                        OpenAIGenerationClient::new(
                            &service.generation_url,
                            &service.generation_model,
                        )?
                        .with_api_key(api_key)
                        .with_timeout(config.call_timeout),
                    ),
                )
            }
        };

    let store: Arc<dyn VectorStore> = if service.storage_url == "memory" {
        Arc::new(InMemoryVectorStore::new())
    } else {
        let store = PgVectorStore::connect(&service.storage_url).await?;
        // The column width must match the embedding model's output.
        let probe = embedder
            .embed("dimension probe", &Deadline::after(config.call_timeout))
            .await
            .context("failed to probe embedding dimensions")?;
        store.ensure_schema(probe.len()).await?;
        Arc::new(store)
    };

    let orchestrator = RagOrchestrator::builder()
        .config(config)
        .embedding_client(embedder)
        .vector_store(store)
        .generation_client(generator)
        .build()?;
    Ok(orchestrator)
}

/// Ingest each file, tagging chunks with `source=<path>`. Returns whether
/// every chunk of every file was stored.
async fn ingest_files(
    orchestrator: &RagOrchestrator,
    files: &[PathBuf],
    meta: &[(String, String)],
) -> Result<bool> {
    let mut complete = true;
    for path in files {
        let document = read_document(path, meta).await?;
        let report = orchestrator.ingest(&document).await?;

        if report.is_complete() {
            println!("{}: stored {} chunks", path.display(), report.succeeded);
        } else {
            println!(
                "{}: stored {} chunks, failed chunks {:?}",
                path.display(),
                report.succeeded,
                report.failed
            );
            complete = false;
        }
    }
    Ok(complete)
}

async fn read_document(path: &Path, meta: &[(String, String)]) -> Result<Document> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;

    let mut document = Document::new(content).with_metadata("source", path.display().to_string());
    for (key, value) in meta {
        document = document.with_metadata(key.clone(), value.clone());
    }
    Ok(document)
}
