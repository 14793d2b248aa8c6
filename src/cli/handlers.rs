//! CLI command handlers
//!
//! This module wires configuration into the clients and runs each command

use std::path::PathBuf;
use std::sync::Arc;

use tracing::error;
use tracing::info;

use crate::batch::BatchRunner;
use crate::candidates::CandidateRegistry;
use crate::cli::output::*;
use crate::config::RetrievalBackend;
use crate::embeddings::Embedder;
use crate::embeddings::EmbeddingClient;
use crate::graph::diagnose;
use crate::graph::EmbeddingWriter;
use crate::graph::GraphClient;
use crate::llm::LlmClient;
use crate::rag::AdviceOptions;
use crate::rag::AdvicePipeline;
use crate::rag::GraphVectorSearch;
use crate::rag::MemoryVectorIndex;
use crate::rag::PipelineInput;
use crate::rag::Retriever;
use crate::rag::SearchBackend;
use crate::rag::UnavailableBackend;
use crate::AppConfig;
use crate::DrugRagError;
use crate::Result;

/// Search backend selected by `[retrieval] backend`
///
/// Setup failures are logged and replaced by an [`UnavailableBackend`], so
/// every later search reports the setup error as a failed retrieval.
pub async fn build_search_backend(config: &AppConfig) -> Arc<dyn SearchBackend> {
    let backend = match try_build_search_backend(config).await {
        Ok(backend) => backend,
        Err(e) => {
            error!("Search backend unavailable: {}", e);
            print_warning(&format!("Search backend unavailable: {e}"));
            Arc::new(UnavailableBackend::new(e.to_string()))
        }
    };
    info!("Search backend: {}", backend.name());
    backend
}

async fn try_build_search_backend(config: &AppConfig) -> Result<Arc<dyn SearchBackend>> {
    let graph = Arc::new(GraphClient::from_config(&config.graph)?);
    let embedder: Arc<dyn Embedder> = Arc::new(EmbeddingClient::from_config(&config.embeddings)?);

    Ok(match config.retrieval.backend {
        RetrievalBackend::Vector => Arc::new(GraphVectorSearch::vector(graph, embedder, &config.graph)),
        RetrievalBackend::Hybrid => Arc::new(GraphVectorSearch::hybrid(graph, embedder, &config.graph)),
        RetrievalBackend::Memory => {
            print_info("Building in-memory index from graph nodes...");
            Arc::new(MemoryVectorIndex::build(graph.as_ref(), embedder).await?)
        }
    })
}

/// Full advice pipeline from configuration
pub async fn build_pipeline(config: &AppConfig) -> Result<AdvicePipeline> {
    let backend = build_search_backend(config).await;
    let llm = Arc::new(LlmClient::from_config(&config.llm)?);
    let candidates = Arc::new(CandidateRegistry::new(config.candidates_path()));
    info!(
        "Loaded {} candidate drugs from {}",
        candidates.names().len(),
        candidates.path().display()
    );

    Ok(AdvicePipeline::new(
        llm,
        Retriever::new(backend, config.retrieval.top_k),
        candidates,
        AdviceOptions::from_config(&config.advice),
    ))
}

/// Handle batch command
pub async fn handle_batch_command(
    config: &AppConfig,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
) -> Result<()> {
    let input = input.unwrap_or_else(|| config.batch.input.clone());
    let output = output.unwrap_or_else(|| config.batch.output.clone());

    if !input.is_file() {
        return Err(DrugRagError::InputNotFound(input));
    }

    print_info(&format!("Processing {}", input.display()));
    let pipeline = build_pipeline(config).await?;
    let runner = BatchRunner::new(&pipeline, config.batch.id_field.clone());
    let report = runner.run_file(&input, &output).await?;

    print_batch_report(&report);
    print_success(&format!("Results written to {}", output.display()));
    Ok(())
}

/// Handle ask command
pub async fn handle_ask_command(config: &AppConfig, text: &str) -> Result<()> {
    let pipeline = build_pipeline(config).await?;
    let formatted = pipeline.run_interactive(PipelineInput::text(text)).await;

    println!("{}", formatted.text);
    if formatted.advised.advice.is_failed() {
        print_warning("Advice generation failed");
    }
    Ok(())
}

/// Handle retrieve command
pub async fn handle_retrieve_command(
    config: &AppConfig,
    text: &str,
    top_k: Option<usize>,
) -> Result<()> {
    let backend = build_search_backend(config).await;
    let retriever = Retriever::new(backend, top_k.unwrap_or(config.retrieval.top_k));
    let outcome = retriever.retrieve(text).await;
    print_retrieval(text, &outcome);
    Ok(())
}

/// Handle filter command
pub fn handle_filter_command(config: &AppConfig, raw: &str) -> Result<()> {
    let candidates = CandidateRegistry::new(config.candidates_path());
    if candidates.names().is_empty() {
        print_warning("No candidate list loaded, names pass through unchanged");
    }
    println!("{}", candidates.filter(raw));
    Ok(())
}

/// Handle embed command
pub async fn handle_embed_command(config: &AppConfig) -> Result<()> {
    let graph = GraphClient::from_config(&config.graph)?;
    let embedder = EmbeddingClient::from_config(&config.embeddings)?;
    let writer = EmbeddingWriter::new(&graph, &embedder, config.graph.embedding_property.clone());

    let progress = writer.write_all().await?;
    print_embedding_progress(&progress);
    print_success("Node embeddings written");
    Ok(())
}

/// Handle diagnose command
pub async fn handle_diagnose_command(config: &AppConfig) -> Result<()> {
    let graph = GraphClient::from_config(&config.graph)?;
    let diagnostics = diagnose(&graph).await?;
    print_diagnostics(&diagnostics);
    Ok(())
}

/// Handle config command
pub fn handle_config_command(config: &AppConfig) -> Result<()> {
    print_config(config);
    for warning in config.credential_warnings() {
        print_warning(&warning);
    }
    Ok(())
}
