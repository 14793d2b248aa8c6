//! RAG (Retrieval-Augmented Generation) module
//!
//! This module recommends discharge medications for a case:
//! - Retrieval of knowledge-graph snippets (vector, hybrid or in-memory)
//! - Recommendation prompting grounded on the retrieved context
//! - Post-hoc restriction of the answer to the candidate formulary
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use drugrag::candidates::CandidateRegistry;
//! use drugrag::config::AppConfig;
//! use drugrag::embeddings::EmbeddingClient;
//! use drugrag::graph::GraphClient;
//! use drugrag::llm::LlmClient;
//! use drugrag::rag::{AdviceOptions, AdvicePipeline, GraphVectorSearch, PipelineInput, Retriever};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::load()?;
//!     let graph = Arc::new(GraphClient::from_config(&config.graph)?);
//!     let embedder = Arc::new(EmbeddingClient::from_config(&config.embeddings)?);
//!     let backend = Arc::new(GraphVectorSearch::hybrid(graph, embedder, &config.graph));
//!
//!     let pipeline = AdvicePipeline::new(
//!         Arc::new(LlmClient::from_config(&config.llm)?),
//!         Retriever::new(backend, config.retrieval.top_k),
//!         Arc::new(CandidateRegistry::new(config.candidates_path())),
//!         AdviceOptions::from_config(&config.advice),
//!     );
//!
//!     let advised = pipeline.run(PipelineInput::text("反复胸闷3年，加重1周")).await;
//!     println!("{}", advised.medical_advice());
//!     Ok(())
//! }
//! ```

pub mod index;
pub mod pipeline;
pub mod retriever;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;

pub use index::GraphVectorSearch;
pub use index::MemoryVectorIndex;
pub use index::UnavailableBackend;
pub use pipeline::AdviceOptions;
pub use pipeline::AdviceOutcome;
pub use pipeline::AdvicePipeline;
pub use pipeline::Advised;
pub use pipeline::Extracted;
pub use pipeline::Formatted;
pub use pipeline::PipelineInput;
pub use pipeline::Retrieved;
pub use retriever::Reranker;
pub use retriever::RetrievalOutcome;
pub use retriever::Retriever;

use crate::errors::Result;

/// One retrieved text snippet with relevance score
#[derive(Debug, Clone, PartialEq)]
pub struct Snippet {
    pub text: String,
    pub score: f32,
    pub match_type: MatchType,
}

impl Snippet {
    pub fn new(text: impl Into<String>, score: f32, match_type: MatchType) -> Self {
        Self {
            text: text.into(),
            score,
            match_type,
        }
    }
}

/// Type of match for the search result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchType {
    /// Vector similarity match
    Semantic,
    /// Full-text keyword match
    Keyword,
    /// Combined semantic and keyword match
    Hybrid,
}

/// "Given text, return top-K related snippets"
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<Snippet>>;

    /// Short backend name for logs
    fn name(&self) -> &str;
}

/// Which text is sent to retrieval
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryMode {
    /// Retrieve with the same case text the advice is generated from
    #[default]
    MedicalText,
    /// Retrieve with the rendered case summary (structured records only)
    CaseSummary,
    /// Ask the LLM to write the retrieval query from the case summary
    Generated,
}
