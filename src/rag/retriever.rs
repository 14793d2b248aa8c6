//! Retrieval adapter and result fusion

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;
use tracing::warn;

use crate::rag::MatchType;
use crate::rag::SearchBackend;
use crate::rag::Snippet;

/// Text used when retrieval produced nothing
pub const NOT_FOUND_TEXT: &str = "未找到相关信息";

/// Separator between snippets in the context text
pub const SNIPPET_SEPARATOR: &str = "、";

static DISALLOWED_CHARS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"[^\w\s.,;:!?()（）【】"'“”‘’、，。；：！？]"#).expect("valid regex")
});

static WHITESPACE_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Drop characters outside the allow-list and collapse whitespace
#[must_use]
pub fn sanitize_query(text: &str) -> String {
    let kept = DISALLOWED_CHARS.replace_all(text, "");
    WHITESPACE_RUN.replace_all(&kept, " ").trim().to_string()
}

/// Result of one retrieval call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetrievalOutcome {
    /// Snippets joined into one context string
    Context(String),
    /// The backend answered but had no hits
    NotFound,
    /// The backend failed; the message is kept for the context text
    Failed(String),
}

impl RetrievalOutcome {
    /// Opaque context text handed to the recommendation prompt
    #[must_use]
    pub fn context_text(&self) -> String {
        match self {
            Self::Context(text) => text.clone(),
            Self::NotFound => NOT_FOUND_TEXT.to_string(),
            Self::Failed(error) => format!("检索过程中出现错误: {error}"),
        }
    }

    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Best-effort retrieval over a search backend
///
/// Never returns an error: backend failures become [`RetrievalOutcome::Failed`].
#[derive(Clone)]
pub struct Retriever {
    backend: Arc<dyn SearchBackend>,
    top_k: usize,
}

impl Retriever {
    pub fn new(backend: Arc<dyn SearchBackend>, top_k: usize) -> Self {
        Self {
            backend,
            top_k: top_k.max(1),
        }
    }

    pub async fn retrieve(&self, query_text: &str) -> RetrievalOutcome {
        let query = sanitize_query(query_text);
        if query.is_empty() {
            debug!("Empty query after sanitizing, skipping retrieval");
            return RetrievalOutcome::NotFound;
        }

        debug!(
            "Retrieving via {} (top_k={}): {}",
            self.backend.name(),
            self.top_k,
            crate::cli::output::truncate_str(&query, 80)
        );

        match self.backend.search(&query, self.top_k).await {
            Ok(snippets) => {
                let texts: Vec<&str> = snippets
                    .iter()
                    .map(|s| s.text.trim())
                    .filter(|t| !t.is_empty())
                    .collect();
                debug!("Retrieved {} snippets", texts.len());
                if texts.is_empty() {
                    RetrievalOutcome::NotFound
                } else {
                    RetrievalOutcome::Context(texts.join(SNIPPET_SEPARATOR))
                }
            }
            Err(e) => {
                warn!("Retrieval via {} failed: {}", self.backend.name(), e);
                RetrievalOutcome::Failed(e.to_string())
            }
        }
    }
}

/// Rerank search results using various strategies
pub struct Reranker;

impl Reranker {
    /// Reciprocal Rank Fusion (RRF) for combining multiple result sets
    ///
    /// Snippets are identified by text. A snippet found by more than one set
    /// becomes a [`MatchType::Hybrid`] match. Ties keep first-seen order.
    #[must_use]
    pub fn reciprocal_rank_fusion(result_sets: Vec<Vec<Snippet>>, k: f32) -> Vec<Snippet> {
        let mut order: Vec<String> = Vec::new();
        let mut scores: HashMap<String, (f32, MatchType)> = HashMap::new();

        for results in result_sets {
            for (rank, snippet) in results.into_iter().enumerate() {
                let rrf_score = 1.0 / (k + rank as f32 + 1.0);
                match scores.get_mut(&snippet.text) {
                    Some(entry) => {
                        entry.0 += rrf_score;
                        if entry.1 != snippet.match_type {
                            entry.1 = MatchType::Hybrid;
                        }
                    }
                    None => {
                        order.push(snippet.text.clone());
                        scores.insert(snippet.text, (rrf_score, snippet.match_type));
                    }
                }
            }
        }

        let mut fused: Vec<Snippet> = order
            .into_iter()
            .filter_map(|text| {
                let (score, match_type) = scores.remove(&text)?;
                Some(Snippet {
                    text,
                    score,
                    match_type,
                })
            })
            .collect();

        // stable sort keeps first-seen order on ties
        fused.sort_by(|a, b| b.score.total_cmp(&a.score));
        fused
    }

    /// Simple score-based reranking
    #[must_use]
    pub fn rerank_by_score(mut results: Vec<Snippet>) -> Vec<Snippet> {
        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results
    }
}
