//! Search backends over the knowledge graph

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::config::GraphConfig;
use crate::embeddings::cosine_similarity;
use crate::embeddings::Embedder;
use crate::errors::DrugRagError;
use crate::errors::Result;
use crate::graph::CypherRunner;
use crate::rag::MatchType;
use crate::rag::Reranker;
use crate::rag::SearchBackend;
use crate::rag::Snippet;

/// Page size used when pulling nodes into the in-memory index
pub const NODE_PAGE_SIZE: usize = 5000;

/// Standard RRF constant
const RRF_K: f32 = 60.0;

const VECTOR_QUERY: &str = "CALL db.index.vector.queryNodes($index, $k, $embedding) \
     YIELD node, score RETURN node[$property] AS text, score";

const FULLTEXT_QUERY: &str = "CALL db.index.fulltext.queryNodes($index, $query) \
     YIELD node, score RETURN node[$property] AS text, score LIMIT $k";

const NODE_PAGE_QUERY: &str = "MATCH (n) WHERE n.name IS NOT NULL \
     RETURN n.name AS name, labels(n) AS labels, n.desc AS desc \
     ORDER BY elementId(n) SKIP $skip LIMIT $limit";

/// Escape Lucene query syntax so free text can go to the full-text index
#[must_use]
pub fn escape_lucene(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(
            c,
            '+' | '-' | '&' | '|' | '!' | '(' | ')' | '{' | '}' | '[' | ']' | '^' | '"' | '~'
                | '*' | '?' | ':' | '\\' | '/'
        ) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Vector (optionally hybrid) search through Neo4j indexes
pub struct GraphVectorSearch {
    graph: Arc<dyn CypherRunner>,
    embedder: Arc<dyn Embedder>,
    vector_index: String,
    fulltext_index: String,
    text_property: String,
    hybrid: bool,
}

impl GraphVectorSearch {
    /// Vector index only
    pub fn vector(
        graph: Arc<dyn CypherRunner>,
        embedder: Arc<dyn Embedder>,
        config: &GraphConfig,
    ) -> Self {
        Self {
            graph,
            embedder,
            vector_index: config.vector_index.clone(),
            fulltext_index: config.fulltext_index.clone(),
            text_property: config.text_property.clone(),
            hybrid: false,
        }
    }

    /// Vector hits fused with full-text hits
    pub fn hybrid(
        graph: Arc<dyn CypherRunner>,
        embedder: Arc<dyn Embedder>,
        config: &GraphConfig,
    ) -> Self {
        Self {
            hybrid: true,
            ..Self::vector(graph, embedder, config)
        }
    }

    async fn vector_search(&self, query: &str, top_k: usize) -> Result<Vec<Snippet>> {
        let embedding = self.embedder.embed(query).await?;
        let result = self
            .graph
            .run(
                VECTOR_QUERY,
                json!({
                    "index": self.vector_index,
                    "k": top_k,
                    "embedding": embedding,
                    "property": self.text_property,
                }),
            )
            .await?;

        Ok(result
            .records()
            .filter_map(|r| {
                let text = r.get_str("text")?;
                Some(Snippet::new(
                    text,
                    r.get_f64("score").unwrap_or(0.0) as f32,
                    MatchType::Semantic,
                ))
            })
            .collect())
    }

    async fn keyword_search(&self, query: &str, top_k: usize) -> Result<Vec<Snippet>> {
        let result = self
            .graph
            .run(
                FULLTEXT_QUERY,
                json!({
                    "index": self.fulltext_index,
                    "query": escape_lucene(query),
                    "k": top_k,
                    "property": self.text_property,
                }),
            )
            .await?;

        Ok(result
            .records()
            .filter_map(|r| {
                let text = r.get_str("text")?;
                Some(Snippet::new(
                    text,
                    r.get_f64("score").unwrap_or(0.0) as f32,
                    MatchType::Keyword,
                ))
            })
            .collect())
    }
}

#[async_trait]
impl SearchBackend for GraphVectorSearch {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<Snippet>> {
        let semantic = self.vector_search(query, top_k).await?;
        if !self.hybrid {
            return Ok(semantic);
        }

        let keyword = match self.keyword_search(query, top_k).await {
            Ok(keyword) => keyword,
            Err(e) => {
                warn!("Keyword search failed, using vector hits only: {}", e);
                let mut semantic = semantic;
                semantic.truncate(top_k);
                return Ok(semantic);
            }
        };
        debug!(
            "Hybrid search: {} vector hits, {} keyword hits",
            semantic.len(),
            keyword.len()
        );

        let mut fused = Reranker::reciprocal_rank_fusion(vec![semantic, keyword], RRF_K);
        fused.truncate(top_k);
        Ok(fused)
    }

    fn name(&self) -> &str {
        if self.hybrid {
            "hybrid"
        } else {
            "vector"
        }
    }
}

struct IndexedDocument {
    text: String,
    vector: Vec<f32>,
}

/// In-process cosine index over every named graph node
pub struct MemoryVectorIndex {
    embedder: Arc<dyn Embedder>,
    documents: Vec<IndexedDocument>,
}

/// `{name}，[labels]。{desc}`
#[must_use]
pub fn node_document(name: &str, labels: &[String], desc: Option<&str>) -> String {
    format!(
        "{name}，[{}]。{}",
        labels.join(", "),
        desc.unwrap_or_default().trim()
    )
}

impl MemoryVectorIndex {
    /// Pull all named nodes page by page and embed them
    ///
    /// Nodes whose embedding fails are logged and left out of the index.
    pub async fn build(graph: &dyn CypherRunner, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let mut texts = Vec::new();
        let mut skip = 0usize;
        loop {
            let page = graph
                .run(
                    NODE_PAGE_QUERY,
                    json!({"skip": skip, "limit": NODE_PAGE_SIZE}),
                )
                .await?;
            let fetched = page.len();
            texts.extend(page.records().filter_map(|r| {
                let name = r.get_str("name")?;
                Some(node_document(name, &r.get_strings("labels"), r.get_str("desc")))
            }));
            debug!("Fetched {} nodes (offset {})", fetched, skip);

            if fetched < NODE_PAGE_SIZE {
                break;
            }
            skip += NODE_PAGE_SIZE;
        }

        info!("Embedding {} graph nodes for the in-memory index", texts.len());
        let mut documents = Vec::with_capacity(texts.len());
        for text in texts {
            match embedder.embed(&text).await {
                Ok(vector) => documents.push(IndexedDocument { text, vector }),
                Err(e) => warn!("Skipping node document '{}': {}", text, e),
            }
        }
        info!("In-memory index ready with {} documents", documents.len());

        Ok(Self {
            embedder,
            documents,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[async_trait]
impl SearchBackend for MemoryVectorIndex {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<Snippet>> {
        let query_vector = self.embedder.embed(query).await?;
        let scored: Vec<Snippet> = self
            .documents
            .iter()
            .map(|doc| {
                Snippet::new(
                    doc.text.clone(),
                    cosine_similarity(&query_vector, &doc.vector),
                    MatchType::Semantic,
                )
            })
            .collect();

        let mut ranked = Reranker::rerank_by_score(scored);
        ranked.truncate(top_k);
        Ok(ranked)
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Stands in for a backend that could not be set up
///
/// Every search fails with the setup error, so each case still runs and
/// records a failed retrieval.
pub struct UnavailableBackend {
    reason: String,
}

impl UnavailableBackend {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl SearchBackend for UnavailableBackend {
    async fn search(&self, _query: &str, _top_k: usize) -> Result<Vec<Snippet>> {
        Err(DrugRagError::GraphError(format!(
            "search backend unavailable: {}",
            self.reason
        )))
    }

    fn name(&self) -> &str {
        "unavailable"
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::Value;

    use super::*;
    use crate::graph::QueryResult;

    /// Maps known words onto fixed axes
    struct AxisEmbedder;

    #[async_trait]
    impl Embedder for AxisEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            Ok(vec![
                if text.contains("糖尿病") { 1.0 } else { 0.0 },
                if text.contains("高血压") { 1.0 } else { 0.0 },
                0.1,
            ])
        }
    }

    /// Records every call and answers by statement prefix
    #[derive(Default)]
    struct ScriptedGraph {
        calls: Mutex<Vec<(String, Value)>>,
        fulltext_down: bool,
    }

    #[async_trait]
    impl CypherRunner for ScriptedGraph {
        async fn run(&self, statement: &str, parameters: Value) -> Result<QueryResult> {
            self.calls
                .lock()
                .unwrap()
                .push((statement.to_string(), parameters.clone()));

            if self.fulltext_down && statement.contains("db.index.fulltext") {
                return Err(DrugRagError::GraphError(
                    "Neo.ClientError.Statement.SyntaxError: TooManyClauses".to_string(),
                ));
            }

            let columns = vec!["text".to_string(), "score".to_string()];
            let rows = if statement.contains("db.index.vector") {
                vec![vec![json!("糖尿病"), json!(0.95)], vec![json!("二甲双胍"), json!(0.9)]]
            } else if statement.contains("db.index.fulltext") {
                vec![vec![json!("二甲双胍"), json!(4.2)], vec![json!("胰岛素"), json!(3.1)]]
            } else {
                return Ok(QueryResult {
                    columns: vec!["name".into(), "labels".into(), "desc".into()],
                    rows: vec![
                        vec![json!("糖尿病"), json!(["Disease"]), json!("代谢性疾病")],
                        vec![json!("高血压"), json!(["Disease"]), Value::Null],
                    ],
                });
            };
            Ok(QueryResult { columns, rows })
        }
    }

    fn graph_config() -> GraphConfig {
        GraphConfig::default()
    }

    #[test]
    fn test_escape_lucene() {
        assert_eq!(escape_lucene("胸痛(加重)?"), "胸痛\\(加重\\)\\?");
        assert_eq!(escape_lucene("糖尿病"), "糖尿病");
    }

    #[test]
    fn test_node_document() {
        assert_eq!(
            node_document("糖尿病", &["Disease".to_string()], Some("代谢性疾病")),
            "糖尿病，[Disease]。代谢性疾病"
        );
        assert_eq!(node_document("头痛", &[], None), "头痛，[]。");
    }

    #[tokio::test]
    async fn test_vector_search() {
        let graph = Arc::new(ScriptedGraph::default());
        let search = GraphVectorSearch::vector(graph.clone(), Arc::new(AxisEmbedder), &graph_config());

        let snippets = search.search("糖尿病", 5).await.unwrap();
        assert_eq!(search.name(), "vector");
        assert_eq!(snippets.len(), 2);
        assert_eq!(snippets[0].text, "糖尿病");

        let calls = graph.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1["k"], json!(5));
        assert_eq!(calls[0].1["index"], json!(graph_config().vector_index));
    }

    #[tokio::test]
    async fn test_hybrid_search_fuses_results() {
        let graph = Arc::new(ScriptedGraph::default());
        let search = GraphVectorSearch::hybrid(graph.clone(), Arc::new(AxisEmbedder), &graph_config());

        let snippets = search.search("糖尿病", 2).await.unwrap();
        assert_eq!(search.name(), "hybrid");
        assert_eq!(snippets.len(), 2);
        assert_eq!(snippets[0].text, "二甲双胍");
        assert_eq!(snippets[0].match_type, MatchType::Hybrid);
        assert_eq!(graph.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_memory_index_build_and_search() {
        let graph = ScriptedGraph::default();
        let index = MemoryVectorIndex::build(&graph, Arc::new(AxisEmbedder)).await.unwrap();
        assert_eq!(index.len(), 2);

        let snippets = index.search("高血压 头晕", 1).await.unwrap();
        assert_eq!(snippets.len(), 1);
        assert_eq!(snippets[0].text, "高血压，[Disease]。");

        let calls = graph.calls.lock().unwrap();
        assert_eq!(calls[0].1["limit"], json!(NODE_PAGE_SIZE));
        assert_eq!(calls[0].1["skip"], json!(0));
    }

    #[tokio::test]
    async fn test_hybrid_search_keeps_vector_hits_when_keyword_search_fails() {
        let graph = Arc::new(ScriptedGraph {
            fulltext_down: true,
            ..ScriptedGraph::default()
        });
        let search = GraphVectorSearch::hybrid(graph.clone(), Arc::new(AxisEmbedder), &graph_config());

        let snippets = search.search("糖尿病", 1).await.unwrap();
        assert_eq!(snippets.len(), 1);
        assert_eq!(snippets[0].text, "糖尿病");
        assert_eq!(snippets[0].match_type, MatchType::Semantic);
        assert_eq!(graph.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unavailable_backend_reports_setup_error() {
        let backend = UnavailableBackend::new("Graph URL must use http(s), got 'bolt'");
        let err = backend.search("胸痛", 10).await.unwrap_err();
        assert!(err.to_string().contains("got 'bolt'"));
        assert_eq!(backend.name(), "unavailable");
    }
}
