//! Quick health report of the knowledge graph

use serde::Serialize;
use serde_json::json;

use crate::errors::Result;
use crate::graph::CypherRunner;

const COUNT_NODES: &str = "MATCH (n) RETURN count(n) AS c";
const COUNT_RELATIONSHIPS: &str = "MATCH ()-[r]->() RETURN count(r) AS c";
const TOP_LABELS: &str = "MATCH (n) UNWIND labels(n) AS l RETURN l AS label, count(*) AS c ORDER BY c DESC LIMIT 10";
const SAMPLE_TRIPLES: &str = "MATCH (a)-[r]->(b) \
     RETURN labels(a) AS a_labels, type(r) AS rel, labels(b) AS b_labels, \
     coalesce(a.name, a.id, a.title, a.label) AS a_name, \
     coalesce(b.name, b.id, b.title, b.label) AS b_name \
     LIMIT 10";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelCount {
    pub label: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Triple {
    pub source_labels: Vec<String>,
    pub source_name: String,
    pub relation: String,
    pub target_labels: Vec<String>,
    pub target_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GraphDiagnostics {
    pub node_count: i64,
    pub relationship_count: i64,
    pub top_labels: Vec<LabelCount>,
    pub sample_triples: Vec<Triple>,
}

/// Node/relationship counts, label distribution and sample triples
pub async fn diagnose(graph: &dyn CypherRunner) -> Result<GraphDiagnostics> {
    let node_count = graph.run(COUNT_NODES, json!({})).await?.single_i64().unwrap_or(0);
    let relationship_count = graph
        .run(COUNT_RELATIONSHIPS, json!({}))
        .await?
        .single_i64()
        .unwrap_or(0);

    let top_labels = graph
        .run(TOP_LABELS, json!({}))
        .await?
        .records()
        .filter_map(|r| {
            Some(LabelCount {
                label: r.get_str("label")?.to_string(),
                count: r.get_i64("c").unwrap_or(0),
            })
        })
        .collect();

    let sample_triples = graph
        .run(SAMPLE_TRIPLES, json!({}))
        .await?
        .records()
        .map(|r| Triple {
            source_labels: r.get_strings("a_labels"),
            source_name: r.get("a_name").map(display_value).unwrap_or_default(),
            relation: r.get_str("rel").unwrap_or_default().to_string(),
            target_labels: r.get_strings("b_labels"),
            target_name: r.get("b_name").map(display_value).unwrap_or_default(),
        })
        .collect();

    Ok(GraphDiagnostics {
        node_count,
        relationship_count,
        top_labels,
        sample_triples,
    })
}

fn display_value(value: &serde_json::Value) -> String {
    value
        .as_str()
        .map_or_else(|| value.to_string(), str::to_string)
}
