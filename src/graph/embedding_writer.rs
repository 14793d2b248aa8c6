//! Writes node embeddings back into the knowledge graph
//!
//! Disease nodes get a rich description built from their clinical
//! properties; every other entity type is embedded from `{label}：{name}`.

use serde_json::json;
use serde_json::Map;
use serde_json::Value;
use tracing::info;
use tracing::warn;

use crate::embeddings::Embedder;
use crate::errors::Result;
use crate::graph::CypherRunner;

/// Disease properties folded into the description, with their display labels
pub const DISEASE_DESCRIPTION_FIELDS: [(&str, &str); 6] = [
    ("desc", "疾病描述"),
    ("cause", "病因"),
    ("prevent", "预防"),
    ("cure_lasttime", "治愈时间"),
    ("cured_prob", "治愈概率"),
    ("easy_get", "易感人群"),
];

/// Entity labels embedded from their name only
pub const SIMPLE_LABELS: [&str; 7] = [
    "Drug",
    "Symptom",
    "Food",
    "Check",
    "Cure",
    "Producer",
    "Department",
];

/// Per-label outcome of an embedding pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelProgress {
    pub label: String,
    pub total: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// `疾病描述：…；病因：…` from the properties present, or the bare name
pub fn disease_description(name: &str, properties: &Map<String, Value>) -> String {
    let parts: Vec<String> = DISEASE_DESCRIPTION_FIELDS
        .iter()
        .filter_map(|(key, label)| {
            let text = match properties.get(*key)? {
                Value::Null => return None,
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            Some(format!("{label}：{text}"))
        })
        .collect();

    if parts.is_empty() {
        name.to_string()
    } else {
        parts.join("；")
    }
}

pub fn simple_description(label: &str, name: &str) -> String {
    format!("{label}：{name}")
}

/// Fills in missing node embeddings, one node at a time
pub struct EmbeddingWriter<'a> {
    graph: &'a dyn CypherRunner,
    embedder: &'a dyn Embedder,
    embedding_property: String,
}

impl<'a> EmbeddingWriter<'a> {
    pub fn new(
        graph: &'a dyn CypherRunner,
        embedder: &'a dyn Embedder,
        embedding_property: impl Into<String>,
    ) -> Self {
        Self {
            graph,
            embedder,
            embedding_property: embedding_property.into(),
        }
    }

    /// Embed diseases first, then every simple label
    ///
    /// Failures on individual nodes are logged and counted, never fatal; a
    /// failing listing query aborts the pass.
    pub async fn write_all(&self) -> Result<Vec<LabelProgress>> {
        let mut progress = vec![self.write_diseases().await?];
        for label in SIMPLE_LABELS {
            progress.push(self.write_label(label).await?);
        }
        Ok(progress)
    }

    pub async fn write_diseases(&self) -> Result<LabelProgress> {
        let prop = &self.embedding_property;
        let listing = format!(
            "MATCH (n:Disease) WHERE n.desc IS NOT NULL AND n.desc <> '' AND n.`{prop}` IS NULL \
             RETURN n.name AS name, properties(n) AS props"
        );
        let update = format!(
            "MATCH (n:Disease {{name: $name}}) SET n.`{prop}` = $embedding, n.full_description = $full_description"
        );

        let nodes = self.graph.run(&listing, json!({})).await?;
        let mut progress = LabelProgress {
            label: "Disease".to_string(),
            total: nodes.len(),
            ..LabelProgress::default()
        };
        info!("Disease nodes needing embeddings: {}", progress.total);

        for (idx, record) in nodes.records().enumerate() {
            let Some(name) = record.get_str("name") else {
                progress.skipped += 1;
                continue;
            };
            let properties = record
                .get("props")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            let description = disease_description(name, &properties);

            let written = async {
                let vector = self.embedder.embed(&description).await?;
                self.graph
                    .run(
                        &update,
                        json!({"name": name, "embedding": vector, "full_description": description}),
                    )
                    .await
            }
            .await;

            match written {
                Ok(_) => {
                    progress.updated += 1;
                    info!("Disease progress: {}/{}", idx + 1, progress.total);
                }
                Err(e) => {
                    progress.failed += 1;
                    warn!("Failed to embed Disease '{}': {}", name, e);
                }
            }
        }

        info!(
            "Disease embeddings written: {}, skipped: {}, failed: {}",
            progress.updated, progress.skipped, progress.failed
        );
        Ok(progress)
    }

    pub async fn write_label(&self, label: &str) -> Result<LabelProgress> {
        let prop = &self.embedding_property;
        let listing = format!("MATCH (n:`{label}`) WHERE n.`{prop}` IS NULL RETURN n.name AS name");
        let update = format!(
            "MATCH (n:`{label}`) WHERE n.name = $name SET n.`{prop}` = $embedding, n.simple_description = $simple_description"
        );

        let nodes = self.graph.run(&listing, json!({})).await?;
        let mut progress = LabelProgress {
            label: label.to_string(),
            total: nodes.len(),
            ..LabelProgress::default()
        };
        info!("{} nodes needing embeddings: {}", label, progress.total);

        for record in nodes.records() {
            let Some(name) = record.get_str("name").filter(|n| !n.is_empty()) else {
                progress.skipped += 1;
                continue;
            };
            let description = simple_description(label, name);

            let written = async {
                let vector = self.embedder.embed(&description).await?;
                self.graph
                    .run(
                        &update,
                        json!({"name": name, "embedding": vector, "simple_description": description}),
                    )
                    .await
            }
            .await;

            match written {
                Ok(_) => progress.updated += 1,
                Err(e) => {
                    progress.failed += 1;
                    warn!("Failed to embed {} '{}': {}", label, name, e);
                }
            }
        }

        info!(
            "{} embeddings written: {}, skipped: {}, failed: {}",
            label, progress.updated, progress.skipped, progress.failed
        );
        Ok(progress)
    }
}
