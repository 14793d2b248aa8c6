//! Cypher over the Neo4j HTTP transactional API

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::config::GraphConfig;
use crate::errors::DrugRagError;
use crate::errors::Result;

/// Anything that can execute a parameterized Cypher statement
#[async_trait]
pub trait CypherRunner: Send + Sync {
    async fn run(&self, statement: &str, parameters: Value) -> Result<QueryResult>;
}

/// Tabular result of one Cypher statement
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryResult {
    pub fn records(&self) -> impl Iterator<Item = Record<'_>> {
        self.rows.iter().map(|row| Record {
            columns: &self.columns,
            row,
        })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// First column of the first row as an integer (for `count(*)` style queries)
    #[must_use]
    pub fn single_i64(&self) -> Option<i64> {
        self.rows.first()?.first()?.as_i64()
    }
}

/// One row with access by column name
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    columns: &'a [String],
    row: &'a [Value],
}

impl<'a> Record<'a> {
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&'a Value> {
        let idx = self.columns.iter().position(|c| c == column)?;
        self.row.get(idx).filter(|v| !v.is_null())
    }

    #[must_use]
    pub fn get_str(&self, column: &str) -> Option<&'a str> {
        self.get(column)?.as_str()
    }

    #[must_use]
    pub fn get_f64(&self, column: &str) -> Option<f64> {
        self.get(column)?.as_f64()
    }

    #[must_use]
    pub fn get_i64(&self, column: &str) -> Option<i64> {
        self.get(column)?.as_i64()
    }

    #[must_use]
    pub fn get_strings(&self, column: &str) -> Vec<String> {
        self.get(column)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Deserialize)]
struct TxResponse {
    #[serde(default)]
    results: Vec<TxResult>,
    #[serde(default)]
    errors: Vec<TxError>,
}

#[derive(Deserialize)]
struct TxResult {
    #[serde(default)]
    columns: Vec<String>,
    #[serde(default)]
    data: Vec<TxRow>,
}

#[derive(Deserialize)]
struct TxRow {
    #[serde(default)]
    row: Vec<Value>,
}

#[derive(Deserialize)]
struct TxError {
    code: String,
    message: String,
}

/// Decode a transactional endpoint body into the first statement's result
pub fn parse_tx_response(body: &str) -> Result<QueryResult> {
    let response: TxResponse = serde_json::from_str(body)
        .map_err(|e| DrugRagError::GraphError(format!("Failed to parse response: {e}")))?;

    if let Some(error) = response.errors.first() {
        return Err(DrugRagError::GraphError(format!(
            "{}: {}",
            error.code, error.message
        )));
    }

    Ok(response
        .results
        .into_iter()
        .next()
        .map(|r| QueryResult {
            columns: r.columns,
            rows: r.data.into_iter().map(|d| d.row).collect(),
        })
        .unwrap_or_default())
}

/// HTTP client for one Neo4j database
pub struct GraphClient {
    commit_url: Url,
    username: String,
    password: String,
    client: Client,
}

impl GraphClient {
    /// Create a new graph client
    ///
    /// # Errors
    /// - Invalid base URL
    /// - HTTP client build errors
    pub fn new(base_url: &str, database: &str, username: String, password: String) -> Result<Self> {
        let mut base = Url::parse(base_url)
            .map_err(|e| DrugRagError::ConfigError(format!("Invalid graph URL '{base_url}': {e}")))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(DrugRagError::ConfigError(format!(
                "Graph URL must use http(s), got '{}'",
                base.scheme()
            )));
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let commit_url = base
            .join(&format!("db/{database}/tx/commit"))
            .map_err(|e| DrugRagError::ConfigError(format!("Invalid graph database name: {e}")))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| DrugRagError::HttpError(e.to_string()))?;

        Ok(Self {
            commit_url,
            username,
            password,
            client,
        })
    }

    pub fn from_config(config: &GraphConfig) -> Result<Self> {
        Self::new(
            &config.url,
            &config.database,
            config.username.clone(),
            config.password.clone(),
        )
    }

    #[must_use]
    pub fn commit_url(&self) -> &str {
        self.commit_url.as_str()
    }
}

#[async_trait]
impl CypherRunner for GraphClient {
    async fn run(&self, statement: &str, parameters: Value) -> Result<QueryResult> {
        #[derive(Serialize)]
        struct Statement<'a> {
            statement: &'a str,
            parameters: Value,
        }

        #[derive(Serialize)]
        struct TxRequest<'a> {
            statements: [Statement<'a>; 1],
        }

        debug!("Running Cypher: {}", statement);

        let request = TxRequest {
            statements: [Statement {
                statement,
                parameters,
            }],
        };

        let response = self
            .client
            .post(self.commit_url.clone())
            .basic_auth(&self.username, Some(&self.password))
            .header("Accept", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| DrugRagError::GraphError(format!("Request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        if !status.is_success() {
            return Err(DrugRagError::GraphError(format!("HTTP {status}: {body}")));
        }

        parse_tx_response(&body)
    }
}
