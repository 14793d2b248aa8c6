//! Embedding API clients for various providers

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::config::EmbeddingsConfig;
use crate::embeddings::Embedder;
use crate::errors::DrugRagError;
use crate::errors::Result;

/// Supported embedding providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProvider {
    /// `OpenAI`-compatible `/embeddings` API
    #[serde(rename = "openai_compatible")]
    OpenAI,
    /// Ollama local embeddings
    #[default]
    Ollama,
}

/// Client for generating embeddings from various providers
pub struct EmbeddingClient {
    provider: EmbeddingProvider,
    model: String,
    endpoint: String,
    api_key: Option<String>,
    dimension: Option<usize>,
    client: Client,
}

/// `OpenAI`-compatible embeddings request body
#[derive(Serialize)]
struct OpenAIRequest<'a> {
    input: &'a str,
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

impl EmbeddingClient {
    /// Create a new embedding client
    ///
    /// # Errors
    /// - HTTP client build errors (invalid configuration)
    pub fn new(
        provider: EmbeddingProvider,
        model: String,
        endpoint: String,
        api_key: Option<String>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| DrugRagError::HttpError(e.to_string()))?;

        Ok(Self {
            provider,
            model,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
            dimension: None,
            client,
        })
    }

    /// Request vectors of `dimension` entries and reject replies of any other length
    #[must_use]
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = Some(dimension);
        self
    }

    pub fn from_config(config: &EmbeddingsConfig) -> Result<Self> {
        Self::new(
            config.provider,
            config.model.clone(),
            config.endpoint.clone(),
            Some(config.api_key.clone()).filter(|k| !k.is_empty()),
        )
        .map(|client| client.with_dimension(config.dimension))
    }

    /// Generate embedding for a single text
    ///
    /// # Errors
    /// - API request failures (network errors, timeouts, authentication failures)
    /// - Invalid API responses (malformed JSON, missing embedding)
    pub async fn generate(&self, text: &str) -> Result<Vec<f32>> {
        let vector = match self.provider {
            EmbeddingProvider::OpenAI => self.generate_openai(text).await?,
            EmbeddingProvider::Ollama => self.generate_ollama(text).await?,
        };
        self.check_dimension(vector)
    }

    /// Vectors must match the graph's vector index size
    fn check_dimension(&self, vector: Vec<f32>) -> Result<Vec<f32>> {
        match self.dimension {
            Some(expected) if vector.len() != expected => Err(DrugRagError::EmbeddingError(format!(
                "Expected {expected}-dimensional embedding from {}, got {}",
                self.model,
                vector.len()
            ))),
            _ => Ok(vector),
        }
    }

    /// Generate embedding using an `OpenAI`-compatible API
    async fn generate_openai(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/embeddings", self.endpoint);
        debug!("Calling embeddings API: {}", url);

        let request = OpenAIRequest {
            input: text,
            model: &self.model,
            dimensions: self.dimension,
        };

        let mut builder = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&request);
        if let Some(api_key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {api_key}"));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| DrugRagError::HttpError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(DrugRagError::EmbeddingError(format!(
                "Embeddings API error ({status}): {error_text}"
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| DrugRagError::EmbeddingError(format!("Failed to parse response: {e}")))?;

        parse_embedding_body(&body)
    }

    /// Generate embedding using Ollama API
    async fn generate_ollama(&self, text: &str) -> Result<Vec<f32>> {
        #[derive(Serialize)]
        struct OllamaRequest<'a> {
            model: &'a str,
            prompt: &'a str,
        }

        #[derive(Deserialize)]
        struct OllamaResponse {
            embedding: Vec<f32>,
        }

        let url = format!("{}/api/embeddings", self.endpoint);
        debug!("Calling Ollama embeddings API: {}", url);

        let request = OllamaRequest {
            model: &self.model,
            prompt: text,
        };

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| DrugRagError::HttpError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(DrugRagError::EmbeddingError(format!(
                "Ollama API error ({status}): {error_text}"
            )));
        }

        let result: OllamaResponse = response
            .json()
            .await
            .map_err(|e| DrugRagError::EmbeddingError(format!("Failed to parse response: {e}")))?;

        Ok(result.embedding)
    }
}

#[async_trait]
impl Embedder for EmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.generate(text).await
    }
}

/// Accepts `{"data":[{"embedding":[..]}]}`, `{"data":[{"vector":[..]}]}` or a bare `[[..]]`
pub fn parse_embedding_body(body: &Value) -> Result<Vec<f32>> {
    let vector = match body {
        Value::Object(map) => map
            .get("data")
            .and_then(Value::as_array)
            .and_then(|items| items.first())
            .and_then(|item| item.get("embedding").or_else(|| item.get("vector"))),
        Value::Array(items) => items.first(),
        _ => None,
    };

    let Some(Value::Array(values)) = vector else {
        return Err(DrugRagError::EmbeddingError(format!(
            "Unrecognized embedding response: {body}"
        )));
    };

    values
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| DrugRagError::EmbeddingError("Non-numeric embedding value".to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_parse_openai_shape() {
        let body = json!({"data": [{"embedding": [0.5, -1.0], "index": 0}], "model": "bge-m3"});
        assert_eq!(parse_embedding_body(&body).unwrap(), vec![0.5, -1.0]);
    }

    #[test]
    fn test_parse_vector_and_bare_shapes() {
        let body = json!({"data": [{"vector": [1.0]}]});
        assert_eq!(parse_embedding_body(&body).unwrap(), vec![1.0]);

        let body = json!([[0.25, 0.75]]);
        assert_eq!(parse_embedding_body(&body).unwrap(), vec![0.25, 0.75]);
    }

    #[test]
    fn test_parse_rejects_unknown_shape() {
        assert!(parse_embedding_body(&json!({"data": []})).is_err());
        assert!(parse_embedding_body(&json!({"data": [{"embedding": ["x"]}]})).is_err());
        assert!(parse_embedding_body(&json!("oops")).is_err());
    }

    #[test]
    fn test_provider_config_names() {
        let provider: EmbeddingProvider = serde_json::from_str(r#""openai_compatible""#).unwrap();
        assert_eq!(provider, EmbeddingProvider::OpenAI);
        let provider: EmbeddingProvider = serde_json::from_str(r#""ollama""#).unwrap();
        assert_eq!(provider, EmbeddingProvider::Ollama);
    }

    fn ollama_client() -> EmbeddingClient {
        EmbeddingClient::new(
            EmbeddingProvider::Ollama,
            "bge-m3".to_string(),
            "http://localhost:11434".to_string(),
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_dimension_check() {
        let client = ollama_client();
        assert_eq!(client.check_dimension(vec![0.1; 3]).unwrap().len(), 3);

        let client = client.with_dimension(4);
        assert_eq!(client.check_dimension(vec![0.1; 4]).unwrap().len(), 4);
        let err = client.check_dimension(vec![0.1; 3]).unwrap_err();
        assert!(err.to_string().contains("Expected 4-dimensional embedding"));
    }

    #[test]
    fn test_openai_request_carries_dimensions() {
        let request = OpenAIRequest {
            input: "冠心病",
            model: "text-embedding-v4",
            dimensions: Some(256),
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"input": "冠心病", "model": "text-embedding-v4", "dimensions": 256})
        );

        let request = OpenAIRequest {
            dimensions: None,
            ..request
        };
        assert!(serde_json::to_value(&request).unwrap().get("dimensions").is_none());
    }

    #[test]
    fn test_from_config_uses_dimension() {
        let config = EmbeddingsConfig {
            dimension: 2,
            ..EmbeddingsConfig::default()
        };
        let client = EmbeddingClient::from_config(&config).unwrap();
        assert!(client.check_dimension(vec![0.0; 3]).is_err());
    }

    #[tokio::test]
    #[ignore = "Requires a running Ollama with bge-m3"]
    async fn test_ollama_embedding() {
        let client = EmbeddingClient::new(
            EmbeddingProvider::Ollama,
            "bge-m3".to_string(),
            "http://localhost:11434".to_string(),
            None,
        )
        .unwrap();

        let embedding = client.generate("高血压").await.unwrap();
        assert_eq!(embedding.len(), 1024);
    }
}
