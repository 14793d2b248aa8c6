use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use url::Url;

use crate::embeddings::EmbeddingProvider;
use crate::llm::LlmProvider;
use crate::rag::QueryMode;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: LlmProvider,
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_llm_endpoint() -> String {
    "https://dashscope.aliyuncs.com/compatible-mode/v1".to_string()
}

fn default_llm_model() -> String {
    "qwen-turbo".to_string()
}

pub(crate) const fn default_max_tokens() -> u32 {
    1024
}

pub(crate) const fn default_timeout_secs() -> u64 {
    120
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            endpoint: default_llm_endpoint(),
            api_key: String::new(),
            model: default_llm_model(),
            temperature: 0.0,
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingsConfig {
    #[serde(default)]
    pub provider: EmbeddingProvider,
    #[serde(default = "default_embedding_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,
}

fn default_embedding_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_embedding_model() -> String {
    "bge-m3".to_string()
}

pub(crate) const fn default_embedding_dimension() -> usize {
    1024
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::default(),
            endpoint: default_embedding_endpoint(),
            api_key: String::new(),
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Neo4j HTTP endpoint (the transactional Cypher API, not bolt)
    #[serde(default = "default_graph_url")]
    pub url: String,
    #[serde(default = "default_graph_database")]
    pub database: String,
    #[serde(default = "default_graph_username")]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_vector_index")]
    pub vector_index: String,
    #[serde(default = "default_fulltext_index")]
    pub fulltext_index: String,
    /// Node property returned as snippet text
    #[serde(default = "default_text_property")]
    pub text_property: String,
    #[serde(default = "default_embedding_property")]
    pub embedding_property: String,
}

fn default_graph_url() -> String {
    "http://localhost:7474".to_string()
}

fn default_graph_database() -> String {
    "neo4j".to_string()
}

fn default_graph_username() -> String {
    "neo4j".to_string()
}

fn default_vector_index() -> String {
    "vector".to_string()
}

fn default_fulltext_index() -> String {
    "fulltext".to_string()
}

fn default_text_property() -> String {
    "name".to_string()
}

fn default_embedding_property() -> String {
    "embedding".to_string()
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            url: default_graph_url(),
            database: default_graph_database(),
            username: default_graph_username(),
            password: String::new(),
            vector_index: default_vector_index(),
            fulltext_index: default_fulltext_index(),
            text_property: default_text_property(),
            embedding_property: default_embedding_property(),
        }
    }
}

/// Which search capability backs the retriever
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalBackend {
    /// Vector index lookup only
    Vector,
    /// Vector and full-text hits fused by reciprocal rank
    #[default]
    Hybrid,
    /// In-process cosine index built from graph nodes at startup
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default)]
    pub backend: RetrievalBackend,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

pub(crate) const fn default_top_k() -> usize {
    10
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            backend: RetrievalBackend::default(),
            top_k: default_top_k(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidatesConfig {
    #[serde(default = "default_candidates_path")]
    pub path: PathBuf,
}

fn default_candidates_path() -> PathBuf {
    PathBuf::from("data").join("候选药物列表.json")
}

impl Default for CandidatesConfig {
    fn default() -> Self {
        Self {
            path: default_candidates_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdviceConfig {
    #[serde(default)]
    pub query_mode: QueryMode,
    /// Record field holding the case text; the whole JSON line is used when unset
    #[serde(default)]
    pub case_text_field: Option<String>,
    #[serde(default = "default_prime_rules")]
    pub prime_rules: bool,
    #[serde(default)]
    pub include_full_candidate_list: bool,
    #[serde(default = "default_max_listed_candidates")]
    pub max_listed_candidates: usize,
}

const fn default_prime_rules() -> bool {
    true
}

pub(crate) const fn default_max_listed_candidates() -> usize {
    200
}

impl Default for AdviceConfig {
    fn default() -> Self {
        Self {
            query_mode: QueryMode::default(),
            case_text_field: None,
            prime_rules: default_prime_rules(),
            include_full_candidate_list: false,
            max_listed_candidates: default_max_listed_candidates(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    #[serde(default = "default_batch_input")]
    pub input: PathBuf,
    #[serde(default = "default_batch_output")]
    pub output: PathBuf,
    #[serde(default = "default_id_field")]
    pub id_field: String,
}

fn default_batch_input() -> PathBuf {
    PathBuf::from("data").join("CDrugRed_test-A.jsonl")
}

fn default_batch_output() -> PathBuf {
    PathBuf::from("outputs").join("results.json")
}

pub(crate) fn default_id_field() -> String {
    "就诊标识".to_string()
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            input: default_batch_input(),
            output: default_batch_output(),
            id_field: default_id_field(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embeddings: EmbeddingsConfig,
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub candidates: CandidatesConfig,
    #[serde(default)]
    pub advice: AdviceConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> crate::Result<Self> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    /// Load configuration from the default locations, then apply environment overrides
    ///
    /// Missing files are not fatal: defaults are used and the caller is expected
    /// to surface [`AppConfig::credential_warnings`].
    pub fn load() -> crate::Result<Self> {
        let mut config = if Path::new("config.toml").exists() {
            Self::from_file("config.toml")?
        } else if Path::new("config.example.toml").exists() {
            tracing::warn!(
                "Using config.example.toml. Please create config.toml for production use."
            );
            Self::from_file("config.example.toml")?
        } else {
            tracing::warn!("No config file found, using built-in defaults");
            Self::default()
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load from an explicit path, then apply environment overrides
    pub fn load_from<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Overlay environment-supplied settings
    ///
    /// `lookup` abstracts the environment so the mapping can be exercised
    /// without touching process state.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty("DASHSCOPE_API_KEY") {
            if self.llm.api_key.is_empty() {
                self.llm.api_key = key.clone();
            }
            if self.embeddings.api_key.is_empty() {
                self.embeddings.api_key = key;
            }
        }
        if let Some(endpoint) = non_empty("LLM_ENDPOINT") {
            self.llm.endpoint = endpoint;
        }
        if let Some(model) = non_empty("LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(url) = non_empty("NEO4J_URL") {
            self.graph.url = url;
        }
        if let Some(username) = non_empty("NEO4J_USERNAME") {
            self.graph.username = username;
        }
        if let Some(password) = non_empty("NEO4J_PASSWORD") {
            self.graph.password = password;
        }
        if let Some(path) = non_empty("CANDIDATE_DRUGS_JSON") {
            self.candidates.path = PathBuf::from(path);
        }
    }

    /// Problems that will not stop the run but will make remote calls fail
    pub fn credential_warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.llm.api_key.is_empty() {
            warnings.push(
                "No LLM API key configured (set DASHSCOPE_API_KEY); LLM requests will fail"
                    .to_string(),
            );
        }
        if self.embeddings.provider == EmbeddingProvider::OpenAI
            && self.embeddings.api_key.is_empty()
        {
            warnings.push("No embedding API key configured; embedding requests may fail".to_string());
        }
        if self.graph.password.is_empty() {
            warnings.push(
                "No graph password configured (set NEO4J_PASSWORD); graph queries will fail"
                    .to_string(),
            );
        }
        match Url::parse(&self.graph.url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => warnings.push(format!(
                "Graph URL scheme '{}' is not supported, use the HTTP endpoint (e.g. http://localhost:7474)",
                url.scheme()
            )),
            Err(e) => warnings.push(format!("Invalid graph URL '{}': {e}", self.graph.url)),
        }

        warnings
    }

    /// Get LLM endpoint
    pub fn llm_endpoint(&self) -> &str {
        &self.llm.endpoint
    }

    /// Get LLM model
    pub fn llm_model(&self) -> &str {
        &self.llm.model
    }

    /// Get graph URL
    pub fn graph_url(&self) -> &str {
        &self.graph.url
    }

    /// Get candidate list path
    pub fn candidates_path(&self) -> &Path {
        &self.candidates.path
    }
}
