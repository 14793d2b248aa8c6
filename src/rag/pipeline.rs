//! Advice pipeline: Extract -> Retrieve -> Advise -> Format

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::candidates::parse_drug_list;
use crate::candidates::CandidateRegistry;
use crate::cli::output::truncate_str;
use crate::config::AdviceConfig;
use crate::llm::prompts::prompt_values;
use crate::llm::strip_reasoning;
use crate::llm::AdvicePrompts;
use crate::llm::ChatMessage;
use crate::llm::LanguageModel;
use crate::llm::PromptTemplate;
use crate::models::CaseRecord;
use crate::rag::QueryMode;
use crate::rag::RetrievalOutcome;
use crate::rag::Retriever;

const CANDIDATE_SEPARATOR: &str = "、";

/// What the pipeline is run on
#[derive(Debug, Clone)]
pub enum PipelineInput {
    /// Conversation; the most recent message holds the case text
    Messages(Vec<ChatMessage>),
    /// One structured case record
    Case(CaseRecord),
}

impl PipelineInput {
    /// Single user message
    pub fn text(text: impl Into<String>) -> Self {
        Self::Messages(vec![ChatMessage::user(text)])
    }
}

/// Knobs of the advice stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdviceOptions {
    pub query_mode: QueryMode,
    pub case_text_field: Option<String>,
    pub prime_rules: bool,
    pub include_full_candidate_list: bool,
    pub max_listed_candidates: usize,
}

impl Default for AdviceOptions {
    fn default() -> Self {
        Self::from_config(&AdviceConfig::default())
    }
}

impl AdviceOptions {
    #[must_use]
    pub fn from_config(config: &AdviceConfig) -> Self {
        Self {
            query_mode: config.query_mode,
            case_text_field: config.case_text_field.clone(),
            prime_rules: config.prime_rules,
            include_full_candidate_list: config.include_full_candidate_list,
            max_listed_candidates: config.max_listed_candidates,
        }
    }
}

/// Output of the extract stage
#[derive(Debug, Clone, PartialEq)]
pub struct Extracted {
    /// Text the advice is generated from
    pub medical_text: String,
    /// Text retrieval starts from, chosen by [`QueryMode`]
    pub query_base: String,
}

/// Output of the retrieve stage
#[derive(Debug, Clone, PartialEq)]
pub struct Retrieved {
    pub medical_text: String,
    pub query_text: String,
    pub retrieval: RetrievalOutcome,
}

impl Retrieved {
    #[must_use]
    pub fn retrieved_info(&self) -> String {
        self.retrieval.context_text()
    }
}

/// Result of asking the LLM for a recommendation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdviceOutcome {
    /// Filtered, deduplicated names (possibly empty)
    Recommended(Vec<String>),
    /// The LLM call failed
    GenerationFailed(String),
}

impl AdviceOutcome {
    /// JSON array text, or the failure message in its place
    #[must_use]
    pub fn medical_advice(&self) -> String {
        match self {
            Self::Recommended(names) => {
                serde_json::to_string(names).unwrap_or_else(|_| "[]".to_string())
            }
            Self::GenerationFailed(error) => format!("抱歉，查询过程中出现错误: {error}"),
        }
    }

    /// Names for the batch output; empty on failure
    #[must_use]
    pub fn prediction(&self) -> Vec<String> {
        match self {
            Self::Recommended(names) => names.clone(),
            Self::GenerationFailed(_) => Vec::new(),
        }
    }

    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::GenerationFailed(_))
    }
}

/// Output of the advise stage
#[derive(Debug, Clone, PartialEq)]
pub struct Advised {
    pub medical_text: String,
    pub query_text: String,
    pub retrieval: RetrievalOutcome,
    pub advice: AdviceOutcome,
}

impl Advised {
    #[must_use]
    pub fn retrieved_info(&self) -> String {
        self.retrieval.context_text()
    }

    #[must_use]
    pub fn medical_advice(&self) -> String {
        self.advice.medical_advice()
    }

    #[must_use]
    pub fn prediction(&self) -> Vec<String> {
        self.advice.prediction()
    }
}

/// Output of the format stage (interactive use)
#[derive(Debug, Clone, PartialEq)]
pub struct Formatted {
    pub advised: Advised,
    pub text: String,
}

/// Discharge-medication advice pipeline
pub struct AdvicePipeline {
    llm: Arc<dyn LanguageModel>,
    retriever: Retriever,
    candidates: Arc<CandidateRegistry>,
    options: AdviceOptions,
    recommendation: PromptTemplate,
    formulary_rules: PromptTemplate,
    case_summary: PromptTemplate,
    query_generation: PromptTemplate,
}

impl AdvicePipeline {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        retriever: Retriever,
        candidates: Arc<CandidateRegistry>,
        options: AdviceOptions,
    ) -> Self {
        Self {
            llm,
            retriever,
            candidates,
            options,
            recommendation: AdvicePrompts::recommendation(),
            formulary_rules: AdvicePrompts::formulary_rules(),
            case_summary: AdvicePrompts::case_summary(),
            query_generation: AdvicePrompts::query_generation(),
        }
    }

    #[must_use]
    pub const fn options(&self) -> &AdviceOptions {
        &self.options
    }

    #[must_use]
    pub fn candidates(&self) -> &CandidateRegistry {
        &self.candidates
    }

    /// Extract, retrieve and advise
    pub async fn run(&self, input: PipelineInput) -> Advised {
        let extracted = self.extract(input);
        let retrieved = self.retrieve(extracted).await;
        self.advise(retrieved).await
    }

    /// [`Self::run`] followed by the format stage
    pub async fn run_interactive(&self, input: PipelineInput) -> Formatted {
        let advised = self.run(input).await;
        self.format(advised)
    }

    /// Stage 1: case text and retrieval base
    #[must_use]
    pub fn extract(&self, input: PipelineInput) -> Extracted {
        let (medical_text, record) = match input {
            PipelineInput::Messages(messages) => (
                messages.last().map(|m| m.content.clone()).unwrap_or_default(),
                None,
            ),
            PipelineInput::Case(record) => {
                let text = self
                    .options
                    .case_text_field
                    .as_deref()
                    .and_then(|field| record.text_field(field))
                    .filter(|t| !t.trim().is_empty())
                    .unwrap_or_else(|| record.raw().to_string());
                (text, Some(record))
            }
        };

        let query_base = match self.options.query_mode {
            QueryMode::MedicalText => medical_text.clone(),
            QueryMode::CaseSummary | QueryMode::Generated => record
                .as_ref()
                .filter(|r| r.has_fields())
                .map_or_else(|| medical_text.clone(), |r| self.case_summary.render(r.fields())),
        };

        debug!(
            "Extracted case text ({} chars): {}",
            medical_text.chars().count(),
            truncate_str(&medical_text, 80)
        );

        Extracted {
            medical_text,
            query_base,
        }
    }

    /// Stage 2: best-effort retrieval
    pub async fn retrieve(&self, extracted: Extracted) -> Retrieved {
        let query_text = match self.options.query_mode {
            QueryMode::Generated => self.generate_query(&extracted.query_base).await,
            QueryMode::MedicalText | QueryMode::CaseSummary => extracted.query_base,
        };

        let retrieval = self.retriever.retrieve(&query_text).await;
        match &retrieval {
            RetrievalOutcome::Context(text) => {
                info!("Retrieved context ({} chars)", text.chars().count());
            }
            RetrievalOutcome::NotFound => info!("No related knowledge found"),
            RetrievalOutcome::Failed(_) => {}
        }

        Retrieved {
            medical_text: extracted.medical_text,
            query_text,
            retrieval,
        }
    }

    /// Stage 3: recommendation restricted to the candidate set
    pub async fn advise(&self, retrieved: Retrieved) -> Advised {
        let retrieved_info = retrieved.retrieved_info();
        let prompt = self.recommendation.render(&prompt_values([
            ("medical_text", Value::String(retrieved.medical_text.clone())),
            ("retrieved_info", Value::String(retrieved_info)),
        ]));

        let mut messages = Vec::with_capacity(2);
        if let Some(rules) = self.rules_message() {
            messages.push(rules);
        }
        messages.push(ChatMessage::user(prompt));

        let advice = match self.llm.chat(&messages).await {
            Ok(raw) => {
                let cleaned = strip_reasoning(&raw);
                debug!("Raw recommendation: {}", truncate_str(&cleaned, 200));
                let filtered = self.candidates.filter(&cleaned);
                let names = parse_drug_list(&filtered);
                info!("Recommended {} drugs", names.len());
                AdviceOutcome::Recommended(names)
            }
            Err(e) => {
                error!("Advice generation failed: {}", e);
                AdviceOutcome::GenerationFailed(e.to_string())
            }
        };

        Advised {
            medical_text: retrieved.medical_text,
            query_text: retrieved.query_text,
            retrieval: retrieved.retrieval,
            advice,
        }
    }

    /// Stage 4: human-readable summary
    #[must_use]
    pub fn format(&self, advised: Advised) -> Formatted {
        let text = format!(
            "检索到的医疗信息:\n{}\n\n医疗建议:\n{}",
            advised.retrieved_info(),
            advised.medical_advice()
        );
        Formatted { advised, text }
    }

    /// Formulary rules system message, when priming is on and a formulary exists
    fn rules_message(&self) -> Option<ChatMessage> {
        if !self.options.prime_rules {
            return None;
        }
        let names = self.candidates.sorted_names();
        if names.is_empty() {
            return None;
        }

        let count = names.len();
        let limit = if self.options.include_full_candidate_list {
            usize::MAX
        } else {
            self.options.max_listed_candidates
        };
        let listed = names
            .into_iter()
            .take(limit)
            .collect::<Vec<_>>()
            .join(CANDIDATE_SEPARATOR);

        let rendered = self.formulary_rules.render(&prompt_values([
            ("candidate_count", Value::from(count)),
            ("candidates", Value::from(listed)),
        ]));
        Some(ChatMessage::system(rendered))
    }

    /// LLM-written retrieval query; falls back to `summary`
    async fn generate_query(&self, summary: &str) -> String {
        let prompt = self
            .query_generation
            .render(&prompt_values([("case_summary", Value::from(summary))]));

        match self.llm.complete(&prompt).await {
            Ok(reply) => {
                let query = strip_reasoning(&reply);
                if query.is_empty() {
                    warn!("Query generation returned nothing, using case summary");
                    summary.to_string()
                } else {
                    debug!("Generated retrieval query: {}", truncate_str(&query, 80));
                    query
                }
            }
            Err(e) => {
                warn!("Query generation failed, using case summary: {}", e);
                summary.to_string()
            }
        }
    }
}
