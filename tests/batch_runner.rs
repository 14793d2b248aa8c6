use std::sync::Arc;

use async_trait::async_trait;
use drugrag::batch::BatchRunner;
use drugrag::candidates::CandidateRegistry;
use drugrag::llm::ChatMessage;
use drugrag::llm::LanguageModel;
use drugrag::models::PredictionEntry;
use drugrag::rag::AdviceOptions;
use drugrag::rag::AdvicePipeline;
use drugrag::rag::MatchType;
use drugrag::rag::Retriever;
use drugrag::rag::SearchBackend;
use drugrag::rag::Snippet;
use drugrag::DrugRagError;
use drugrag::Result;

struct FixedLlm(&'static str);

#[async_trait]
impl LanguageModel for FixedLlm {
    async fn chat(&self, _messages: &[ChatMessage]) -> Result<String> {
        Ok(self.0.to_string())
    }

    fn model_name(&self) -> &str {
        "fixed"
    }
}

struct DownLlm;

#[async_trait]
impl LanguageModel for DownLlm {
    async fn chat(&self, _messages: &[ChatMessage]) -> Result<String> {
        Err(DrugRagError::LlmError("connection refused".to_string()))
    }

    fn model_name(&self) -> &str {
        "down"
    }
}

struct KnowledgeBackend;

#[async_trait]
impl SearchBackend for KnowledgeBackend {
    async fn search(&self, _query: &str, _top_k: usize) -> Result<Vec<Snippet>> {
        Ok(vec![Snippet::new("冠心病", 0.9, MatchType::Semantic)])
    }

    fn name(&self) -> &str {
        "knowledge"
    }
}

struct DownBackend;

#[async_trait]
impl SearchBackend for DownBackend {
    async fn search(&self, _query: &str, _top_k: usize) -> Result<Vec<Snippet>> {
        Err(DrugRagError::GraphError("HTTP 401 Unauthorized".to_string()))
    }

    fn name(&self) -> &str {
        "down"
    }
}

fn pipeline(llm: Arc<dyn LanguageModel>, backend: Arc<dyn SearchBackend>) -> AdvicePipeline {
    AdvicePipeline::new(
        llm,
        Retriever::new(backend, 10),
        Arc::new(CandidateRegistry::from_names(["阿司匹林", "二甲双胍"])),
        AdviceOptions::default(),
    )
}

fn read_entries(path: &std::path::Path) -> Vec<PredictionEntry> {
    let text = std::fs::read_to_string(path).unwrap();
    serde_json::from_str(&text).unwrap()
}

#[tokio::test]
async fn test_blank_line_and_valid_line_give_one_entry() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let input = dir.path().join("cases.jsonl");
    let output = dir.path().join("out").join("results.json");
    std::fs::write(&input, "\n{\"就诊标识\":\"V001\",\"主诉\":\"胸痛\"}\n")?;

    let pipeline = pipeline(
        Arc::new(FixedLlm(r#"["阿司匹林","布洛芬"]"#)),
        Arc::new(KnowledgeBackend),
    );
    let report = BatchRunner::new(&pipeline, "就诊标识")
        .run_file(&input, &output)
        .await?;

    assert_eq!(report.processed, 1);
    assert_eq!(report.skipped_blank, 1);
    assert_eq!(report.recommended, 1);
    assert!(report.finished_at.is_some());
    assert!(report.elapsed().is_some_and(|d| d >= chrono::Duration::zero()));

    let entries = read_entries(&output);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].id, "V001");
    assert_eq!(entries[0].prediction, vec!["阿司匹林"]);
    Ok(())
}

#[tokio::test]
async fn test_missing_input_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("results.json");
    let pipeline = pipeline(Arc::new(FixedLlm("[]")), Arc::new(KnowledgeBackend));

    let result = BatchRunner::new(&pipeline, "就诊标识")
        .run_file(&dir.path().join("missing.jsonl"), &output)
        .await;

    assert!(matches!(result, Err(DrugRagError::InputNotFound(_))));
    assert!(!output.exists());
}

#[tokio::test]
async fn test_failures_still_emit_empty_predictions() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let input = dir.path().join("cases.jsonl");
    let output = dir.path().join("results.json");
    std::fs::write(
        &input,
        "{\"就诊标识\":\"V001\",\"主诉\":\"胸痛\"}\n{\"就诊标识\":\"V002\",\"主诉\":\"口渴\"}\n",
    )?;

    let pipeline = pipeline(Arc::new(DownLlm), Arc::new(DownBackend));
    let report = BatchRunner::new(&pipeline, "就诊标识")
        .run_file(&input, &output)
        .await?;

    assert_eq!(report.processed, 2);
    assert_eq!(report.retrieval_failures, 2);
    assert_eq!(report.generation_failures, 2);

    let entries = read_entries(&output);
    let ids: Vec<&str> = entries.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["V001", "V002"]);
    assert!(entries.iter().all(|e| e.prediction.is_empty()));
    Ok(())
}

#[tokio::test]
async fn test_missing_id_uses_line_number() -> Result<()> {
    let pipeline = pipeline(Arc::new(FixedLlm("不是JSON")), Arc::new(KnowledgeBackend));
    let (entries, report) = BatchRunner::new(&pipeline, "就诊标识")
        .run_content("{\"主诉\":\"胸痛\"}\n\n   \nnot json at all\n")
        .await;

    let ids: Vec<&str> = entries.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["line-1", "line-4"]);
    assert_eq!(report.skipped_blank, 2);
    assert_eq!(report.empty_recommendations, 2);
    Ok(())
}

#[tokio::test]
async fn test_output_document_format() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let input = dir.path().join("cases.jsonl");
    let output = dir.path().join("results.json");
    std::fs::write(&input, "{\"就诊标识\":\"V001\"}\n")?;

    let pipeline = pipeline(Arc::new(FixedLlm(r#"["二甲双胍"]"#)), Arc::new(KnowledgeBackend));
    BatchRunner::new(&pipeline, "就诊标识")
        .run_file(&input, &output)
        .await?;

    let text = std::fs::read_to_string(&output)?;
    assert_eq!(
        text,
        "[\n  {\n    \"ID\": \"V001\",\n    \"prediction\": [\n      \"二甲双胍\"\n    ]\n  }\n]"
    );
    Ok(())
}
