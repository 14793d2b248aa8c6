//! Batch runs against services that cannot be set up or reached.
//!
//! Every endpoint points at a closed local port, so nothing leaves the machine.

use std::path::Path;

use drugrag::cli::handle_batch_command;
use drugrag::config::RetrievalBackend;
use drugrag::models::PredictionEntry;
use drugrag::AppConfig;
use drugrag::DrugRagError;
use drugrag::Result;

const CLOSED_PORT: &str = "http://127.0.0.1:9";

fn offline_config(dir: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.llm.endpoint = CLOSED_PORT.to_string();
    config.llm.timeout_secs = 5;
    config.embeddings.endpoint = CLOSED_PORT.to_string();
    config.graph.url = CLOSED_PORT.to_string();
    config.candidates.path = dir.join("候选药物列表.json");
    config
}

fn write_cases(dir: &Path) -> std::io::Result<std::path::PathBuf> {
    let input = dir.join("cases.jsonl");
    std::fs::write(
        &input,
        "{\"就诊标识\":\"V001\",\"主诉\":\"胸痛\"}\n{\"就诊标识\":\"V002\",\"主诉\":\"口渴\"}\n",
    )?;
    Ok(input)
}

fn assert_empty_predictions(output: &Path) {
    let text = std::fs::read_to_string(output).unwrap();
    let entries: Vec<PredictionEntry> = serde_json::from_str(&text).unwrap();
    let ids: Vec<&str> = entries.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["V001", "V002"]);
    assert!(entries.iter().all(|e| e.prediction.is_empty()));
}

#[tokio::test]
async fn test_bolt_graph_url_still_writes_results() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let input = write_cases(dir.path())?;
    let output = dir.path().join("results.json");

    let mut config = offline_config(dir.path());
    config.graph.url = "bolt://localhost:7687".to_string();

    handle_batch_command(&config, Some(input), Some(output.clone())).await?;
    assert_empty_predictions(&output);
    Ok(())
}

#[tokio::test]
async fn test_unreachable_graph_with_memory_backend_still_writes_results() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let input = write_cases(dir.path())?;
    let output = dir.path().join("results.json");

    let mut config = offline_config(dir.path());
    config.retrieval.backend = RetrievalBackend::Memory;

    handle_batch_command(&config, Some(input), Some(output.clone())).await?;
    assert_empty_predictions(&output);
    Ok(())
}

#[tokio::test]
async fn test_missing_input_fails_before_backend_setup() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("results.json");

    let mut config = offline_config(dir.path());
    config.retrieval.backend = RetrievalBackend::Memory;

    let result = handle_batch_command(
        &config,
        Some(dir.path().join("missing.jsonl")),
        Some(output.clone()),
    )
    .await;

    assert!(matches!(result, Err(DrugRagError::InputNotFound(_))));
    assert!(!output.exists());
}
