//! Batch runner: JSONL cases in, one JSON prediction document out

use std::path::Path;

use chrono::DateTime;
use chrono::Utc;
use serde::Serialize;
use tracing::info;
use tracing::info_span;
use tracing::Instrument;
use uuid::Uuid;

use crate::errors::DrugRagError;
use crate::errors::Result;
use crate::models::CaseRecord;
use crate::models::PredictionEntry;
use crate::rag::AdviceOutcome;
use crate::rag::AdvicePipeline;
use crate::rag::PipelineInput;

/// Counters of one batch run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub processed: usize,
    pub skipped_blank: usize,
    pub recommended: usize,
    pub empty_recommendations: usize,
    pub retrieval_failures: usize,
    pub generation_failures: usize,
}

impl BatchReport {
    fn start() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            processed: 0,
            skipped_blank: 0,
            recommended: 0,
            empty_recommendations: 0,
            retrieval_failures: 0,
            generation_failures: 0,
        }
    }

    /// Wall-clock duration once finished
    #[must_use]
    pub fn elapsed(&self) -> Option<chrono::Duration> {
        self.finished_at.map(|end| end - self.started_at)
    }

    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "processed {} cases ({} with recommendations, {} empty), {} retrieval failures, {} generation failures, {} blank lines skipped",
            self.processed,
            self.recommended,
            self.empty_recommendations,
            self.retrieval_failures,
            self.generation_failures,
            self.skipped_blank
        )
    }
}

/// Runs the advice pipeline over every case of a JSONL file
pub struct BatchRunner<'a> {
    pipeline: &'a AdvicePipeline,
    id_field: String,
}

impl<'a> BatchRunner<'a> {
    pub fn new(pipeline: &'a AdvicePipeline, id_field: impl Into<String>) -> Self {
        Self {
            pipeline,
            id_field: id_field.into(),
        }
    }

    /// Process `input` and write all predictions to `output` once
    ///
    /// # Errors
    /// - `InputNotFound` when `input` does not exist (nothing is processed)
    /// - I/O or serialization errors reading the input or writing the output
    pub async fn run_file(&self, input: &Path, output: &Path) -> Result<BatchReport> {
        if !input.is_file() {
            return Err(DrugRagError::InputNotFound(input.to_path_buf()));
        }
        let content = tokio::fs::read_to_string(input).await?;

        let (entries, report) = self.run_content(&content).await;
        write_output(output, &entries).await?;

        info!("Wrote {} predictions to {}", entries.len(), output.display());
        Ok(report)
    }

    /// Process JSONL text; blank lines are skipped, line numbers are 1-based
    pub async fn run_content(&self, content: &str) -> (Vec<PredictionEntry>, BatchReport) {
        let mut report = BatchReport::start();
        let span = info_span!("batch", run_id = %report.run_id);

        let entries = async {
            let mut entries = Vec::new();
            for (idx, line) in content.lines().enumerate() {
                if line.trim().is_empty() {
                    report.skipped_blank += 1;
                    continue;
                }
                let line_no = idx + 1;
                let record = CaseRecord::parse(line);
                let id = record.case_id(&self.id_field, line_no);
                info!("Processing case {} (line {})", id, line_no);

                let advised = self.pipeline.run(PipelineInput::Case(record)).await;

                report.processed += 1;
                if advised.retrieval.is_failed() {
                    report.retrieval_failures += 1;
                }
                match &advised.advice {
                    AdviceOutcome::GenerationFailed(_) => report.generation_failures += 1,
                    AdviceOutcome::Recommended(names) if names.is_empty() => {
                        report.empty_recommendations += 1;
                    }
                    AdviceOutcome::Recommended(_) => report.recommended += 1,
                }

                entries.push(PredictionEntry {
                    id,
                    prediction: advised.prediction(),
                });
            }
            entries
        }
        .instrument(span)
        .await;

        report.finished_at = Some(Utc::now());
        info!("Batch {} finished: {}", report.run_id, report.summary());
        (entries, report)
    }
}

/// Serialize all entries as one pretty JSON array, creating parent directories
pub async fn write_output(path: &Path, entries: &[PredictionEntry]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_string_pretty(entries)?;
    tokio::fs::write(path, json).await?;
    Ok(())
}
