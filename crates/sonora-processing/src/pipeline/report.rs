use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

use sonora_core::{AppError, AudioInfo, ErrorMetadata};

use super::outcome::{FailureKind, FormatWarning, PipelineOutcome, SourceProperties, Stage};

pub const REPORT_FILE_NAME: &str = "info.json";

#[derive(Debug, Clone, Serialize)]
pub struct ReportError {
    pub kind: FailureKind,
    pub stage: Stage,
    pub code: &'static str,
    pub message: String,
    pub client_message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<String>,
}

/// Serializable summary of a finished run, written as `info.json`
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub run_id: String,
    pub status: Stage,
    pub generated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<AudioInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<FormatWarning>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceProperties>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canonical_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distribution_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ReportError>,
    pub log: Vec<String>,
}

impl PipelineReport {
    pub fn from_outcome(outcome: &PipelineOutcome) -> Self {
        let mut report = Self {
            run_id: outcome.run_id().to_string(),
            status: outcome.stage(),
            generated_at: Utc::now(),
            info: None,
            warning: None,
            source: None,
            canonical_path: None,
            distribution_path: None,
            error: None,
            log: outcome.log().lines().to_vec(),
        };

        match outcome {
            PipelineOutcome::Validated(v) => {
                report.info = Some(v.info);
                report.warning = v.warning.clone();
                report.source = Some(v.source.clone());
                report.canonical_path = Some(v.canonical.output_path.clone());
                report.distribution_path = v.distribution.as_ref().map(|d| d.output_path.clone());
            }
            PipelineOutcome::Failed(f) => {
                report.error = Some(ReportError {
                    kind: f.kind,
                    stage: f.stage,
                    code: f.error.error_code(),
                    message: f.message(),
                    client_message: f.user_message(),
                    diagnostics: f.diagnostics().map(str::to_string),
                });
            }
        }

        report
    }

    pub fn to_json(&self) -> Result<String, AppError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the report to `<dir>/info.json` and return its path.
    pub async fn write_json(&self, dir: &Path) -> Result<PathBuf, AppError> {
        let path = dir.join(REPORT_FILE_NAME);
        tokio::fs::write(&path, self.to_json()?).await?;
        tracing::debug!(run_id = %self.run_id, path = %path.display(), "Pipeline report written");
        Ok(path)
    }
}
