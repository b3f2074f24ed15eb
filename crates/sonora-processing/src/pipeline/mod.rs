//! Pipeline orchestrator
//!
//! Drives one finished upload through conversion, extraction and optional
//! distribution encoding:
//!
//! `Received -> Converting -> Extracting -> [Encoding ->] Validated | Failed`
//!
//! Canonical-format mismatches are reported as a [`FormatWarning`] on the
//! validated result; they never fail the run. Nothing is retried. Each run
//! works inside its own directory `<work_root>/run_<run_id>/`, which is
//! removed when the run fails and handed to the caller when it succeeds.

mod outcome;
mod report;

pub use outcome::{
    FailureKind, FormatMismatch, FormatWarning, PipelineFailure, PipelineOutcome,
    SourceProperties, Stage, ValidatedAudio, WorkLog,
};
pub use report::{PipelineReport, ReportError, REPORT_FILE_NAME};

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use sonora_core::{
    AppError, CanonicalSpec, CapacityGate, DistributionFormat, ProcessingConfig, SoundType,
};

use crate::audio::{
    estimate_bitrate_kbps, FfmpegConverter, FormatConverter, InfoExtractor, StereofyExtractor,
};

const SCRATCH_DIR_NAME: &str = "scratch";
const SCRATCH_FILE_NAME: &str = "analysis_scratch.wav";

/// Per-run options
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    /// Also encode a distribution file from the canonical output
    pub distribution: Option<DistributionFormat>,
}

pub struct Pipeline {
    converter: Arc<dyn FormatConverter>,
    extractor: Arc<dyn InfoExtractor>,
    capacity_gate: Option<Arc<dyn CapacityGate>>,
    work_root: PathBuf,
    expected: CanonicalSpec,
}

/// Run ids become directory names.
fn is_valid_run_id(run_id: &str) -> bool {
    !run_id.is_empty()
        && run_id.len() <= 128
        && run_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

impl Pipeline {
    pub fn new(
        converter: Arc<dyn FormatConverter>,
        extractor: Arc<dyn InfoExtractor>,
        work_root: PathBuf,
    ) -> Self {
        Self {
            converter,
            extractor,
            capacity_gate: None,
            work_root,
            expected: CanonicalSpec::default(),
        }
    }

    /// Build a pipeline over ffmpeg and the analysis tool as configured.
    pub fn from_config(config: &ProcessingConfig) -> Self {
        Self::new(
            Arc::new(FfmpegConverter::from_config(config)),
            Arc::new(StereofyExtractor::from_config(config)),
            config.temp_dir.clone(),
        )
        .with_expected(config.expected_canonical())
    }

    pub fn with_expected(mut self, expected: CanonicalSpec) -> Self {
        self.expected = expected;
        self
    }

    pub fn with_capacity_gate(mut self, gate: Arc<dyn CapacityGate>) -> Self {
        self.capacity_gate = Some(gate);
        self
    }

    pub fn new_run_id() -> String {
        uuid::Uuid::new_v4().simple().to_string()
    }

    pub fn run_dir(&self, run_id: &str) -> PathBuf {
        self.work_root.join(format!("run_{}", run_id))
    }

    /// Delete the workspace of a validated run once the caller is done with it.
    pub async fn discard_run(&self, run_id: &str) -> Result<(), AppError> {
        if !is_valid_run_id(run_id) {
            return Err(AppError::InvalidInput(format!("Invalid run id: {:?}", run_id)));
        }
        let run_dir = self.run_dir(run_id);
        match tokio::fs::remove_dir_all(&run_dir).await {
            Ok(()) => {
                tracing::debug!(
                    run_id = %run_id,
                    path = %run_dir.display(),
                    "Run workspace discarded"
                );
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(AppError::NotFound(format!("Run workspace {} not found", run_id)))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Process one fully received file.
    #[tracing::instrument(
        skip(self, run_id, options, cancel),
        fields(run_id = %run_id, service = "audio")
    )]
    pub async fn run(
        &self,
        input: &Path,
        run_id: &str,
        options: &PipelineOptions,
        cancel: &CancellationToken,
    ) -> PipelineOutcome {
        let mut log = WorkLog::default();
        enter(&mut log, Stage::Received);
        log.push(format!("input {}", input.display()));

        if !is_valid_run_id(run_id) {
            let error = AppError::InvalidInput(format!("Invalid run id: {:?}", run_id));
            return self
                .fail(run_id, FailureKind::Workspace, Stage::Received, error, log, None)
                .await;
        }

        if let Err(e) = tokio::fs::create_dir_all(&self.work_root).await {
            let error = AppError::Internal(format!(
                "Cannot create work directory {}: {}",
                self.work_root.display(),
                e
            ));
            return self
                .fail(run_id, FailureKind::Workspace, Stage::Received, error, log, None)
                .await;
        }

        if let Some(gate) = &self.capacity_gate {
            if let Err(error) = gate.ensure_capacity(&self.work_root).await {
                return self
                    .fail(run_id, FailureKind::Capacity, Stage::Received, error, log, None)
                    .await;
            }
        }

        // The directory of an earlier run with the same id belongs to its caller.
        let run_dir = self.run_dir(run_id);
        if let Err(e) = tokio::fs::create_dir(&run_dir).await {
            let error = if e.kind() == std::io::ErrorKind::AlreadyExists {
                AppError::InvalidInput(format!("Run id {:?} is already in use", run_id))
            } else {
                AppError::Internal(format!(
                    "Cannot create run directory {}: {}",
                    run_dir.display(),
                    e
                ))
            };
            return self
                .fail(run_id, FailureKind::Workspace, Stage::Received, error, log, None)
                .await;
        }

        enter(&mut log, Stage::Converting);
        let canonical = match self.converter.to_canonical(input, &run_dir, cancel).await {
            Ok(result) => result,
            Err(e) => {
                return self
                    .fail(
                        run_id,
                        FailureKind::Conversion,
                        Stage::Converting,
                        e.into(),
                        log,
                        Some(&run_dir),
                    )
                    .await;
            }
        };
        log.push(format!("canonical {}", canonical.output_path.display()));

        enter(&mut log, Stage::Extracting);
        let scratch_dir = run_dir.join(SCRATCH_DIR_NAME);
        if let Err(e) = tokio::fs::create_dir(&scratch_dir).await {
            let error = AppError::Internal(format!(
                "Cannot create scratch directory {}: {}",
                scratch_dir.display(),
                e
            ));
            return self
                .fail(run_id, FailureKind::Workspace, Stage::Extracting, error, log, Some(&run_dir))
                .await;
        }
        let extracted = self
            .extractor
            .extract(
                &canonical.output_path,
                &scratch_dir.join(SCRATCH_FILE_NAME),
                cancel,
            )
            .await;
        if let Err(e) = tokio::fs::remove_dir_all(&scratch_dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(
                    run_id = %run_id,
                    path = %scratch_dir.display(),
                    error = %e,
                    "Failed to remove analysis scratch"
                );
            }
        }
        let info = match extracted {
            Ok(info) => info,
            Err(e) => {
                return self
                    .fail(
                        run_id,
                        FailureKind::Extraction,
                        Stage::Extracting,
                        e.into(),
                        log,
                        Some(&run_dir),
                    )
                    .await;
            }
        };
        log.push(format!(
            "info duration={} samplerate={} bits={} channels={}",
            info.duration, info.samplerate, info.bits, info.channels
        ));

        let warning = FormatWarning::check(&info, &self.expected);
        if let Some(warning) = &warning {
            tracing::warn!(
                run_id = %run_id,
                warning = %warning,
                "Canonical file does not match expected format"
            );
            log.push(format!("warning {}", warning));
        }

        let mut distribution = None;
        if let Some(format) = options.distribution {
            enter(&mut log, Stage::Encoding);
            let stem = canonical
                .output_path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| "audio".to_string());
            let output = run_dir.join(format!("{}.{}", stem, format.extension()));
            match self
                .converter
                .to_distribution_format(&canonical.output_path, &output, format, cancel)
                .await
            {
                Ok(result) => {
                    log.push(format!("distribution {} {}", format, result.output_path.display()));
                    distribution = Some(result);
                }
                Err(e) => {
                    return self
                        .fail(
                            run_id,
                            FailureKind::Conversion,
                            Stage::Encoding,
                            e.into(),
                            log,
                            Some(&run_dir),
                        )
                        .await;
                }
            }
        }

        let source = source_properties(input, info.duration).await;
        enter(&mut log, Stage::Validated);

        tracing::info!(
            run_id = %run_id,
            duration = info.duration,
            samplerate = info.samplerate,
            channels = info.channels,
            has_warning = warning.is_some(),
            "Pipeline run validated"
        );

        PipelineOutcome::Validated(ValidatedAudio {
            run_id: run_id.to_string(),
            info,
            warning,
            canonical,
            distribution,
            source,
            run_dir,
            log,
        })
    }

    async fn fail(
        &self,
        run_id: &str,
        kind: FailureKind,
        stage: Stage,
        error: AppError,
        mut log: WorkLog,
        run_dir: Option<&Path>,
    ) -> PipelineOutcome {
        log.push(format!("error during {}: {}", stage, error));
        enter(&mut log, Stage::Failed);

        tracing::error!(
            run_id = %run_id,
            kind = ?kind,
            stage = %stage,
            error = %error,
            "Pipeline run failed"
        );

        if let Some(run_dir) = run_dir {
            if let Err(e) = tokio::fs::remove_dir_all(run_dir).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(
                        run_id = %run_id,
                        path = %run_dir.display(),
                        error = %e,
                        "Failed to remove run workspace"
                    );
                }
            }
        }

        PipelineOutcome::Failed(PipelineFailure {
            run_id: run_id.to_string(),
            kind,
            stage,
            error,
            log,
        })
    }
}

fn enter(log: &mut WorkLog, stage: Stage) {
    tracing::debug!(stage = %stage, "Pipeline stage");
    log.push(format!("stage={}", stage));
}

async fn source_properties(input: &Path, duration: f64) -> SourceProperties {
    let sound_type = SoundType::from_path(input);
    let filesize = tokio::fs::metadata(input)
        .await
        .map(|m| m.len())
        .unwrap_or(0);
    let bitrate_kbps = if sound_type.is_lossy() {
        estimate_bitrate_kbps(filesize, duration)
    } else {
        0
    };
    SourceProperties {
        sound_type,
        filesize,
        bitrate_kbps,
    }
}
