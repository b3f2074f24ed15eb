use chrono::Utc;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

use sonora_core::{
    AppError, AudioInfo, CanonicalSpec, ConversionError, ConversionResult, ErrorMetadata,
    ExtractionError, SoundType,
};

/// States of one pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Received,
    Converting,
    Extracting,
    Encoding,
    Validated,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Received => "received",
            Stage::Converting => "converting",
            Stage::Extracting => "extracting",
            Stage::Encoding => "encoding",
            Stage::Validated => "validated",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Human-readable, timestamped record of what a run did
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct WorkLog {
    lines: Vec<String>,
}

impl WorkLog {
    pub fn push(&mut self, line: impl Into<String>) {
        self.lines.push(format!(
            "{} {}",
            Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ"),
            line.into()
        ));
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines.iter().any(|line| line.contains(needle))
    }
}

/// One canonical property that differs from what was expected
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "property", rename_all = "snake_case")]
pub enum FormatMismatch {
    Bits { expected: u32, actual: u32 },
    Samplerate { expected: u32, actual: u32 },
    Channels { expected: u32, actual: u32 },
    Duration { actual: f64 },
}

impl FormatMismatch {
    pub fn property(&self) -> &'static str {
        match self {
            FormatMismatch::Bits { .. } => "bits",
            FormatMismatch::Samplerate { .. } => "samplerate",
            FormatMismatch::Channels { .. } => "channels",
            FormatMismatch::Duration { .. } => "duration",
        }
    }
}

impl fmt::Display for FormatMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatMismatch::Bits { expected, actual }
            | FormatMismatch::Samplerate { expected, actual }
            | FormatMismatch::Channels { expected, actual } => {
                write!(f, "{}: expected {}, got {}", self.property(), expected, actual)
            }
            FormatMismatch::Duration { actual } => {
                write!(f, "duration: expected > 0, got {}", actual)
            }
        }
    }
}

/// Non-fatal report that the canonical file does not look as expected
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormatWarning {
    pub mismatches: Vec<FormatMismatch>,
}

impl FormatWarning {
    /// Compare extracted properties with the expected canonical format.
    pub fn check(info: &AudioInfo, expected: &CanonicalSpec) -> Option<Self> {
        let mut mismatches = Vec::new();
        if info.bits != expected.bits {
            mismatches.push(FormatMismatch::Bits {
                expected: expected.bits,
                actual: info.bits,
            });
        }
        if info.samplerate != expected.samplerate {
            mismatches.push(FormatMismatch::Samplerate {
                expected: expected.samplerate,
                actual: info.samplerate,
            });
        }
        if info.channels != expected.channels {
            mismatches.push(FormatMismatch::Channels {
                expected: expected.channels,
                actual: info.channels,
            });
        }
        if info.duration.is_nan() || info.duration <= 0.0 {
            mismatches.push(FormatMismatch::Duration {
                actual: info.duration,
            });
        }

        if mismatches.is_empty() {
            None
        } else {
            Some(Self { mismatches })
        }
    }

    pub fn mentions(&self, property: &str) -> bool {
        self.mismatches.iter().any(|m| m.property() == property)
    }
}

impl fmt::Display for FormatWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("canonical format mismatch: ")?;
        for (i, mismatch) in self.mismatches.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", mismatch)?;
        }
        Ok(())
    }
}

/// Properties of the uploaded file itself
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceProperties {
    pub sound_type: SoundType,
    pub filesize: u64,
    /// Estimated for lossy sources, 0 otherwise
    pub bitrate_kbps: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidatedAudio {
    pub run_id: String,
    pub info: AudioInfo,
    pub warning: Option<FormatWarning>,
    pub canonical: ConversionResult,
    pub distribution: Option<ConversionResult>,
    pub source: SourceProperties,
    /// Run workspace; owned by the caller from here on
    pub run_dir: PathBuf,
    pub log: WorkLog,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Conversion,
    Extraction,
    Capacity,
    Workspace,
}

#[derive(Debug)]
pub struct PipelineFailure {
    pub run_id: String,
    pub kind: FailureKind,
    /// Stage that was running when the run failed
    pub stage: Stage,
    pub error: AppError,
    pub log: WorkLog,
}

impl PipelineFailure {
    pub fn message(&self) -> String {
        self.error.to_string()
    }

    /// Unmodified output of the external tool, when one was involved
    pub fn diagnostics(&self) -> Option<&str> {
        match &self.error {
            AppError::Conversion(e) => e.diagnostics(),
            AppError::Extraction(e) => e.raw_output(),
            _ => None,
        }
    }

    /// Actionable message for the end user
    pub fn user_message(&self) -> String {
        self.error.client_message()
    }

    pub fn conversion_error(&self) -> Option<&ConversionError> {
        match &self.error {
            AppError::Conversion(e) => Some(e),
            _ => None,
        }
    }

    pub fn extraction_error(&self) -> Option<&ExtractionError> {
        match &self.error {
            AppError::Extraction(e) => Some(e),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub enum PipelineOutcome {
    Validated(ValidatedAudio),
    Failed(PipelineFailure),
}

impl PipelineOutcome {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineOutcome::Validated(_) => Stage::Validated,
            PipelineOutcome::Failed(_) => Stage::Failed,
        }
    }

    pub fn run_id(&self) -> &str {
        match self {
            PipelineOutcome::Validated(v) => &v.run_id,
            PipelineOutcome::Failed(f) => &f.run_id,
        }
    }

    pub fn log(&self) -> &WorkLog {
        match self {
            PipelineOutcome::Validated(v) => &v.log,
            PipelineOutcome::Failed(f) => &f.log,
        }
    }

    pub fn validated(&self) -> Option<&ValidatedAudio> {
        match self {
            PipelineOutcome::Validated(v) => Some(v),
            PipelineOutcome::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&PipelineFailure> {
        match self {
            PipelineOutcome::Validated(_) => None,
            PipelineOutcome::Failed(f) => Some(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(samplerate: u32, channels: u32, bits: u32, duration: f64) -> AudioInfo {
        AudioInfo {
            duration,
            samplerate,
            bits,
            channels,
        }
    }

    #[test]
    fn test_canonical_info_has_no_warning() {
        let expected = CanonicalSpec::default();
        assert!(FormatWarning::check(&info(44100, 2, 16, 3.0), &expected).is_none());
    }

    #[test]
    fn test_mismatches_are_all_reported() {
        let expected = CanonicalSpec::default();
        let warning = FormatWarning::check(&info(22050, 1, 24, 0.0), &expected).unwrap();
        assert_eq!(warning.mismatches.len(), 4);
        assert!(warning.mentions("samplerate"));
        assert!(warning.mentions("channels"));
        assert!(warning.mentions("bits"));
        assert!(warning.mentions("duration"));
        assert_eq!(
            warning.to_string(),
            "canonical format mismatch: bits: expected 16, got 24; samplerate: expected 44100, got 22050; \
             channels: expected 2, got 1; duration: expected > 0, got 0"
        );
    }

    #[test]
    fn test_nan_duration_is_a_mismatch() {
        let expected = CanonicalSpec::default();
        let warning = FormatWarning::check(&info(44100, 2, 16, f64::NAN), &expected).unwrap();
        assert_eq!(warning.mismatches.len(), 1);
        assert!(warning.mentions("duration"));
    }

    #[test]
    fn test_format_mismatch_serialization() {
        let json = serde_json::to_value(FormatMismatch::Channels {
            expected: 2,
            actual: 1,
        })
        .unwrap();
        assert_eq!(json["property"], "channels");
        assert_eq!(json["expected"], 2);
        assert_eq!(json["actual"], 1);
    }

    #[test]
    fn test_work_log_lines_are_timestamped() {
        let mut log = WorkLog::default();
        log.push("stage=converting");
        assert_eq!(log.lines().len(), 1);
        assert!(log.lines()[0].ends_with(" stage=converting"));
        assert!(log.contains("converting"));
    }
}
