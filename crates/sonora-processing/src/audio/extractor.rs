//! Audio info extractor - reads technical properties through the analysis tool
//!
//! The tool is invoked as `<tool> --input <file> --output <scratch>` and
//! reports `key value` pairs such as `#samplerate 44100` on stdout or stderr.

use async_trait::async_trait;
use std::ffi::OsStr;
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use sonora_core::{AudioInfo, ExtractionError, ProcessingConfig};

use crate::command::{run_tool, tool_name};

#[async_trait]
pub trait InfoExtractor: Send + Sync {
    /// Analyse `input`, letting the tool write its side output to `scratch`.
    async fn extract(
        &self,
        input: &Path,
        scratch: &Path,
        cancel: &CancellationToken,
    ) -> Result<AudioInfo, ExtractionError>;
}

pub struct StereofyExtractor {
    tool_path: String,
    timeout: Duration,
}

impl StereofyExtractor {
    pub fn new(tool_path: String, timeout: Duration) -> Self {
        Self { tool_path, timeout }
    }

    pub fn from_config(config: &ProcessingConfig) -> Self {
        Self::new(config.stereofy_path.clone(), config.tool_timeout())
    }
}

#[async_trait]
impl InfoExtractor for StereofyExtractor {
    #[tracing::instrument(skip(self, cancel), fields(service = "audio", tool = %self.tool_path))]
    async fn extract(
        &self,
        input: &Path,
        scratch: &Path,
        cancel: &CancellationToken,
    ) -> Result<AudioInfo, ExtractionError> {
        if tokio::fs::metadata(input).await.is_err() {
            return Err(ExtractionError::SourceMissing(input.to_path_buf()));
        }

        let args = [
            OsStr::new("--input"),
            input.as_os_str(),
            OsStr::new("--output"),
            scratch.as_os_str(),
        ];
        let output = run_tool(&self.tool_path, args, self.timeout, cancel).await?;

        if tokio::fs::metadata(scratch).await.is_err() {
            return Err(ExtractionError::MissingScratchOutput {
                tool: tool_name(&self.tool_path),
                path: scratch.to_path_buf(),
            });
        }

        let info = parse_analysis_output(&output.combined())?;
        tracing::debug!(
            duration = info.duration,
            samplerate = info.samplerate,
            bits = info.bits,
            channels = info.channels,
            "Audio info extracted"
        );
        Ok(info)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Duration,
    Samplerate,
    Bits,
    Channels,
}

impl Field {
    fn from_key(key: &str) -> Option<Self> {
        match key.to_ascii_lowercase().as_str() {
            "duration" => Some(Field::Duration),
            "samplerate" | "sample_rate" => Some(Field::Samplerate),
            "bits" | "bitdepth" => Some(Field::Bits),
            "channels" => Some(Field::Channels),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Field::Duration => "duration",
            Field::Samplerate => "samplerate",
            Field::Bits => "bits",
            Field::Channels => "channels",
        }
    }

    /// Durations are any finite number; the other fields are integers that
    /// may be printed as `44100` or `44100.0`.
    fn parse(self, value: &str) -> Option<f64> {
        let number: f64 = value.parse().ok()?;
        let valid = match self {
            Field::Duration => number.is_finite(),
            _ => number.fract() == 0.0 && number >= 0.0 && number <= u32::MAX as f64,
        };
        valid.then_some(number)
    }
}

#[derive(Default)]
struct Slot<'a> {
    value: Option<f64>,
    marked: bool,
    rejected: Option<&'a str>,
}

#[derive(Default)]
struct Fields<'a> {
    slots: [Slot<'a>; 4],
}

impl<'a> Fields<'a> {
    /// Returns whether `value` was a well formed value for `field`.
    fn offer(&mut self, field: Field, value: &'a str, marked: bool) -> bool {
        let slot = &mut self.slots[field as usize];
        match field.parse(value) {
            Some(number) => {
                if marked || !slot.marked {
                    slot.value = Some(number);
                    slot.marked = marked;
                }
                true
            }
            None => {
                if slot.rejected.is_none() {
                    slot.rejected = Some(value);
                }
                false
            }
        }
    }

    fn take(&self, field: Field, raw: &str) -> Result<f64, ExtractionError> {
        let slot = &self.slots[field as usize];
        match (slot.value, slot.rejected) {
            (Some(number), _) => Ok(number),
            (None, Some(value)) => Err(ExtractionError::InvalidField {
                field: field.name(),
                value: value.to_string(),
                raw_output: raw.to_string(),
            }),
            (None, None) => Err(ExtractionError::MissingField {
                field: field.name(),
                raw_output: raw.to_string(),
            }),
        }
    }
}

fn normalize_key(token: &str) -> &str {
    token.trim_start_matches('#').trim_end_matches(':')
}

/// Parse the analysis tool's textual output into an [`AudioInfo`].
///
/// Accepts `key value`, `key: value` and `key=value` forms separated by any
/// whitespace. A bare key only takes the next token when that token is a valid
/// value, so diagnostic prose mentioning a key is skipped. Keys written with a
/// leading `#` take priority over unmarked ones; among equals the last
/// occurrence wins. A field with no valid value is reported as invalid if a
/// value was seen for it and as missing otherwise.
pub fn parse_analysis_output(raw: &str) -> Result<AudioInfo, ExtractionError> {
    let mut fields = Fields::default();
    let tokens: Vec<&str> = raw.split_whitespace().collect();

    let mut i = 0;
    while i < tokens.len() {
        let token = tokens[i];
        i += 1;
        let marked = token.starts_with('#');

        if let Some((key, value)) = token.split_once('=') {
            if let Some(field) = Field::from_key(normalize_key(key)) {
                fields.offer(field, value, marked);
            }
            continue;
        }

        if let Some(field) = Field::from_key(normalize_key(token)) {
            if let Some(&value) = tokens.get(i) {
                if fields.offer(field, value, marked) {
                    i += 1;
                }
            }
        }
    }

    Ok(AudioInfo {
        duration: fields.take(Field::Duration, raw)?,
        samplerate: fields.take(Field::Samplerate, raw)? as u32,
        bits: fields.take(Field::Bits, raw)? as u32,
        channels: fields.take(Field::Channels, raw)? as u32,
    })
}
