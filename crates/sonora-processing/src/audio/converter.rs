//! Format converter - transcodes uploads with ffmpeg

use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use sonora_core::{
    ConversionError, ConversionFormat, ConversionResult, DistributionFormat, ProcessingConfig,
};

use crate::command::{run_tool, tool_name};

/// Converts audio files into the canonical intermediate and distribution formats.
///
/// Each call blocks until the external process exits; nothing is retried.
/// Output files belong to the caller.
#[async_trait]
pub trait FormatConverter: Send + Sync {
    /// Convert `input` to a 16-bit PCM WAV file inside `output_dir`.
    async fn to_canonical(
        &self,
        input: &Path,
        output_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<ConversionResult, ConversionError>;

    /// Encode `input` into `format` at `output`.
    async fn to_distribution_format(
        &self,
        input: &Path,
        output: &Path,
        format: DistributionFormat,
        cancel: &CancellationToken,
    ) -> Result<ConversionResult, ConversionError>;
}

/// Target parameters of the canonical file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanonicalTarget {
    /// `None` keeps the source sample rate
    pub sample_rate: Option<u32>,
    /// Mix down to one channel
    pub mono: bool,
}

impl Default for CanonicalTarget {
    fn default() -> Self {
        Self {
            sample_rate: Some(44100),
            mono: false,
        }
    }
}

/// Deterministic canonical output path: `<output_dir>/<stem>.wav`.
///
/// Falls back to `<stem>.canonical.wav` when that would overwrite the input.
pub fn canonical_output_path(input: &Path, output_dir: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "audio".to_string());
    let output = output_dir.join(format!("{}.wav", stem));
    if output == input {
        output_dir.join(format!("{}.canonical.wav", stem))
    } else {
        output
    }
}

pub struct FfmpegConverter {
    ffmpeg_path: String,
    target: CanonicalTarget,
    timeout: Duration,
}

impl FfmpegConverter {
    pub fn new(ffmpeg_path: String, target: CanonicalTarget, timeout: Duration) -> Self {
        Self {
            ffmpeg_path,
            target,
            timeout,
        }
    }

    pub fn from_config(config: &ProcessingConfig) -> Self {
        let target = CanonicalTarget {
            sample_rate: (config.canonical_sample_rate > 0).then_some(config.canonical_sample_rate),
            mono: config.canonical_mono,
        };
        Self::new(config.ffmpeg_path.clone(), target, config.tool_timeout())
    }

    fn canonical_args(&self, input: &Path, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-y".into(),
            "-i".into(),
            input.into(),
            "-acodec".into(),
            "pcm_s16le".into(),
        ];
        if let Some(rate) = self.target.sample_rate {
            args.extend(["-ar".into(), rate.to_string().into()]);
        }
        if self.target.mono {
            args.extend(["-ac".into(), "1".into()]);
        }
        args.push(output.into());
        args
    }

    fn distribution_args(
        &self,
        input: &Path,
        output: &Path,
        format: DistributionFormat,
    ) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-y".into(), "-i".into(), input.into()];
        match format {
            DistributionFormat::Mp3 { bitrate_kbps } => {
                args.extend([
                    "-acodec".into(),
                    "libmp3lame".into(),
                    "-abr".into(),
                    "1".into(),
                    "-b:a".into(),
                    format!("{}k", bitrate_kbps).into(),
                ]);
            }
            DistributionFormat::Ogg { quality } => {
                args.extend([
                    "-acodec".into(),
                    "libvorbis".into(),
                    "-q:a".into(),
                    quality.to_string().into(),
                ]);
            }
        }
        args.push(output.into());
        args
    }

    /// Run ffmpeg and make sure it left a file at `output`.
    async fn transcode(
        &self,
        args: Vec<OsString>,
        input: &Path,
        output: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), ConversionError> {
        if tokio::fs::metadata(input).await.is_err() {
            return Err(ConversionError::SourceMissing(input.to_path_buf()));
        }
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        if let Err(e) = run_tool(&self.ffmpeg_path, args, self.timeout, cancel).await {
            // ffmpeg may leave a truncated file behind
            if let Err(remove) = tokio::fs::remove_file(output).await {
                if remove.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(
                        path = %output.display(),
                        error = %remove,
                        "Failed to remove partial conversion output"
                    );
                }
            }
            return Err(e.into());
        }

        if tokio::fs::metadata(output).await.is_err() {
            return Err(ConversionError::MissingOutput {
                tool: tool_name(&self.ffmpeg_path),
                path: output.to_path_buf(),
            });
        }

        Ok(())
    }
}

#[async_trait]
impl FormatConverter for FfmpegConverter {
    #[tracing::instrument(skip(self, cancel), fields(service = "audio"))]
    async fn to_canonical(
        &self,
        input: &Path,
        output_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<ConversionResult, ConversionError> {
        let output = canonical_output_path(input, output_dir);
        let args = self.canonical_args(input, &output);
        self.transcode(args, input, &output, cancel).await?;

        tracing::info!(
            output = %output.display(),
            sample_rate = ?self.target.sample_rate,
            mono = self.target.mono,
            "Canonical conversion complete"
        );

        Ok(ConversionResult {
            source_path: input.to_path_buf(),
            output_path: output,
            format: ConversionFormat::CanonicalWav,
            success: true,
        })
    }

    #[tracing::instrument(skip(self, format, cancel), fields(service = "audio", format = %format))]
    async fn to_distribution_format(
        &self,
        input: &Path,
        output: &Path,
        format: DistributionFormat,
        cancel: &CancellationToken,
    ) -> Result<ConversionResult, ConversionError> {
        let args = self.distribution_args(input, output, format);
        self.transcode(args, input, output, cancel).await?;

        tracing::info!(output = %output.display(), "Distribution encoding complete");

        Ok(ConversionResult {
            source_path: input.to_path_buf(),
            output_path: output.to_path_buf(),
            format: ConversionFormat::Distribution(format),
            success: true,
        })
    }
}
