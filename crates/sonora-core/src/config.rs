//! Configuration module
//!
//! This module provides the configuration for the processing pipeline:
//! external tool locations, the canonical target format, timeouts, the upload
//! progress TTL, disk capacity policy and upload limits.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::models::DistributionFormat;

// Common constants
const FFMPEG_PATH: &str = "ffmpeg";
const STEREOFY_PATH: &str = "stereofy";
const TOOL_TIMEOUT_SECS: u64 = 900;
const UPLOAD_PROGRESS_TTL_SECS: u64 = 60;
const CANONICAL_SAMPLE_RATE: u32 = 44100;
const MIN_FREE_DISK_PERCENT: f64 = 5.0;
const PREVIEW_MP3_BITRATE_KBPS: u32 = 70;
const PREVIEW_OGG_QUALITY: u8 = 1;
const MAX_AUDIO_SIZE_MB: usize = 1024;
const AUDIO_ALLOWED_EXTENSIONS: &str = "wav,aif,aiff,flac,ogg,mp3,m4a";

/// What to do when the processing volume is below the free space threshold
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiskCheckBehavior {
    /// Refuse to start the run
    Fail,
    /// Log a warning and continue
    Warn,
}

impl DiskCheckBehavior {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "fail" => Some(DiskCheckBehavior::Fail),
            "warn" => Some(DiskCheckBehavior::Warn),
            _ => None,
        }
    }
}

/// Expected properties of a canonical file
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CanonicalSpec {
    pub bits: u32,
    pub samplerate: u32,
    pub channels: u32,
}

impl Default for CanonicalSpec {
    fn default() -> Self {
        Self {
            bits: 16,
            samplerate: CANONICAL_SAMPLE_RATE,
            channels: 2,
        }
    }
}

/// Audio processing configuration
#[derive(Clone, Debug)]
pub struct ProcessingConfig {
    pub environment: String,
    pub ffmpeg_path: String,
    pub stereofy_path: String,
    pub temp_dir: PathBuf,
    pub tool_timeout_secs: u64,
    pub upload_progress_ttl_secs: u64,
    /// Target sample rate of the canonical file. 0 keeps the source rate.
    pub canonical_sample_rate: u32,
    /// Mix the canonical file down to a single channel
    pub canonical_mono: bool,
    pub min_free_disk_percent: f64,
    pub disk_check_behavior: DiskCheckBehavior,
    pub preview_mp3_bitrate_kbps: u32,
    pub preview_ogg_quality: u8,
    pub max_audio_size_bytes: usize,
    pub audio_allowed_extensions: Vec<String>,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            ffmpeg_path: FFMPEG_PATH.to_string(),
            stereofy_path: STEREOFY_PATH.to_string(),
            temp_dir: env::temp_dir(),
            tool_timeout_secs: TOOL_TIMEOUT_SECS,
            upload_progress_ttl_secs: UPLOAD_PROGRESS_TTL_SECS,
            canonical_sample_rate: CANONICAL_SAMPLE_RATE,
            canonical_mono: false,
            min_free_disk_percent: MIN_FREE_DISK_PERCENT,
            disk_check_behavior: DiskCheckBehavior::Fail,
            preview_mp3_bitrate_kbps: PREVIEW_MP3_BITRATE_KBPS,
            preview_ogg_quality: PREVIEW_OGG_QUALITY,
            max_audio_size_bytes: MAX_AUDIO_SIZE_MB * 1024 * 1024,
            audio_allowed_extensions: split_list(AUDIO_ALLOWED_EXTENSIONS),
        }
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn megabytes_to_bytes(megabytes: usize) -> Result<usize, anyhow::Error> {
    megabytes
        .checked_mul(1024 * 1024)
        .ok_or_else(|| anyhow::anyhow!("MAX_AUDIO_SIZE_MB is too large: {}", megabytes))
}

impl ProcessingConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let disk_check_raw =
            env::var("DISK_CHECK_BEHAVIOR").unwrap_or_else(|_| "fail".to_string());
        let disk_check_behavior = DiskCheckBehavior::parse(&disk_check_raw).ok_or_else(|| {
            anyhow::anyhow!(
                "DISK_CHECK_BEHAVIOR must be 'fail' or 'warn', got '{}'",
                disk_check_raw
            )
        })?;

        let max_audio_size_mb: usize = env::var("MAX_AUDIO_SIZE_MB")
            .unwrap_or_else(|_| MAX_AUDIO_SIZE_MB.to_string())
            .parse()
            .unwrap_or(MAX_AUDIO_SIZE_MB);

        let config = ProcessingConfig {
            environment,
            ffmpeg_path: env::var("FFMPEG_PATH").unwrap_or_else(|_| FFMPEG_PATH.to_string()),
            stereofy_path: env::var("STEREOFY_PATH")
                .unwrap_or_else(|_| STEREOFY_PATH.to_string()),
            temp_dir: env::var("PROCESSING_TEMP_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| env::temp_dir()),
            tool_timeout_secs: env::var("TOOL_TIMEOUT_SECS")
                .unwrap_or_else(|_| TOOL_TIMEOUT_SECS.to_string())
                .parse()
                .unwrap_or(TOOL_TIMEOUT_SECS),
            upload_progress_ttl_secs: env::var("UPLOAD_PROGRESS_TTL_SECS")
                .unwrap_or_else(|_| UPLOAD_PROGRESS_TTL_SECS.to_string())
                .parse()
                .unwrap_or(UPLOAD_PROGRESS_TTL_SECS),
            canonical_sample_rate: env::var("CANONICAL_SAMPLE_RATE")
                .unwrap_or_else(|_| CANONICAL_SAMPLE_RATE.to_string())
                .parse()
                .unwrap_or(CANONICAL_SAMPLE_RATE),
            canonical_mono: env::var("CANONICAL_MONO")
                .unwrap_or_else(|_| "false".to_string())
                .to_lowercase()
                .parse()
                .unwrap_or(false),
            min_free_disk_percent: env::var("MIN_FREE_DISK_PERCENT")
                .unwrap_or_else(|_| MIN_FREE_DISK_PERCENT.to_string())
                .parse()
                .unwrap_or(MIN_FREE_DISK_PERCENT),
            disk_check_behavior,
            preview_mp3_bitrate_kbps: env::var("PREVIEW_MP3_BITRATE_KBPS")
                .unwrap_or_else(|_| PREVIEW_MP3_BITRATE_KBPS.to_string())
                .parse()
                .unwrap_or(PREVIEW_MP3_BITRATE_KBPS),
            preview_ogg_quality: env::var("PREVIEW_OGG_QUALITY")
                .unwrap_or_else(|_| PREVIEW_OGG_QUALITY.to_string())
                .parse()
                .unwrap_or(PREVIEW_OGG_QUALITY),
            max_audio_size_bytes: megabytes_to_bytes(max_audio_size_mb)?,
            audio_allowed_extensions: split_list(
                &env::var("AUDIO_ALLOWED_EXTENSIONS")
                    .unwrap_or_else(|_| AUDIO_ALLOWED_EXTENSIONS.to_string()),
            ),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.ffmpeg_path.trim().is_empty() {
            return Err(anyhow::anyhow!("FFMPEG_PATH must not be empty"));
        }

        if self.stereofy_path.trim().is_empty() {
            return Err(anyhow::anyhow!("STEREOFY_PATH must not be empty"));
        }

        if self.tool_timeout_secs == 0 {
            return Err(anyhow::anyhow!("TOOL_TIMEOUT_SECS must be greater than 0"));
        }

        if self.upload_progress_ttl_secs == 0 {
            return Err(anyhow::anyhow!(
                "UPLOAD_PROGRESS_TTL_SECS must be greater than 0"
            ));
        }

        if !(0.0..=100.0).contains(&self.min_free_disk_percent) {
            return Err(anyhow::anyhow!(
                "MIN_FREE_DISK_PERCENT must be between 0 and 100"
            ));
        }

        if self.preview_ogg_quality > 10 {
            return Err(anyhow::anyhow!("PREVIEW_OGG_QUALITY must be between 0 and 10"));
        }

        if self.audio_allowed_extensions.is_empty() {
            return Err(anyhow::anyhow!(
                "AUDIO_ALLOWED_EXTENSIONS must list at least one extension"
            ));
        }

        Ok(())
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    /// Properties a canonical file is expected to have under this configuration
    pub fn expected_canonical(&self) -> CanonicalSpec {
        let default = CanonicalSpec::default();
        CanonicalSpec {
            bits: default.bits,
            samplerate: if self.canonical_sample_rate > 0 {
                self.canonical_sample_rate
            } else {
                default.samplerate
            },
            channels: if self.canonical_mono { 1 } else { default.channels },
        }
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    pub fn upload_progress_ttl(&self) -> Duration {
        Duration::from_secs(self.upload_progress_ttl_secs)
    }

    pub fn mp3_preview(&self) -> DistributionFormat {
        DistributionFormat::Mp3 {
            bitrate_kbps: self.preview_mp3_bitrate_kbps,
        }
    }

    pub fn ogg_preview(&self) -> DistributionFormat {
        DistributionFormat::Ogg {
            quality: self.preview_ogg_quality,
        }
    }
}
