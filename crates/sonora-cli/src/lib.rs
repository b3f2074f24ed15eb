use anyhow::{bail, Context};
use bytes::Bytes;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use sonora_core::{DistributionFormat, ProcessingConfig, UploadProgress};
use sonora_infra::{CapacityChecker, UploadProgressCache};
use sonora_processing::Pipeline;

/// Distribution format to encode after validation
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum DistributionArg {
    Mp3,
    Ogg,
}

impl DistributionArg {
    pub fn format(self, config: &ProcessingConfig) -> DistributionFormat {
        match self {
            DistributionArg::Mp3 => config.mp3_preview(),
            DistributionArg::Ogg => config.ogg_preview(),
        }
    }
}

pub fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize output")?;
    println!("{}", out);
    Ok(())
}

/// Pipeline over the configured tools, guarded by the disk capacity check.
pub fn build_pipeline(config: &ProcessingConfig) -> Pipeline {
    let gate = CapacityChecker::new(config.min_free_disk_percent, config.disk_check_behavior);
    Pipeline::from_config(config).with_capacity_gate(Arc::new(gate))
}

/// Copy `source` into `<spool_dir>/<unique_id>/` in chunks of `chunk_size`
/// bytes, recording each chunk in `progress`.
///
/// `on_progress` is called after every chunk with the cached counters.
pub async fn spool_upload<F>(
    source: &Path,
    spool_dir: &Path,
    unique_id: &str,
    chunk_size: usize,
    progress: &UploadProgressCache,
    mut on_progress: F,
) -> anyhow::Result<PathBuf>
where
    F: FnMut(&UploadProgress),
{
    if chunk_size == 0 {
        bail!("Chunk size must be greater than 0");
    }

    let file_name = source
        .file_name()
        .with_context(|| format!("Not a file: {}", source.display()))?;
    let total = tokio::fs::metadata(source)
        .await
        .with_context(|| format!("Cannot read {}", source.display()))?
        .len();

    let upload_dir = spool_dir.join(unique_id);
    tokio::fs::create_dir_all(&upload_dir)
        .await
        .with_context(|| format!("Cannot create {}", upload_dir.display()))?;
    let dest = upload_dir.join(file_name);

    let mut reader = tokio::fs::File::open(source).await?;
    let mut writer = tokio::fs::File::create(&dest).await?;
    let mut buf = vec![0u8; chunk_size];

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        let chunk = progress
            .record_chunk(unique_id, Bytes::copy_from_slice(&buf[..n]), total)
            .await;
        writer.write_all(&chunk).await?;
        if let Some(current) = progress.query(unique_id).await {
            on_progress(&current);
        }
    }
    writer.flush().await?;

    progress.record_complete(unique_id, total).await;
    tracing::info!(
        unique_id = %unique_id,
        bytes = total,
        path = %dest.display(),
        "Upload spooled"
    );

    Ok(dest)
}
