//! Sonora CLI: run the audio ingestion pipeline on local files.
//!
//! Tool paths, the work directory and limits come from the environment (see
//! `ProcessingConfig::from_env`). Run reports go to stdout, progress to stderr.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use sonora_cli::{build_pipeline, print_json, spool_upload, DistributionArg};
use sonora_core::{AppError, ProcessingConfig};
use sonora_infra::{init_telemetry, shutdown_telemetry, UploadProgressCache};
use sonora_processing::{
    AudioUploadValidator, InfoExtractor, Pipeline, PipelineOptions, PipelineOutcome,
    PipelineReport, StereofyExtractor,
};

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Parser)]
#[command(name = "sonora", about = "Audio ingestion pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a file to the canonical format and read its properties
    Process {
        /// Path to the audio file
        file: PathBuf,
        /// Run identifier (generated when omitted)
        #[arg(long)]
        run_id: Option<String>,
        /// Also encode a distribution file
        #[arg(long, value_enum)]
        distribution: Option<DistributionArg>,
        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Stream a file through the upload progress cache, then process it
    Ingest {
        /// Path to the audio file
        file: PathBuf,
        /// Bytes per chunk
        #[arg(long, default_value = "65536")]
        chunk_size: usize,
        /// Also encode a distribution file
        #[arg(long, value_enum)]
        distribution: Option<DistributionArg>,
        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Read the properties of a file with the analysis tool only
    Inspect {
        /// Path to the audio file
        file: PathBuf,
    },
    /// Remove the workspace of a finished run
    Discard {
        /// Run identifier
        run_id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = ProcessingConfig::from_env().context("Invalid processing configuration")?;
    init_telemetry("sonora", &config)
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling");
            ctrl_c.cancel();
        }
    });

    let result = match cli.command {
        Commands::Process {
            file,
            run_id,
            distribution,
            json,
        } => {
            let run_id = run_id.unwrap_or_else(Pipeline::new_run_id);
            let output = Output { distribution, json };
            process(&config, &file, &run_id, output, &cancel).await
        }
        Commands::Ingest {
            file,
            chunk_size,
            distribution,
            json,
        } => {
            let output = Output { distribution, json };
            ingest(&config, &file, chunk_size, output, &cancel).await
        }
        Commands::Inspect { file } => inspect(&config, &file, &cancel).await,
        Commands::Discard { run_id } => {
            build_pipeline(&config).discard_run(&run_id).await?;
            print_json(&serde_json::json!({ "run_id": run_id, "discarded": true }))
        }
    };

    cancel.cancel();
    shutdown_telemetry().await;
    result
}

#[derive(Clone, Copy)]
struct Output {
    distribution: Option<DistributionArg>,
    json: bool,
}

async fn process(
    config: &ProcessingConfig,
    file: &Path,
    run_id: &str,
    output: Output,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    AudioUploadValidator::from_config(config)
        .validate_file(file)
        .await
        .map_err(AppError::from)?;

    let pipeline = build_pipeline(config);
    let options = PipelineOptions {
        distribution: output.distribution.map(|d| d.format(config)),
    };
    let outcome = pipeline.run(file, run_id, &options, cancel).await;

    let report = PipelineReport::from_outcome(&outcome);
    if let PipelineOutcome::Validated(validated) = &outcome {
        report.write_json(&validated.run_dir).await?;
    }
    if output.json {
        print_json(&report)?;
    } else {
        print_summary(&outcome);
    }

    match outcome {
        PipelineOutcome::Validated(_) => Ok(()),
        PipelineOutcome::Failed(failure) => {
            Err(anyhow::anyhow!(failure.user_message()).context(failure.message()))
        }
    }
}

async fn ingest(
    config: &ProcessingConfig,
    file: &Path,
    chunk_size: usize,
    output: Output,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let progress = UploadProgressCache::new(config.upload_progress_ttl());
    let sweeper = progress.spawn_sweeper(SWEEP_INTERVAL, cancel.child_token());

    let unique_id = Pipeline::new_run_id();
    let spool_dir = config.temp_dir.join("uploads");
    let spooled = spool_upload(file, &spool_dir, &unique_id, chunk_size, &progress, |p| {
        if let Some(percent) = p.percent() {
            eprint!("\ruploaded {:>6.2}% ({} bytes)", percent, p.bytes_received);
        }
    })
    .await;
    eprintln!();

    let result = match spooled {
        Ok(path) => process(config, &path, &unique_id, output, cancel).await,
        Err(e) => Err(e),
    };

    if let Err(e) = tokio::fs::remove_dir_all(spool_dir.join(&unique_id)).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(unique_id = %unique_id, error = %e, "Failed to remove spooled upload");
        }
    }
    sweeper.abort();
    result
}

fn print_summary(outcome: &PipelineOutcome) {
    match outcome {
        PipelineOutcome::Validated(v) => {
            println!("run {}: validated", v.run_id);
            println!(
                "  duration {:.3}s, {} Hz, {} bit, {} channel(s)",
                v.info.duration, v.info.samplerate, v.info.bits, v.info.channels
            );
            if let Some(warning) = &v.warning {
                println!("  warning: {}", warning);
            }
            println!("  canonical: {}", v.canonical.output_path.display());
            if let Some(distribution) = &v.distribution {
                println!("  distribution: {}", distribution.output_path.display());
            }
            if v.source.bitrate_kbps > 0 {
                println!("  source bitrate: {} kbps", v.source.bitrate_kbps);
            }
        }
        PipelineOutcome::Failed(f) => {
            println!("run {}: failed during {}", f.run_id, f.stage);
            println!("  {}", f.user_message());
            if let Some(diagnostics) = f.diagnostics() {
                println!("  tool output:");
                for line in diagnostics.lines() {
                    println!("    {}", line);
                }
            }
        }
    }
}

async fn inspect(
    config: &ProcessingConfig,
    file: &Path,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(&config.temp_dir)
        .await
        .with_context(|| format!("Cannot create {}", config.temp_dir.display()))?;
    let scratch = config
        .temp_dir
        .join(format!("inspect_{}.wav", Pipeline::new_run_id()));

    let extracted = StereofyExtractor::from_config(config)
        .extract(file, &scratch, cancel)
        .await;
    if let Err(e) = tokio::fs::remove_file(&scratch).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(
                path = %scratch.display(),
                error = %e,
                "Failed to remove analysis scratch"
            );
        }
    }

    let info = extracted.map_err(AppError::from)?;
    print_json(&info)
}
