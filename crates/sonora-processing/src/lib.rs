//! Sonora Processing Library
//!
//! This crate drives the external tools of the audio ingestion pipeline:
//! - `command`: bounded, cancellable execution of external processes
//! - `audio`: format conversion, audio info extraction and bitrate estimation
//! - `validator`: checks on a finished upload before processing
//! - `pipeline`: the orchestrator that sequences conversion and extraction

pub mod audio;
pub mod command;
pub mod pipeline;
pub mod validator;

pub use audio::{
    estimate_bitrate_kbps, parse_analysis_output, CanonicalTarget, FfmpegConverter,
    FormatConverter, InfoExtractor, StereofyExtractor,
};
pub use command::{run_tool, ToolOutput};
pub use pipeline::{
    FailureKind, FormatMismatch, FormatWarning, Pipeline, PipelineFailure, PipelineOptions,
    PipelineOutcome, PipelineReport, SourceProperties, Stage, ValidatedAudio, WorkLog,
};
pub use validator::{AudioUploadValidator, ValidationError};
