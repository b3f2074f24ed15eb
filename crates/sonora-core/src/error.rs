//! Error types module
//!
//! This module provides the error types used throughout Sonora. Failures of
//! external tools are described by [`ToolError`]; the format converter and the
//! audio info extractor wrap them in [`ConversionError`] and
//! [`ExtractionError`]. Everything is unified under [`AppError`], which carries
//! the presentation contract consumed by the web layer through
//! [`ErrorMetadata`].

use std::io;
use std::path::PathBuf;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like validation failures
    Debug,
    /// Warning level - for recoverable issues like resource limits
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// Metadata for error responses - defines how an error should be presented
pub trait ErrorMetadata {
    /// HTTP status code to return
    fn http_status_code(&self) -> u16;

    /// Machine-readable error code (e.g., "CONVERSION_FAILED")
    fn error_code(&self) -> &'static str;

    /// Whether this error is recoverable (re-running the pipeline may succeed)
    fn is_recoverable(&self) -> bool;

    /// Suggested action for the client
    fn suggested_action(&self) -> Option<&'static str>;

    /// Client-facing message (may differ from internal error message)
    fn client_message(&self) -> String;

    /// Whether details should be hidden in production
    fn is_sensitive(&self) -> bool;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

/// Failure of a single external process invocation.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Failed to execute {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: io::Error,
    },

    #[error("{tool} exited unsuccessfully (code {code:?}):\n{diagnostics}")]
    Exit {
        tool: String,
        code: Option<i32>,
        diagnostics: String,
    },

    #[error("{tool} ran out of disk space:\n{diagnostics}")]
    NoSpaceLeft { tool: String, diagnostics: String },

    #[error("{tool} timed out after {timeout_secs}s")]
    TimedOut { tool: String, timeout_secs: u64 },

    #[error("{tool} was cancelled")]
    Cancelled { tool: String },
}

impl ToolError {
    /// Name of the tool that failed
    pub fn tool(&self) -> &str {
        match self {
            ToolError::Spawn { tool, .. }
            | ToolError::Exit { tool, .. }
            | ToolError::NoSpaceLeft { tool, .. }
            | ToolError::TimedOut { tool, .. }
            | ToolError::Cancelled { tool } => tool,
        }
    }

    /// Raw stdout/stderr captured from the tool, if it ran to completion
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            ToolError::Exit { diagnostics, .. } | ToolError::NoSpaceLeft { diagnostics, .. } => {
                Some(diagnostics)
            }
            _ => None,
        }
    }
}

/// Failure of the format converter.
#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("Source file does not exist: {}", .0.display())]
    SourceMissing(PathBuf),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("{tool} finished but produced no output at {}", path.display())]
    MissingOutput { tool: String, path: PathBuf },

    #[error("Failed to prepare conversion output: {0}")]
    Io(#[from] io::Error),
}

impl ConversionError {
    /// Unmodified diagnostic text from the transcoder, when available
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            ConversionError::Tool(e) => e.diagnostics(),
            _ => None,
        }
    }
}

/// Failure of the audio info extractor.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("Input file does not exist: {}", .0.display())]
    SourceMissing(PathBuf),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("{tool} finished but wrote nothing to scratch path {}", path.display())]
    MissingScratchOutput { tool: String, path: PathBuf },

    #[error("Analysis output is missing field `{field}`")]
    MissingField {
        field: &'static str,
        raw_output: String,
    },

    #[error("Analysis output has invalid value {value:?} for field `{field}`")]
    InvalidField {
        field: &'static str,
        value: String,
        raw_output: String,
    },
}

impl ExtractionError {
    /// Raw analysis tool output, kept for diagnostics
    pub fn raw_output(&self) -> Option<&str> {
        match self {
            ExtractionError::Tool(e) => e.diagnostics(),
            ExtractionError::MissingField { raw_output, .. }
            | ExtractionError::InvalidField { raw_output, .. } => Some(raw_output),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Conversion failed: {0}")]
    Conversion(#[from] ConversionError),

    #[error("Could not read audio properties: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("File too large: {0}")]
    PayloadTooLarge(String),

    #[error(
        "Insufficient disk space: {available_percent:.1}% free, {required_percent:.1}% required"
    )]
    InsufficientDiskSpace {
        available_percent: f64,
        required_percent: f64,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Internal error with source")]
    InternalWithSource {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalWithSource {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        AppError::Internal(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal(format!("JSON error: {}", err))
    }
}

fn tool_error(err: &AppError) -> Option<&ToolError> {
    match err {
        AppError::Conversion(ConversionError::Tool(e)) => Some(e),
        AppError::Extraction(ExtractionError::Tool(e)) => Some(e),
        _ => None,
    }
}

/// Static metadata for each variant: (http_status, error_code, recoverable, suggested_action, sensitive, log_level).
/// Tool-level failures inside conversion or extraction take precedence over the stage.
fn app_error_static_metadata(
    err: &AppError,
) -> (
    u16,
    &'static str,
    bool,
    Option<&'static str>,
    bool,
    LogLevel,
) {
    match tool_error(err) {
        Some(ToolError::Spawn { .. }) => {
            return (
                500,
                "TOOL_UNAVAILABLE",
                false,
                Some("Contact support if this error persists"),
                true,
                LogLevel::Error,
            )
        }
        Some(ToolError::TimedOut { .. }) => {
            return (
                504,
                "PROCESSING_TIMEOUT",
                true,
                Some("Retry the upload later"),
                false,
                LogLevel::Warn,
            )
        }
        Some(ToolError::NoSpaceLeft { .. }) => {
            return (
                507,
                "INSUFFICIENT_DISK_SPACE",
                true,
                Some("Retry after cleanup or wait for capacity"),
                false,
                LogLevel::Error,
            )
        }
        Some(ToolError::Cancelled { .. }) => {
            return (
                503,
                "PROCESSING_CANCELLED",
                true,
                Some("Retry the upload"),
                false,
                LogLevel::Warn,
            )
        }
        _ => {}
    }

    match err {
        AppError::Conversion(_) => (
            422,
            "CONVERSION_FAILED",
            false,
            Some("Check that the file is a supported audio format"),
            false,
            LogLevel::Warn,
        ),
        AppError::Extraction(_) => (
            422,
            "AUDIO_PROPERTIES_UNREADABLE",
            false,
            Some("Check that the file is not corrupted and try again"),
            false,
            LogLevel::Warn,
        ),
        AppError::InvalidInput(_) => (
            400,
            "INVALID_INPUT",
            false,
            Some("Check the uploaded file and try again"),
            false,
            LogLevel::Debug,
        ),
        AppError::NotFound(_) => (
            404,
            "NOT_FOUND",
            false,
            Some("Verify the upload identifier"),
            false,
            LogLevel::Debug,
        ),
        AppError::PayloadTooLarge(_) => (
            413,
            "PAYLOAD_TOO_LARGE",
            false,
            Some("Reduce file size"),
            false,
            LogLevel::Debug,
        ),
        AppError::InsufficientDiskSpace { .. } => (
            507,
            "INSUFFICIENT_DISK_SPACE",
            true,
            Some("Retry after cleanup or wait for capacity"),
            false,
            LogLevel::Warn,
        ),
        AppError::Configuration(_) => (
            500,
            "CONFIGURATION_ERROR",
            false,
            Some("Contact support if this error persists"),
            true,
            LogLevel::Error,
        ),
        AppError::Internal(_) | AppError::InternalWithSource { .. } => (
            500,
            "INTERNAL_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
    }
}

impl AppError {
    /// Get detailed error information including error chain
    pub fn detailed_message(&self) -> String {
        use std::error::Error;

        let mut details = self.to_string();

        let mut source = self.source();
        let mut depth = 0;
        while let Some(err) = source {
            depth += 1;
            if depth > 5 {
                details.push_str("\n  ... (truncated)");
                break;
            }
            details.push_str(&format!("\n  Caused by: {}", err));
            source = err.source();
        }

        details
    }
}

impl ErrorMetadata for AppError {
    fn http_status_code(&self) -> u16 {
        app_error_static_metadata(self).0
    }

    fn error_code(&self) -> &'static str {
        app_error_static_metadata(self).1
    }

    fn is_recoverable(&self) -> bool {
        app_error_static_metadata(self).2
    }

    fn suggested_action(&self) -> Option<&'static str> {
        app_error_static_metadata(self).3
    }

    fn is_sensitive(&self) -> bool {
        app_error_static_metadata(self).4
    }

    fn log_level(&self) -> LogLevel {
        app_error_static_metadata(self).5
    }

    fn client_message(&self) -> String {
        match self {
            AppError::Conversion(_) => {
                "Audio conversion failed: the uploaded file could not be converted".to_string()
            }
            AppError::Extraction(_) => {
                "Could not read audio properties of the uploaded file".to_string()
            }
            AppError::InvalidInput(ref msg) => msg.clone(),
            AppError::NotFound(ref msg) => msg.clone(),
            AppError::PayloadTooLarge(ref msg) => msg.clone(),
            AppError::InsufficientDiskSpace {
                available_percent,
                required_percent,
            } => format!(
                "Insufficient disk space: {:.1}% free, {:.1}% required",
                available_percent, required_percent
            ),
            AppError::Configuration(_) => "Service misconfigured".to_string(),
            AppError::Internal(_) | AppError::InternalWithSource { .. } => {
                "Internal server error".to_string()
            }
        }
    }
}
