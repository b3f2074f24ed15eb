//! Sonora Core Library
//!
//! This crate provides the domain models, error types, configuration and
//! capacity gate that are shared across all Sonora components.

pub mod capacity_gate;
pub mod config;
pub mod error;
pub mod models;

// Re-export commonly used types
pub use capacity_gate::CapacityGate;
pub use config::{CanonicalSpec, DiskCheckBehavior, ProcessingConfig};
pub use error::{AppError, ConversionError, ErrorMetadata, ExtractionError, LogLevel, ToolError};
pub use models::{
    AudioInfo, ConversionFormat, ConversionResult, DistributionFormat, SoundType, UploadProgress,
};
