//! Sonora Infrastructure Library
//!
//! This crate provides shared infrastructure components used by the Sonora pipeline:
//! - Upload progress cache (sharded TTL store)
//! - Telemetry initialization
//! - Disk capacity checking

#[cfg(feature = "observability-basic")]
pub mod telemetry;

#[cfg(feature = "progress")]
pub mod progress;

#[cfg(feature = "capacity")]
pub mod capacity;

// Re-export commonly used types
#[cfg(feature = "observability-basic")]
pub use telemetry::{init_telemetry, shutdown_telemetry};

#[cfg(feature = "progress")]
pub use progress::{TtlStore, UploadProgressCache};

#[cfg(feature = "capacity")]
pub use capacity::CapacityChecker;
