//! Capacity gate trait for pipeline runs.
//!
//! Implementations check whether the volume holding the processing directory
//! has enough room for the intermediate files of a new run. Used by the
//! pipeline orchestrator before any external tool is launched.

use async_trait::async_trait;
use std::path::Path;

use crate::error::AppError;

/// Gate that determines whether a run may start writing into `work_dir`.
///
/// Returning an error ends the run before conversion; the error is reported
/// to the caller as a capacity failure.
#[async_trait]
pub trait CapacityGate: Send + Sync {
    async fn ensure_capacity(&self, work_dir: &Path) -> Result<(), AppError>;
}
