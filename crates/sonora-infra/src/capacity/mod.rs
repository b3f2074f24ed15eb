//! Capacity checking service
//!
//! This module provides the disk space check used as the pipeline's capacity gate.

pub use checker::{CapacityChecker, DiskUsage};

mod checker;
