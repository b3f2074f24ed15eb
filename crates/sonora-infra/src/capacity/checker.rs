use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;
use sysinfo::Disks;
use tracing::{error, warn};

use sonora_core::{AppError, CapacityGate, DiskCheckBehavior};

/// Free space on one volume
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiskUsage {
    pub available_bytes: u64,
    pub total_bytes: u64,
}

impl DiskUsage {
    pub fn free_percent(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        self.available_bytes as f64 / self.total_bytes as f64 * 100.0
    }
}

/// Checks that the volume holding the processing directory keeps a minimum
/// percentage of free space.
#[derive(Clone, Debug)]
pub struct CapacityChecker {
    min_free_percent: f64,
    behavior: DiskCheckBehavior,
}

impl CapacityChecker {
    pub fn new(min_free_percent: f64, behavior: DiskCheckBehavior) -> Self {
        Self {
            min_free_percent,
            behavior,
        }
    }

    /// Apply the free space threshold to a measured volume.
    pub fn evaluate(&self, path: &Path, usage: DiskUsage) -> Result<(), AppError> {
        let free_percent = usage.free_percent();
        if free_percent >= self.min_free_percent {
            return Ok(());
        }

        match self.behavior {
            DiskCheckBehavior::Fail => {
                error!(
                    available_bytes = usage.available_bytes,
                    total_bytes = usage.total_bytes,
                    free_percent = free_percent,
                    required_percent = self.min_free_percent,
                    path = %path.display(),
                    "Insufficient disk space"
                );
                Err(AppError::InsufficientDiskSpace {
                    available_percent: free_percent,
                    required_percent: self.min_free_percent,
                })
            }
            DiskCheckBehavior::Warn => {
                warn!(
                    available_bytes = usage.available_bytes,
                    total_bytes = usage.total_bytes,
                    free_percent = free_percent,
                    required_percent = self.min_free_percent,
                    path = %path.display(),
                    "Insufficient disk space (warning only)"
                );
                Ok(())
            }
        }
    }

    /// Measure the volume holding `path` and apply the threshold.
    ///
    /// A volume that cannot be identified is logged and allowed.
    pub fn check_disk_space(&self, path: &Path) -> Result<(), AppError> {
        match disk_usage(path) {
            Ok(usage) => self.evaluate(path, usage),
            Err(e) => {
                warn!(
                    error = %e,
                    path = %path.display(),
                    "Could not determine disk space, skipping capacity check"
                );
                Ok(())
            }
        }
    }

    /// Async variant; runs the sync check in spawn_blocking to avoid blocking the runtime.
    pub async fn check_disk_space_async(&self, path: &Path) -> Result<(), AppError> {
        let path = path.to_path_buf();
        let checker = self.clone();
        tokio::task::spawn_blocking(move || checker.check_disk_space(&path))
            .await
            .map_err(|e| AppError::Internal(format!("spawn_blocking for disk space check: {}", e)))?
    }
}

#[async_trait]
impl CapacityGate for CapacityChecker {
    async fn ensure_capacity(&self, work_dir: &Path) -> Result<(), AppError> {
        self.check_disk_space_async(work_dir).await
    }
}

/// Find the disk with the longest mount point containing `path`.
fn disk_usage(path: &Path) -> Result<DiskUsage> {
    let canonical = path
        .canonicalize()
        .with_context(|| format!("Failed to canonicalize {}", path.display()))?;

    let disks = Disks::new_with_refreshed_list();
    disks
        .iter()
        .filter(|disk| canonical.starts_with(disk.mount_point()))
        .max_by_key(|disk| disk.mount_point().components().count())
        .map(|disk| DiskUsage {
            available_bytes: disk.available_space(),
            total_bytes: disk.total_space(),
        })
        .with_context(|| format!("No mounted disk contains {}", canonical.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sonora_core::ErrorMetadata;

    fn usage(available: u64, total: u64) -> DiskUsage {
        DiskUsage {
            available_bytes: available,
            total_bytes: total,
        }
    }

    #[test]
    fn test_free_percent() {
        assert_eq!(usage(25, 100).free_percent(), 25.0);
        assert_eq!(usage(0, 0).free_percent(), 0.0);
    }

    #[test]
    fn test_evaluate_allows_enough_space() {
        let checker = CapacityChecker::new(5.0, DiskCheckBehavior::Fail);
        assert!(checker.evaluate(Path::new("/tmp"), usage(50, 100)).is_ok());
    }

    #[test]
    fn test_evaluate_fail_behavior_refuses() {
        let checker = CapacityChecker::new(5.0, DiskCheckBehavior::Fail);
        let err = checker
            .evaluate(Path::new("/tmp"), usage(2, 100))
            .unwrap_err();
        assert!(matches!(err, AppError::InsufficientDiskSpace { .. }));
        assert_eq!(err.http_status_code(), 507);
    }

    #[test]
    fn test_evaluate_warn_behavior_allows() {
        let checker = CapacityChecker::new(5.0, DiskCheckBehavior::Warn);
        assert!(checker.evaluate(Path::new("/tmp"), usage(2, 100)).is_ok());
    }

    #[tokio::test]
    async fn test_zero_threshold_always_passes() {
        let dir = tempfile::tempdir().unwrap();
        let checker = CapacityChecker::new(0.0, DiskCheckBehavior::Fail);
        assert!(checker.ensure_capacity(dir.path()).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_path_is_allowed() {
        let checker = CapacityChecker::new(100.0, DiskCheckBehavior::Fail);
        assert!(checker
            .ensure_capacity(Path::new("/definitely/not/a/real/path"))
            .await
            .is_ok());
    }
}
