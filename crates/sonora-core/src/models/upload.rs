use serde::{Deserialize, Serialize};

/// Bytes received so far for one in-flight upload.
///
/// `bytes_total` is 0 while the total size is unknown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadProgress {
    pub unique_id: String,
    pub bytes_received: u64,
    pub bytes_total: u64,
}

impl UploadProgress {
    pub fn is_complete(&self) -> bool {
        self.bytes_total > 0 && self.bytes_received >= self.bytes_total
    }

    /// Percentage received, or `None` while the total is unknown
    pub fn percent(&self) -> Option<f64> {
        if self.bytes_total == 0 {
            return None;
        }
        Some((self.bytes_received as f64 / self.bytes_total as f64 * 100.0).min(100.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_progress_percent() {
        let progress = UploadProgress {
            unique_id: "abc".to_string(),
            bytes_received: 25,
            bytes_total: 100,
        };
        assert_eq!(progress.percent(), Some(25.0));
        assert!(!progress.is_complete());
    }

    #[test]
    fn test_upload_progress_unknown_total() {
        let progress = UploadProgress {
            unique_id: "abc".to_string(),
            bytes_received: 4096,
            bytes_total: 0,
        };
        assert_eq!(progress.percent(), None);
        assert!(!progress.is_complete());
    }

    #[test]
    fn test_upload_progress_serializes_counters() {
        let progress = UploadProgress {
            unique_id: "abc".to_string(),
            bytes_received: 10,
            bytes_total: 10,
        };
        let json = serde_json::to_value(&progress).unwrap();
        assert_eq!(json["bytes_received"], 10);
        assert_eq!(json["bytes_total"], 10);
        assert!(progress.is_complete());
    }
}
