use std::path::Path;

use sonora_core::{AppError, ProcessingConfig};

/// Validation errors for a finished upload
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("File too large: {size} bytes (max: {max} bytes)")]
    FileTooLarge { size: u64, max: u64 },

    #[error("Invalid file extension: {extension} (allowed: {allowed:?})")]
    InvalidExtension {
        extension: String,
        allowed: Vec<String>,
    },

    #[error("Invalid filename: {0}")]
    InvalidFilename(String),

    #[error("Empty file")]
    EmptyFile,

    #[error("Cannot read uploaded file: {0}")]
    Unreadable(#[from] std::io::Error),
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::FileTooLarge { .. } => AppError::PayloadTooLarge(err.to_string()),
            ValidationError::Unreadable(_) => AppError::NotFound(err.to_string()),
            _ => AppError::InvalidInput(err.to_string()),
        }
    }
}

/// Checks a finished upload before the pipeline runs.
///
/// Unknown containers are left to the transcoder; only the extension
/// allowlist, emptiness and the size limit are enforced here.
pub struct AudioUploadValidator {
    max_file_size: u64,
    allowed_extensions: Vec<String>,
}

impl AudioUploadValidator {
    pub fn new(max_file_size: u64, allowed_extensions: Vec<String>) -> Self {
        Self {
            max_file_size,
            allowed_extensions: allowed_extensions
                .into_iter()
                .map(|e| e.to_lowercase())
                .collect(),
        }
    }

    pub fn from_config(config: &ProcessingConfig) -> Self {
        Self::new(
            config.max_audio_size_bytes as u64,
            config.audio_allowed_extensions.clone(),
        )
    }

    /// Validate file size
    pub fn validate_file_size(&self, size: u64) -> Result<(), ValidationError> {
        if size == 0 {
            return Err(ValidationError::EmptyFile);
        }

        if size > self.max_file_size {
            return Err(ValidationError::FileTooLarge {
                size,
                max: self.max_file_size,
            });
        }

        Ok(())
    }

    /// Validate file extension
    pub fn validate_extension(&self, filename: &str) -> Result<(), ValidationError> {
        let extension = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .ok_or_else(|| ValidationError::InvalidFilename(filename.to_string()))?;

        if !self.allowed_extensions.contains(&extension) {
            return Err(ValidationError::InvalidExtension {
                extension,
                allowed: self.allowed_extensions.clone(),
            });
        }

        Ok(())
    }

    /// Validate a file on disk: extension first, then size.
    pub async fn validate_file(&self, path: &Path) -> Result<u64, ValidationError> {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ValidationError::InvalidFilename(path.display().to_string()))?;
        self.validate_extension(filename)?;

        let size = tokio::fs::metadata(path).await?.len();
        self.validate_file_size(size)?;
        Ok(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sonora_core::ErrorMetadata;

    fn validator() -> AudioUploadValidator {
        AudioUploadValidator::new(
            1024,
            vec!["wav".to_string(), "FLAC".to_string(), "mp3".to_string()],
        )
    }

    #[test]
    fn test_validate_file_size() {
        let v = validator();
        assert!(v.validate_file_size(512).is_ok());
        assert!(matches!(
            v.validate_file_size(0),
            Err(ValidationError::EmptyFile)
        ));
        assert!(matches!(
            v.validate_file_size(2048),
            Err(ValidationError::FileTooLarge { size: 2048, max: 1024 })
        ));
    }

    #[test]
    fn test_validate_extension() {
        let v = validator();
        assert!(v.validate_extension("loop.WAV").is_ok());
        assert!(v.validate_extension("loop.flac").is_ok());
        assert!(matches!(
            v.validate_extension("loop.exe"),
            Err(ValidationError::InvalidExtension { .. })
        ));
        assert!(matches!(
            v.validate_extension("README"),
            Err(ValidationError::InvalidFilename(_))
        ));
    }

    #[test]
    fn test_validation_error_maps_to_app_error() {
        let err: AppError = ValidationError::FileTooLarge { size: 10, max: 1 }.into();
        assert_eq!(err.http_status_code(), 413);

        let err: AppError = ValidationError::EmptyFile.into();
        assert_eq!(err.error_code(), "INVALID_INPUT");
    }

    #[tokio::test]
    async fn test_validate_file_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let v = validator();

        let good = dir.path().join("take.wav");
        tokio::fs::write(&good, vec![1u8; 100]).await.unwrap();
        assert_eq!(v.validate_file(&good).await.unwrap(), 100);

        let empty = dir.path().join("empty.mp3");
        tokio::fs::write(&empty, b"").await.unwrap();
        assert!(matches!(
            v.validate_file(&empty).await,
            Err(ValidationError::EmptyFile)
        ));

        assert!(matches!(
            v.validate_file(&dir.path().join("missing.wav")).await,
            Err(ValidationError::Unreadable(_))
        ));
    }
}
