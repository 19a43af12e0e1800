//! Error types shared across ArenaCrop crates.

use std::path::PathBuf;

/// Top-level error type for ArenaCrop operations.
#[derive(Debug, thiserror::Error)]
pub enum CropError {
    #[error("No metadata row matches video '{video_id}': {reason}")]
    MissingMetadataRow { video_id: String, reason: String },

    #[error("Expected {expected} confirmed boxes, got {actual}")]
    InvalidBoxCount { expected: usize, actual: usize },

    #[error("Cannot open {path} for decoding: {message}")]
    DecodeOpen { path: PathBuf, message: String },

    #[error("Decode error: {message}")]
    Decode { message: String },

    #[error("Write to {path} failed: {message}")]
    Write { path: PathBuf, message: String },

    #[error("Metadata error: {message}")]
    Metadata { message: String },

    #[error("Progress store error: {message}")]
    Progress { message: String },

    #[error("Annotation error: {message}")]
    Annotation { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Result type alias using CropError.
pub type CropResult<T> = Result<T, CropError>;

impl CropError {
    pub fn missing_metadata_row(video_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MissingMetadataRow {
            video_id: video_id.into(),
            reason: reason.into(),
        }
    }

    pub fn decode_open(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::DecodeOpen {
            path: path.into(),
            message: msg.into(),
        }
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode {
            message: msg.into(),
        }
    }

    pub fn write(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::Write {
            path: path.into(),
            message: msg.into(),
        }
    }

    pub fn metadata(msg: impl Into<String>) -> Self {
        Self::Metadata {
            message: msg.into(),
        }
    }

    pub fn progress(msg: impl Into<String>) -> Self {
        Self::Progress {
            message: msg.into(),
        }
    }

    pub fn annotation(msg: impl Into<String>) -> Self {
        Self::Annotation {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Whether the failure only affects the current video (the batch may
    /// continue with the next one).
    pub fn is_video_skip(&self) -> bool {
        matches!(
            self,
            Self::MissingMetadataRow { .. }
                | Self::InvalidBoxCount { .. }
                | Self::DecodeOpen { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_classification() {
        assert!(CropError::missing_metadata_row("a.mp4", "no row").is_video_skip());
        assert!(CropError::decode_open("a.mp4", "ffprobe failed").is_video_skip());
        assert!(CropError::InvalidBoxCount {
            expected: 15,
            actual: 14
        }
        .is_video_skip());
        assert!(!CropError::write("out/A_a.mp4", "broken pipe").is_video_skip());
        assert!(!CropError::decode("decoder exited with status 1").is_video_skip());
    }

    #[test]
    fn test_display_names_offending_identifier() {
        let err = CropError::missing_metadata_row("trial_07.mov", "no matching row");
        assert!(err.to_string().contains("trial_07.mov"));
    }
}
