//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{CropError, CropResult};

/// Global application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Input/output locations.
    pub paths: PathsConfig,

    /// Job and extraction parameters.
    pub job: JobDefaults,

    /// Subject table layout.
    pub metadata: MetadataConfig,

    /// Output encoder settings.
    pub encoder: EncoderConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Filesystem locations used by a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory holding the wide-shot source recordings.
    pub video_dir: PathBuf,

    /// Directory receiving the per-subject crops.
    pub output_dir: PathBuf,

    /// CSV subject table.
    pub metadata_path: PathBuf,

    /// Durable progress record.
    pub progress_file: PathBuf,
}

/// Extraction parameters shared by every job of a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobDefaults {
    /// Number of subjects (boxes) per recording.
    pub num_subjects: usize,

    /// Frame rate written to every output stream. Not derived from the
    /// source; set it to the intended playback rate.
    pub output_fps: u32,

    /// Scale of the annotation display relative to source pixels.
    pub display_scale: f64,

    /// Recognized source file extensions (case-insensitive).
    pub video_extensions: Vec<String>,
}

/// Column layout of the subject table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    /// Column holding the video identifier.
    pub filename_column: String,

    /// Prefix of the subject columns (`Pos1`, `Pos2`, ...).
    pub subject_column_prefix: String,
}

/// Encoder settings for the output streams.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// ffmpeg video codec.
    pub codec: String,

    /// Output pixel format. `yuv420p` requires even box dimensions.
    pub pixel_format: String,

    /// Constant rate factor.
    pub crf: u32,

    /// Encoder preset.
    pub preset: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "arenacrop=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            video_dir: PathBuf::from("videos"),
            output_dir: PathBuf::from("cropped"),
            metadata_path: PathBuf::from("metadata.csv"),
            progress_file: PathBuf::from("progress_drift.json"),
        }
    }
}

impl Default for JobDefaults {
    fn default() -> Self {
        Self {
            num_subjects: 15,
            output_fps: 60,
            display_scale: 0.5,
            video_extensions: vec!["mov".to_string(), "mp4".to_string(), "avi".to_string()],
        }
    }
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            filename_column: "file name".to_string(),
            subject_column_prefix: "Pos".to_string(),
        }
    }
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            codec: "libx264".to_string(),
            pixel_format: "yuv444p".to_string(),
            crf: 18,
            preset: "medium".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match Self::load_from(&config_path) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!("Failed to load config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Load config from an explicit path. Errors are reported, not masked.
    pub fn load_from(path: impl AsRef<Path>) -> CropResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            CropError::config(format!("Failed to read {}: {e}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&content).map_err(|e| {
            CropError::config(format!("Failed to parse {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        self.save_to(config_file_path())
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<(), std::io::Error> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    /// Reject values the pipeline cannot work with.
    pub fn validate(&self) -> CropResult<()> {
        if self.job.num_subjects == 0 {
            return Err(CropError::config("job.num_subjects must be at least 1"));
        }
        if self.job.output_fps == 0 {
            return Err(CropError::config("job.output_fps must be at least 1"));
        }
        if self.job.display_scale.is_nan() || self.job.display_scale <= 0.0 {
            return Err(CropError::config("job.display_scale must be positive"));
        }
        if self.job.video_extensions.is_empty() {
            return Err(CropError::config("job.video_extensions must not be empty"));
        }
        Ok(())
    }

    /// Whether a file name carries one of the recognized video extensions.
    pub fn is_video_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                self.job
                    .video_extensions
                    .iter()
                    .any(|known| known.eq_ignore_ascii_case(ext))
            })
            .unwrap_or(false)
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("arenacrop").join("config.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_arena_setup() {
        let config = AppConfig::default();
        assert_eq!(config.job.num_subjects, 15);
        assert_eq!(config.job.output_fps, 60);
        assert_eq!(config.metadata.filename_column, "file name");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"job": {"num_subjects": 4}}"#).unwrap();
        assert_eq!(config.job.num_subjects, 4);
        assert_eq!(config.job.output_fps, 60);
        assert_eq!(config.encoder.codec, "libx264");
    }

    #[test]
    fn test_validate_rejects_zero_fps() {
        let mut config = AppConfig::default();
        config.job.output_fps = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_video_extension_match_is_case_insensitive() {
        let config = AppConfig::default();
        assert!(config.is_video_file(Path::new("trial.MOV")));
        assert!(config.is_video_file(Path::new("dir/trial.mp4")));
        assert!(!config.is_video_file(Path::new("notes.txt")));
        assert!(!config.is_video_file(Path::new("noext")));
    }

    #[test]
    fn test_load_from_reports_parse_errors() {
        let dir = std::env::temp_dir().join("arenacrop_test_config");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            AppConfig::load_from(&path),
            Err(CropError::Config { .. })
        ));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_saved_config_loads_back() {
        let dir = std::env::temp_dir().join("arenacrop_test_config_save");
        let _ = std::fs::remove_dir_all(&dir);
        let path = dir.join("nested").join("config.json");

        let mut config = AppConfig::default();
        config.job.num_subjects = 6;
        config.encoder.crf = 22;
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.job.num_subjects, 6);
        assert_eq!(loaded.encoder.crf, 22);
        std::fs::remove_dir_all(&dir).ok();
    }
}
