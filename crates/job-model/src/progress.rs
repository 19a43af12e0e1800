//! Durable per-video completion records.
//!
//! The store is a single JSON document rewritten after every completed job.
//! Writes go to a temporary sibling file that is then renamed over the
//! store, so a crash leaves either the old or the new document on disk.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Schema version written to new progress files.
pub const PROGRESS_SCHEMA_VERSION: &str = "1.0";

/// Completion status of one source video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Done,
    Failed,
}

/// What the store remembers about one source video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub status: ProgressStatus,

    /// Descriptor hash of the job that produced this record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_hash: Option<String>,

    /// RFC 3339 timestamp of when the record was written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,

    /// Source frames processed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frames: Option<u64>,

    /// Output files written for this video.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<String>,

    /// Failure diagnostic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProgressRecord {
    /// Record for a fully extracted video.
    pub fn done(job_hash: impl Into<String>, frames: u64, outputs: Vec<String>) -> Self {
        Self {
            status: ProgressStatus::Done,
            job_hash: Some(job_hash.into()),
            completed_at: Some(chrono::Utc::now().to_rfc3339()),
            frames: Some(frames),
            outputs,
            error: None,
        }
    }

    /// Record for a video whose extraction failed.
    pub fn failed(job_hash: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            status: ProgressStatus::Failed,
            job_hash: Some(job_hash.into()),
            completed_at: Some(chrono::Utc::now().to_rfc3339()),
            frames: None,
            outputs: vec![],
            error: Some(error.into()),
        }
    }

    fn legacy_done() -> Self {
        Self {
            status: ProgressStatus::Done,
            job_hash: None,
            completed_at: None,
            frames: None,
            outputs: vec![],
            error: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ProgressFile {
    version: String,
    videos: BTreeMap<String, ProgressRecord>,
}

/// Errors that can occur when reading or writing the progress store.
#[derive(Debug, thiserror::Error)]
pub enum ProgressError {
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Parse error in {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Durable mapping `video_id -> ProgressRecord`.
#[derive(Debug, Clone)]
pub struct ProgressStore {
    path: PathBuf,
    videos: BTreeMap<String, ProgressRecord>,
}

impl ProgressStore {
    /// Open the store at `path`. A missing file is an empty store; a file
    /// that cannot be parsed is an error.
    ///
    /// Flat `{ "video": {...} }` documents written by earlier tooling are
    /// accepted and every key is treated as done.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ProgressError> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Ok(Self {
                path,
                videos: BTreeMap::new(),
            });
        }

        let content = std::fs::read_to_string(&path).map_err(|e| ProgressError::IoError {
            path: path.clone(),
            source: e,
        })?;
        let value: serde_json::Value =
            serde_json::from_str(&content).map_err(|e| ProgressError::ParseError {
                path: path.clone(),
                source: e,
            })?;

        let is_versioned = value.get("version").is_some() && value.get("videos").is_some();
        let videos = if is_versioned {
            let file: ProgressFile =
                serde_json::from_value(value).map_err(|e| ProgressError::ParseError {
                    path: path.clone(),
                    source: e,
                })?;
            file.videos
        } else {
            let legacy: BTreeMap<String, serde_json::Value> = serde_json::from_value(value)
                .map_err(|e| ProgressError::ParseError {
                    path: path.clone(),
                    source: e,
                })?;
            tracing::info!(
                path = %path.display(),
                entries = legacy.len(),
                "Upgrading legacy progress file"
            );
            legacy
                .into_keys()
                .map(|video| (video, ProgressRecord::legacy_done()))
                .collect()
        };

        Ok(Self { path, videos })
    }

    /// Location of the store on disk.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the video has completed extraction.
    pub fn is_done(&self, video_id: &str) -> bool {
        self.videos
            .get(video_id)
            .is_some_and(|record| record.status == ProgressStatus::Done)
    }

    pub fn get(&self, video_id: &str) -> Option<&ProgressRecord> {
        self.videos.get(video_id)
    }

    /// All records, ordered by video id.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &ProgressRecord)> {
        self.videos.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.videos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.videos.is_empty()
    }

    /// Number of videos marked done.
    pub fn done_count(&self) -> usize {
        self.videos
            .values()
            .filter(|r| r.status == ProgressStatus::Done)
            .count()
    }

    /// Record a completed video and persist before returning.
    pub fn record_done(
        &mut self,
        video_id: impl Into<String>,
        record: ProgressRecord,
    ) -> Result<(), ProgressError> {
        self.videos.insert(video_id.into(), record);
        self.save()
    }

    /// Record a failed video and persist. A video already marked done keeps
    /// its done record.
    pub fn record_failed(
        &mut self,
        video_id: impl Into<String>,
        record: ProgressRecord,
    ) -> Result<(), ProgressError> {
        let video_id = video_id.into();
        if self.is_done(&video_id) {
            tracing::warn!(video = %video_id, "Ignoring failure record for a completed video");
            return Ok(());
        }
        self.videos.insert(video_id, record);
        self.save()
    }

    /// Forget one video. Returns whether an entry existed.
    pub fn reset(&mut self, video_id: &str) -> Result<bool, ProgressError> {
        let existed = self.videos.remove(video_id).is_some();
        if existed {
            self.save()?;
        }
        Ok(existed)
    }

    /// Forget every video.
    pub fn reset_all(&mut self) -> Result<usize, ProgressError> {
        let count = self.videos.len();
        self.videos.clear();
        self.save()?;
        Ok(count)
    }

    /// Write the store to disk atomically.
    pub fn save(&self) -> Result<(), ProgressError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ProgressError::IoError {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let file = ProgressFile {
            version: PROGRESS_SCHEMA_VERSION.to_string(),
            videos: self.videos.clone(),
        };
        let json = serde_json::to_string_pretty(&file).map_err(|e| ProgressError::ParseError {
            path: self.path.clone(),
            source: e,
        })?;

        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, json).map_err(|e| ProgressError::IoError {
            path: tmp_path.clone(),
            source: e,
        })?;
        std::fs::rename(&tmp_path, &self.path).map_err(|e| ProgressError::IoError {
            path: self.path.clone(),
            source: e,
        })?;
        Ok(())
    }
}
