//! Batch runner: discovery, planning, the annotation phase, and the
//! sequential extraction phase.

use std::path::{Path, PathBuf};

use arenacrop_common::config::AppConfig;
use arenacrop_common::error::{CropError, CropResult};
use arenacrop_job_model::job::{normalized_video_id, JobQueue};
use arenacrop_job_model::metadata::{MetadataError, SubjectColumns, SubjectTable};
use arenacrop_job_model::progress::{ProgressError, ProgressRecord, ProgressStore};
use arenacrop_processing_core::annotation::{
    AnnotationOutcome, AnnotationRequest, Annotator, JobTemplate,
};

use crate::backend::MediaBackend;
use crate::dispatcher::extract_job;
use crate::progress::ProgressCallback;

/// Where a discovered video stands before annotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanStatus {
    Done,
    Pending { subjects: Vec<String> },
    MissingMetadata { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanEntry {
    pub video_id: String,
    pub path: PathBuf,
    pub status: PlanStatus,
}

/// A video left out of the batch, with the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedVideo {
    pub video_id: String,
    pub reason: String,
}

/// Result of the annotation phase.
#[derive(Debug, Default)]
pub struct AnnotationReport {
    pub queue: JobQueue,
    pub skipped: Vec<SkippedVideo>,
    /// The operator stopped before every pending video was seen.
    pub aborted: bool,
}

/// Result of a completed extraction phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub completed: Vec<String>,
    pub skipped: Vec<SkippedVideo>,
    /// Source frames processed across all completed jobs.
    pub frames: u64,
}

/// List recognized video files in `dir`, sorted by file name.
pub fn discover_videos(dir: &Path, config: &AppConfig) -> CropResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(CropError::FileNotFound {
            path: dir.to_path_buf(),
        });
    }
    let mut videos = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && config.is_video_file(&path) {
            videos.push(path);
        }
    }
    videos.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(videos)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn progress_error(err: ProgressError) -> CropError {
    CropError::progress(err.to_string())
}

fn metadata_error(err: MetadataError) -> CropError {
    match err {
        MetadataError::MissingRow { video_id, reason } => {
            CropError::missing_metadata_row(video_id, reason)
        }
        MetadataError::NotFound { path } => CropError::FileNotFound { path },
        other => CropError::metadata(other.to_string()),
    }
}

/// Drives both phases of a batch over one video directory.
pub struct BatchRunner<B: MediaBackend> {
    config: AppConfig,
    backend: B,
    subjects: SubjectTable,
    store: ProgressStore,
}

impl<B: MediaBackend> BatchRunner<B> {
    /// Load the subject table and progress store named by `config`.
    pub fn new(config: AppConfig, backend: B) -> CropResult<Self> {
        let columns = SubjectColumns {
            filename_column: config.metadata.filename_column.clone(),
            subject_prefix: config.metadata.subject_column_prefix.clone(),
            num_subjects: config.job.num_subjects,
        };
        let subjects =
            SubjectTable::load(&config.paths.metadata_path, columns).map_err(metadata_error)?;
        let store = ProgressStore::open(&config.paths.progress_file).map_err(progress_error)?;
        tracing::info!(
            backend = backend.name(),
            metadata_rows = subjects.len(),
            done = store.done_count(),
            "Batch runner ready"
        );
        Ok(Self::with_parts(config, backend, subjects, store))
    }

    pub fn with_parts(
        config: AppConfig,
        backend: B,
        subjects: SubjectTable,
        store: ProgressStore,
    ) -> Self {
        Self {
            config,
            backend,
            subjects,
            store,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn store(&self) -> &ProgressStore {
        &self.store
    }

    /// Candidate source videos, in processing order.
    pub fn discover(&self) -> CropResult<Vec<PathBuf>> {
        discover_videos(&self.config.paths.video_dir, &self.config)
    }

    /// Subject labels for a source file name.
    pub fn subjects_for(&self, video_id: &str) -> CropResult<Vec<String>> {
        self.subjects
            .subjects_for(&normalized_video_id(video_id))
            .map_err(metadata_error)
    }

    /// Classify every discovered video.
    pub fn plan(&self) -> CropResult<Vec<PlanEntry>> {
        Ok(self
            .discover()?
            .into_iter()
            .map(|path| {
                let video_id = file_name(&path);
                let status = if self.store.is_done(&video_id) {
                    PlanStatus::Done
                } else {
                    match self.subjects_for(&video_id) {
                        Ok(subjects) => PlanStatus::Pending { subjects },
                        Err(err) => PlanStatus::MissingMetadata {
                            reason: err.to_string(),
                        },
                    }
                };
                PlanEntry {
                    video_id,
                    path,
                    status,
                }
            })
            .collect())
    }

    /// Ask `annotator` for a job for every pending video, in order.
    ///
    /// Sources that cannot be opened are skipped before annotation. Stops early, keeping the jobs confirmed so far, when the annotator
    /// aborts.
    pub fn annotation_phase(
        &self,
        annotator: &mut dyn Annotator,
    ) -> CropResult<AnnotationReport> {
        let mut report = AnnotationReport::default();
        let mut previous: Option<JobTemplate> = None;

        for entry in self.plan()? {
            let subjects = match entry.status {
                PlanStatus::Done => {
                    tracing::debug!(video = %entry.video_id, "Already done, skipping");
                    continue;
                }
                PlanStatus::MissingMetadata { reason } => {
                    tracing::warn!(video = %entry.video_id, %reason, "Skipping video");
                    report.skipped.push(SkippedVideo {
                        video_id: entry.video_id,
                        reason,
                    });
                    continue;
                }
                PlanStatus::Pending { subjects } => subjects,
            };

            let info = match self.backend.open_source(&entry.path) {
                Ok(source) => source.info().clone(),
                Err(err) if err.is_video_skip() => {
                    tracing::warn!(
                        video = %entry.video_id,
                        error = %err,
                        "Cannot open source, skipping"
                    );
                    report.skipped.push(SkippedVideo {
                        video_id: entry.video_id,
                        reason: err.to_string(),
                    });
                    continue;
                }
                Err(err) => return Err(err),
            };

            let request = AnnotationRequest {
                video_id: entry.video_id.clone(),
                source: entry.path,
                frame_size: (info.width, info.height),
                frame_count: info.frame_count,
                subjects,
                display_scale: self.config.job.display_scale,
                previous: previous.clone(),
            };

            let outcome = match annotator.annotate(&request) {
                Ok(outcome) => outcome,
                Err(err) if err.is_video_skip() => AnnotationOutcome::Skipped {
                    reason: err.to_string(),
                },
                Err(err) => return Err(err),
            };

            match outcome {
                AnnotationOutcome::Confirmed(job) => {
                    previous = Some(JobTemplate::from_job(&job));
                    report.queue.push(job);
                }
                AnnotationOutcome::Skipped { reason } => {
                    tracing::warn!(video = %entry.video_id, %reason, "Annotation skipped");
                    report.skipped.push(SkippedVideo {
                        video_id: entry.video_id,
                        reason,
                    });
                }
                AnnotationOutcome::Aborted => {
                    tracing::info!(
                        video = %entry.video_id,
                        queued = report.queue.len(),
                        "Annotation aborted; remaining videos left for a later run"
                    );
                    report.aborted = true;
                    break;
                }
            }
        }

        tracing::info!(
            queued = report.queue.len(),
            skipped = report.skipped.len(),
            aborted = report.aborted,
            "Annotation phase finished"
        );
        Ok(report)
    }

    /// Extract every queued job, one at a time, recording each as done
    /// before starting the next.
    ///
    /// A source that cannot be opened is recorded as failed and skipped. Any
    /// other failure is recorded as failed and aborts the batch.
    pub fn run_batch(
        &mut self,
        mut queue: JobQueue,
        progress: Option<ProgressCallback>,
    ) -> CropResult<BatchReport> {
        let output_dir = self.config.paths.output_dir.clone();
        std::fs::create_dir_all(&output_dir).map_err(|e| {
            CropError::write(&output_dir, format!("Cannot create output directory: {e}"))
        })?;
        let fps = f64::from(self.config.job.output_fps);
        let mut report = BatchReport::default();

        while let Some(job) = queue.pop() {
            let video_id = job.video_id().to_string();
            if self.store.is_done(&video_id) {
                tracing::info!(video = %video_id, "Already done, skipping");
                continue;
            }

            let hash = job.descriptor_hash();
            match extract_job(&self.backend, &job, &output_dir, fps, progress.as_ref()) {
                Ok(summary) => {
                    let outputs = summary.outputs.iter().map(|p| file_name(p)).collect();
                    self.store
                        .record_done(
                            video_id.clone(),
                            ProgressRecord::done(hash, summary.frames, outputs),
                        )
                        .map_err(progress_error)?;
                    tracing::info!(video = %video_id, frames = summary.frames, "Video done");
                    report.frames += summary.frames;
                    report.completed.push(video_id);
                }
                Err(err) if err.is_video_skip() => {
                    tracing::warn!(video = %video_id, error = %err, "Skipping video");
                    self.store
                        .record_failed(video_id.clone(), ProgressRecord::failed(hash, err.to_string()))
                        .map_err(progress_error)?;
                    report.skipped.push(SkippedVideo {
                        video_id,
                        reason: err.to_string(),
                    });
                }
                Err(err) => {
                    tracing::error!(
                        video = %video_id,
                        error = %err,
                        completed = report.completed.len(),
                        remaining = queue.len(),
                        "Aborting batch"
                    );
                    if let Err(store_err) = self
                        .store
                        .record_failed(video_id.clone(), ProgressRecord::failed(hash, err.to_string()))
                    {
                        tracing::error!(video = %video_id, error = %store_err, "Cannot record failure");
                    }
                    return Err(err);
                }
            }
        }

        tracing::info!(
            completed = report.completed.len(),
            skipped = report.skipped.len(),
            frames = report.frames,
            "Batch finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;
    use arenacrop_job_model::drift::DriftVector;
    use arenacrop_job_model::job::Job;
    use arenacrop_job_model::region::CropBox;
    use arenacrop_processing_core::replay::{ReplayAnnotator, ReplayEntry};
    use image::{Rgb, RgbImage};

    fn workspace(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("arenacrop_test_batch_{name}"));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(dir.join("videos")).unwrap();
        dir
    }

    fn config(dir: &Path) -> AppConfig {
        let mut config = AppConfig::default();
        config.paths.video_dir = dir.join("videos");
        config.paths.output_dir = dir.join("out");
        config.paths.progress_file = dir.join("progress.json");
        config.job.num_subjects = 2;
        config
    }

    fn table() -> SubjectTable {
        SubjectTable::from_reader(
            "file name,Pos1,Pos2\nb_trial,r3,r4\na_trial,r1,r2\n".as_bytes(),
            SubjectColumns {
                filename_column: "file name".to_string(),
                subject_prefix: "Pos".to_string(),
                num_subjects: 2,
            },
        )
        .unwrap()
    }

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join("videos").join(name);
        std::fs::write(&path, b"").unwrap();
        path
    }

    #[test]
    fn test_discover_filters_and_sorts() {
        let dir = workspace("discover");
        touch(&dir, "b_trial.MOV");
        touch(&dir, "a_trial.mp4");
        touch(&dir, "notes.txt");

        let runner = BatchRunner::with_parts(
            config(&dir),
            MemoryBackend::new(),
            table(),
            ProgressStore::open(dir.join("progress.json")).unwrap(),
        );
        let names: Vec<String> = runner.discover().unwrap().iter().map(|p| file_name(p)).collect();
        assert_eq!(names, vec!["a_trial.mp4", "b_trial.MOV"]);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_plan_classifies_videos() {
        let dir = workspace("plan");
        touch(&dir, "a_trial.mp4");
        touch(&dir, "b_trial.mp4");
        touch(&dir, "z_unknown.mp4");

        let mut store = ProgressStore::open(dir.join("progress.json")).unwrap();
        store
            .record_done("b_trial.mp4", ProgressRecord::done("h", 1, vec![]))
            .unwrap();
        let runner = BatchRunner::with_parts(config(&dir), MemoryBackend::new(), table(), store);

        let plan = runner.plan().unwrap();
        assert_eq!(
            plan[0].status,
            PlanStatus::Pending {
                subjects: vec!["r1".to_string(), "r2".to_string()]
            }
        );
        assert_eq!(plan[1].status, PlanStatus::Done);
        assert!(matches!(plan[2].status, PlanStatus::MissingMetadata { .. }));
        std::fs::remove_dir_all(&dir).ok();
    }

    fn still_clip() -> Vec<RgbImage> {
        vec![RgbImage::from_pixel(16, 8, Rgb([9, 9, 9])); 3]
    }

    #[test]
    fn test_annotation_phase_respects_abort() {
        let dir = workspace("abort");
        let mut backend = MemoryBackend::new();
        backend.add_source(touch(&dir, "a_trial.mp4"), still_clip(), 60.0);
        backend.add_source(touch(&dir, "b_trial.mp4"), still_clip(), 60.0);

        let runner = BatchRunner::with_parts(
            config(&dir),
            backend,
            table(),
            ProgressStore::open(dir.join("progress.json")).unwrap(),
        );
        let mut annotator = ReplayAnnotator::from_entries([
            ReplayEntry {
                video: "a_trial.mp4".to_string(),
                boxes: vec![[0, 0, 4, 4], [4, 0, 8, 4]],
                drift: None,
                copy_previous: false,
                abort: false,
            },
            ReplayEntry {
                video: "b_trial.mp4".to_string(),
                boxes: vec![],
                drift: None,
                copy_previous: false,
                abort: true,
            },
        ]);

        let report = runner.annotation_phase(&mut annotator).unwrap();
        assert!(report.aborted);
        assert_eq!(report.queue.len(), 1);
        assert!(report.queue.contains("a_trial.mp4"));
        std::fs::remove_dir_all(&dir).ok();
    }

    fn entry(video: &str) -> ReplayEntry {
        ReplayEntry {
            video: video.to_string(),
            boxes: vec![[0, 0, 4, 4], [4, 0, 8, 4]],
            drift: None,
            copy_previous: false,
            abort: false,
        }
    }

    #[test]
    fn test_unopenable_source_is_skipped_before_annotation() {
        let dir = workspace("skip_open");
        let a = touch(&dir, "a_trial.mp4");
        touch(&dir, "b_trial.mp4");

        let mut backend = MemoryBackend::new();
        backend.add_source_with_count(a, still_clip(), 60.0, None);
        let runner = BatchRunner::with_parts(
            config(&dir),
            backend,
            table(),
            ProgressStore::open(dir.join("progress.json")).unwrap(),
        );
        let mut annotator =
            ReplayAnnotator::from_entries([entry("a_trial.mp4"), entry("b_trial.mp4")]);

        let report = runner.annotation_phase(&mut annotator).unwrap();
        assert_eq!(report.queue.len(), 1);
        assert!(report.queue.contains("a_trial.mp4"));
        assert!(!report.queue.contains("b_trial.mp4"));
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].video_id, "b_trial.mp4");
        assert!(report.skipped[0].reason.contains("no such clip"));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_source_lost_before_extraction_is_skipped_not_fatal() {
        let dir = workspace("skip_extract");
        let a = touch(&dir, "a_trial.mp4");

        let mut backend = MemoryBackend::new();
        backend.add_source(a.clone(), still_clip(), 60.0);
        let mut runner = BatchRunner::with_parts(
            config(&dir),
            backend,
            table(),
            ProgressStore::open(dir.join("progress.json")).unwrap(),
        );
        let boxes = vec![
            CropBox::new("A", "", 0, 0, 4, 4).unwrap(),
            CropBox::new("B", "", 4, 0, 8, 4).unwrap(),
        ];
        let subjects = vec!["r1".to_string(), "r2".to_string()];
        let mut queue = JobQueue::new();
        queue.push(
            Job::confirm(
                "gone.mp4",
                dir.join("videos/gone.mp4"),
                boxes.clone(),
                subjects.clone(),
                DriftVector::ZERO,
                2,
            )
            .unwrap(),
        );
        queue.push(Job::confirm("a_trial.mp4", a, boxes, subjects, DriftVector::ZERO, 2).unwrap());

        let report = runner.run_batch(queue, None).unwrap();
        assert_eq!(report.completed, vec!["a_trial.mp4".to_string()]);
        assert_eq!(report.skipped.len(), 1);
        assert!(runner.store().is_done("a_trial.mp4"));
        assert!(!runner.store().is_done("gone.mp4"));
        std::fs::remove_dir_all(&dir).ok();
    }
}
