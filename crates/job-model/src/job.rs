//! Confirmed jobs and the FIFO job queue.
//!
//! A [`Job`] is produced once, at confirmation time, and is never mutated
//! afterwards. The batch phase consumes jobs from a [`JobQueue`] in the
//! order they were confirmed.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::drift::DriftVector;
use crate::region::{box_name, CropBox};

/// Errors that prevent a job from being confirmed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobError {
    #[error("Expected {expected} boxes, {actual} confirmed")]
    InvalidBoxCount { expected: usize, actual: usize },

    #[error("{boxes} boxes but {subjects} subject labels")]
    SubjectCountMismatch { boxes: usize, subjects: usize },

    #[error("Video identifier is empty")]
    EmptyVideoId,
}

/// One fully-annotated unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Job {
    video_id: String,
    #[serde(skip)]
    source: PathBuf,
    boxes: Vec<CropBox>,
    subjects: Vec<String>,
    drift: DriftVector,
}

impl Job {
    /// Confirm a job. Box `i` is renamed to its positional name and
    /// labelled with `subjects[i]`.
    pub fn confirm(
        video_id: impl Into<String>,
        source: impl Into<PathBuf>,
        boxes: Vec<CropBox>,
        subjects: Vec<String>,
        drift: DriftVector,
        expected_boxes: usize,
    ) -> Result<Self, JobError> {
        let video_id = video_id.into();
        if video_id.trim().is_empty() {
            return Err(JobError::EmptyVideoId);
        }
        if boxes.len() != expected_boxes {
            return Err(JobError::InvalidBoxCount {
                expected: expected_boxes,
                actual: boxes.len(),
            });
        }
        if subjects.len() != boxes.len() {
            return Err(JobError::SubjectCountMismatch {
                boxes: boxes.len(),
                subjects: subjects.len(),
            });
        }

        let boxes = boxes
            .iter()
            .zip(&subjects)
            .enumerate()
            .map(|(i, (b, subject))| b.relabeled(box_name(i), subject.clone()))
            .collect();

        Ok(Self {
            video_id,
            source: source.into(),
            boxes,
            subjects,
            drift,
        })
    }

    /// Source file name, the key of the progress store.
    pub fn video_id(&self) -> &str {
        &self.video_id
    }

    /// Path of the source recording.
    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn boxes(&self) -> &[CropBox] {
        &self.boxes
    }

    pub fn subjects(&self) -> &[String] {
        &self.subjects
    }

    pub fn drift(&self) -> DriftVector {
        self.drift
    }

    /// Normalized identifier used for output naming.
    pub fn normalized_id(&self) -> String {
        normalized_video_id(&self.video_id)
    }

    /// Output file names, one per box, in box order.
    ///
    /// `{subject}_{normalized_id}.mp4`; an empty subject falls back to the
    /// box id and a repeated name gets the box id appended, so no two
    /// streams of a job share a file.
    pub fn output_file_names(&self) -> Vec<String> {
        let stem = self.normalized_id();
        let mut seen = HashSet::new();
        self.boxes
            .iter()
            .map(|b| {
                let subject = if b.label().is_empty() {
                    b.id()
                } else {
                    b.label()
                };
                let mut name = format!("{subject}_{stem}.mp4");
                if !seen.insert(name.clone()) {
                    name = format!("{subject}_{}_{stem}.mp4", b.id());
                    seen.insert(name.clone());
                }
                name
            })
            .collect()
    }

    /// Stable hex digest of the job descriptor (video id, boxes, subjects,
    /// drift), recorded alongside progress entries for auditing.
    pub fn descriptor_hash(&self) -> String {
        let descriptor = serde_json::to_string(self).unwrap_or_default();
        format!("{:016x}", fnv1a_64(descriptor.as_bytes()))
    }
}

/// File stem of a video file name, trimmed of surrounding whitespace.
pub fn normalized_video_id(video_id: &str) -> String {
    Path::new(video_id)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(video_id)
        .trim()
        .to_string()
}

fn fnv1a_64(input: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in input {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

/// Confirmed jobs awaiting extraction, in strict FIFO order.
#[derive(Debug, Clone, Default)]
pub struct JobQueue {
    jobs: VecDeque<Job>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a confirmed job.
    pub fn push(&mut self, job: Job) {
        tracing::debug!(video = job.video_id(), queued = self.jobs.len() + 1, "Job queued");
        self.jobs.push_back(job);
    }

    /// Take the oldest job.
    pub fn pop(&mut self) -> Option<Job> {
        self.jobs.pop_front()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Queued jobs, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter()
    }

    /// Whether a job for this video is already queued.
    pub fn contains(&self, video_id: &str) -> bool {
        self.jobs.iter().any(|job| job.video_id() == video_id)
    }
}

impl IntoIterator for JobQueue {
    type Item = Job;
    type IntoIter = std::collections::vec_deque::IntoIter<Job>;

    fn into_iter(self) -> Self::IntoIter {
        self.jobs.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boxes(n: usize) -> Vec<CropBox> {
        (0..n)
            .map(|i| {
                let x = i as u32 * 100;
                CropBox::new("tmp", "", x, 0, x + 80, 60).unwrap()
            })
            .collect()
    }

    fn subjects(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_confirm_assigns_names_and_labels() {
        let job = Job::confirm(
            "trial_01.mp4",
            "videos/trial_01.mp4",
            boxes(3),
            subjects(&["r1", "r2", "r3"]),
            DriftVector::ZERO,
            3,
        )
        .unwrap();

        let ids: Vec<_> = job.boxes().iter().map(|b| b.id()).collect();
        let labels: Vec<_> = job.boxes().iter().map(|b| b.label()).collect();
        assert_eq!(ids, vec!["A", "B", "C"]);
        assert_eq!(labels, vec!["r1", "r2", "r3"]);
        assert_eq!(job.normalized_id(), "trial_01");
    }

    #[test]
    fn test_confirm_rejects_wrong_box_count() {
        let err = Job::confirm(
            "trial.mp4",
            "trial.mp4",
            boxes(2),
            subjects(&["a", "b"]),
            DriftVector::ZERO,
            3,
        )
        .unwrap_err();
        assert_eq!(
            err,
            JobError::InvalidBoxCount {
                expected: 3,
                actual: 2
            }
        );
    }

    #[test]
    fn test_confirm_rejects_subject_mismatch() {
        let err = Job::confirm(
            "trial.mp4",
            "trial.mp4",
            boxes(2),
            subjects(&["a"]),
            DriftVector::ZERO,
            2,
        )
        .unwrap_err();
        assert!(matches!(err, JobError::SubjectCountMismatch { .. }));
    }

    #[test]
    fn test_output_names_are_unique() {
        let job = Job::confirm(
            " day3 .avi",
            "day3.avi",
            boxes(3),
            subjects(&["m7", "", "m7"]),
            DriftVector::ZERO,
            3,
        )
        .unwrap();
        assert_eq!(
            job.output_file_names(),
            vec!["m7_day3.mp4", "B_day3.mp4", "m7_C_day3.mp4"]
        );
    }

    #[test]
    fn test_descriptor_hash_tracks_content() {
        let make = |drift| {
            Job::confirm(
                "t.mp4",
                "t.mp4",
                boxes(2),
                subjects(&["a", "b"]),
                drift,
                2,
            )
            .unwrap()
        };
        assert_eq!(
            make(DriftVector::ZERO).descriptor_hash(),
            make(DriftVector::ZERO).descriptor_hash()
        );
        assert_ne!(
            make(DriftVector::ZERO).descriptor_hash(),
            make(DriftVector::new(3, 0)).descriptor_hash()
        );
        assert_eq!(make(DriftVector::ZERO).descriptor_hash().len(), 16);
    }

    #[test]
    fn test_queue_is_fifo() {
        let mut queue = JobQueue::new();
        for name in ["a.mp4", "b.mp4", "c.mp4"] {
            queue.push(
                Job::confirm(name, name, boxes(1), subjects(&["s"]), DriftVector::ZERO, 1)
                    .unwrap(),
            );
        }
        assert_eq!(queue.len(), 3);
        assert!(queue.contains("b.mp4"));
        assert_eq!(queue.pop().unwrap().video_id(), "a.mp4");

        let rest: Vec<_> = queue.into_iter().map(|j| j.video_id().to_string()).collect();
        assert_eq!(rest, vec!["b.mp4", "c.mp4"]);
    }
}
