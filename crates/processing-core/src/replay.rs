//! Scripted annotator driven by a JSON annotation file.
//!
//! Each entry names a video and its boxes in source pixels, optionally a
//! drift measurement, a request to copy the previous job, or an abort
//! marker. Entries are replayed through an [`AnnotationSession`] exactly as
//! a UI would feed operator events, so the same validation applies.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use arenacrop_common::error::{CropError, CropResult};
use arenacrop_job_model::job::normalized_video_id;

use crate::annotation::{
    AnnotationError, AnnotationEvent, AnnotationOutcome, AnnotationRequest, AnnotationSession,
    Annotator, Transition, ViewMode,
};

/// Drift measurement as two source-pixel points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayDrift {
    pub start: [u32; 2],
    pub end: [u32; 2],
}

/// Annotation of one video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayEntry {
    /// Video file name, or its normalized identifier.
    pub video: String,

    /// Boxes as `[x1, y1, x2, y2]` corners, in subject order.
    #[serde(default)]
    pub boxes: Vec<[u32; 4]>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drift: Option<ReplayDrift>,

    /// Start from the previous video's boxes and drift.
    #[serde(default)]
    pub copy_previous: bool,

    /// Stop the annotation phase at this video.
    #[serde(default)]
    pub abort: bool,
}

impl ReplayEntry {
    /// Describe the first box reaching past a `(width, height)` frame. An
    /// unknown `(0, 0)` size accepts every box.
    fn out_of_frame(&self, (width, height): (u32, u32)) -> Option<String> {
        if (width, height) == (0, 0) {
            return None;
        }
        self.boxes.iter().enumerate().find_map(|(i, [x1, y1, x2, y2])| {
            ((*x1).max(*x2) > width || (*y1).max(*y2) > height)
                .then(|| format!("box {} lies outside the {width}x{height} frame", i + 1))
        })
    }

    fn events(&self) -> Vec<AnnotationEvent> {
        let click = |x: u32, y: u32| AnnotationEvent::Click {
            x: f64::from(x),
            y: f64::from(y),
        };

        let mut events = Vec::new();
        if self.copy_previous {
            events.push(AnnotationEvent::CopyPrevious);
        }
        if let Some(drift) = &self.drift {
            events.push(AnnotationEvent::SwitchMode(ViewMode::Drift));
            events.push(click(drift.start[0], drift.start[1]));
            events.push(click(drift.end[0], drift.end[1]));
            events.push(AnnotationEvent::SwitchMode(ViewMode::StartFrame));
        }
        for [x1, y1, x2, y2] in &self.boxes {
            events.push(click(*x1, *y1));
            events.push(click(*x2, *y2));
            events.push(AnnotationEvent::Confirm);
        }
        events
    }
}

/// [`Annotator`] that answers from a pre-recorded annotation file.
#[derive(Debug, Default)]
pub struct ReplayAnnotator {
    entries: HashMap<String, ReplayEntry>,
}

impl ReplayAnnotator {
    pub fn from_entries(entries: impl IntoIterator<Item = ReplayEntry>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|entry| (entry.video.clone(), entry))
                .collect(),
        }
    }

    /// Load a JSON array of [`ReplayEntry`].
    pub fn load(path: impl AsRef<Path>) -> CropResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(CropError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        let entries: Vec<ReplayEntry> = serde_json::from_str(&content).map_err(|e| {
            CropError::annotation(format!("Invalid annotation file {}: {e}", path.display()))
        })?;
        tracing::info!(
            path = %path.display(),
            entries = entries.len(),
            "Annotation file loaded"
        );
        Ok(Self::from_entries(entries))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry_for(&self, video_id: &str) -> Option<&ReplayEntry> {
        self.entries
            .get(video_id)
            .or_else(|| self.entries.get(&normalized_video_id(video_id)))
    }
}

impl Annotator for ReplayAnnotator {
    fn annotate(&mut self, request: &AnnotationRequest) -> CropResult<AnnotationOutcome> {
        let Some(entry) = self.entry_for(&request.video_id) else {
            return Ok(AnnotationOutcome::Skipped {
                reason: "no annotation recorded".to_string(),
            });
        };
        if entry.abort {
            return Ok(AnnotationOutcome::Aborted);
        }
        if let Some(reason) = entry.out_of_frame(request.frame_size) {
            tracing::warn!(video = %request.video_id, %reason, "Annotation rejected");
            return Ok(AnnotationOutcome::Skipped { reason });
        }

        // Recorded coordinates are already source pixels.
        let mut session = AnnotationSession::new(request).with_display_scale(1.0);
        for event in entry.events() {
            if let Transition::Ignored(why) = session.apply(event) {
                tracing::warn!(video = %request.video_id, ?event, why, "Annotation event ignored");
            }
        }

        match session.finish() {
            Ok(job) => Ok(AnnotationOutcome::Confirmed(job)),
            Err(err @ AnnotationError::InvalidBoxCount { .. }) => {
                tracing::warn!(video = %request.video_id, error = %err, "Annotation rejected");
                Ok(AnnotationOutcome::Skipped {
                    reason: err.to_string(),
                })
            }
            Err(err) => Err(err.into()),
        }
    }
}
