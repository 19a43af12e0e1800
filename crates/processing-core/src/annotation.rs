//! Annotation session: an explicit state machine over operator events.
//!
//! The session owns every piece of in-progress annotation state (pending
//! corner clicks, confirmed boxes, drift measurement, current view). A UI
//! feeds it [`AnnotationEvent`]s and renders [`SessionSnapshot`]s; nothing
//! is shared or global. A [`Job`] is produced only by [`AnnotationSession::finish`].

use std::path::PathBuf;

use arenacrop_common::error::CropError;
use arenacrop_job_model::drift::DriftVector;
use arenacrop_job_model::job::{Job, JobError};
use arenacrop_job_model::region::{box_name, CropBox, Point};

/// Views the operator can switch to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewMode {
    /// First frame, drawing boxes. Cancels a drift measurement in progress.
    StartFrame,
    /// Last usable frame, reviewing boxes displaced by the drift.
    EndFrame,
    /// Measure drift: clears the current drift and waits for two points.
    Drift,
}

/// Operator input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AnnotationEvent {
    /// Click at display coordinates.
    Click { x: f64, y: f64 },
    /// Confirm the two pending corners as the next box.
    Confirm,
    /// Drop the last pending point, or the last confirmed box.
    Undo,
    SwitchMode(ViewMode),
    /// Reuse boxes and drift from the previously confirmed video.
    CopyPrevious,
}

/// Current state of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    Boxes,
    EndFrame,
    /// `start` is the reference point on the first frame once clicked; the
    /// view is on the last frame while it is set.
    Drift { start: Option<Point> },
}

/// What an event did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    PointAdded(Point),
    BoxConfirmed { index: usize },
    DriftMeasured(DriftVector),
    PointRemoved,
    BoxRemoved { index: usize },
    ModeChanged(SessionMode),
    Copied { boxes: usize },
    Ignored(&'static str),
}

/// Boxes and drift of a confirmed job, reusable on the next video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobTemplate {
    pub boxes: Vec<CropBox>,
    pub drift: DriftVector,
}

impl JobTemplate {
    pub fn from_job(job: &Job) -> Self {
        Self {
            boxes: job.boxes().to_vec(),
            drift: job.drift(),
        }
    }
}

/// Everything the annotator needs to know about one video.
#[derive(Debug, Clone)]
pub struct AnnotationRequest {
    pub video_id: String,
    pub source: PathBuf,
    /// Probed source size in pixels.
    pub frame_size: (u32, u32),
    /// Container frame count, when known.
    pub frame_count: Option<u64>,
    pub subjects: Vec<String>,
    pub display_scale: f64,
    pub previous: Option<JobTemplate>,
}

/// Result of annotating one video.
#[derive(Debug, Clone)]
pub enum AnnotationOutcome {
    Confirmed(Job),
    Skipped { reason: String },
    /// Operator stopped annotating; remaining videos are left for a later run.
    Aborted,
}

/// Boundary to the external annotation UI.
pub trait Annotator {
    fn annotate(&mut self, request: &AnnotationRequest) -> Result<AnnotationOutcome, CropError>;
}

/// Errors returned when finishing a session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AnnotationError {
    #[error("Expected {expected} confirmed boxes, got {actual}")]
    InvalidBoxCount { expected: usize, actual: usize },

    #[error("Cannot confirm job: {0}")]
    Job(JobError),
}

impl From<AnnotationError> for CropError {
    fn from(err: AnnotationError) -> Self {
        match err {
            AnnotationError::InvalidBoxCount { expected, actual } => {
                CropError::InvalidBoxCount { expected, actual }
            }
            other => CropError::annotation(other.to_string()),
        }
    }
}

/// A confirmed box as drawn in the current view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoxOverlay {
    pub id: String,
    pub label: String,
    /// `(x1, y1, x2, y2)`, displaced by the drift in the end-frame view.
    pub rect: (i64, i64, i64, i64),
}

/// Read-only view of a session for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub mode: SessionMode,
    pub prompt: String,
    pub boxes: Vec<BoxOverlay>,
    pub pending: Vec<Point>,
    pub drift: DriftVector,
    pub expected: usize,
}

/// In-progress annotation of one video.
#[derive(Debug, Clone)]
pub struct AnnotationSession {
    video_id: String,
    source: PathBuf,
    subjects: Vec<String>,
    display_scale: f64,
    previous: Option<JobTemplate>,
    mode: SessionMode,
    pending: Vec<Point>,
    boxes: Vec<CropBox>,
    drift: DriftVector,
}

impl AnnotationSession {
    /// Start a session expecting one box per subject.
    pub fn new(request: &AnnotationRequest) -> Self {
        Self {
            video_id: request.video_id.clone(),
            source: request.source.clone(),
            subjects: request.subjects.clone(),
            display_scale: request.display_scale,
            previous: request.previous.clone(),
            mode: SessionMode::Boxes,
            pending: Vec::with_capacity(2),
            boxes: Vec::new(),
            drift: DriftVector::ZERO,
        }
    }

    /// Interpret clicks with a different display scale.
    pub fn with_display_scale(mut self, display_scale: f64) -> Self {
        self.display_scale = display_scale;
        self
    }

    pub fn expected(&self) -> usize {
        self.subjects.len()
    }

    pub fn confirmed(&self) -> usize {
        self.boxes.len()
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn drift(&self) -> DriftVector {
        self.drift
    }

    /// Feed one operator event.
    pub fn apply(&mut self, event: AnnotationEvent) -> Transition {
        match event {
            AnnotationEvent::Click { x, y } => {
                self.click(Point::from_display(x, y, self.display_scale))
            }
            AnnotationEvent::Confirm => self.confirm_box(),
            AnnotationEvent::Undo => self.undo(),
            AnnotationEvent::SwitchMode(view) => self.switch_mode(view),
            AnnotationEvent::CopyPrevious => self.copy_previous(),
        }
    }

    fn click(&mut self, point: Point) -> Transition {
        match self.mode {
            SessionMode::Boxes => {
                if self.boxes.len() >= self.expected() {
                    return Transition::Ignored("all boxes already placed");
                }
                if self.pending.len() >= 2 {
                    return Transition::Ignored("two corners placed; confirm or undo");
                }
                self.pending.push(point);
                Transition::PointAdded(point)
            }
            SessionMode::EndFrame => Transition::Ignored("end-frame view is read-only"),
            SessionMode::Drift { start: None } => {
                self.mode = SessionMode::Drift { start: Some(point) };
                Transition::PointAdded(point)
            }
            SessionMode::Drift { start: Some(start) } => {
                self.drift = DriftVector::between(start, point);
                // stay on the end frame so the displaced boxes can be checked
                self.mode = SessionMode::EndFrame;
                tracing::info!(
                    video = %self.video_id,
                    dx = self.drift.dx,
                    dy = self.drift.dy,
                    "Drift measured"
                );
                Transition::DriftMeasured(self.drift)
            }
        }
    }

    fn confirm_box(&mut self) -> Transition {
        if self.mode != SessionMode::Boxes {
            return Transition::Ignored("boxes are confirmed on the start frame");
        }
        if self.pending.len() != 2 {
            return Transition::Ignored("two corners required");
        }
        let index = self.boxes.len();
        if index >= self.expected() {
            return Transition::Ignored("all boxes already placed");
        }
        let label = self.subjects.get(index).cloned().unwrap_or_default();
        match CropBox::from_corners(box_name(index), label, self.pending[0], self.pending[1]) {
            Ok(region) => {
                self.boxes.push(region);
                self.pending.clear();
                Transition::BoxConfirmed { index }
            }
            Err(_) => Transition::Ignored("box has zero width or height"),
        }
    }

    fn undo(&mut self) -> Transition {
        match self.mode {
            SessionMode::Drift { start: Some(_) } => {
                self.mode = SessionMode::Drift { start: None };
                Transition::PointRemoved
            }
            SessionMode::Drift { start: None } => Transition::Ignored("nothing to undo"),
            SessionMode::Boxes | SessionMode::EndFrame => {
                if self.pending.pop().is_some() {
                    Transition::PointRemoved
                } else if self.boxes.pop().is_some() {
                    Transition::BoxRemoved {
                        index: self.boxes.len(),
                    }
                } else {
                    Transition::Ignored("nothing to undo")
                }
            }
        }
    }

    fn switch_mode(&mut self, view: ViewMode) -> Transition {
        self.pending.clear();
        self.mode = match view {
            ViewMode::StartFrame => SessionMode::Boxes,
            ViewMode::EndFrame => SessionMode::EndFrame,
            ViewMode::Drift => {
                self.drift = DriftVector::ZERO;
                SessionMode::Drift { start: None }
            }
        };
        Transition::ModeChanged(self.mode)
    }

    fn copy_previous(&mut self) -> Transition {
        if self.mode == SessionMode::EndFrame {
            return Transition::Ignored("return to the start frame to copy");
        }
        let Some(previous) = &self.previous else {
            return Transition::Ignored("nothing to copy");
        };
        self.boxes = previous
            .boxes
            .iter()
            .take(self.subjects.len())
            .enumerate()
            .map(|(i, b)| b.relabeled(box_name(i), self.subjects[i].clone()))
            .collect();
        self.drift = previous.drift;
        self.pending.clear();
        self.mode = SessionMode::Boxes;
        Transition::Copied {
            boxes: self.boxes.len(),
        }
    }

    /// Confirm the job. Fails unless exactly one box per subject is placed.
    pub fn finish(&self) -> Result<Job, AnnotationError> {
        Job::confirm(
            self.video_id.clone(),
            self.source.clone(),
            self.boxes.clone(),
            self.subjects.clone(),
            self.drift,
            self.expected(),
        )
        .map_err(|e| match e {
            JobError::InvalidBoxCount { expected, actual } => {
                AnnotationError::InvalidBoxCount { expected, actual }
            }
            other => AnnotationError::Job(other),
        })
    }

    /// Render-ready view of the session.
    pub fn snapshot(&self) -> SessionSnapshot {
        let (dx, dy) = match self.mode {
            SessionMode::EndFrame => (self.drift.dx, self.drift.dy),
            _ => (0, 0),
        };
        SessionSnapshot {
            mode: self.mode,
            prompt: self.prompt(),
            boxes: self
                .boxes
                .iter()
                .map(|b| BoxOverlay {
                    id: b.id().to_string(),
                    label: b.label().to_string(),
                    rect: b.displaced(dx, dy),
                })
                .collect(),
            pending: match self.mode {
                SessionMode::Drift { start } => start.into_iter().collect(),
                _ => self.pending.clone(),
            },
            drift: self.drift,
            expected: self.expected(),
        }
    }

    fn prompt(&self) -> String {
        match self.mode {
            SessionMode::Drift { start: None } => {
                "Drift: click a reference point on the first frame".to_string()
            }
            SessionMode::Drift { start: Some(_) } => {
                "Drift: click the same point on the last frame".to_string()
            }
            SessionMode::EndFrame => "End frame: check boxes for camera movement".to_string(),
            SessionMode::Boxes => match self.subjects.get(self.boxes.len()) {
                Some(subject) => format!("Draw {}: {subject}", box_name(self.boxes.len())),
                None => "All boxes placed: confirm the job".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(subjects: &[&str]) -> AnnotationRequest {
        AnnotationRequest {
            video_id: "trial.mp4".to_string(),
            source: PathBuf::from("videos/trial.mp4"),
            frame_size: (640, 480),
            frame_count: Some(100),
            subjects: subjects.iter().map(|s| s.to_string()).collect(),
            display_scale: 0.5,
            previous: None,
        }
    }

    fn click(x: f64, y: f64) -> AnnotationEvent {
        AnnotationEvent::Click { x, y }
    }

    fn draw_box(session: &mut AnnotationSession, x1: f64, y1: f64, x2: f64, y2: f64) {
        session.apply(click(x1, y1));
        session.apply(click(x2, y2));
        assert!(matches!(
            session.apply(AnnotationEvent::Confirm),
            Transition::BoxConfirmed { .. }
        ));
    }

    #[test]
    fn test_clicks_are_scaled_to_source_pixels() {
        let mut session = AnnotationSession::new(&request(&["r1"]));
        draw_box(&mut session, 60.0, 40.0, 5.0, 10.0);
        let job = session.finish().unwrap();
        let b = &job.boxes()[0];
        assert_eq!((b.x1(), b.y1(), b.x2(), b.y2()), (10, 20, 120, 80));
        assert_eq!(b.label(), "r1");
    }

    #[test]
    fn test_finish_requires_all_boxes() {
        let mut session = AnnotationSession::new(&request(&["a", "b"]));
        draw_box(&mut session, 0.0, 0.0, 10.0, 10.0);
        assert_eq!(
            session.finish().unwrap_err(),
            AnnotationError::InvalidBoxCount {
                expected: 2,
                actual: 1
            }
        );
        draw_box(&mut session, 20.0, 0.0, 30.0, 10.0);
        assert_eq!(session.finish().unwrap().boxes().len(), 2);
    }

    #[test]
    fn test_cannot_exceed_expected_boxes() {
        let mut session = AnnotationSession::new(&request(&["a"]));
        draw_box(&mut session, 0.0, 0.0, 10.0, 10.0);
        assert!(matches!(
            session.apply(click(1.0, 1.0)),
            Transition::Ignored(_)
        ));
        assert_eq!(session.confirmed(), 1);
    }

    #[test]
    fn test_undo_pops_point_then_box() {
        let mut session = AnnotationSession::new(&request(&["a", "b"]));
        draw_box(&mut session, 0.0, 0.0, 10.0, 10.0);
        session.apply(click(3.0, 3.0));

        assert_eq!(session.apply(AnnotationEvent::Undo), Transition::PointRemoved);
        assert_eq!(
            session.apply(AnnotationEvent::Undo),
            Transition::BoxRemoved { index: 0 }
        );
        assert!(matches!(
            session.apply(AnnotationEvent::Undo),
            Transition::Ignored(_)
        ));
    }

    #[test]
    fn test_degenerate_box_is_not_confirmed() {
        let mut session = AnnotationSession::new(&request(&["a"]));
        session.apply(click(10.0, 10.0));
        session.apply(click(10.0, 40.0));
        assert!(matches!(
            session.apply(AnnotationEvent::Confirm),
            Transition::Ignored(_)
        ));
        assert_eq!(session.confirmed(), 0);
    }

    #[test]
    fn test_drift_measurement_flow() {
        let mut session = AnnotationSession::new(&request(&["a"]));
        session.apply(AnnotationEvent::SwitchMode(ViewMode::Drift));
        session.apply(click(50.0, 50.0));
        assert_eq!(
            session.mode(),
            SessionMode::Drift {
                start: Some(Point::new(100, 100))
            }
        );
        assert_eq!(
            session.apply(click(60.0, 45.0)),
            Transition::DriftMeasured(DriftVector::new(20, -10))
        );
        assert_eq!(session.mode(), SessionMode::EndFrame);

        session.apply(AnnotationEvent::SwitchMode(ViewMode::StartFrame));
        draw_box(&mut session, 0.0, 0.0, 10.0, 10.0);
        assert_eq!(session.finish().unwrap().drift(), DriftVector::new(20, -10));
    }

    #[test]
    fn test_switching_to_drift_clears_previous_measurement() {
        let mut session = AnnotationSession::new(&request(&["a"]));
        session.apply(AnnotationEvent::SwitchMode(ViewMode::Drift));
        session.apply(click(0.0, 0.0));
        session.apply(click(5.0, 0.0));
        assert_eq!(session.drift(), DriftVector::new(10, 0));

        session.apply(AnnotationEvent::SwitchMode(ViewMode::Drift));
        assert_eq!(session.drift(), DriftVector::ZERO);
        session.apply(AnnotationEvent::SwitchMode(ViewMode::StartFrame));
        assert_eq!(session.mode(), SessionMode::Boxes);
    }

    #[test]
    fn test_end_frame_snapshot_shows_displaced_boxes() {
        let mut session = AnnotationSession::new(&request(&["a"]));
        draw_box(&mut session, 10.0, 10.0, 20.0, 20.0);
        session.apply(AnnotationEvent::SwitchMode(ViewMode::Drift));
        session.apply(click(0.0, 0.0));
        session.apply(click(10.0, 5.0));

        assert_eq!(session.mode(), SessionMode::EndFrame);
        let snapshot = session.snapshot();
        assert_eq!(snapshot.boxes[0].rect, (40, 30, 60, 50));
        assert!(matches!(
            session.apply(click(1.0, 1.0)),
            Transition::Ignored(_)
        ));

        session.apply(AnnotationEvent::SwitchMode(ViewMode::StartFrame));
        assert_eq!(session.snapshot().boxes[0].rect, (20, 20, 40, 40));
    }

    #[test]
    fn test_copy_previous() {
        let mut first = AnnotationSession::new(&request(&["a", "b"]));
        first.apply(AnnotationEvent::SwitchMode(ViewMode::Drift));
        first.apply(click(0.0, 0.0));
        first.apply(click(2.0, 0.0));
        first.apply(AnnotationEvent::SwitchMode(ViewMode::StartFrame));
        draw_box(&mut first, 0.0, 0.0, 10.0, 10.0);
        draw_box(&mut first, 20.0, 0.0, 30.0, 10.0);
        let job = first.finish().unwrap();

        let mut next_request = request(&["c", "d"]);
        next_request.previous = Some(JobTemplate::from_job(&job));
        let mut second = AnnotationSession::new(&next_request);
        assert_eq!(
            second.apply(AnnotationEvent::CopyPrevious),
            Transition::Copied { boxes: 2 }
        );
        let copied = second.finish().unwrap();
        assert_eq!(copied.drift(), DriftVector::new(4, 0));
        assert_eq!(copied.boxes()[1].label(), "d");
        assert_eq!(copied.boxes()[1].x1(), job.boxes()[1].x1());
    }

    #[test]
    fn test_copy_without_previous_is_ignored() {
        let mut session = AnnotationSession::new(&request(&["a"]));
        assert_eq!(
            session.apply(AnnotationEvent::CopyPrevious),
            Transition::Ignored("nothing to copy")
        );
    }

    #[test]
    fn test_prompt_follows_progress() {
        let mut session = AnnotationSession::new(&request(&["rat1", "rat2"]));
        assert_eq!(session.snapshot().prompt, "Draw A: rat1");
        draw_box(&mut session, 0.0, 0.0, 10.0, 10.0);
        assert_eq!(session.snapshot().prompt, "Draw B: rat2");
    }

    #[test]
    fn test_invalid_box_count_maps_to_crop_error() {
        let err: CropError = AnnotationError::InvalidBoxCount {
            expected: 15,
            actual: 3,
        }
        .into();
        assert!(matches!(
            err,
            CropError::InvalidBoxCount {
                expected: 15,
                actual: 3
            }
        ));
    }
}
