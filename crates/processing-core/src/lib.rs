//! ArenaCrop Processing Core
//!
//! Per-frame computation and operator-facing state:
//! - **Drift:** Linear per-frame displacement of the crop boxes
//! - **Extraction:** Fixed-size crops with clamp-and-stretch at frame edges
//! - **Contrast:** CLAHE on the lightness channel
//! - **Annotation:** Explicit session state machine producing confirmed jobs
//! - **Replay:** Scripted annotator reading a JSON annotation file
//!
//! Nothing here decodes or encodes video; frames come in as images.

pub mod annotation;
pub mod contrast;
pub mod drift;
pub mod extract;
pub mod replay;

pub use annotation::{
    AnnotationError, AnnotationEvent, AnnotationOutcome, AnnotationRequest, AnnotationSession,
    Annotator, JobTemplate, SessionMode, SessionSnapshot, Transition, ViewMode,
};
pub use contrast::{enhance, EnhanceOptions};
pub use drift::{shift, Shift};
pub use extract::{crop_rect, extract, Frame, PixelRect};
pub use replay::{ReplayAnnotator, ReplayEntry};
