//! ArenaCrop Render Engine
//!
//! Decodes each source recording once and fans every frame out to one
//! encoder per subject box, with the drift shift applied per frame.
//!
//! # Pipeline Architecture
//!
//! ```text
//! source.mov ── decode (rgb24) ──┐
//!                                ├── shift(frame, total, drift)
//!                                │
//!                                ├── box A ── extract ── encode ── A_trial.mp4
//!                                ├── box B ── extract ── encode ── B_trial.mp4
//!                                └── ...                           ...
//!
//! all streams closed ── progress store: video -> done
//! ```

pub mod backend;
pub mod batch;
pub mod dispatcher;
pub mod ffmpeg;
pub mod memory;
pub mod progress;
pub mod transform;

pub use backend::{FrameSink, FrameSource, MediaBackend, SinkSpec, StreamInfo};
pub use batch::{
    discover_videos, AnnotationReport, BatchReport, BatchRunner, PlanEntry, PlanStatus,
    SkippedVideo,
};
pub use dispatcher::{extract_job, JobSummary, MultiWriter};
pub use ffmpeg::FfmpegBackend;
pub use memory::MemoryBackend;
pub use progress::{ExtractProgress, ExtractStage, ProgressCallback};
pub use transform::{
    downsample_video, enhance_video, rotate_video, DownsampleOptions, TransformSummary,
};
