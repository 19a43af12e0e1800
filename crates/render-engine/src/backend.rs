//! Media backend seam: frame sources, frame sinks, and the backend that
//! creates them.

use std::path::{Path, PathBuf};

use arenacrop_common::error::CropResult;
use arenacrop_processing_core::extract::Frame;

/// Properties of a decoded video stream.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    pub width: u32,
    pub height: u32,

    /// Nominal frame rate.
    pub fps: f64,

    /// Frame count reported by the container, if known.
    pub frame_count: Option<u64>,
}

impl StreamInfo {
    /// Frame count for the drift model; `0` when unknown, which disables
    /// drift compensation.
    pub fn total_frames(&self) -> i64 {
        self.frame_count
            .and_then(|n| i64::try_from(n).ok())
            .unwrap_or(0)
    }
}

/// Parameters of one output stream.
#[derive(Debug, Clone, PartialEq)]
pub struct SinkSpec {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

/// Sequential reader of decoded frames.
pub trait FrameSource: Send {
    fn info(&self) -> &StreamInfo;

    /// Next frame in presentation order, or `None` at end of stream.
    fn read_frame(&mut self) -> CropResult<Option<Frame>>;
}

/// Sequential writer of frames of a fixed size.
pub trait FrameSink: Send {
    fn write_frame(&mut self, frame: &Frame) -> CropResult<()>;

    fn frames_written(&self) -> u64;

    /// Flush and close the stream. Returns the number of frames written.
    fn finish(self: Box<Self>) -> CropResult<u64>;
}

/// Trait for media backends (ffmpeg, in-memory).
pub trait MediaBackend: Send {
    /// Open a source video for sequential decoding.
    fn open_source(&self, path: &Path) -> CropResult<Box<dyn FrameSource>>;

    /// Create an output stream, replacing any existing file.
    fn create_sink(&self, spec: &SinkSpec) -> CropResult<Box<dyn FrameSink>>;

    /// Check if this backend is available on the system.
    fn is_available(&self) -> bool;

    /// Backend name.
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_frame_count_disables_drift() {
        let info = StreamInfo {
            width: 640,
            height: 480,
            fps: 60.0,
            frame_count: None,
        };
        assert_eq!(info.total_frames(), 0);
        assert_eq!(
            StreamInfo {
                frame_count: Some(1800),
                ..info
            }
            .total_frames(),
            1800
        );
    }
}
