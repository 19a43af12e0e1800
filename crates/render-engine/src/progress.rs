//! Extraction progress reporting.

/// Progress callback for extraction.
pub type ProgressCallback = Box<dyn Fn(ExtractProgress) + Send>;

/// Progress report for one video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractProgress {
    /// Source file name.
    pub video_id: String,

    /// Source frames decoded and dispatched so far.
    pub frames_done: u64,

    /// Container frame count, when known.
    pub total_frames: Option<u64>,

    /// Current stage.
    pub stage: ExtractStage,
}

impl ExtractProgress {
    /// Completion in `[0.0, 1.0]`, if the total is known.
    pub fn fraction(&self) -> Option<f64> {
        match self.stage {
            ExtractStage::Complete => Some(1.0),
            _ => self
                .total_frames
                .filter(|total| *total > 0)
                .map(|total| (self.frames_done as f64 / total as f64).clamp(0.0, 1.0)),
        }
    }
}

/// Stages of extracting one video.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractStage {
    Opening,
    Extracting,
    Finalizing,
    Complete,
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fraction() {
        let mut p = ExtractProgress {
            video_id: "a.mp4".to_string(),
            frames_done: 50,
            total_frames: Some(200),
            stage: ExtractStage::Extracting,
        };
        assert_eq!(p.fraction(), Some(0.25));

        p.total_frames = None;
        assert_eq!(p.fraction(), None);

        p.stage = ExtractStage::Complete;
        assert_eq!(p.fraction(), Some(1.0));
    }
}
