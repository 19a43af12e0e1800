//! Whole-frame preparation and post-processing passes sharing the media
//! backend: 180° rotation of upside-down recordings, downsampling of
//! finished crops, and contrast enhancement.

use std::path::{Path, PathBuf};

use image::imageops::{self, FilterType};

use arenacrop_common::error::{CropError, CropResult};
use arenacrop_processing_core::contrast::{self, EnhanceOptions};
use arenacrop_processing_core::extract::Frame;

use crate::backend::{FrameSource, MediaBackend, SinkSpec, StreamInfo};

/// File name prefix of rotated videos.
pub const ROTATED_PREFIX: &str = "rot_";

/// File name prefix of downsampled videos.
pub const DOWNSAMPLED_PREFIX: &str = "small_";

/// File name prefix of contrast-enhanced videos.
pub const ENHANCED_PREFIX: &str = "enh_";

/// Downsampling parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DownsampleOptions {
    /// Scale applied to both axes.
    pub factor: f64,
    /// Keep one frame out of every `frame_skip`.
    pub frame_skip: u32,
}

impl Default for DownsampleOptions {
    fn default() -> Self {
        Self {
            factor: 0.5,
            frame_skip: 2,
        }
    }
}

impl DownsampleOptions {
    pub fn validate(&self) -> CropResult<()> {
        if !(self.factor.is_finite() && self.factor > 0.0) {
            return Err(CropError::config("downsample factor must be positive"));
        }
        if self.frame_skip == 0 {
            return Err(CropError::config("frame skip must be at least 1"));
        }
        Ok(())
    }

    /// Output size for a `width x height` source, at least one pixel per axis.
    pub fn output_size(&self, width: u32, height: u32) -> (u32, u32) {
        let scale = |v: u32| ((f64::from(v) * self.factor) as u32).max(1);
        (scale(width), scale(height))
    }
}

/// Outcome of one transformed video.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformSummary {
    pub output: PathBuf,
    pub frames_read: u64,
    pub frames_written: u64,
}

fn prefixed_output(input: &Path, output_dir: &Path, prefix: &str) -> CropResult<PathBuf> {
    let name = input
        .file_name()
        .ok_or_else(|| CropError::decode_open(input, "path has no file name"))?;
    Ok(output_dir.join(format!("{prefix}{}", name.to_string_lossy())))
}

fn source_fps(info: &StreamInfo, input: &Path) -> CropResult<f64> {
    if info.fps > 0.0 {
        Ok(info.fps)
    } else {
        Err(CropError::decode_open(input, "unknown frame rate"))
    }
}

/// Rotate every frame of `input` by 180° at the source frame rate.
pub fn rotate_video(
    backend: &dyn MediaBackend,
    input: &Path,
    output_dir: &Path,
) -> CropResult<TransformSummary> {
    let mut source = backend.open_source(input)?;
    let info = source.info().clone();
    let spec = SinkSpec {
        path: prefixed_output(input, output_dir, ROTATED_PREFIX)?,
        width: info.width,
        height: info.height,
        fps: source_fps(&info, input)?,
    };
    tracing::info!(input = %input.display(), output = %spec.path.display(), "Rotating 180 degrees");

    run_pass(&mut *source, backend, spec, |_, frame| {
        Some(imageops::rotate180(&frame))
    })
}

/// Resize `input` by `options.factor` and keep every `frame_skip`-th frame,
/// dividing the frame rate accordingly.
pub fn downsample_video(
    backend: &dyn MediaBackend,
    input: &Path,
    output_dir: &Path,
    options: DownsampleOptions,
) -> CropResult<TransformSummary> {
    options.validate()?;
    let mut source = backend.open_source(input)?;
    let info = source.info().clone();
    let (width, height) = options.output_size(info.width, info.height);
    let spec = SinkSpec {
        path: prefixed_output(input, output_dir, DOWNSAMPLED_PREFIX)?,
        width,
        height,
        fps: source_fps(&info, input)? / f64::from(options.frame_skip),
    };
    tracing::info!(
        input = %input.display(),
        output = %spec.path.display(),
        width,
        height,
        fps = spec.fps,
        "Downsampling"
    );

    let skip = u64::from(options.frame_skip);
    run_pass(&mut *source, backend, spec, |index, frame| {
        (index % skip == 0).then(|| imageops::resize(&frame, width, height, FilterType::Triangle))
    })
}

/// Apply CLAHE to the lightness of every frame of `input`, at the source
/// frame rate.
pub fn enhance_video(
    backend: &dyn MediaBackend,
    input: &Path,
    output_dir: &Path,
    options: EnhanceOptions,
) -> CropResult<TransformSummary> {
    options.validate()?;
    let mut source = backend.open_source(input)?;
    let info = source.info().clone();
    let spec = SinkSpec {
        path: prefixed_output(input, output_dir, ENHANCED_PREFIX)?,
        width: info.width,
        height: info.height,
        fps: source_fps(&info, input)?,
    };
    tracing::info!(
        input = %input.display(),
        output = %spec.path.display(),
        clip_limit = options.clip_limit,
        grid = options.grid_size,
        "Enhancing contrast"
    );

    run_pass(&mut *source, backend, spec, |_, frame| {
        Some(contrast::enhance(&frame, options))
    })
}

/// Copy `source` into a new sink, mapping each frame. Frames mapped to
/// `None` are dropped.
fn run_pass(
    source: &mut dyn FrameSource,
    backend: &dyn MediaBackend,
    spec: SinkSpec,
    mut map: impl FnMut(u64, Frame) -> Option<Frame>,
) -> CropResult<TransformSummary> {
    let output = spec.path.clone();
    let mut sink = backend.create_sink(&spec)?;
    let mut frames_read = 0u64;

    while let Some(frame) = source.read_frame()? {
        if let Some(out) = map(frames_read, frame) {
            sink.write_frame(&out)?;
        }
        frames_read += 1;
    }

    let frames_written = sink.finish()?;
    tracing::debug!(
        output = %output.display(),
        frames_read,
        frames_written,
        "Pass finished"
    );
    Ok(TransformSummary {
        output,
        frames_read,
        frames_written,
    })
}
