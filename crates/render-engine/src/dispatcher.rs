//! Multi-writer dispatcher: one decoded frame fans out to one output
//! stream per box.

use std::path::{Path, PathBuf};

use arenacrop_common::error::{CropError, CropResult};
use arenacrop_job_model::job::Job;
use arenacrop_job_model::region::CropBox;
use arenacrop_processing_core::drift::{self, Shift};
use arenacrop_processing_core::extract::{self, Frame};

use crate::backend::{FrameSink, MediaBackend, SinkSpec};
use crate::progress::{ExtractProgress, ExtractStage, ProgressCallback};

/// Emit a progress report every this many frames.
const PROGRESS_INTERVAL: u64 = 50;

struct OutputStream {
    region: CropBox,
    path: PathBuf,
    sink: Box<dyn FrameSink>,
}

/// The N open output streams of one job.
pub struct MultiWriter {
    streams: Vec<OutputStream>,
}

impl MultiWriter {
    /// Open one stream per box of `job` in `output_dir`.
    ///
    /// If any stream cannot be created, the ones already open are closed
    /// before the error is returned.
    pub fn open(
        backend: &dyn MediaBackend,
        job: &Job,
        output_dir: &Path,
        fps: f64,
    ) -> CropResult<Self> {
        let mut streams = Vec::with_capacity(job.boxes().len());
        for (region, name) in job.boxes().iter().zip(job.output_file_names()) {
            let spec = SinkSpec {
                path: output_dir.join(name),
                width: region.width(),
                height: region.height(),
                fps,
            };
            match backend.create_sink(&spec) {
                Ok(sink) => streams.push(OutputStream {
                    region: region.clone(),
                    path: spec.path,
                    sink,
                }),
                Err(err) => {
                    Self { streams }.abort();
                    return Err(err);
                }
            }
        }
        Ok(Self { streams })
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Crop every box out of `frame` and write each crop to its stream, in
    /// box order.
    pub fn dispatch(&mut self, frame: &Frame, shift: Shift) -> CropResult<()> {
        for stream in &mut self.streams {
            let crop = extract::extract(frame, &stream.region, shift);
            stream.sink.write_frame(&crop)?;
        }
        Ok(())
    }

    /// Close every stream and check each holds `expected_frames` frames.
    pub fn finish(self, expected_frames: u64) -> CropResult<Vec<PathBuf>> {
        let mut first_error = None;
        let mut paths = Vec::with_capacity(self.streams.len());
        for stream in self.streams {
            match stream.sink.finish() {
                Ok(written) if written == expected_frames => paths.push(stream.path),
                Ok(written) => {
                    first_error.get_or_insert(CropError::write(
                        &stream.path,
                        format!("stream holds {written} frames, expected {expected_frames}"),
                    ));
                }
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(paths),
        }
    }

    /// Close every stream, ignoring errors.
    pub fn abort(self) {
        for stream in self.streams {
            if let Err(err) = stream.sink.finish() {
                tracing::debug!(path = %stream.path.display(), error = %err, "Error closing stream");
            }
        }
    }
}

/// Outcome of a fully extracted job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSummary {
    pub frames: u64,
    pub outputs: Vec<PathBuf>,
}

/// Decode `job`'s source once and write every box's crop stream.
pub fn extract_job(
    backend: &dyn MediaBackend,
    job: &Job,
    output_dir: &Path,
    output_fps: f64,
    progress: Option<&ProgressCallback>,
) -> CropResult<JobSummary> {
    let report = |frames_done: u64, total_frames: Option<u64>, stage: ExtractStage| {
        if let Some(cb) = progress {
            cb(ExtractProgress {
                video_id: job.video_id().to_string(),
                frames_done,
                total_frames,
                stage,
            });
        }
    };

    report(0, None, ExtractStage::Opening);
    let mut source = backend.open_source(job.source())?;
    let info = source.info().clone();
    let total_frames = info.total_frames();
    if total_frames == 0 && !job.drift().is_zero() {
        tracing::warn!(
            video = job.video_id(),
            "Frame count unknown; drift compensation disabled"
        );
    }

    let mut writer = MultiWriter::open(backend, job, output_dir, output_fps)?;
    tracing::info!(
        video = job.video_id(),
        streams = writer.len(),
        width = info.width,
        height = info.height,
        total_frames,
        dx = job.drift().dx,
        dy = job.drift().dy,
        "Extracting"
    );

    let mut frames: u64 = 0;
    loop {
        let frame = match source.read_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(err) => {
                writer.abort();
                report(frames, info.frame_count, ExtractStage::Failed);
                return Err(err);
            }
        };

        let shift = drift::shift(frames, total_frames, job.drift());
        if let Err(err) = writer.dispatch(&frame, shift) {
            writer.abort();
            report(frames, info.frame_count, ExtractStage::Failed);
            return Err(err);
        }
        frames += 1;

        if frames % PROGRESS_INTERVAL == 0 {
            report(frames, info.frame_count, ExtractStage::Extracting);
        }
    }

    report(frames, info.frame_count, ExtractStage::Finalizing);
    let outputs = match writer.finish(frames) {
        Ok(outputs) => outputs,
        Err(err) => {
            report(frames, info.frame_count, ExtractStage::Failed);
            return Err(err);
        }
    };
    report(frames, info.frame_count, ExtractStage::Complete);

    if let Some(expected) = info.frame_count.filter(|n| *n != frames) {
        tracing::debug!(
            video = job.video_id(),
            expected,
            decoded = frames,
            "Decoded frame count differs from container count"
        );
    }

    Ok(JobSummary { frames, outputs })
}
