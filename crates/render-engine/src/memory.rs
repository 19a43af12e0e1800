//! In-memory backend for tests: sources are preloaded frame lists, sinks
//! record what they receive.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use arenacrop_common::error::{CropError, CropResult};
use arenacrop_processing_core::extract::Frame;

use crate::backend::{FrameSink, FrameSource, MediaBackend, SinkSpec, StreamInfo};

#[derive(Debug, Clone)]
struct Clip {
    frames: Arc<Vec<Frame>>,
    info: StreamInfo,
    fail_after: Option<usize>,
}

/// A finished output stream.
#[derive(Debug, Clone)]
pub struct RecordedStream {
    pub spec: SinkSpec,
    pub frames: Vec<Frame>,
}

#[derive(Debug, Default)]
struct Recorder {
    finished: BTreeMap<PathBuf, RecordedStream>,
    opened_sources: Vec<PathBuf>,
    abandoned: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
struct WriteFailure {
    file_name: String,
    after_frames: u64,
}

/// Backend keeping every frame in memory. Clones share the same recorder.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    clips: HashMap<PathBuf, Clip>,
    recorder: Arc<Mutex<Recorder>>,
    failure: Option<WriteFailure>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source clip. The reported frame count is the clip length.
    pub fn add_source(&mut self, path: impl Into<PathBuf>, frames: Vec<Frame>, fps: f64) {
        let count = frames.len() as u64;
        self.add_source_with_count(path, frames, fps, Some(count));
    }

    /// Register a source clip whose container reports `frame_count`.
    pub fn add_source_with_count(
        &mut self,
        path: impl Into<PathBuf>,
        frames: Vec<Frame>,
        fps: f64,
        frame_count: Option<u64>,
    ) {
        let (width, height) = frames.first().map(|f| f.dimensions()).unwrap_or((0, 0));
        self.clips.insert(
            path.into(),
            Clip {
                frames: Arc::new(frames),
                info: StreamInfo {
                    width,
                    height,
                    fps,
                    frame_count,
                },
                fail_after: None,
            },
        );
    }

    /// Make reads from the clip at `path` fail once `after_frames` frames
    /// were decoded, like a decoder crashing mid-stream.
    pub fn fail_reads_after(&mut self, path: &Path, after_frames: usize) {
        if let Some(clip) = self.clips.get_mut(path) {
            clip.fail_after = Some(after_frames);
        }
    }

    /// Make writes to the sink named `file_name` fail once it holds
    /// `after_frames` frames.
    pub fn fail_writes_to(&mut self, file_name: impl Into<String>, after_frames: u64) {
        self.failure = Some(WriteFailure {
            file_name: file_name.into(),
            after_frames,
        });
    }

    /// Finished stream at `path`.
    pub fn stream(&self, path: &Path) -> Option<RecordedStream> {
        self.lock().finished.get(path).cloned()
    }

    /// Paths of every finished stream, sorted.
    pub fn finished_paths(&self) -> Vec<PathBuf> {
        self.lock().finished.keys().cloned().collect()
    }

    /// Sources opened so far, in order.
    pub fn opened_sources(&self) -> Vec<PathBuf> {
        self.lock().opened_sources.clone()
    }

    /// Sinks dropped without being finished.
    pub fn abandoned_sinks(&self) -> Vec<PathBuf> {
        self.lock().abandoned.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Recorder> {
        self.recorder
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl MediaBackend for MemoryBackend {
    fn open_source(&self, path: &Path) -> CropResult<Box<dyn FrameSource>> {
        let clip = self
            .clips
            .get(path)
            .ok_or_else(|| CropError::decode_open(path, "no such clip"))?;
        self.lock().opened_sources.push(path.to_path_buf());
        Ok(Box::new(MemorySource {
            clip: clip.clone(),
            next: 0,
        }))
    }

    fn create_sink(&self, spec: &SinkSpec) -> CropResult<Box<dyn FrameSink>> {
        let fail_after = self
            .failure
            .as_ref()
            .filter(|f| {
                spec.path
                    .file_name()
                    .is_some_and(|name| name.to_string_lossy() == f.file_name)
            })
            .map(|f| f.after_frames);
        Ok(Box::new(MemorySink {
            spec: spec.clone(),
            frames: Vec::new(),
            recorder: Arc::clone(&self.recorder),
            fail_after,
            finished: false,
        }))
    }

    fn is_available(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "memory"
    }
}

struct MemorySource {
    clip: Clip,
    next: usize,
}

impl FrameSource for MemorySource {
    fn info(&self) -> &StreamInfo {
        &self.clip.info
    }

    fn read_frame(&mut self) -> CropResult<Option<Frame>> {
        if self.clip.fail_after == Some(self.next) {
            return Err(CropError::decode(format!(
                "simulated decoder crash after {} frame(s)",
                self.next
            )));
        }
        let frame = self.clip.frames.get(self.next).cloned();
        if frame.is_some() {
            self.next += 1;
        }
        Ok(frame)
    }
}

struct MemorySink {
    spec: SinkSpec,
    frames: Vec<Frame>,
    recorder: Arc<Mutex<Recorder>>,
    fail_after: Option<u64>,
    finished: bool,
}

impl FrameSink for MemorySink {
    fn write_frame(&mut self, frame: &Frame) -> CropResult<()> {
        if self.fail_after == Some(self.frames.len() as u64) {
            return Err(CropError::write(&self.spec.path, "simulated write failure"));
        }
        if frame.dimensions() != (self.spec.width, self.spec.height) {
            return Err(CropError::write(
                &self.spec.path,
                format!(
                    "frame is {}x{}, stream expects {}x{}",
                    frame.width(),
                    frame.height(),
                    self.spec.width,
                    self.spec.height
                ),
            ));
        }
        self.frames.push(frame.clone());
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.frames.len() as u64
    }

    fn finish(mut self: Box<Self>) -> CropResult<u64> {
        self.finished = true;
        let count = self.frames.len() as u64;
        let stream = RecordedStream {
            spec: self.spec.clone(),
            frames: std::mem::take(&mut self.frames),
        };
        self.recorder
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .finished
            .insert(stream.spec.path.clone(), stream);
        Ok(count)
    }
}

impl Drop for MemorySink {
    fn drop(&mut self) {
        if !self.finished {
            self.recorder
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .abandoned
                .push(self.spec.path.clone());
        }
    }
}
