//! ffmpeg subprocess backend.
//!
//! Sources run `ffmpeg` decoding to raw `rgb24` on stdout; sinks run
//! `ffmpeg` reading raw `rgb24` on stdin. Stream properties come from
//! `ffprobe` with packet counting so the drift model sees the real length.

use std::io::{BufReader, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;

use serde::Deserialize;

use arenacrop_common::config::EncoderConfig;
use arenacrop_common::error::{CropError, CropResult};
use arenacrop_processing_core::extract::Frame;

use crate::backend::{FrameSink, FrameSource, MediaBackend, SinkSpec, StreamInfo};

/// Backend driving the system `ffmpeg` and `ffprobe` binaries.
#[derive(Debug, Clone, Default)]
pub struct FfmpegBackend {
    encoder: EncoderConfig,
}

impl FfmpegBackend {
    pub fn new(encoder: EncoderConfig) -> Self {
        Self { encoder }
    }

    /// Probe the first video stream of `path`.
    pub fn probe(path: &Path) -> CropResult<StreamInfo> {
        let output = Command::new("ffprobe")
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-count_packets",
                "-show_entries",
                "stream=width,height,avg_frame_rate,r_frame_rate,nb_frames,nb_read_packets",
                "-of",
                "json",
            ])
            .arg(path)
            .output()
            .map_err(|e| CropError::decode_open(path, format!("Failed to start ffprobe: {e}")))?;

        if !output.status.success() {
            return Err(CropError::decode_open(
                path,
                format!(
                    "ffprobe failed (status {}): {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ));
        }

        let raw = String::from_utf8_lossy(&output.stdout);
        parse_probe(&raw)
            .ok_or_else(|| CropError::decode_open(path, "no decodable video stream"))
    }

    fn encode_args(&self, spec: &SinkSpec) -> Vec<String> {
        let mut args: Vec<String> = [
            "-hide_banner",
            "-v",
            "error",
            "-nostdin",
            "-y",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgb24",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        args.extend([
            "-s".to_string(),
            format!("{}x{}", spec.width, spec.height),
            "-r".to_string(),
            format!("{}", spec.fps),
            "-i".to_string(),
            "pipe:0".to_string(),
            "-an".to_string(),
            "-map_metadata".to_string(),
            "-1".to_string(),
            "-c:v".to_string(),
            self.encoder.codec.clone(),
            "-preset".to_string(),
            self.encoder.preset.clone(),
            "-crf".to_string(),
            self.encoder.crf.to_string(),
            "-pix_fmt".to_string(),
            self.encoder.pixel_format.clone(),
            // Byte-identical output for identical input.
            "-fflags".to_string(),
            "+bitexact".to_string(),
            "-flags:v".to_string(),
            "+bitexact".to_string(),
        ]);
        args.push(spec.path.to_string_lossy().into_owned());
        args
    }
}

impl MediaBackend for FfmpegBackend {
    fn open_source(&self, path: &Path) -> CropResult<Box<dyn FrameSource>> {
        if !path.exists() {
            return Err(CropError::decode_open(path, "file not found"));
        }
        let info = Self::probe(path)?;
        tracing::debug!(
            path = %path.display(),
            width = info.width,
            height = info.height,
            fps = info.fps,
            frames = ?info.frame_count,
            "Probed source"
        );
        Ok(Box::new(FfmpegSource::spawn(path, info)?))
    }

    fn create_sink(&self, spec: &SinkSpec) -> CropResult<Box<dyn FrameSink>> {
        Ok(Box::new(FfmpegSink::spawn(spec, self.encode_args(spec))?))
    }

    fn is_available(&self) -> bool {
        command_exists("ffmpeg") && command_exists("ffprobe")
    }

    fn name(&self) -> &str {
        "ffmpeg"
    }
}

struct FfmpegSource {
    path: PathBuf,
    info: StreamInfo,
    child: Child,
    stdout: BufReader<ChildStdout>,
    stderr: Option<JoinHandle<String>>,
    frame_len: usize,
    frames_read: u64,
    finished: bool,
}

impl FfmpegSource {
    fn spawn(path: &Path, info: StreamInfo) -> CropResult<Self> {
        let mut child = Command::new("ffmpeg")
            .args(["-hide_banner", "-v", "error", "-nostdin", "-noautorotate", "-i"])
            .arg(path)
            .args([
                "-map",
                "0:v:0",
                "-fps_mode",
                "passthrough",
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgb24",
                "pipe:1",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| CropError::decode_open(path, format!("Failed to start ffmpeg: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CropError::decode_open(path, "Failed to capture ffmpeg stdout"))?;
        let stderr = child.stderr.take().map(drain_stderr);

        tracing::debug!(pid = child.id(), path = %path.display(), "Decoder started");

        Ok(Self {
            path: path.to_path_buf(),
            frame_len: info.width as usize * info.height as usize * 3,
            info,
            child,
            stdout: BufReader::new(stdout),
            stderr,
            frames_read: 0,
            finished: false,
        })
    }

    fn finish_process(&mut self) -> CropResult<()> {
        self.finished = true;
        let status = self
            .child
            .wait()
            .map_err(|e| CropError::decode(format!("Failed to wait on ffmpeg: {e}")))?;
        let stderr_output = join_stderr(self.stderr.take());

        // A failing exit is an error even after frames were produced.
        if !status.success() {
            return Err(CropError::decode(format!(
                "ffmpeg failed decoding {} after {} frame(s) (status {}): {}",
                self.path.display(),
                self.frames_read,
                status,
                stderr_output.trim()
            )));
        }
        Ok(())
    }
}

impl FrameSource for FfmpegSource {
    fn info(&self) -> &StreamInfo {
        &self.info
    }

    fn read_frame(&mut self) -> CropResult<Option<Frame>> {
        if self.finished {
            return Ok(None);
        }

        let mut buf = vec![0u8; self.frame_len];
        let filled = read_full(&mut self.stdout, &mut buf)
            .map_err(|e| CropError::decode(format!("Failed reading decoded frames: {e}")))?;

        if filled == self.frame_len {
            self.frames_read += 1;
            return Frame::from_raw(self.info.width, self.info.height, buf)
                .map(Some)
                .ok_or_else(|| CropError::decode("decoded frame has unexpected size"));
        }

        if filled > 0 {
            tracing::warn!(
                path = %self.path.display(),
                bytes = filled,
                "Discarding truncated trailing frame"
            );
        }
        self.finish_process()?;
        Ok(None)
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

struct FfmpegSink {
    path: PathBuf,
    width: u32,
    height: u32,
    child: Child,
    stdin: Option<ChildStdin>,
    stderr: Option<JoinHandle<String>>,
    frames_written: u64,
}

impl FfmpegSink {
    fn spawn(spec: &SinkSpec, args: Vec<String>) -> CropResult<Self> {
        if let Some(parent) = spec.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| CropError::write(parent, format!("Cannot create directory: {e}")))?;
        }

        tracing::debug!(args = ?args, "Starting encoder");
        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| CropError::write(&spec.path, format!("Failed to start ffmpeg: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| CropError::write(&spec.path, "Failed to capture ffmpeg stdin"))?;
        let stderr = child.stderr.take().map(drain_stderr);

        Ok(Self {
            path: spec.path.clone(),
            width: spec.width,
            height: spec.height,
            child,
            stdin: Some(stdin),
            stderr,
            frames_written: 0,
        })
    }

    /// Close stdin and reap the encoder.
    fn close(&mut self) -> CropResult<String> {
        drop(self.stdin.take());
        let status = self
            .child
            .wait()
            .map_err(|e| CropError::write(&self.path, format!("Failed to wait on ffmpeg: {e}")))?;
        let stderr_output = join_stderr(self.stderr.take());
        if !status.success() {
            return Err(CropError::write(
                &self.path,
                format!("ffmpeg exited with {status}: {}", stderr_output.trim()),
            ));
        }
        Ok(stderr_output)
    }
}

impl FrameSink for FfmpegSink {
    fn write_frame(&mut self, frame: &Frame) -> CropResult<()> {
        if frame.dimensions() != (self.width, self.height) {
            return Err(CropError::write(
                &self.path,
                format!(
                    "frame is {}x{}, stream expects {}x{}",
                    frame.width(),
                    frame.height(),
                    self.width,
                    self.height
                ),
            ));
        }

        let Some(stdin) = self.stdin.as_mut() else {
            return Err(CropError::write(&self.path, "stream already closed"));
        };
        if let Err(err) = stdin.write_all(frame.as_raw()) {
            let detail = match self.close() {
                Err(exit) => exit.to_string(),
                Ok(_) => String::new(),
            };
            return Err(CropError::write(
                &self.path,
                format!("{err} {detail}").trim().to_string(),
            ));
        }
        self.frames_written += 1;
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.frames_written
    }

    fn finish(mut self: Box<Self>) -> CropResult<u64> {
        if let Some(mut stdin) = self.stdin.take() {
            stdin
                .flush()
                .map_err(|e| CropError::write(&self.path, format!("Failed to flush: {e}")))?;
        }
        self.close()?;
        tracing::debug!(
            path = %self.path.display(),
            frames = self.frames_written,
            "Encoder finished"
        );
        Ok(self.frames_written)
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        // EOF on stdin lets ffmpeg finalize whatever it has.
        if self.stdin.take().is_some() {
            let _ = self.child.wait();
        }
    }
}

/// Drain stderr concurrently to avoid ffmpeg blocking on a full stderr pipe.
fn drain_stderr(stderr: ChildStderr) -> JoinHandle<String> {
    std::thread::spawn(move || -> String {
        let mut reader = BufReader::new(stderr);
        let mut output = String::new();
        match reader.read_to_string(&mut output) {
            Ok(_) => output,
            Err(err) => format!("<failed to read ffmpeg stderr: {err}>"),
        }
    })
}

fn join_stderr(handle: Option<JoinHandle<String>>) -> String {
    handle
        .map(|h| {
            h.join()
                .unwrap_or_else(|_| "<failed to join stderr reader>".to_string())
        })
        .unwrap_or_default()
}

/// Fill `buf` as far as the stream allows. Returns the bytes read.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

pub(crate) fn command_exists(binary: &str) -> bool {
    Command::new("sh")
        .arg("-c")
        .arg(format!("command -v {binary} >/dev/null 2>&1"))
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    nb_frames: Option<String>,
    nb_read_packets: Option<String>,
}

fn parse_probe(raw: &str) -> Option<StreamInfo> {
    let probe: ProbeOutput = serde_json::from_str(raw).ok()?;
    let stream = probe.streams.into_iter().next()?;
    let width = stream.width.filter(|w| *w > 0)?;
    let height = stream.height.filter(|h| *h > 0)?;

    let fps = stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_rate)
        .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_rate))
        .unwrap_or(0.0);

    let count = |value: &Option<String>| {
        value
            .as_deref()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|n| *n > 0)
    };
    let frame_count = count(&stream.nb_read_packets).or_else(|| count(&stream.nb_frames));

    Some(StreamInfo {
        width,
        height,
        fps,
        frame_count,
    })
}

/// Parse an ffprobe rational such as `30000/1001`.
fn parse_rate(raw: &str) -> Option<f64> {
    let (num, den) = raw.trim().split_once('/').unwrap_or((raw.trim(), "1"));
    let num = num.parse::<f64>().ok()?;
    let den = den.parse::<f64>().ok()?;
    if den == 0.0 || num <= 0.0 {
        return None;
    }
    Some(num / den)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rate() {
        assert_eq!(parse_rate("60/1"), Some(60.0));
        assert!((parse_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert_eq!(parse_rate("0/0"), None);
        assert_eq!(parse_rate("25"), Some(25.0));
    }

    #[test]
    fn test_parse_probe_prefers_counted_packets() {
        let raw = r#"{
            "programs": [],
            "streams": [{
                "width": 1920,
                "height": 1080,
                "r_frame_rate": "60/1",
                "avg_frame_rate": "0/0",
                "nb_frames": "1799",
                "nb_read_packets": "1800"
            }]
        }"#;
        let info = parse_probe(raw).unwrap();
        assert_eq!((info.width, info.height), (1920, 1080));
        assert_eq!(info.fps, 60.0);
        assert_eq!(info.frame_count, Some(1800));
    }

    #[test]
    fn test_parse_probe_without_count() {
        let raw = r#"{"streams": [{"width": 64, "height": 48, "avg_frame_rate": "25/1"}]}"#;
        let info = parse_probe(raw).unwrap();
        assert_eq!(info.frame_count, None);
        assert_eq!(info.total_frames(), 0);
    }

    #[test]
    fn test_parse_probe_rejects_missing_stream() {
        assert!(parse_probe(r#"{"streams": []}"#).is_none());
        assert!(parse_probe("not json").is_none());
    }

    #[test]
    fn test_encode_args_are_deterministic_and_sized() {
        let backend = FfmpegBackend::new(EncoderConfig::default());
        let spec = SinkSpec {
            path: PathBuf::from("out/r1_trial.mp4"),
            width: 101,
            height: 57,
            fps: 60.0,
        };
        let args = backend.encode_args(&spec);
        assert!(args.windows(2).any(|w| w[0] == "-s" && w[1] == "101x57"));
        assert!(args.windows(2).any(|w| w[0] == "-r" && w[1] == "60"));
        assert!(args.windows(2).any(|w| w[0] == "-pix_fmt" && w[1] == "yuv444p"));
        assert!(args.iter().filter(|a| *a == "+bitexact").count() == 2);
        assert_eq!(args.last().map(String::as_str), Some("out/r1_trial.mp4"));
    }

    #[test]
    fn test_read_full_reports_short_reads() {
        let data = [1u8, 2, 3, 4, 5];
        let mut buf = [0u8; 8];
        assert_eq!(read_full(&mut &data[..], &mut buf).unwrap(), 5);
        let mut exact = [0u8; 3];
        assert_eq!(read_full(&mut &data[..], &mut exact).unwrap(), 3);
    }

    fn scripted_source(script: &str, width: u32, height: u32) -> FfmpegSource {
        let mut child = Command::new("sh")
            .args(["-c", script])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap();
        let stdout = child.stdout.take().unwrap();
        let stderr = child.stderr.take().map(drain_stderr);
        FfmpegSource {
            path: PathBuf::from("videos/trial.mp4"),
            frame_len: width as usize * height as usize * 3,
            info: StreamInfo {
                width,
                height,
                fps: 60.0,
                frame_count: Some(10),
            },
            child,
            stdout: BufReader::new(stdout),
            stderr,
            frames_read: 0,
            finished: false,
        }
    }

    #[test]
    fn test_decoder_crash_after_frames_is_an_error() {
        // two 2x2 rgb24 frames, then a failing exit
        let mut source = scripted_source("printf '%024d' 0; echo boom >&2; exit 1", 2, 2);
        assert!(source.read_frame().unwrap().is_some());
        assert!(source.read_frame().unwrap().is_some());

        let err = source.read_frame().unwrap_err();
        assert!(matches!(err, CropError::Decode { .. }));
        assert!(err.to_string().contains("after 2 frame(s)"));
        assert!(source.read_frame().unwrap().is_none());
    }

    #[test]
    fn test_clean_decoder_exit_ends_stream() {
        let mut source = scripted_source("printf '%012d' 0", 2, 2);
        assert!(source.read_frame().unwrap().is_some());
        assert!(source.read_frame().unwrap().is_none());
    }

    #[test]
    fn test_command_exists() {
        assert!(command_exists("sh"));
        assert!(!command_exists("arenacrop-definitely-not-a-binary"));
    }
}
