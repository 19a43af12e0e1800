//! Downsample finished crops in size and frame rate.

use std::path::PathBuf;

use arenacrop_common::config::AppConfig;
use arenacrop_render_engine::{
    discover_videos, downsample_video, DownsampleOptions, FfmpegBackend, MediaBackend,
};

pub fn run(
    config: AppConfig,
    input: PathBuf,
    output: PathBuf,
    factor: f64,
    frame_skip: u32,
) -> anyhow::Result<()> {
    let options = DownsampleOptions { factor, frame_skip };
    options
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid options: {e}"))?;

    let backend = FfmpegBackend::new(config.encoder.clone());
    if !backend.is_available() {
        anyhow::bail!("ffmpeg and ffprobe must be on PATH (run `arenacrop check`)");
    }

    let videos = discover_videos(&input, &config)?;
    println!(
        "Downsampling {} video(s): factor {factor}, keeping 1 frame in {frame_skip}",
        videos.len()
    );

    let mut failed = 0;
    for video in &videos {
        match downsample_video(&backend, video, &output, options) {
            Ok(summary) => println!(
                "  [OK]   {} ({} of {} frames)",
                summary.output.display(),
                summary.frames_written,
                summary.frames_read
            ),
            Err(e) => {
                failed += 1;
                tracing::warn!(video = %video.display(), error = %e, "Downsampling failed");
                println!("  [FAIL] {}: {e}", video.display());
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {} video(s) could not be downsampled", videos.len());
    }
    Ok(())
}
