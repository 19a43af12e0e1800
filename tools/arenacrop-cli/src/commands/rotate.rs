//! Rotate upside-down recordings by 180 degrees.

use std::path::PathBuf;

use arenacrop_common::config::AppConfig;
use arenacrop_render_engine::{discover_videos, rotate_video, FfmpegBackend, MediaBackend};

pub fn run(config: AppConfig, input: PathBuf, output: PathBuf) -> anyhow::Result<()> {
    let backend = FfmpegBackend::new(config.encoder.clone());
    if !backend.is_available() {
        anyhow::bail!("ffmpeg and ffprobe must be on PATH (run `arenacrop check`)");
    }

    let videos = discover_videos(&input, &config)?;
    println!("Found {} video(s) to rotate.", videos.len());

    let mut failed = 0;
    for video in &videos {
        match rotate_video(&backend, video, &output) {
            Ok(summary) => println!(
                "  [OK]   {} ({} frames)",
                summary.output.display(),
                summary.frames_written
            ),
            Err(e) => {
                failed += 1;
                tracing::warn!(video = %video.display(), error = %e, "Rotation failed");
                println!("  [FAIL] {}: {e}", video.display());
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {} video(s) could not be rotated", videos.len());
    }
    println!("All videos rotated.");
    Ok(())
}
