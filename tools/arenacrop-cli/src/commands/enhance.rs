//! Boost the contrast of finished crops.

use std::path::PathBuf;

use arenacrop_common::config::AppConfig;
use arenacrop_processing_core::contrast::EnhanceOptions;
use arenacrop_render_engine::{discover_videos, enhance_video, FfmpegBackend, MediaBackend};

pub fn run(
    config: AppConfig,
    input: PathBuf,
    output: PathBuf,
    options: EnhanceOptions,
) -> anyhow::Result<()> {
    options
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid options: {e}"))?;

    let backend = FfmpegBackend::new(config.encoder.clone());
    if !backend.is_available() {
        anyhow::bail!("ffmpeg and ffprobe must be on PATH (run `arenacrop check`)");
    }

    let videos = discover_videos(&input, &config)?;
    println!(
        "Enhancing {} video(s): clip limit {}, {}x{} tiles",
        videos.len(),
        options.clip_limit,
        options.grid_size,
        options.grid_size
    );

    let mut failed = 0;
    for video in &videos {
        match enhance_video(&backend, video, &output, options) {
            Ok(summary) => println!(
                "  [OK]   {} ({} frames)",
                summary.output.display(),
                summary.frames_written
            ),
            Err(e) => {
                failed += 1;
                tracing::warn!(video = %video.display(), error = %e, "Enhancement failed");
                println!("  [FAIL] {}: {e}", video.display());
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {} video(s) could not be enhanced", videos.len());
    }
    Ok(())
}
