//! Annotate pending videos, then extract every confirmed job.

use std::io::Write;
use std::path::PathBuf;

use arenacrop_common::config::AppConfig;
use arenacrop_processing_core::replay::ReplayAnnotator;
use arenacrop_render_engine::{
    BatchRunner, ExtractProgress, ExtractStage, FfmpegBackend, MediaBackend, ProgressCallback,
};

pub fn run(config: AppConfig, annotations: PathBuf) -> anyhow::Result<()> {
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {e}"))?;

    let backend = FfmpegBackend::new(config.encoder.clone());
    if !backend.is_available() {
        anyhow::bail!("ffmpeg and ffprobe must be on PATH (run `arenacrop check`)");
    }

    println!("Videos:   {}", config.paths.video_dir.display());
    println!("Output:   {}", config.paths.output_dir.display());
    println!("Progress: {}", config.paths.progress_file.display());

    let mut runner = BatchRunner::new(config, backend)
        .map_err(|e| anyhow::anyhow!("Failed to prepare batch: {e}"))?;
    let mut annotator = ReplayAnnotator::load(&annotations)
        .map_err(|e| anyhow::anyhow!("Failed to load annotations: {e}"))?;

    println!("\nAnnotation phase");
    let annotated = runner.annotation_phase(&mut annotator)?;
    for skipped in &annotated.skipped {
        println!("  [SKIP] {}: {}", skipped.video_id, skipped.reason);
    }
    if annotated.aborted {
        println!("  Annotation stopped early; remaining videos are left for a later run.");
    }
    println!("  {} job(s) queued", annotated.queue.len());

    if annotated.queue.is_empty() {
        println!("\nNothing to extract.");
        return Ok(());
    }

    println!("\nExtraction phase");
    let progress_cb: ProgressCallback = Box::new(|p: ExtractProgress| match p.stage {
        ExtractStage::Extracting => {
            match p.fraction() {
                Some(fraction) => print!(
                    "\r  {}: {}/{} frames ({:.1}%)  ",
                    p.video_id,
                    p.frames_done,
                    p.total_frames.unwrap_or(0),
                    fraction * 100.0
                ),
                None => print!("\r  {}: {} frames  ", p.video_id, p.frames_done),
            }
            let _ = std::io::stdout().flush();
        }
        ExtractStage::Complete => {
            println!("\r  {}: done ({} frames)    ", p.video_id, p.frames_done)
        }
        ExtractStage::Failed => println!("\r  {}: failed    ", p.video_id),
        ExtractStage::Opening | ExtractStage::Finalizing => {}
    });

    let report = runner
        .run_batch(annotated.queue, Some(progress_cb))
        .map_err(|e| anyhow::anyhow!("Batch aborted: {e}"))?;

    for skipped in &report.skipped {
        println!("  [SKIP] {}: {}", skipped.video_id, skipped.reason);
    }
    println!(
        "\nBatch complete: {} video(s), {} source frames.",
        report.completed.len(),
        report.frames
    );
    Ok(())
}
