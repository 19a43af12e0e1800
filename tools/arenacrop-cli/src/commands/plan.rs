//! Show the state of every video in the batch directory.

use arenacrop_common::config::AppConfig;
use arenacrop_render_engine::{BatchRunner, FfmpegBackend, PlanStatus};

pub fn run(config: AppConfig) -> anyhow::Result<()> {
    let backend = FfmpegBackend::new(config.encoder.clone());
    let runner = BatchRunner::new(config, backend)
        .map_err(|e| anyhow::anyhow!("Failed to prepare batch: {e}"))?;

    let plan = runner.plan()?;
    if plan.is_empty() {
        println!(
            "No videos found in {}",
            runner.config().paths.video_dir.display()
        );
        return Ok(());
    }

    let (mut done, mut pending, mut missing) = (0, 0, 0);
    for entry in &plan {
        match &entry.status {
            PlanStatus::Done => {
                done += 1;
                println!("  [DONE]    {}", entry.video_id);
            }
            PlanStatus::Pending { subjects } => {
                pending += 1;
                println!("  [PENDING] {} ({})", entry.video_id, subjects.join(", "));
            }
            PlanStatus::MissingMetadata { reason } => {
                missing += 1;
                println!("  [SKIP]    {}: {reason}", entry.video_id);
            }
        }
    }

    println!("\n{done} done, {pending} pending, {missing} without metadata");
    Ok(())
}
