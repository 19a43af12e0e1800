//! Show the progress store.

use std::path::PathBuf;

use arenacrop_job_model::progress::{ProgressStatus, ProgressStore};

pub fn run(progress_file: PathBuf, json: bool) -> anyhow::Result<()> {
    let store = ProgressStore::open(&progress_file)
        .map_err(|e| anyhow::anyhow!("Failed to read progress: {e}"))?;

    if json {
        let records: serde_json::Map<String, serde_json::Value> = store
            .entries()
            .map(|(video, record)| serde_json::to_value(record).map(|v| (video.to_string(), v)))
            .collect::<Result<_, _>>()?;
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    println!("Progress file: {}", store.path().display());
    if store.is_empty() {
        println!("  No videos recorded.");
        return Ok(());
    }

    for (video, record) in store.entries() {
        match record.status {
            ProgressStatus::Done => println!(
                "  [DONE]   {video}  frames: {}  outputs: {}  at: {}",
                record
                    .frames
                    .map(|f| f.to_string())
                    .unwrap_or_else(|| "?".to_string()),
                record.outputs.len(),
                record.completed_at.as_deref().unwrap_or("-"),
            ),
            ProgressStatus::Failed => println!(
                "  [FAILED] {video}  {}",
                record.error.as_deref().unwrap_or("unknown error")
            ),
        }
    }
    println!(
        "\n{} done, {} failed",
        store.done_count(),
        store.len() - store.done_count()
    );
    Ok(())
}
