//! Forget recorded progress.

use std::path::PathBuf;

use arenacrop_job_model::progress::ProgressStore;

pub fn run(progress_file: PathBuf, video: Option<String>, all: bool) -> anyhow::Result<()> {
    let mut store = ProgressStore::open(&progress_file)
        .map_err(|e| anyhow::anyhow!("Failed to read progress: {e}"))?;

    match (video, all) {
        (_, true) => {
            let count = store.reset_all()?;
            println!("Forgot {count} video(s) in {}", progress_file.display());
        }
        (Some(video), false) => {
            if store.reset(&video)? {
                println!("Forgot {video}; it will be processed on the next run.");
            } else {
                println!("{video} is not recorded in {}", progress_file.display());
            }
        }
        (None, false) => anyhow::bail!("Name a video to reset, or pass --all"),
    }
    Ok(())
}
