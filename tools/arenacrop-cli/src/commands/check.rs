//! Check system capabilities and configuration.

use std::path::PathBuf;

use arenacrop_common::config::{config_file_path, AppConfig};
use arenacrop_job_model::metadata::{SubjectColumns, SubjectTable};
use arenacrop_job_model::progress::ProgressStore;
use arenacrop_render_engine::{discover_videos, FfmpegBackend, MediaBackend};

pub fn run(
    config: AppConfig,
    config_path: Option<PathBuf>,
    write_config: bool,
) -> anyhow::Result<()> {
    println!("ArenaCrop System Check");
    println!("{}", "=".repeat(50));

    let mut all_ok = true;

    // Media backend
    let backend = FfmpegBackend::new(config.encoder.clone());
    if backend.is_available() {
        println!("[OK] Media backend: {}", backend.name());
    } else {
        all_ok = false;
        println!("[FAIL] ffmpeg/ffprobe not found on PATH");
    }

    // Configuration
    if write_config {
        let written = match &config_path {
            Some(path) => config.save_to(path),
            None => config.save(),
        };
        written.map_err(|e| anyhow::anyhow!("Failed to write config: {e}"))?;
    }
    let path = config_path.unwrap_or_else(config_file_path);
    match config.validate() {
        Ok(()) => println!("[OK] Config: {}", path.display()),
        Err(e) => {
            all_ok = false;
            println!("[FAIL] Config {}: {e}", path.display());
        }
    }
    println!(
        "     {} subjects, {} fps, codec {} ({})",
        config.job.num_subjects,
        config.job.output_fps,
        config.encoder.codec,
        config.encoder.pixel_format
    );

    // Inputs
    match discover_videos(&config.paths.video_dir, &config) {
        Ok(videos) => println!(
            "[OK] Videos: {} in {}",
            videos.len(),
            config.paths.video_dir.display()
        ),
        Err(e) => {
            all_ok = false;
            println!("[FAIL] Videos: {e}");
        }
    }

    let columns = SubjectColumns {
        filename_column: config.metadata.filename_column.clone(),
        subject_prefix: config.metadata.subject_column_prefix.clone(),
        num_subjects: config.job.num_subjects,
    };
    match SubjectTable::load(&config.paths.metadata_path, columns) {
        Ok(table) => println!(
            "[OK] Metadata: {} rows in {}",
            table.len(),
            config.paths.metadata_path.display()
        ),
        Err(e) => {
            all_ok = false;
            println!("[FAIL] Metadata: {e}");
        }
    }

    match ProgressStore::open(&config.paths.progress_file) {
        Ok(store) => println!(
            "[OK] Progress: {} done in {}",
            store.done_count(),
            config.paths.progress_file.display()
        ),
        Err(e) => {
            all_ok = false;
            println!("[FAIL] Progress: {e}");
        }
    }

    println!();
    if all_ok {
        println!("All checks passed. ArenaCrop is ready.");
    } else {
        println!("Some checks failed. See above for details.");
    }

    Ok(())
}
