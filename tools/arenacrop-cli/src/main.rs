//! ArenaCrop CLI: batch cropping of multi-subject arena recordings.
//!
//! Usage:
//!   arenacrop plan                    Show what the next batch would do
//!   arenacrop crop -a <FILE>          Annotate from a file, then extract
//!   arenacrop status                  Show the progress store
//!   arenacrop reset <VIDEO>|--all     Forget completed videos
//!   arenacrop rotate <DIR>            Rotate recordings by 180 degrees
//!   arenacrop downsample <DIR>        Shrink finished crops
//!   arenacrop enhance <DIR>           Boost contrast of finished crops
//!   arenacrop check                   Check system capabilities

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use arenacrop_common::config::AppConfig;
use arenacrop_processing_core::contrast::EnhanceOptions;

mod commands;

#[derive(Parser)]
#[command(
    name = "arenacrop",
    about = "Drift-compensated multi-region batch video cropping",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to $XDG_CONFIG_HOME/arenacrop/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Overrides for the batch locations in the config file.
#[derive(Args, Debug)]
struct BatchPaths {
    /// Directory of source recordings
    #[arg(long)]
    videos: Option<PathBuf>,

    /// Output directory for the crops
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// CSV subject table
    #[arg(long)]
    metadata: Option<PathBuf>,

    /// Progress file
    #[arg(long)]
    progress: Option<PathBuf>,

    /// Number of subjects per recording
    #[arg(long)]
    subjects: Option<usize>,
}

impl BatchPaths {
    fn apply(self, config: &mut AppConfig) {
        if let Some(videos) = self.videos {
            config.paths.video_dir = videos;
        }
        if let Some(output) = self.output {
            config.paths.output_dir = output;
        }
        if let Some(metadata) = self.metadata {
            config.paths.metadata_path = metadata;
        }
        if let Some(progress) = self.progress {
            config.paths.progress_file = progress;
        }
        if let Some(subjects) = self.subjects {
            config.job.num_subjects = subjects;
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Annotate pending videos from an annotation file, then extract all crops
    Crop {
        /// JSON annotation file
        #[arg(short, long)]
        annotations: PathBuf,

        /// Output frame rate
        #[arg(long)]
        fps: Option<u32>,

        #[command(flatten)]
        paths: BatchPaths,
    },

    /// Show which videos are done, pending, or missing metadata
    Plan {
        #[command(flatten)]
        paths: BatchPaths,
    },

    /// Show the progress store
    Status {
        /// Progress file
        #[arg(long)]
        progress: Option<PathBuf>,

        /// Print the records as JSON
        #[arg(long)]
        json: bool,
    },

    /// Forget progress so videos are processed again
    Reset {
        /// Source file name to forget
        video: Option<String>,

        /// Forget every video
        #[arg(long, conflicts_with = "video")]
        all: bool,

        /// Progress file
        #[arg(long)]
        progress: Option<PathBuf>,
    },

    /// Rotate every recording in a directory by 180 degrees
    Rotate {
        /// Directory of recordings
        input: PathBuf,

        /// Output directory
        #[arg(short, long, default_value = "output_rotated")]
        output: PathBuf,
    },

    /// Downsample every video in a directory
    Downsample {
        /// Directory of videos
        input: PathBuf,

        /// Output directory
        #[arg(short, long, default_value = "output_downsampled")]
        output: PathBuf,

        /// Scale factor for both axes
        #[arg(long, default_value = "0.5")]
        factor: f64,

        /// Keep one frame in every N
        #[arg(long, default_value = "2")]
        frame_skip: u32,
    },

    /// Apply adaptive contrast enhancement to every video in a directory
    Enhance {
        /// Directory of videos
        input: PathBuf,

        /// Output directory
        #[arg(short, long, default_value = "output_enhanced")]
        output: PathBuf,

        /// Histogram clip limit
        #[arg(long, default_value = "3.0")]
        clip_limit: f64,

        /// Tiles per axis
        #[arg(long, default_value = "8")]
        grid_size: u32,
    },

    /// Check system capabilities and configuration
    Check {
        /// Write the effective configuration to the config file
        #[arg(long)]
        write_config: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path)
            .map_err(|e| anyhow::anyhow!("Failed to load config: {e}"))?,
        None => AppConfig::load(),
    };

    // Initialize logging
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    arenacrop_common::logging::init_logging(&config.logging);

    match cli.command {
        Commands::Crop {
            annotations,
            fps,
            paths,
        } => {
            paths.apply(&mut config);
            if let Some(fps) = fps {
                config.job.output_fps = fps;
            }
            commands::crop::run(config, annotations)
        }
        Commands::Plan { paths } => {
            paths.apply(&mut config);
            commands::plan::run(config)
        }
        Commands::Status { progress, json } => {
            commands::status::run(progress.unwrap_or(config.paths.progress_file), json)
        }
        Commands::Reset {
            video,
            all,
            progress,
        } => commands::reset::run(progress.unwrap_or(config.paths.progress_file), video, all),
        Commands::Rotate { input, output } => commands::rotate::run(config, input, output),
        Commands::Downsample {
            input,
            output,
            factor,
            frame_skip,
        } => commands::downsample::run(config, input, output, factor, frame_skip),
        Commands::Enhance {
            input,
            output,
            clip_limit,
            grid_size,
        } => commands::enhance::run(
            config,
            input,
            output,
            EnhanceOptions {
                clip_limit,
                grid_size,
            },
        ),
        Commands::Check { write_config } => {
            commands::check::run(config, cli.config, write_config)
        }
    }
}
