use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Live object detection client for a remote YOLO-style detection service.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about)]
pub struct AppArgs {
    /// Optional configuration file layered under `LIVE_DETECT__*` variables.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Detection service base URL.
    #[arg(long, global = true)]
    pub api_base: Option<String>,
    /// Camera snapshot URL.
    #[arg(long, global = true)]
    pub camera_url: Option<String>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the live poll loop against the camera.
    Live {
        /// File the latest annotated image is written to.
        #[arg(long, default_value = "annotated.jpg")]
        output: PathBuf,
        /// Stop after this many seconds instead of waiting for Ctrl-C.
        #[arg(long)]
        duration_secs: Option<u64>,
        /// Save the final annotated image here on exit.
        #[arg(long)]
        snapshot_dir: Option<PathBuf>,
        #[arg(long)]
        threshold: Option<f32>,
        /// Restrict detection to these labels (repeatable).
        #[arg(long = "class")]
        classes: Vec<String>,
    },
    /// Run detection once on a still image.
    Upload {
        file: PathBuf,
        #[arg(long)]
        threshold: Option<f32>,
        #[arg(long, default_value = "annotated_upload.jpg")]
        output: PathBuf,
    },
    /// Print the classes the detection service can filter on.
    Classes,
}
