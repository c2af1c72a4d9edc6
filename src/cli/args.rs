//! Command-line argument definitions

use std::path::PathBuf;

use clap::Args;

/// Arguments for the scan command
#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Input VOD file path (defaults to the newest recording)
    #[arg(short, long)]
    pub vod: Option<PathBuf>,

    /// Decode frame rate override
    #[arg(long)]
    pub fps: Option<f64>,

    /// Continue from this VOD's resume marker, if present
    #[arg(long)]
    pub resume: bool,

    /// Do not split clips after a completed scan
    #[arg(long)]
    pub no_split: bool,
}

/// Arguments for the watch command
#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Capture backend override (auto, xcap, ffmpeg)
    #[arg(long)]
    pub backend: Option<String>,
}

/// Arguments for the split command
#[derive(Args, Debug)]
pub struct SplitArgs {
    /// Bookmark log (JSONL or exported CSV; defaults to the newest log)
    #[arg(short, long)]
    pub bookmarks: Option<PathBuf>,

    /// Input VOD file path (defaults to the newest recording)
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Output directory override
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,
}

/// Arguments for the fetch command
#[derive(Args, Debug)]
pub struct FetchArgs {
    /// VOD page URL
    #[arg(short, long)]
    pub url: String,

    /// Scan the downloaded file once the fetch completes
    #[arg(long)]
    pub scan: bool,
}

/// Arguments for the export command
#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Bookmark log (JSONL)
    #[arg(short, long)]
    pub bookmarks: PathBuf,
}
