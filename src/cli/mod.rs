//! CLI module for Killmark
//!
//! This module handles command-line argument parsing and command execution.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub mod args;
pub mod commands;

/// Killmark killfeed scanner and clip splitter
///
/// Scans gameplay footage (recorded VODs or the live screen) for killfeed
/// keywords, bookmarks every hit, and cuts highlight clips around them.
#[derive(Parser)]
#[command(name = "killmark")]
#[command(about = "Killfeed OCR bookmarking and highlight clipping")]
#[command(version)]
#[command(long_about = None)]
pub struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Logging level override
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// The command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Scan a recorded VOD for killfeed events
    Scan(args::ScanArgs),
    /// Watch the live screen and bookmark events as they happen
    Watch(args::WatchArgs),
    /// Cut clips out of a VOD from a bookmark log
    Split(args::SplitArgs),
    /// Download a VOD for offline scanning
    Fetch(args::FetchArgs),
    /// Export a bookmark log as CSV
    Export(args::ExportArgs),
}
