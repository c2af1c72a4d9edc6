//! Killmark killfeed scanner and clip splitter
//!
//! Scans gameplay footage for killfeed keywords via OCR, bookmarks every
//! hit with a video-relative timestamp, and cuts highlight clips around
//! the bookmarks.
//!
//! # Usage
//!
//! ```bash
//! killmark scan --vod "Replay_20260301_120000.mp4"
//! killmark watch
//! killmark split --bookmarks session.jsonl --input match.mp4
//! killmark fetch --url "https://www.twitch.tv/videos/123456789" --scan
//! ```

use anyhow::Result;
use clap::Parser;

use killmark::cli::{commands, Cli, Commands};
use killmark::config::AppConfig;
use killmark::utils::logging;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;

    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    logging::init(&level);

    match cli.command {
        Commands::Scan(args) => commands::scan(config, args).await,
        Commands::Watch(args) => commands::watch(config, args).await,
        Commands::Split(args) => commands::split(config, args).await,
        Commands::Fetch(args) => commands::fetch(config, args).await,
        Commands::Export(args) => commands::export(args),
    }
}
