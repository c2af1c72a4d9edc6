//! Command implementations

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::app::registry::JobRegistry;
use crate::cli::args::{ExportArgs, FetchArgs, ScanArgs, SplitArgs, WatchArgs};
use crate::config::AppConfig;
use crate::domain::model::{ClipOutcome, DownloadState, ScanState};
use crate::engine::recorder::export_csv;
use crate::utils::path::newest_with_extension;
use crate::utils::time::format_hms;

/// Execute the scan command
pub async fn scan(mut config: AppConfig, args: ScanArgs) -> Result<()> {
    if let Some(fps) = args.fps {
        config.capture.fps = fps;
    }
    let vod = match args.vod {
        Some(vod) => vod,
        None => newest_with_extension(&config.download.recordings_dir, &config.split.extensions)
            .with_context(|| {
                format!(
                    "no recording found under {}; pass --vod",
                    config.download.recordings_dir.display()
                )
            })?,
    };
    let csv_log = config.bookmarks.format.eq_ignore_ascii_case("csv");
    let registry = JobRegistry::with_default_adapters(config)?;
    let (job_id, controller) = registry.start_scan(Some(vod.as_path()), args.resume)?;
    info!("scan job {job_id} started for {}", vod.display());

    let mut rx = controller.subscribe();
    let wait = controller.wait();
    tokio::pin!(wait);
    let summary = loop {
        tokio::select! {
            result = &mut wait => break result?,
            _ = tokio::signal::ctrl_c() => {
                warn!("interrupt received, stopping scan");
                controller.stop()?;
            }
            changed = rx.changed() => {
                if changed.is_err() {
                    continue;
                }
                let snapshot = rx.borrow().clone();
                if snapshot.state == ScanState::Running {
                    match snapshot.percent {
                        Some(p) => info!(
                            "scanning {} ({:.1}%)",
                            format_hms(snapshot.position_seconds),
                            p * 100.0
                        ),
                        None => info!("scanning {}", format_hms(snapshot.position_seconds)),
                    }
                }
            }
        }
    };

    let Some(summary) = summary else {
        println!("Scan paused; rerun with --resume to continue.");
        return Ok(());
    };
    println!(
        "Scan finished: {} events in {} -> {}",
        summary.event_count,
        format_hms(summary.duration_scanned),
        summary.log_path.display()
    );
    if csv_log && summary.event_count > 0 {
        let csv_path = export_csv(&summary.log_path).context("csv export failed")?;
        println!("Exported {}", csv_path.display());
    }

    let completed = controller.progress().state == ScanState::Completed;
    if completed && !args.no_split && summary.event_count > 0 {
        let outcomes = registry
            .split(&summary.log_path, &vod)
            .await
            .context("splitting after scan failed")?;
        report_outcomes(&outcomes);
    }
    Ok(())
}

/// Execute the watch command
pub async fn watch(mut config: AppConfig, args: WatchArgs) -> Result<()> {
    if let Some(backend) = args.backend {
        config.capture.backend = backend;
    }
    let csv_log = config.bookmarks.format.eq_ignore_ascii_case("csv");
    let registry = JobRegistry::with_default_adapters(config)?;
    let (job_id, controller) = registry.start_scan(None, false)?;
    info!("live capture job {job_id} started; press Ctrl-C to stop");

    let wait = controller.wait();
    tokio::pin!(wait);
    let summary = loop {
        tokio::select! {
            result = &mut wait => break result?,
            _ = tokio::signal::ctrl_c() => {
                info!("stopping live capture");
                controller.stop()?;
            }
        }
    };
    if let Some(summary) = summary {
        println!(
            "Session {}: {} events -> {}",
            summary.session_id,
            summary.event_count,
            summary.log_path.display()
        );
        if csv_log && summary.event_count > 0 {
            let csv_path = export_csv(&summary.log_path).context("csv export failed")?;
            println!("Exported {}", csv_path.display());
        }
    }
    Ok(())
}

/// Execute the split command
pub async fn split(mut config: AppConfig, args: SplitArgs) -> Result<()> {
    if let Some(output_dir) = args.output_dir {
        config.split.output_dir = output_dir;
    }
    let bookmarks = match args.bookmarks {
        Some(bookmarks) => bookmarks,
        None => newest_with_extension(&config.bookmarks.directory, &[".jsonl".into()]).with_context(
            || {
                format!(
                    "no bookmark log under {}; pass --bookmarks",
                    config.bookmarks.directory.display()
                )
            },
        )?,
    };
    let input = match args.input {
        Some(input) => input,
        None => newest_with_extension(&config.download.recordings_dir, &config.split.extensions)
            .with_context(|| {
                format!(
                    "no recording found under {}; pass --input",
                    config.download.recordings_dir.display()
                )
            })?,
    };
    let registry = JobRegistry::with_default_adapters(config)?;
    let outcomes = registry
        .split(&bookmarks, &input)
        .await
        .context("split failed")?;
    if outcomes.is_empty() {
        println!("No events in {}; nothing to split.", bookmarks.display());
        return Ok(());
    }
    report_outcomes(&outcomes);
    Ok(())
}

/// Execute the fetch command
pub async fn fetch(config: AppConfig, args: FetchArgs) -> Result<()> {
    let registry = JobRegistry::with_default_adapters(config.clone())?;
    let (job_id, controller) = registry.start_download(&args.url)?;
    info!("download job {job_id} started");

    let mut rx = controller.subscribe();
    let wait = controller.wait();
    tokio::pin!(wait);
    let path = loop {
        tokio::select! {
            result = &mut wait => break result?,
            _ = tokio::signal::ctrl_c() => {
                warn!("interrupt received, cancelling download");
                controller.cancel();
            }
            changed = rx.changed() => {
                if changed.is_err() {
                    continue;
                }
                let snapshot = rx.borrow().clone();
                if snapshot.state == DownloadState::Downloading {
                    info!(
                        "downloading {:.1}% {} eta {}",
                        snapshot.percent, snapshot.speed, snapshot.eta
                    );
                }
            }
        }
    };
    println!("Downloaded to {}", path.display());

    if args.scan {
        let scan_args = ScanArgs {
            vod: Some(path),
            fps: None,
            resume: false,
            no_split: false,
        };
        return scan(config, scan_args).await;
    }
    Ok(())
}

/// Execute the export command
pub fn export(args: ExportArgs) -> Result<()> {
    let csv_path = export_csv(&args.bookmarks).context("export failed")?;
    println!("Exported {}", csv_path.display());
    Ok(())
}

fn report_outcomes(outcomes: &[ClipOutcome]) {
    for outcome in outcomes {
        match &outcome.error {
            None => println!(
                "  [{} - {}] k{} a{} d{} -> {}",
                format_hms(outcome.interval.start_seconds),
                format_hms(outcome.interval.end_seconds),
                outcome.interval.counts.kills,
                outcome.interval.counts.assists,
                outcome.interval.counts.deaths,
                outcome.output_path.display()
            ),
            Some(error) => println!(
                "  [{} - {}] FAILED: {}",
                format_hms(outcome.interval.start_seconds),
                format_hms(outcome.interval.end_seconds),
                error
            ),
        }
    }
    let failed = outcomes.iter().filter(|o| !o.succeeded()).count();
    println!("{} clips written, {} failed", outcomes.len() - failed, failed);
}
