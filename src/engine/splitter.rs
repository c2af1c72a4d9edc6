//! Clip synthesis: bookmark events in, trimmed highlight files out.
//!
//! Interval math lives in the domain rules; this engine resolves naming and
//! output locations and drives the trimmer, several cuts at a time. A failed
//! cut is recorded in its outcome and never aborts the batch.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Local, NaiveDateTime};
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::config::SplitConfig;
use crate::domain::errors::DomainError;
use crate::domain::model::{ClipOutcome, Event};
use crate::domain::rules::{
    build_intervals, clip_file_name, merge_intervals, parse_vod_start_time, CategoryMap,
    WindowPolicy,
};
use crate::ports::MediaTrimmer;

pub struct ClipSynthesizer {
    trimmer: Arc<dyn MediaTrimmer>,
    policy: WindowPolicy,
    merge_gap: f64,
    categories: CategoryMap,
    output_dir: PathBuf,
    max_parallel: usize,
}

impl ClipSynthesizer {
    pub fn new(trimmer: Arc<dyn MediaTrimmer>, split: &SplitConfig) -> Self {
        let policy = WindowPolicy::new(split.pre_seconds, split.post_seconds)
            .with_overrides(&split.event_windows);
        Self {
            trimmer,
            policy,
            merge_gap: split.merge_gap_seconds,
            categories: split.categories.clone(),
            output_dir: split.output_dir.clone(),
            max_parallel: num_cpus::get().max(1),
        }
    }

    /// Cut one clip per merged interval. Outcomes come back in interval
    /// order, successful or not.
    pub async fn split(
        &self,
        vod_path: &Path,
        events: &[Event],
    ) -> Result<Vec<ClipOutcome>, DomainError> {
        if !vod_path.is_file() {
            return Err(DomainError::InputNotFound(vod_path.display().to_string()));
        }
        if events.is_empty() {
            info!("no events, nothing to split");
            return Ok(Vec::new());
        }

        let duration = self.trimmer.probe_duration(vod_path).await?;
        let intervals = merge_intervals(
            build_intervals(events, &self.policy, duration),
            self.merge_gap,
            &self.categories,
        );
        info!(
            "{} events -> {} clips from {}",
            events.len(),
            intervals.len(),
            vod_path.display()
        );

        let output_dir = self.resolve_output_dir(vod_path)?;
        let vod_start = vod_start_time(vod_path);
        let extension = vod_path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_else(|| ".mp4".to_string());

        let semaphore = Arc::new(Semaphore::new(self.max_parallel));
        let mut handles = Vec::with_capacity(intervals.len());
        for (index, interval) in intervals.into_iter().enumerate() {
            let output_path = output_dir.join(clip_file_name(
                vod_start,
                &interval,
                index + 1,
                &extension,
            ));
            let trimmer = Arc::clone(&self.trimmer);
            let semaphore = Arc::clone(&semaphore);
            let source = vod_path.to_path_buf();
            handles.push(tokio::spawn(async move {
                // Closed semaphore is unreachable; treat it as a trim failure.
                let result = match semaphore.acquire().await {
                    Ok(_permit) => {
                        trimmer
                            .trim(
                                &source,
                                interval.start_seconds,
                                interval.duration(),
                                &output_path,
                            )
                            .await
                    }
                    Err(e) => Err(DomainError::TrimFail(e.to_string())),
                };
                match result {
                    Ok(()) => ClipOutcome {
                        interval,
                        output_path,
                        error: None,
                    },
                    Err(e) => {
                        warn!("clip {} failed: {e}", output_path.display());
                        ClipOutcome {
                            interval,
                            output_path,
                            error: Some(e.to_string()),
                        }
                    }
                }
            }));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for handle in handles {
            let outcome = handle
                .await
                .map_err(|e| DomainError::TrimFail(format!("trim task panicked: {e}")))?;
            outcomes.push(outcome);
        }
        let failed = outcomes.iter().filter(|o| !o.succeeded()).count();
        info!("split done: {} ok, {} failed", outcomes.len() - failed, failed);
        Ok(outcomes)
    }

    fn resolve_output_dir(&self, vod_path: &Path) -> Result<PathBuf, DomainError> {
        let dir = if self.output_dir.is_absolute() {
            self.output_dir.clone()
        } else {
            vod_path
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join(&self.output_dir)
        };
        std::fs::create_dir_all(&dir)
            .map_err(|e| DomainError::TrimFail(format!("{}: {e}", dir.display())))?;
        Ok(dir)
    }
}

/// Recording start time: from the file name when it carries one, otherwise
/// the file's modification time.
fn vod_start_time(vod_path: &Path) -> NaiveDateTime {
    if let Some(parsed) = parse_vod_start_time(vod_path) {
        return parsed;
    }
    let mtime = std::fs::metadata(vod_path)
        .and_then(|m| m.modified())
        .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
    DateTime::<Local>::from(mtime).naive_local()
}
