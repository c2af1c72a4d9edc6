//! Remote VOD fetching through yt-dlp.
//!
//! Progress arrives on stdout via `--progress-template` as
//! `download:<percent>|<speed>|<eta>` lines and is republished through a
//! watch channel. Cancellation kills the child; yt-dlp leaves a `.part`
//! file that it resumes from on the next attempt.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::errors::DomainError;
use crate::domain::model::{DownloadProgress, DownloadState};
use crate::ports::RemoteFetcher;
use crate::utils::path::{resolve_tool, sanitize_stem};

const PROGRESS_TEMPLATE: &str =
    "download:%(progress._percent_str)s|%(progress._speed_str)s|%(progress._eta_str)s";

pub struct YtDlpFetcher {
    binary: PathBuf,
    url_pattern: Regex,
    progress_pattern: Regex,
}

impl YtDlpFetcher {
    pub fn new() -> Result<Self, DomainError> {
        let url_pattern = Regex::new(r"^https?://(www\.)?twitch\.tv/videos/\d+/?$")
            .map_err(|e| DomainError::FetchFail(format!("url pattern: {e}")))?;
        let progress_pattern = Regex::new(r"^\s*([\d.]+)%\s*\|(.*?)\|(.*?)\s*$")
            .map_err(|e| DomainError::FetchFail(format!("progress pattern: {e}")))?;
        Ok(Self {
            binary: resolve_tool("yt-dlp"),
            url_pattern,
            progress_pattern,
        })
    }

    fn parse_progress_line(&self, line: &str) -> Option<(f64, String, String)> {
        let payload = line.strip_prefix("download:")?;
        let captures = self.progress_pattern.captures(payload)?;
        let percent = captures[1].parse::<f64>().ok()?;
        Some((
            percent.clamp(0.0, 100.0),
            captures[2].trim().to_string(),
            captures[3].trim().to_string(),
        ))
    }

    /// Derive the output file name from the VOD's metadata:
    /// `<streamer>_<upload date>.mp4`, sanitized for the filesystem.
    async fn resolve_output_path(
        &self,
        url: &str,
        output_dir: &Path,
    ) -> Result<PathBuf, DomainError> {
        let output = Command::new(&self.binary)
            .args(["--no-warnings", "--dump-json"])
            .arg(url)
            .output()
            .await
            .map_err(|e| DomainError::FetchFail(format!("yt-dlp spawn: {e}")))?;
        if !output.status.success() {
            return Err(DomainError::FetchFail(format!(
                "metadata fetch failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        let meta: serde_json::Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| DomainError::FetchFail(format!("metadata unreadable: {e}")))?;
        let uploader = meta["uploader"]
            .as_str()
            .or_else(|| meta["uploader_id"].as_str())
            .unwrap_or("vod");
        let date = meta["upload_date"].as_str().unwrap_or("unknown");
        let stem = sanitize_stem(&format!("{uploader}_{date}"));

        let mut candidate = output_dir.join(format!("{stem}.mp4"));
        let mut suffix = 1;
        while candidate.exists() {
            candidate = output_dir.join(format!("{stem}_{suffix}.mp4"));
            suffix += 1;
        }
        Ok(candidate)
    }
}

#[async_trait]
impl RemoteFetcher for YtDlpFetcher {
    fn validate_url(&self, url: &str) -> bool {
        self.url_pattern.is_match(url.trim())
    }

    async fn fetch(
        &self,
        url: &str,
        output_dir: &Path,
        progress: watch::Sender<DownloadProgress>,
        cancel: CancellationToken,
    ) -> Result<PathBuf, DomainError> {
        if !self.validate_url(url) {
            return Err(DomainError::InvalidUrl(url.to_string()));
        }
        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|e| DomainError::FetchFail(format!("recordings dir: {e}")))?;

        let version = Command::new(&self.binary)
            .arg("--version")
            .output()
            .await
            .map_err(|e| DomainError::FetchFail(format!("yt-dlp not runnable: {e}")))?;
        if !version.status.success() {
            return Err(DomainError::FetchFail(format!(
                "yt-dlp --version exited with {}",
                version.status
            )));
        }

        let output_path = self.resolve_output_path(url, output_dir).await?;
        info!("downloading {} -> {}", url, output_path.display());

        let mut child = Command::new(&self.binary)
            .args(["--no-warnings", "--newline", "--progress-template"])
            .arg(PROGRESS_TEMPLATE)
            .args(["-f", "best", "-o"])
            .arg(&output_path)
            .arg(url)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DomainError::FetchFail(format!("yt-dlp spawn: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DomainError::FetchFail("yt-dlp stdout unavailable".into()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| DomainError::FetchFail("yt-dlp stderr unavailable".into()))?;
        let mut lines = BufReader::new(stdout).lines();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    warn!("download cancelled, stopping yt-dlp");
                    if let Err(e) = child.kill().await {
                        debug!("yt-dlp already exited: {e}");
                    }
                    return Err(DomainError::Cancelled);
                }
                line = lines.next_line() => {
                    match line {
                        Ok(Some(line)) => {
                            if let Some((percent, speed, eta)) = self.parse_progress_line(&line) {
                                let _ = progress.send(DownloadProgress {
                                    state: DownloadState::Downloading,
                                    percent,
                                    speed,
                                    eta,
                                    error_message: None,
                                    output_path: None,
                                });
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            return Err(DomainError::FetchFail(format!("progress read: {e}")));
                        }
                    }
                }
            }
        }

        let mut stderr_text = String::new();
        let _ = stderr.read_to_string(&mut stderr_text).await;
        let status = child
            .wait()
            .await
            .map_err(|e| DomainError::FetchFail(format!("yt-dlp wait: {e}")))?;
        if !status.success() {
            return Err(DomainError::FetchFail(format!(
                "yt-dlp exited with {}: {}",
                status,
                stderr_text.trim()
            )));
        }
        info!("download finished: {}", output_path.display());
        Ok(output_path)
    }
}
