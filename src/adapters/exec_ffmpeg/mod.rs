//! Stream-copy trimming and duration probing via the ffmpeg tools.

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::domain::errors::DomainError;
use crate::ports::MediaTrimmer;
use crate::utils::path::resolve_tool;

/// [`MediaTrimmer`] backed by `ffmpeg`/`ffprobe` subprocesses.
///
/// Cuts are stream copies (`-c copy`): no re-encode, so boundaries snap to
/// the nearest keyframe, which is acceptable slack for highlight clips.
#[derive(Debug, Default, Clone)]
pub struct FfmpegTrimmer;

#[async_trait]
impl MediaTrimmer for FfmpegTrimmer {
    async fn trim(
        &self,
        source: &Path,
        start_seconds: f64,
        duration_seconds: f64,
        output: &Path,
    ) -> Result<(), DomainError> {
        debug!(
            "trimming {} [{:.2}s +{:.2}s] -> {}",
            source.display(),
            start_seconds,
            duration_seconds,
            output.display()
        );
        let result = Command::new(resolve_tool("ffmpeg"))
            .arg("-y")
            .args(["-ss", &format!("{start_seconds:.3}")])
            .arg("-i")
            .arg(source)
            .args(["-t", &format!("{duration_seconds:.3}")])
            .args(["-c", "copy"])
            .arg(output)
            .output()
            .await
            .map_err(|e| DomainError::TrimFail(format!("ffmpeg spawn: {e}")))?;
        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let excerpt: String = stderr.lines().rev().take(3).collect::<Vec<_>>().join("; ");
            return Err(DomainError::TrimFail(format!(
                "ffmpeg exited with {} for {}: {}",
                result.status,
                output.display(),
                excerpt
            )));
        }
        info!("wrote {}", output.display());
        Ok(())
    }

    async fn probe_duration(&self, source: &Path) -> Result<f64, DomainError> {
        let result = Command::new(resolve_tool("ffprobe"))
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(source)
            .output()
            .await
            .map_err(|e| DomainError::TrimFail(format!("ffprobe spawn: {e}")))?;
        if !result.status.success() {
            return Err(DomainError::TrimFail(format!(
                "ffprobe failed for {}: {}",
                source.display(),
                String::from_utf8_lossy(&result.stderr).trim()
            )));
        }
        String::from_utf8_lossy(&result.stdout)
            .trim()
            .parse::<f64>()
            .map_err(|e| DomainError::TrimFail(format!("unparsable duration: {e}")))
    }
}
