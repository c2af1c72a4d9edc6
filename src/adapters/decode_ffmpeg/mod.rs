//! File-backed frame source built on an ffmpeg rawvideo pipe.
//!
//! ffmpeg does the seeking, cropping, grayscale conversion and sampling;
//! this adapter just reads fixed-size frames off the child's stdout. The
//! same pipe machinery backs the live-capture fallback in `capture_screen`.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use image::GrayImage;
use tracing::{debug, warn};

use crate::config::CaptureConfig;
use crate::domain::errors::DomainError;
use crate::ports::{CapturedFrame, FrameSource, FrameStep};
use crate::utils::path::resolve_tool;

/// Killfeed crop rectangle in actual-video pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Scale the configured region from its calibration resolution to the actual
/// video resolution, clamped to stay inside the frame.
pub fn build_crop_region(capture: &CaptureConfig, actual_w: u32, actual_h: u32) -> CropRegion {
    let sx = actual_w as f64 / capture.target_width.max(1) as f64;
    let sy = actual_h as f64 / capture.target_height.max(1) as f64;
    let x = ((capture.left as f64 * sx) as u32).min(actual_w.saturating_sub(1));
    let y = ((capture.top as f64 * sy) as u32).min(actual_h.saturating_sub(1));
    let width = ((capture.width as f64 * sx) as u32)
        .max(1)
        .min(actual_w - x);
    let height = ((capture.height as f64 * sy) as u32)
        .max(1)
        .min(actual_h - y);
    CropRegion {
        x,
        y,
        width,
        height,
    }
}

/// Video geometry and duration reported by ffprobe.
#[derive(Debug, Clone, Copy)]
pub struct MediaInfo {
    pub width: u32,
    pub height: u32,
    pub duration_seconds: f64,
}

/// Probe width, height and duration of a video file.
pub fn probe_media(path: &Path) -> Result<MediaInfo, DomainError> {
    let output = Command::new(resolve_tool("ffprobe"))
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height",
            "-show_entries",
            "format=duration",
            "-of",
            "json",
        ])
        .arg(path)
        .output()
        .map_err(|e| DomainError::SourceLost(format!("ffprobe spawn failed: {e}")))?;
    if !output.status.success() {
        return Err(DomainError::SourceLost(format!(
            "ffprobe failed for {}: {}",
            path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    let parsed: serde_json::Value = serde_json::from_slice(&output.stdout)
        .map_err(|e| DomainError::SourceLost(format!("ffprobe output unreadable: {e}")))?;
    let stream = parsed["streams"]
        .get(0)
        .ok_or_else(|| DomainError::SourceLost("no video stream found".into()))?;
    let width = stream["width"].as_u64().unwrap_or(0) as u32;
    let height = stream["height"].as_u64().unwrap_or(0) as u32;
    let duration_seconds = parsed["format"]["duration"]
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.0);
    if width == 0 || height == 0 {
        return Err(DomainError::SourceLost(format!(
            "could not determine video geometry for {}",
            path.display()
        )));
    }
    Ok(MediaInfo {
        width,
        height,
        duration_seconds,
    })
}

/// A running ffmpeg child emitting fixed-size gray frames on stdout.
pub struct RawFramePipe {
    child: Child,
    frame_len: usize,
    width: u32,
    height: u32,
}

impl RawFramePipe {
    /// Spawn ffmpeg with the given input arguments, appending the common
    /// rawvideo output tail. `filter` is the `-vf` chain.
    pub fn spawn(
        input_args: &[String],
        filter: &str,
        width: u32,
        height: u32,
    ) -> Result<Self, DomainError> {
        let mut command = Command::new(resolve_tool("ffmpeg"));
        command.args(["-v", "error"]);
        command.args(input_args);
        command.args(["-vf", filter, "-f", "rawvideo", "-pix_fmt", "gray", "-"]);
        command.stdout(Stdio::piped()).stderr(Stdio::null());
        let child = command
            .spawn()
            .map_err(|e| DomainError::SourceLost(format!("ffmpeg spawn failed: {e}")))?;
        Ok(Self {
            child,
            frame_len: width as usize * height as usize,
            width,
            height,
        })
    }

    /// Blocking read of the next frame. `Ok(None)` means clean end of stream.
    pub fn read_frame(&mut self) -> Result<Option<GrayImage>, DomainError> {
        let stdout = self
            .child
            .stdout
            .as_mut()
            .ok_or_else(|| DomainError::SourceLost("ffmpeg stdout closed".into()))?;
        let mut buffer = vec![0u8; self.frame_len];
        match stdout.read_exact(&mut buffer) {
            Ok(()) => {
                let image = GrayImage::from_raw(self.width, self.height, buffer)
                    .ok_or_else(|| DomainError::SourceLost("malformed raw frame".into()))?;
                Ok(Some(image))
            }
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(DomainError::SourceLost(format!("frame read failed: {e}"))),
        }
    }

    pub fn shutdown(&mut self) {
        if let Err(e) = self.child.kill() {
            debug!("ffmpeg child already gone: {e}");
        }
        let _ = self.child.wait();
    }
}

impl Drop for RawFramePipe {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// [`FrameSource`] over a video file, sampling at a reduced frame rate.
pub struct FfmpegFileSource {
    pipe: Option<RawFramePipe>,
    sample_fps: f64,
    start_at: f64,
    frames_read: u64,
    duration_seconds: f64,
}

impl FfmpegFileSource {
    /// Open `path` for scanning, starting at `start_at` seconds into the
    /// file (used for resume).
    pub fn open(
        path: &Path,
        capture: &CaptureConfig,
        sample_fps: f64,
        start_at: f64,
    ) -> Result<Self, DomainError> {
        if !path.exists() {
            return Err(DomainError::InputNotFound(path.display().to_string()));
        }
        let info = probe_media(path)?;
        let region = build_crop_region(capture, info.width, info.height);
        debug!(
            "scanning {} ({}x{}, {:.1}s) crop {}x{}+{}+{}",
            path.display(),
            info.width,
            info.height,
            info.duration_seconds,
            region.width,
            region.height,
            region.x,
            region.y,
        );

        let mut input_args = Vec::new();
        if start_at > 0.0 {
            input_args.push("-ss".to_string());
            input_args.push(format!("{start_at:.3}"));
        }
        input_args.push("-i".to_string());
        input_args.push(path.display().to_string());
        let filter = format!(
            "fps={},crop={}:{}:{}:{},format=gray",
            sample_fps, region.width, region.height, region.x, region.y
        );
        let pipe = RawFramePipe::spawn(&input_args, &filter, region.width, region.height)?;
        Ok(Self {
            pipe: Some(pipe),
            sample_fps,
            start_at,
            frames_read: 0,
            duration_seconds: info.duration_seconds,
        })
    }
}

impl FrameSource for FfmpegFileSource {
    fn next_frame(&mut self, _timeout: Duration) -> Result<FrameStep, DomainError> {
        let Some(pipe) = self.pipe.as_mut() else {
            return Ok(FrameStep::EndOfStream);
        };
        match pipe.read_frame()? {
            Some(image) => {
                let timestamp_seconds = self.start_at + self.frames_read as f64 / self.sample_fps;
                self.frames_read += 1;
                Ok(FrameStep::Frame(CapturedFrame {
                    image,
                    timestamp_seconds,
                }))
            }
            None => {
                debug!("end of stream after {} frames", self.frames_read);
                Ok(FrameStep::EndOfStream)
            }
        }
    }

    fn total_duration(&self) -> Option<f64> {
        Some(self.duration_seconds)
    }

    fn close(&mut self) {
        if let Some(mut pipe) = self.pipe.take() {
            pipe.shutdown();
        }
    }
}

/// Validate a candidate VOD path before creating a job for it.
pub fn require_readable_video(path: &Path) -> Result<PathBuf, DomainError> {
    if !path.is_file() {
        warn!("rejected missing input: {}", path.display());
        return Err(DomainError::InputNotFound(path.display().to_string()));
    }
    std::fs::canonicalize(path)
        .map_err(|e| DomainError::InputNotFound(format!("{}: {e}", path.display())))
}
