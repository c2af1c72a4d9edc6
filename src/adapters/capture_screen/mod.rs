//! Live screen capture frame sources.
//!
//! Primary backend grabs the primary monitor through `xcap` and crops the
//! killfeed region in-process; if the platform refuses direct capture we
//! fall back to an ffmpeg screen-grab pipe. Both produce the same
//! cropped-grayscale frames as the file decoder.

use std::time::{Duration, Instant};

use image::imageops;
use image::DynamicImage;
use tracing::{debug, info, warn};
use xcap::Monitor;

use crate::adapters::decode_ffmpeg::{build_crop_region, CropRegion, RawFramePipe};
use crate::config::CaptureConfig;
use crate::domain::errors::DomainError;
use crate::ports::{CapturedFrame, FrameSource, FrameStep};

/// Open a live frame source per the configured backend. `auto` tries xcap
/// first and falls back to the ffmpeg grabber.
pub fn open_live_source(capture: &CaptureConfig) -> Result<Box<dyn FrameSource>, DomainError> {
    match capture.backend.as_str() {
        "xcap" => Ok(Box::new(XcapLiveSource::open(capture)?)),
        "ffmpeg" => Ok(Box::new(FfmpegGrabSource::open(capture)?)),
        _ => match XcapLiveSource::open(capture) {
            Ok(source) => Ok(Box::new(source)),
            Err(e) => {
                warn!("direct screen capture unavailable ({e}), using ffmpeg grabber");
                Ok(Box::new(FfmpegGrabSource::open(capture)?))
            }
        },
    }
}

/// Region key used by the registry to detect overlapping live scans.
pub fn region_key(capture: &CaptureConfig) -> String {
    format!(
        "live:{}x{}+{}+{}",
        capture.width, capture.height, capture.left, capture.top
    )
}

/// In-process capture of the primary monitor.
pub struct XcapLiveSource {
    monitor: Monitor,
    region: CropRegion,
    frame_interval: Duration,
    started: Instant,
    next_due: Instant,
}

impl XcapLiveSource {
    pub fn open(capture: &CaptureConfig) -> Result<Self, DomainError> {
        let monitors = Monitor::all()
            .map_err(|e| DomainError::SourceLost(format!("monitor enumeration failed: {e}")))?;
        let monitor = monitors
            .iter()
            .find(|m| m.is_primary())
            .or_else(|| monitors.first())
            .cloned()
            .ok_or_else(|| DomainError::SourceLost("no monitor available".into()))?;
        let region = build_crop_region(capture, monitor.width(), monitor.height());
        info!(
            "live capture on {} ({}x{}), region {}x{}+{}+{}",
            monitor.name(),
            monitor.width(),
            monitor.height(),
            region.width,
            region.height,
            region.x,
            region.y,
        );
        let now = Instant::now();
        Ok(Self {
            monitor,
            region,
            frame_interval: Duration::from_secs_f64(1.0 / capture.fps.max(0.1)),
            started: now,
            next_due: now,
        })
    }
}

impl FrameSource for XcapLiveSource {
    fn next_frame(&mut self, timeout: Duration) -> Result<FrameStep, DomainError> {
        let now = Instant::now();
        if now < self.next_due {
            let wait = self.next_due - now;
            if wait > timeout {
                std::thread::sleep(timeout);
                return Ok(FrameStep::Retry);
            }
            std::thread::sleep(wait);
        }
        self.next_due = Instant::now() + self.frame_interval;

        let screenshot = self
            .monitor
            .capture_image()
            .map_err(|e| DomainError::SourceLost(format!("screen capture failed: {e}")))?;
        let cropped = imageops::crop_imm(
            &screenshot,
            self.region.x,
            self.region.y,
            self.region.width,
            self.region.height,
        )
        .to_image();
        let image = DynamicImage::ImageRgba8(cropped).into_luma8();
        Ok(FrameStep::Frame(CapturedFrame {
            image,
            timestamp_seconds: self.started.elapsed().as_secs_f64(),
        }))
    }

    fn close(&mut self) {
        debug!("live capture closed");
    }
}

/// Screen grabbing through a platform ffmpeg input device.
pub struct FfmpegGrabSource {
    pipe: Option<RawFramePipe>,
    frame_interval: Duration,
    started: Instant,
    frames_read: u64,
}

impl FfmpegGrabSource {
    pub fn open(capture: &CaptureConfig) -> Result<Self, DomainError> {
        let region = CropRegion {
            x: capture.left,
            y: capture.top,
            width: capture.width,
            height: capture.height,
        };
        let (input_args, filter) = grab_args(capture, &region);
        let pipe = RawFramePipe::spawn(&input_args, &filter, region.width, region.height)?;
        Ok(Self {
            pipe: Some(pipe),
            frame_interval: Duration::from_secs_f64(1.0 / capture.fps.max(0.1)),
            started: Instant::now(),
            frames_read: 0,
        })
    }
}

#[cfg(target_os = "linux")]
fn grab_args(capture: &CaptureConfig, region: &CropRegion) -> (Vec<String>, String) {
    let display = std::env::var("DISPLAY").unwrap_or_else(|_| ":0".into());
    (
        vec![
            "-f".into(),
            "x11grab".into(),
            "-framerate".into(),
            format!("{}", capture.fps),
            "-video_size".into(),
            format!("{}x{}", region.width, region.height),
            "-i".into(),
            format!("{display}+{},{}", region.x, region.y),
        ],
        "format=gray".to_string(),
    )
}

#[cfg(target_os = "windows")]
fn grab_args(capture: &CaptureConfig, region: &CropRegion) -> (Vec<String>, String) {
    (
        vec![
            "-f".into(),
            "gdigrab".into(),
            "-framerate".into(),
            format!("{}", capture.fps),
            "-offset_x".into(),
            region.x.to_string(),
            "-offset_y".into(),
            region.y.to_string(),
            "-video_size".into(),
            format!("{}x{}", region.width, region.height),
            "-i".into(),
            "desktop".into(),
        ],
        "format=gray".to_string(),
    )
}

#[cfg(target_os = "macos")]
fn grab_args(capture: &CaptureConfig, region: &CropRegion) -> (Vec<String>, String) {
    // avfoundation cannot grab a sub-region; crop in the filter chain.
    (
        vec![
            "-f".into(),
            "avfoundation".into(),
            "-framerate".into(),
            format!("{}", capture.fps),
            "-i".into(),
            "1:none".into(),
        ],
        format!(
            "crop={}:{}:{}:{},format=gray",
            region.width, region.height, region.x, region.y
        ),
    )
}

impl FrameSource for FfmpegGrabSource {
    fn next_frame(&mut self, _timeout: Duration) -> Result<FrameStep, DomainError> {
        let Some(pipe) = self.pipe.as_mut() else {
            return Ok(FrameStep::EndOfStream);
        };
        match pipe.read_frame()? {
            Some(image) => {
                self.frames_read += 1;
                // Prefer wall-clock elapsed over frame counting; the grabber
                // drops frames under load.
                let by_clock = self.started.elapsed().as_secs_f64();
                let by_count = self.frames_read as f64 * self.frame_interval.as_secs_f64();
                Ok(FrameStep::Frame(CapturedFrame {
                    image,
                    timestamp_seconds: by_clock.max(by_count),
                }))
            }
            None => Err(DomainError::SourceLost("screen grabber exited".into())),
        }
    }

    fn close(&mut self) {
        if let Some(mut pipe) = self.pipe.take() {
            pipe.shutdown();
        }
    }
}
