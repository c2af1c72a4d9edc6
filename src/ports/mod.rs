// Ports - Interface definitions (contracts)

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use image::GrayImage;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::domain::errors::DomainError;
use crate::domain::model::DownloadProgress;

/// A time-stamped still image pulled from a frame source.
///
/// Frames arrive already cropped to the configured killfeed region and
/// converted to grayscale; recognizers only see the region of interest.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    pub image: GrayImage,
    /// Position in the source media for file-backed sources; seconds since
    /// session start for live capture.
    pub timestamp_seconds: f64,
}

/// One step of frame acquisition.
#[derive(Debug)]
pub enum FrameStep {
    Frame(CapturedFrame),
    /// No frame available within the timeout; try again.
    Retry,
    EndOfStream,
}

/// Port for acquiring time-stamped frames from a live region or a video file.
///
/// Implementations behave identically to the scan loop regardless of origin;
/// the only observable difference is that file-backed sources know their
/// total duration.
pub trait FrameSource: Send {
    /// Pull the next frame. A timeout without a frame yields `Retry`, not an
    /// error; errors mean the device or file became unrecoverable.
    fn next_frame(&mut self, timeout: Duration) -> Result<FrameStep, DomainError>;

    /// Total media duration in seconds, if known (file variant only).
    fn total_duration(&self) -> Option<f64> {
        None
    }

    /// Release the capture device or decoder handle.
    fn close(&mut self);
}

/// Text recognized from one frame.
#[derive(Debug, Clone)]
pub struct Recognition {
    pub lines: Vec<String>,
    /// Mean backend confidence in 0.0..=1.0
    pub confidence: f32,
}

/// Port for converting a cropped image region into recognized text.
///
/// Backend selection is a configuration value; see the `ocr_tesseract`
/// (CPU default) and `ocr_easyocr` (GPU) adapters.
pub trait TextRecognizer: Send {
    fn recognize(&mut self, image: &GrayImage) -> Result<Recognition, DomainError>;
}

/// Port for the external trimming tool and duration probe.
#[async_trait]
pub trait MediaTrimmer: Send + Sync {
    /// Cut `[start, start + duration]` out of `source` into `output`.
    /// A nonzero tool exit maps to `DomainError::TrimFail` for this interval
    /// only.
    async fn trim(
        &self,
        source: &Path,
        start_seconds: f64,
        duration_seconds: f64,
        output: &Path,
    ) -> Result<(), DomainError>;

    /// Media duration in seconds.
    async fn probe_duration(&self, source: &Path) -> Result<f64, DomainError>;
}

/// Port for downloading a remote video asset into the recordings directory.
#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    /// Synchronous URL shape check; rejected URLs never become jobs.
    fn validate_url(&self, url: &str) -> bool;

    /// Download `url` into `output_dir`, publishing progress incrementally.
    /// Returns the path of the completed file, which is valid input for the
    /// file-backed `FrameSource`.
    async fn fetch(
        &self,
        url: &str,
        output_dir: &Path,
        progress: watch::Sender<DownloadProgress>,
        cancel: CancellationToken,
    ) -> Result<PathBuf, DomainError>;
}
