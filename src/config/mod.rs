//! Resolved configuration snapshots
//!
//! Jobs consume an immutable [`AppConfig`] loaded once per invocation; the
//! core does not own configuration persistence.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::rules::{CategoryMap, EventWindow};
use crate::error::{KillmarkError, KillmarkResult};

/// Screen/killfeed region and capture backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
    /// Resolution the region coordinates were calibrated against; the crop
    /// scales when the actual video resolution differs.
    pub target_width: u32,
    pub target_height: u32,
    /// `auto` | `xcap` | `ffmpeg`
    pub backend: String,
    pub fps: f64,
    /// Upscale factor applied before OCR
    pub scale: f32,
    /// Binarization threshold, 0-255
    pub threshold: u8,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            left: 1300,
            top: 80,
            width: 600,
            height: 300,
            target_width: 1920,
            target_height: 1080,
            backend: "auto".into(),
            fps: 10.0,
            scale: 2.0,
            threshold: 180,
        }
    }
}

/// OCR backend selection and cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// `tesseract` (CPU default) | `easyocr` (GPU)
    pub engine: String,
    pub lang: String,
    /// Tesseract page segmentation mode
    pub psm: u32,
    /// Minimum seconds between recognition ticks; frames in between are
    /// discarded.
    pub interval_seconds: f64,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            engine: "tesseract".into(),
            lang: "eng".into(),
            psm: 6,
            interval_seconds: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub keywords: Vec<String>,
    pub cooldown_seconds: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            keywords: vec!["killed".into(), "knocked".into()],
            cooldown_seconds: 3.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BookmarksConfig {
    pub directory: PathBuf,
    pub session_prefix: String,
    /// `jsonl` | `csv` (csv is an export format; the live log is jsonl)
    pub format: String,
    pub include_ocr_lines: bool,
}

impl Default for BookmarksConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("bookmarks"),
            session_prefix: "session".into(),
            format: "jsonl".into(),
            include_ocr_lines: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    /// Relative paths resolve against the VOD's directory
    pub output_dir: PathBuf,
    pub extensions: Vec<String>,
    pub pre_seconds: f64,
    pub post_seconds: f64,
    /// Extra slack added to the touching-merge rule
    pub merge_gap_seconds: f64,
    /// Per-keyword pre/post-roll overrides
    pub event_windows: BTreeMap<String, EventWindow>,
    pub categories: CategoryMap,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("clips"),
            extensions: vec![".mp4".into(), ".mkv".into(), ".flv".into()],
            pre_seconds: 5.0,
            post_seconds: 3.0,
            merge_gap_seconds: 0.0,
            event_windows: BTreeMap::new(),
            categories: CategoryMap::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    pub recordings_dir: PathBuf,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            recordings_dir: PathBuf::from("recordings"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Log every recognized line at debug level
    pub log_ocr: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            log_ocr: false,
        }
    }
}

/// Complete configuration snapshot for one job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub capture: CaptureConfig,
    pub ocr: OcrConfig,
    pub detection: DetectionConfig,
    pub bookmarks: BookmarksConfig,
    pub split: SplitConfig,
    pub download: DownloadConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load from a TOML file; a missing path yields the defaults.
    pub fn load(path: Option<&Path>) -> KillmarkResult<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| KillmarkError::ConfigError {
            message: format!("{}: {}", path.display(), e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_every_section() {
        let config = AppConfig::default();
        assert_eq!(config.ocr.engine, "tesseract");
        assert_eq!(config.detection.cooldown_seconds, 3.0);
        assert_eq!(config.split.pre_seconds, 5.0);
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let parsed: AppConfig = toml::from_str(
            r#"
            [detection]
            keywords = ["eliminated"]
            cooldown_seconds = 5.0

            [split.event_windows.eliminated]
            pre_seconds = 8.0
            "#,
        )
        .unwrap();
        assert_eq!(parsed.detection.keywords, vec!["eliminated".to_string()]);
        assert_eq!(parsed.detection.cooldown_seconds, 5.0);
        assert_eq!(
            parsed.split.event_windows["eliminated"].pre_seconds,
            Some(8.0)
        );
        assert_eq!(parsed.ocr.engine, "tesseract");
    }
}
