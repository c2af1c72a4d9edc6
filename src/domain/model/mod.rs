// Domain models - Events, sessions, clip intervals, and job states

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a bookmark entered the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSource {
    /// Emitted by the detector
    Auto,
    /// Inserted by the user
    Manual,
}

/// One detected killfeed occurrence.
///
/// Events are immutable once recorded; corrections happen by appending new
/// events, never by rewriting history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Position within the session timeline (video-relative for VOD scans)
    pub timestamp_seconds: f64,
    /// OCR output line that triggered the match
    pub raw_text: String,
    /// Configured keyword that fired
    pub matched_keyword: String,
    pub source: EventSource,
}

impl Event {
    pub fn auto(timestamp_seconds: f64, raw_text: String, matched_keyword: String) -> Self {
        Self {
            timestamp_seconds,
            raw_text,
            matched_keyword,
            source: EventSource::Auto,
        }
    }
}

/// One scan or live-capture run, 1:1 with a persisted bookmark log file.
///
/// Insertion order equals chronological order; the recorder rejects
/// out-of-order appends.
#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: String,
    /// None for live capture
    pub vod_path: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
    pub log_path: PathBuf,
    pub events: Vec<Event>,
}

/// Returned when a session closes.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub session_id: String,
    pub log_path: PathBuf,
    pub event_count: usize,
    /// Last processed timestamp, in seconds
    pub duration_scanned: f64,
}

/// Lifecycle of a scan job.
///
/// Transitions are monotonic except `Running` ⇄ `Paused`; `Stopped`,
/// `Completed` and `Error` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanState {
    Queued,
    Running,
    Paused,
    Stopping,
    Stopped,
    Completed,
    Error,
}

impl ScanState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScanState::Stopped | ScanState::Completed | ScanState::Error
        )
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition(&self, next: ScanState) -> bool {
        use ScanState::*;
        match (self, next) {
            (Queued, Running) => true,
            (Running, Paused) | (Paused, Running) => true,
            (Running, Stopping) | (Paused, Stopping) => true,
            (Stopping, Stopped) => true,
            (Running, Completed) => true,
            (Running, Error) | (Paused, Error) | (Queued, Error) | (Stopping, Error) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ScanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScanState::Queued => "queued",
            ScanState::Running => "running",
            ScanState::Paused => "paused",
            ScanState::Stopping => "stopping",
            ScanState::Stopped => "stopped",
            ScanState::Completed => "completed",
            ScanState::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// Snapshot of a scan job, readable at any time without blocking the worker.
#[derive(Debug, Clone, Serialize)]
pub struct ScanProgress {
    pub state: ScanState,
    /// 0.0..=1.0 for VOD scans; None for live capture
    pub percent: Option<f64>,
    /// Last processed timestamp, in seconds
    pub position_seconds: f64,
    pub session_log: Option<PathBuf>,
    pub error: Option<String>,
}

impl ScanProgress {
    pub fn queued() -> Self {
        Self {
            state: ScanState::Queued,
            percent: None,
            position_seconds: 0.0,
            session_log: None,
            error: None,
        }
    }
}

/// Lifecycle of a remote fetch job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadState {
    Queued,
    Downloading,
    Completed,
    Error,
    Cancelled,
}

impl DownloadState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DownloadState::Completed | DownloadState::Error | DownloadState::Cancelled
        )
    }
}

/// Snapshot of a remote fetch job.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadProgress {
    pub state: DownloadState,
    /// 0..=100, as reported by the fetch tool
    pub percent: f64,
    pub speed: String,
    pub eta: String,
    pub error_message: Option<String>,
    pub output_path: Option<PathBuf>,
}

impl DownloadProgress {
    pub fn queued() -> Self {
        Self {
            state: DownloadState::Queued,
            percent: 0.0,
            speed: String::new(),
            eta: String::new(),
            error_message: None,
            output_path: None,
        }
    }
}

/// Derived tally over a clip interval's member events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipCounts {
    pub kills: u32,
    pub assists: u32,
    pub deaths: u32,
}

/// A computed clip time range with the events it absorbed.
///
/// Computed fresh on every split request; never persisted independently of
/// the resulting clip file.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipInterval {
    pub start_seconds: f64,
    pub end_seconds: f64,
    pub events: Vec<Event>,
    pub counts: ClipCounts,
}

impl ClipInterval {
    pub fn duration(&self) -> f64 {
        (self.end_seconds - self.start_seconds).max(0.0)
    }
}

/// Per-interval result of a split request. Partial success is expected:
/// a failed interval never aborts the remaining ones.
#[derive(Debug, Clone)]
pub struct ClipOutcome {
    pub interval: ClipInterval,
    pub output_path: PathBuf,
    pub error: Option<String>,
}

impl ClipOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

#[cfg(test)]
mod tests;
