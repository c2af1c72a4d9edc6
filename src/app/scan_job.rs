//! Async facade over a blocking scan worker.
//!
//! The controller owns the watch channel callers observe, spawns the worker
//! on the blocking pool and translates pause/resume/stop requests into
//! cooperative flags. Resume tears the job down to a sidecar marker and
//! rebuilds the pipeline from it, reopening the same session log.

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::adapters::capture_screen::open_live_source;
use crate::adapters::decode_ffmpeg::FfmpegFileSource;
use crate::adapters::ocr_easyocr::EasyOcrRecognizer;
use crate::adapters::ocr_tesseract::TesseractRecognizer;
use crate::config::AppConfig;
use crate::domain::errors::DomainError;
use crate::domain::model::{ScanProgress, ScanState, SessionSummary};
use crate::engine::detector::EventDetector;
use crate::engine::recorder::{ResumeMarker, SessionRecorder};
use crate::engine::scanner::{ScanControl, ScanExit, ScanWorker};
use crate::ports::{FrameSource, TextRecognizer};

type WorkerResult = Result<(ScanExit, SessionSummary), DomainError>;

#[derive(Debug)]
pub struct ScanJobController {
    config: AppConfig,
    /// None for live capture
    vod_path: Option<PathBuf>,
    progress_tx: watch::Sender<ScanProgress>,
    progress_rx: watch::Receiver<ScanProgress>,
    control: Mutex<Option<Arc<ScanControl>>>,
    handle: Mutex<Option<JoinHandle<WorkerResult>>>,
}

impl ScanJobController {
    /// Create the controller and launch the first worker run. With `resume`
    /// set, a VOD's resume marker (when present) decides the starting point
    /// and the session log to append to.
    pub fn start(config: AppConfig, vod_path: Option<PathBuf>, resume: bool) -> Arc<Self> {
        let (progress_tx, progress_rx) = watch::channel(ScanProgress::queued());
        let controller = Arc::new(Self {
            config,
            vod_path,
            progress_tx,
            progress_rx,
            control: Mutex::new(None),
            handle: Mutex::new(None),
        });
        let (resume_from, session_log) = match (&controller.vod_path, resume) {
            (Some(vod), true) => ResumeMarker::load(vod)
                .map(|marker| (marker.last_timestamp, Some(marker.session_log)))
                .unwrap_or((0.0, None)),
            _ => (0.0, None),
        };
        controller.launch(resume_from, session_log);
        controller
    }

    /// Spawn one worker run starting at `resume_from`, appending to
    /// `session_log` when resuming.
    fn launch(self: &Arc<Self>, resume_from: f64, session_log: Option<PathBuf>) {
        let control = Arc::new(ScanControl::new(self.progress_tx.clone()));
        if let Ok(mut slot) = self.control.lock() {
            *slot = Some(Arc::clone(&control));
        }
        let config = self.config.clone();
        let vod_path = self.vod_path.clone();
        let progress_tx = self.progress_tx.clone();
        let handle = tokio::task::spawn_blocking(move || {
            let worker = match build_worker(&config, vod_path, resume_from, session_log) {
                Ok(worker) => worker,
                Err(e) => {
                    let _ = progress_tx.send(ScanProgress {
                        state: ScanState::Error,
                        percent: None,
                        position_seconds: resume_from,
                        session_log: None,
                        error: Some(e.to_string()),
                    });
                    return Err(e);
                }
            };
            worker.run(&control)
        });
        if let Ok(mut slot) = self.handle.lock() {
            *slot = Some(handle);
        }
    }

    pub fn progress(&self) -> ScanProgress {
        self.progress_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ScanProgress> {
        self.progress_rx.clone()
    }

    /// Request a pause. Takes effect at the next frame boundary; the worker
    /// writes the resume marker before exiting.
    pub fn pause(&self) -> Result<(), DomainError> {
        let state = self.progress().state;
        if !state.can_transition(ScanState::Paused) {
            return Err(DomainError::BadArgs(format!("cannot pause a {state} scan")));
        }
        if self.vod_path.is_none() {
            return Err(DomainError::BadArgs(
                "live capture cannot pause; stop it instead".into(),
            ));
        }
        if let Some(control) = self.current_control() {
            control.pause.store(true, Ordering::SeqCst);
        }
        info!("pause requested");
        Ok(())
    }

    /// Relaunch a paused scan from its marker.
    pub fn resume(self: &Arc<Self>) -> Result<(), DomainError> {
        let state = self.progress().state;
        if state != ScanState::Paused {
            return Err(DomainError::BadArgs(format!("cannot resume a {state} scan")));
        }
        let vod = self
            .vod_path
            .as_ref()
            .ok_or_else(|| DomainError::BadArgs("live capture cannot resume".into()))?;
        let marker = ResumeMarker::load(vod).ok_or_else(|| {
            DomainError::SessionIo(format!("no resume marker for {}", vod.display()))
        })?;
        info!("resuming from {:.2}s", marker.last_timestamp);
        self.launch(marker.last_timestamp, Some(marker.session_log));
        Ok(())
    }

    /// Request a stop. The session log is always retained. Stopping a paused
    /// scan finalizes it immediately.
    pub fn stop(&self) -> Result<(), DomainError> {
        let snapshot = self.progress();
        if snapshot.state.is_terminal() {
            return Err(DomainError::BadArgs(format!(
                "scan already {}",
                snapshot.state
            )));
        }
        if snapshot.state == ScanState::Paused {
            if let Some(vod) = &self.vod_path {
                ResumeMarker::clear(vod);
            }
            let _ = self.progress_tx.send(ScanProgress {
                state: ScanState::Stopped,
                ..snapshot
            });
            return Ok(());
        }
        if let Some(control) = self.current_control() {
            control.stop.store(true, Ordering::SeqCst);
        }
        info!("stop requested");
        Ok(())
    }

    /// Await the current worker run. Returns None when a pause ended the run.
    pub async fn wait(&self) -> Result<Option<SessionSummary>, DomainError> {
        let handle = match self.handle.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        };
        let Some(handle) = handle else {
            return Ok(None);
        };
        let (exit, summary) = handle
            .await
            .map_err(|e| DomainError::SessionIo(format!("scan worker panicked: {e}")))??;
        match exit {
            ScanExit::Paused { last_timestamp } => {
                warn!("scan paused at {:.2}s", last_timestamp);
                Ok(None)
            }
            _ => Ok(Some(summary)),
        }
    }

    fn current_control(&self) -> Option<Arc<ScanControl>> {
        self.control.lock().ok().and_then(|slot| slot.clone())
    }
}

/// Assemble the scan pipeline for one run.
fn build_worker(
    config: &AppConfig,
    vod_path: Option<PathBuf>,
    resume_from: f64,
    session_log: Option<PathBuf>,
) -> Result<ScanWorker, DomainError> {
    let source: Box<dyn FrameSource> = match &vod_path {
        Some(vod) => Box::new(FfmpegFileSource::open(
            vod,
            &config.capture,
            sample_fps(config),
            resume_from,
        )?),
        None => open_live_source(&config.capture)?,
    };
    let recognizer: Box<dyn TextRecognizer> = match config.ocr.engine.as_str() {
        "easyocr" => Box::new(EasyOcrRecognizer::new(&config.ocr, &config.capture)?),
        _ => Box::new(TesseractRecognizer::new(&config.ocr, &config.capture)?),
    };
    let recorder = match &session_log {
        Some(log) => SessionRecorder::reopen(log, config.bookmarks.include_ocr_lines)?,
        None => SessionRecorder::create(
            &config.bookmarks.directory,
            &config.bookmarks.session_prefix,
            config.bookmarks.include_ocr_lines,
        )?,
    };
    Ok(ScanWorker {
        source,
        recognizer,
        detector: EventDetector::new(
            &config.detection.keywords,
            config.detection.cooldown_seconds,
        ),
        recorder,
        ocr_interval: config.ocr.interval_seconds,
        resume_from,
        vod_path,
        log_ocr: config.logging.log_ocr,
    })
}

/// File scans decode at the recognition cadence; there is no point decoding
/// frames the OCR gate would drop.
fn sample_fps(config: &AppConfig) -> f64 {
    if config.ocr.interval_seconds > 0.0 {
        (1.0 / config.ocr.interval_seconds).min(config.capture.fps.max(0.1))
    } else {
        config.capture.fps.max(0.1)
    }
}

#[cfg(test)]
impl ScanJobController {
    /// Controller pinned at a given state, with no worker behind it.
    pub(crate) fn stub(
        config: AppConfig,
        vod_path: Option<PathBuf>,
        state: ScanState,
    ) -> Arc<Self> {
        let (progress_tx, progress_rx) = watch::channel(ScanProgress {
            state,
            percent: None,
            position_seconds: 0.0,
            session_log: None,
            error: None,
        });
        Arc::new(Self {
            config,
            vod_path,
            progress_tx,
            progress_rx,
            control: Mutex::new(None),
            handle: Mutex::new(None),
        })
    }
}
