//! The synchronous scan loop: frames in, bookmark events out.
//!
//! One worker owns a frame source, a recognizer, a detector and a session
//! recorder, and runs on a blocking thread. Control is cooperative: the
//! pause/stop flags are checked between ticks, so a request takes effect
//! at the next frame boundary.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::domain::errors::DomainError;
use crate::domain::model::{ScanProgress, ScanState, SessionSummary};
use crate::engine::detector::EventDetector;
use crate::engine::recorder::{ResumeMarker, SessionRecorder};
use crate::ports::{FrameSource, FrameStep, TextRecognizer};

const FRAME_TIMEOUT: Duration = Duration::from_secs(1);

/// Shared control surface between a worker and its controller.
#[derive(Debug)]
pub struct ScanControl {
    pub pause: AtomicBool,
    pub stop: AtomicBool,
    pub progress: watch::Sender<ScanProgress>,
}

impl ScanControl {
    pub fn new(progress: watch::Sender<ScanProgress>) -> Self {
        Self {
            pause: AtomicBool::new(false),
            stop: AtomicBool::new(false),
            progress,
        }
    }
}

/// How a scan run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanExit {
    /// File source ran out of frames
    Completed,
    /// Stop requested; the session log is retained
    Stopped,
    /// Pause requested; a resume marker points at the watermark
    Paused { last_timestamp: f64 },
}

pub struct ScanWorker {
    pub source: Box<dyn FrameSource>,
    pub recognizer: Box<dyn TextRecognizer>,
    pub detector: EventDetector,
    pub recorder: SessionRecorder,
    /// Minimum seconds between recognition ticks
    pub ocr_interval: f64,
    /// Skip frames at or before this position (resume)
    pub resume_from: f64,
    /// None for live capture
    pub vod_path: Option<PathBuf>,
    pub log_ocr: bool,
}

impl ScanWorker {
    /// Drive the loop to an exit. Always closes the session log, whatever
    /// the outcome.
    pub fn run(mut self, control: &ScanControl) -> Result<(ScanExit, SessionSummary), DomainError> {
        let total_duration = self.source.total_duration();
        let mut position = self.resume_from;
        let mut last_ocr_tick = f64::NEG_INFINITY;

        self.publish(control, ScanState::Running, position, total_duration, None);
        info!(
            "scan running (session {}, from {:.2}s)",
            self.recorder.session_id(),
            self.resume_from
        );

        loop {
            if control.stop.load(Ordering::SeqCst) {
                self.publish(control, ScanState::Stopping, position, total_duration, None);
                return self.finish(control, ScanExit::Stopped, position, total_duration);
            }
            if control.pause.load(Ordering::SeqCst) {
                if let Some(vod) = &self.vod_path {
                    ResumeMarker {
                        last_timestamp: position,
                        session_log: self.recorder.log_path().to_path_buf(),
                    }
                    .save(vod)?;
                }
                return self.finish(
                    control,
                    ScanExit::Paused {
                        last_timestamp: position,
                    },
                    position,
                    total_duration,
                );
            }

            let step = match self.source.next_frame(FRAME_TIMEOUT) {
                Ok(step) => step,
                Err(e) => {
                    return self.fail(control, e, position, total_duration);
                }
            };
            let frame = match step {
                FrameStep::Frame(frame) => frame,
                FrameStep::Retry => continue,
                FrameStep::EndOfStream => {
                    if let Some(vod) = &self.vod_path {
                        ResumeMarker::clear(vod);
                    }
                    return self.finish(control, ScanExit::Completed, position, total_duration);
                }
            };

            if frame.timestamp_seconds <= self.resume_from && self.resume_from > 0.0 {
                continue;
            }
            position = frame.timestamp_seconds;

            if position - last_ocr_tick < self.ocr_interval {
                self.publish(control, ScanState::Running, position, total_duration, None);
                continue;
            }
            last_ocr_tick = position;

            let recognition = match self.recognizer.recognize(&frame.image) {
                Ok(recognition) => recognition,
                Err(e) if e.is_transient() => {
                    warn!("skipping tick at {:.2}s: {e}", position);
                    continue;
                }
                Err(e) => {
                    return self.fail(control, e, position, total_duration);
                }
            };
            if self.log_ocr && !recognition.lines.is_empty() {
                debug!(
                    "ocr @{:.2}s ({:.2}): {:?}",
                    position, recognition.confidence, recognition.lines
                );
            }

            for event in self.detector.classify(&recognition.lines, position) {
                info!(
                    "bookmark at {:.2}s: '{}' ({})",
                    event.timestamp_seconds, event.raw_text, event.matched_keyword
                );
                self.recorder.append(&event, &recognition.lines)?;
            }
            self.publish(control, ScanState::Running, position, total_duration, None);
        }
    }

    fn publish(
        &self,
        control: &ScanControl,
        state: ScanState,
        position: f64,
        total_duration: Option<f64>,
        error: Option<String>,
    ) {
        let percent = total_duration
            .filter(|d| *d > 0.0)
            .map(|d| (position / d).clamp(0.0, 1.0));
        let _ = control.progress.send(ScanProgress {
            state,
            percent,
            position_seconds: position,
            session_log: Some(self.recorder.log_path().to_path_buf()),
            error,
        });
    }

    fn finish(
        mut self,
        control: &ScanControl,
        exit: ScanExit,
        position: f64,
        total_duration: Option<f64>,
    ) -> Result<(ScanExit, SessionSummary), DomainError> {
        self.source.close();
        let state = match &exit {
            ScanExit::Completed => ScanState::Completed,
            ScanExit::Stopped => ScanState::Stopped,
            ScanExit::Paused { .. } => ScanState::Paused,
        };
        self.publish(control, state, position, total_duration, None);
        let summary = self.recorder.close(position)?;
        info!(
            "scan {} with {} events -> {}",
            state,
            summary.event_count,
            summary.log_path.display()
        );
        Ok((exit, summary))
    }

    fn fail(
        mut self,
        control: &ScanControl,
        cause: DomainError,
        position: f64,
        total_duration: Option<f64>,
    ) -> Result<(ScanExit, SessionSummary), DomainError> {
        self.source.close();
        error!("scan failed at {:.2}s: {cause}", position);
        self.publish(
            control,
            ScanState::Error,
            position,
            total_duration,
            Some(cause.to_string()),
        );
        // The partial session log is retained for inspection and splitting.
        let _ = self.recorder.close(position);
        Err(cause)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::EventSource;
    use crate::engine::recorder::read_session;
    use crate::ports::{CapturedFrame, Recognition};
    use image::GrayImage;

    /// Scripted frame source: emits one frame per timestamp, then ends.
    struct ScriptedSource {
        timestamps: Vec<f64>,
        cursor: usize,
        duration: f64,
    }

    impl FrameSource for ScriptedSource {
        fn next_frame(&mut self, _timeout: Duration) -> Result<FrameStep, DomainError> {
            let Some(&ts) = self.timestamps.get(self.cursor) else {
                return Ok(FrameStep::EndOfStream);
            };
            self.cursor += 1;
            Ok(FrameStep::Frame(CapturedFrame {
                image: GrayImage::new(2, 2),
                timestamp_seconds: ts,
            }))
        }

        fn total_duration(&self) -> Option<f64> {
            Some(self.duration)
        }

        fn close(&mut self) {}
    }

    /// Recognizer that replays one scripted text per recognize call.
    struct ScriptedRecognizer {
        texts: Vec<&'static str>,
        cursor: usize,
    }

    impl TextRecognizer for ScriptedRecognizer {
        fn recognize(&mut self, _image: &GrayImage) -> Result<Recognition, DomainError> {
            let text = self.texts.get(self.cursor).copied().unwrap_or("");
            self.cursor += 1;
            Ok(Recognition {
                lines: if text.is_empty() {
                    vec![]
                } else {
                    vec![text.to_string()]
                },
                confidence: 0.9,
            })
        }
    }

    fn worker_for(
        timestamps: Vec<f64>,
        texts: Vec<&'static str>,
        dir: &std::path::Path,
        ocr_interval: f64,
    ) -> ScanWorker {
        ScanWorker {
            source: Box::new(ScriptedSource {
                duration: timestamps.last().map(|&ts| ts + 1.0).unwrap_or(0.0),
                timestamps,
                cursor: 0,
            }),
            recognizer: Box::new(ScriptedRecognizer { texts, cursor: 0 }),
            detector: EventDetector::new(&["killed".into(), "knocked".into()], 3.0),
            recorder: SessionRecorder::create(dir, "session", true).unwrap(),
            ocr_interval,
            resume_from: 0.0,
            vod_path: None,
            log_ocr: false,
        }
    }

    #[test]
    fn scan_records_detections_and_completes() {
        let dir = tempfile::tempdir().unwrap();
        let timestamps = vec![1.0, 10.0, 11.0, 20.0];
        let texts = vec![
            "",
            "Player killed Enemy",
            "Player killed Enemy",
            "Player knocked Other",
        ];
        let (tx, rx) = watch::channel(ScanProgress::queued());
        let control = ScanControl::new(tx);
        let (exit, summary) = worker_for(timestamps, texts, dir.path(), 0.5)
            .run(&control)
            .unwrap();

        assert_eq!(exit, ScanExit::Completed);
        assert_eq!(summary.event_count, 2);
        let events = read_session(&summary.log_path).unwrap();
        assert_eq!(events[0].timestamp_seconds, 10.0);
        assert_eq!(events[0].source, EventSource::Auto);
        assert_eq!(events[1].matched_keyword, "knocked");
        assert_eq!(rx.borrow().state, ScanState::Completed);
    }

    #[test]
    fn ocr_interval_skips_intermediate_frames() {
        let dir = tempfile::tempdir().unwrap();
        // Tick at 10.0 fires; the 10.2 frame sits inside the interval and is
        // never recognized, so only two recognize calls happen.
        let timestamps = vec![10.0, 10.2, 15.0];
        let texts = vec!["Player killed Enemy", ""];
        let (tx, _rx) = watch::channel(ScanProgress::queued());
        let control = ScanControl::new(tx);
        let (_, summary) = worker_for(timestamps, texts, dir.path(), 1.0)
            .run(&control)
            .unwrap();
        assert_eq!(summary.event_count, 1);
    }

    #[test]
    fn stop_flag_ends_scan_and_keeps_log() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, rx) = watch::channel(ScanProgress::queued());
        let control = ScanControl::new(tx);
        control.stop.store(true, Ordering::SeqCst);
        let (exit, summary) =
            worker_for(vec![10.0, 20.0], vec!["Player killed Enemy", ""], dir.path(), 0.5)
                .run(&control)
                .unwrap();
        assert_eq!(exit, ScanExit::Stopped);
        assert!(summary.log_path.is_file());
        assert_eq!(rx.borrow().state, ScanState::Stopped);
    }

    #[test]
    fn transient_ocr_failure_skips_tick_only() {
        struct FlakyRecognizer {
            calls: usize,
        }
        impl TextRecognizer for FlakyRecognizer {
            fn recognize(&mut self, _image: &GrayImage) -> Result<Recognition, DomainError> {
                self.calls += 1;
                if self.calls == 1 {
                    Err(DomainError::OcrFail("engine hiccup".into()))
                } else {
                    Ok(Recognition {
                        lines: vec!["Player killed Enemy".into()],
                        confidence: 0.8,
                    })
                }
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let mut worker = worker_for(vec![5.0, 10.0], vec![], dir.path(), 1.0);
        worker.recognizer = Box::new(FlakyRecognizer { calls: 0 });
        let (tx, _rx) = watch::channel(ScanProgress::queued());
        let control = ScanControl::new(tx);
        let (exit, summary) = worker.run(&control).unwrap();
        assert_eq!(exit, ScanExit::Completed);
        assert_eq!(summary.event_count, 1);
    }

    #[test]
    fn source_loss_is_fatal_and_reports_error_state() {
        struct DyingSource;
        impl FrameSource for DyingSource {
            fn next_frame(&mut self, _timeout: Duration) -> Result<FrameStep, DomainError> {
                Err(DomainError::SourceLost("device vanished".into()))
            }
            fn close(&mut self) {}
        }

        let dir = tempfile::tempdir().unwrap();
        let mut worker = worker_for(vec![], vec![], dir.path(), 1.0);
        worker.source = Box::new(DyingSource);
        let (tx, rx) = watch::channel(ScanProgress::queued());
        let control = ScanControl::new(tx);
        assert!(worker.run(&control).is_err());
        assert_eq!(rx.borrow().state, ScanState::Error);
        assert!(rx.borrow().error.is_some());
    }
}
