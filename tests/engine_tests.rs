//! End-to-end pipeline tests: scripted frames through detection, session
//! logging, and clip synthesis, with the external tools mocked out.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use image::GrayImage;
use tempfile::TempDir;
use tokio::sync::watch;

use killmark::config::SplitConfig;
use killmark::domain::errors::DomainError;
use killmark::domain::model::{ScanProgress, ScanState};
use killmark::engine::detector::EventDetector;
use killmark::engine::recorder::{read_session, SessionRecorder};
use killmark::engine::scanner::{ScanControl, ScanExit, ScanWorker};
use killmark::engine::splitter::ClipSynthesizer;
use killmark::ports::{
    CapturedFrame, FrameSource, FrameStep, MediaTrimmer, Recognition, TextRecognizer,
};

// Test utilities

/// Frame source that replays a fixed timeline of killfeed snapshots.
struct ReplaySource {
    ticks: Vec<(f64, Vec<&'static str>)>,
    cursor: usize,
    duration: f64,
}

impl FrameSource for ReplaySource {
    fn next_frame(&mut self, _timeout: Duration) -> Result<FrameStep, DomainError> {
        let Some((ts, _)) = self.ticks.get(self.cursor) else {
            return Ok(FrameStep::EndOfStream);
        };
        let ts = *ts;
        self.cursor += 1;
        Ok(FrameStep::Frame(CapturedFrame {
            image: GrayImage::new(4, 4),
            timestamp_seconds: ts,
        }))
    }

    fn total_duration(&self) -> Option<f64> {
        Some(self.duration)
    }

    fn close(&mut self) {}
}

/// Recognizer paired with a [`ReplaySource`]; returns the lines scripted
/// for each tick in order.
struct ReplayRecognizer {
    scripts: Vec<Vec<&'static str>>,
    cursor: usize,
}

impl TextRecognizer for ReplayRecognizer {
    fn recognize(&mut self, _image: &GrayImage) -> Result<Recognition, DomainError> {
        let lines = self
            .scripts
            .get(self.cursor)
            .map(|l| l.iter().map(|s| s.to_string()).collect())
            .unwrap_or_default();
        self.cursor += 1;
        Ok(Recognition {
            lines,
            confidence: 0.9,
        })
    }
}

/// Trimmer that writes stub clip files instead of invoking ffmpeg.
struct FileWritingTrimmer {
    duration: f64,
    calls: Mutex<Vec<(f64, f64)>>,
}

#[async_trait]
impl MediaTrimmer for FileWritingTrimmer {
    async fn trim(
        &self,
        _source: &Path,
        start_seconds: f64,
        duration_seconds: f64,
        output: &Path,
    ) -> Result<(), DomainError> {
        self.calls
            .lock()
            .unwrap()
            .push((start_seconds, duration_seconds));
        std::fs::write(output, b"clip").map_err(|e| DomainError::TrimFail(e.to_string()))
    }

    async fn probe_duration(&self, _source: &Path) -> Result<f64, DomainError> {
        Ok(self.duration)
    }
}

fn run_scan(ticks: Vec<(f64, Vec<&'static str>)>, dir: &Path) -> PathBuf {
    let scripts = ticks.iter().map(|(_, lines)| lines.clone()).collect();
    let worker = ScanWorker {
        source: Box::new(ReplaySource {
            duration: ticks.last().map(|(ts, _)| ts + 10.0).unwrap_or(0.0),
            ticks,
            cursor: 0,
        }),
        recognizer: Box::new(ReplayRecognizer { scripts, cursor: 0 }),
        detector: EventDetector::new(&["killed".into(), "knocked".into()], 3.0),
        recorder: SessionRecorder::create(dir, "session", true).unwrap(),
        ocr_interval: 0.5,
        resume_from: 0.0,
        vod_path: None,
        log_ocr: false,
    };
    let (tx, rx) = watch::channel(ScanProgress::queued());
    let control = ScanControl::new(tx);
    let (exit, summary) = worker.run(&control).unwrap();
    assert_eq!(exit, ScanExit::Completed);
    assert_eq!(rx.borrow().state, ScanState::Completed);
    summary.log_path
}

#[tokio::test]
async fn scan_then_split_produces_clips_around_events() {
    let dir = TempDir::new().unwrap();
    let vod = dir.path().join("Replay_20260301_120000.mp4");
    std::fs::write(&vod, b"video").unwrap();

    // Two kills close together (one merged clip) and one later knock.
    let log_path = run_scan(
        vec![
            (5.0, vec![]),
            (30.0, vec!["Player killed EnemyA"]),
            (34.0, vec!["Player killed EnemyB"]),
            (80.0, vec!["Player knocked EnemyC"]),
        ],
        dir.path(),
    );

    let events = read_session(&log_path).unwrap();
    assert_eq!(events.len(), 3);

    let trimmer = Arc::new(FileWritingTrimmer {
        duration: 120.0,
        calls: Mutex::new(Vec::new()),
    });
    let mut split = SplitConfig::default();
    split.pre_seconds = 5.0;
    split.post_seconds = 5.0;
    let outcomes = ClipSynthesizer::new(Arc::clone(&trimmer) as Arc<dyn MediaTrimmer>, &split)
        .split(&vod, &events)
        .await
        .unwrap();

    // [25,35] + [29,39] merge into [25,39]; the knock stays separate.
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(|o| o.succeeded()));
    assert!(outcomes.iter().all(|o| o.output_path.is_file()));
    assert_eq!(outcomes[0].interval.start_seconds, 25.0);
    assert_eq!(outcomes[0].interval.end_seconds, 39.0);
    assert_eq!(outcomes[0].interval.counts.kills, 2);
    assert_eq!(outcomes[1].interval.counts.kills, 1);

    let calls = trimmer.calls.lock().unwrap();
    assert_eq!(calls.len(), 2);
}

#[tokio::test]
async fn cooldown_keeps_repeated_killfeed_lines_to_one_event() {
    let dir = TempDir::new().unwrap();
    // The same line persists on screen across three ticks inside the
    // cooldown window, then a fresh kill appears after it expires.
    let log_path = run_scan(
        vec![
            (10.0, vec!["Player killed EnemyA"]),
            (11.0, vec!["Player killed EnemyA"]),
            (12.0, vec!["Player killed EnemyA"]),
            (20.0, vec!["Player killed EnemyB"]),
        ],
        dir.path(),
    );
    let events = read_session(&log_path).unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].timestamp_seconds, 10.0);
    assert_eq!(events[1].timestamp_seconds, 20.0);
}

/// Frame source that requests a pause after emitting a fixed number of
/// frames, the way a user pausing mid-scan would.
struct PausingAfter {
    inner: ReplaySource,
    control: Arc<ScanControl>,
    pause_after: usize,
    emitted: usize,
}

impl FrameSource for PausingAfter {
    fn next_frame(&mut self, timeout: Duration) -> Result<FrameStep, DomainError> {
        let step = self.inner.next_frame(timeout)?;
        if matches!(step, FrameStep::Frame(_)) {
            self.emitted += 1;
            if self.emitted == self.pause_after {
                self.control
                    .pause
                    .store(true, std::sync::atomic::Ordering::SeqCst);
            }
        }
        Ok(step)
    }

    fn total_duration(&self) -> Option<f64> {
        self.inner.total_duration()
    }

    fn close(&mut self) {}
}

#[tokio::test]
async fn resume_never_duplicates_events_before_the_pause_point() {
    use killmark::engine::recorder::ResumeMarker;

    let dir = TempDir::new().unwrap();
    let vod = dir.path().join("match.mp4");
    std::fs::write(&vod, b"video").unwrap();

    let ticks: Vec<(f64, Vec<&'static str>)> = vec![
        (10.0, vec!["Player killed EnemyA"]),
        (20.0, vec!["Player killed EnemyB"]),
        (30.0, vec!["Player killed EnemyC"]),
        (40.0, vec!["Player knocked EnemyD"]),
    ];
    let scripts: Vec<Vec<&'static str>> = ticks.iter().map(|(_, l)| l.clone()).collect();

    // First run pauses after the second frame, with two events committed.
    let (tx, rx) = watch::channel(ScanProgress::queued());
    let control = Arc::new(ScanControl::new(tx));
    let worker = ScanWorker {
        source: Box::new(PausingAfter {
            inner: ReplaySource {
                ticks: ticks.clone(),
                cursor: 0,
                duration: 50.0,
            },
            control: Arc::clone(&control),
            pause_after: 2,
            emitted: 0,
        }),
        recognizer: Box::new(ReplayRecognizer {
            scripts: scripts.clone(),
            cursor: 0,
        }),
        detector: EventDetector::new(&["killed".into(), "knocked".into()], 3.0),
        recorder: SessionRecorder::create(dir.path(), "session", false).unwrap(),
        ocr_interval: 0.5,
        resume_from: 0.0,
        vod_path: Some(vod.clone()),
        log_ocr: false,
    };
    let (exit, _) = worker.run(&control).unwrap();
    assert!(matches!(exit, ScanExit::Paused { .. }));
    assert_eq!(rx.borrow().state, ScanState::Paused);

    let marker = ResumeMarker::load(&vod).unwrap();
    assert_eq!(marker.last_timestamp, 20.0);

    // Second run picks up from the marker. The decoder re-emits the boundary
    // frame, which must be skipped, not re-recorded.
    let resume_ticks: Vec<(f64, Vec<&'static str>)> = ticks[1..].to_vec();
    let resume_scripts: Vec<Vec<&'static str>> =
        vec![scripts[2].clone(), scripts[3].clone()];
    let (tx2, _rx2) = watch::channel(ScanProgress::queued());
    let control2 = ScanControl::new(tx2);
    let worker2 = ScanWorker {
        source: Box::new(ReplaySource {
            ticks: resume_ticks,
            cursor: 0,
            duration: 50.0,
        }),
        recognizer: Box::new(ReplayRecognizer {
            scripts: resume_scripts,
            cursor: 0,
        }),
        detector: EventDetector::new(&["killed".into(), "knocked".into()], 3.0),
        recorder: SessionRecorder::reopen(&marker.session_log, false).unwrap(),
        ocr_interval: 0.5,
        resume_from: marker.last_timestamp,
        vod_path: Some(vod.clone()),
        log_ocr: false,
    };
    let (exit, summary) = worker2.run(&control2).unwrap();
    assert_eq!(exit, ScanExit::Completed);
    assert_eq!(summary.event_count, 4);
    assert!(ResumeMarker::load(&vod).is_none());

    let events = read_session(&summary.log_path).unwrap();
    let stamps: Vec<f64> = events.iter().map(|e| e.timestamp_seconds).collect();
    assert_eq!(stamps, vec![10.0, 20.0, 30.0, 40.0]);
}

#[tokio::test]
async fn scan_with_no_matches_leaves_an_empty_log() {
    let dir = TempDir::new().unwrap();
    let log_path = run_scan(
        vec![(5.0, vec!["nothing interesting"]), (10.0, vec![])],
        dir.path(),
    );
    assert!(log_path.is_file());
    assert!(read_session(&log_path).unwrap().is_empty());
}
