//! Append-only bookmark session logs.
//!
//! One scan run writes one JSONL file, one record per event, flushed after
//! every append so a crash mid-scan loses at most nothing. CSV is an export
//! format; the live log is always JSONL.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::domain::errors::DomainError;
use crate::domain::model::{Event, EventSource, Session, SessionSummary};

/// One line of the session log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookmarkRecord {
    /// Wall-clock time the event was recorded
    pub timestamp: DateTime<Utc>,
    /// Position within the session timeline
    pub seconds_since_start: f64,
    pub keyword: String,
    /// Raw OCR line that triggered the match
    pub event: String,
    /// Full recognized text of the tick, if enabled
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ocr: Vec<String>,
    pub source: EventSource,
}

impl BookmarkRecord {
    fn into_event(self) -> Event {
        Event {
            timestamp_seconds: self.seconds_since_start,
            raw_text: self.event,
            matched_keyword: self.keyword,
            source: self.source,
        }
    }
}

/// Writer side of one session log.
pub struct SessionRecorder {
    session_id: String,
    log_path: PathBuf,
    writer: BufWriter<File>,
    include_ocr_lines: bool,
    last_timestamp: f64,
    event_count: usize,
}

impl SessionRecorder {
    /// Start a fresh session log under `directory`.
    pub fn create(
        directory: &Path,
        session_prefix: &str,
        include_ocr_lines: bool,
    ) -> Result<Self, DomainError> {
        std::fs::create_dir_all(directory)
            .map_err(|e| DomainError::SessionIo(format!("bookmark dir: {e}")))?;
        let session_id = format!("{}_{}", session_prefix, Utc::now().format("%Y%m%d_%H%M%S"));
        let log_path = directory.join(format!("{session_id}.jsonl"));
        let file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&log_path)
            .map_err(|e| DomainError::SessionIo(format!("{}: {e}", log_path.display())))?;
        info!("session {} -> {}", session_id, log_path.display());
        Ok(Self {
            session_id,
            log_path,
            writer: BufWriter::new(file),
            include_ocr_lines,
            last_timestamp: 0.0,
            event_count: 0,
        })
    }

    /// Reopen an existing log for appending (resume). Replays the file to
    /// recover the ordering watermark.
    pub fn reopen(log_path: &Path, include_ocr_lines: bool) -> Result<Self, DomainError> {
        let existing = read_session(log_path)?;
        let last_timestamp = existing
            .last()
            .map(|e| e.timestamp_seconds)
            .unwrap_or(0.0);
        let event_count = existing.len();
        let session_id = log_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "session".to_string());
        let file = OpenOptions::new()
            .append(true)
            .open(log_path)
            .map_err(|e| DomainError::SessionIo(format!("{}: {e}", log_path.display())))?;
        debug!(
            "resumed session {} with {} events, watermark {:.2}s",
            session_id, event_count, last_timestamp
        );
        Ok(Self {
            session_id,
            log_path: log_path.to_path_buf(),
            writer: BufWriter::new(file),
            include_ocr_lines,
            last_timestamp,
            event_count,
        })
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Append one event. Out-of-order timestamps are rejected; insertion
    /// order must equal chronological order.
    pub fn append(&mut self, event: &Event, ocr_lines: &[String]) -> Result<(), DomainError> {
        if event.timestamp_seconds < self.last_timestamp {
            return Err(DomainError::SessionIo(format!(
                "out-of-order event: {:.2}s after {:.2}s",
                event.timestamp_seconds, self.last_timestamp
            )));
        }
        let record = BookmarkRecord {
            timestamp: Utc::now(),
            seconds_since_start: event.timestamp_seconds,
            keyword: event.matched_keyword.clone(),
            event: event.raw_text.clone(),
            ocr: if self.include_ocr_lines {
                ocr_lines.to_vec()
            } else {
                Vec::new()
            },
            source: event.source,
        };
        let line = serde_json::to_string(&record)
            .map_err(|e| DomainError::SessionIo(format!("serialize: {e}")))?;
        self.writer
            .write_all(line.as_bytes())
            .and_then(|_| self.writer.write_all(b"\n"))
            .and_then(|_| self.writer.flush())
            .map_err(|e| DomainError::SessionIo(format!("append: {e}")))?;
        self.last_timestamp = event.timestamp_seconds;
        self.event_count += 1;
        Ok(())
    }

    /// Close the log. `duration_scanned` is the last processed media
    /// position, which can run past the last event.
    pub fn close(mut self, duration_scanned: f64) -> Result<SessionSummary, DomainError> {
        self.writer
            .flush()
            .map_err(|e| DomainError::SessionIo(format!("flush: {e}")))?;
        Ok(SessionSummary {
            session_id: self.session_id,
            log_path: self.log_path,
            event_count: self.event_count,
            duration_scanned: duration_scanned.max(self.last_timestamp),
        })
    }
}

/// Load the events of a session log; accepts the JSONL format or a
/// previously exported CSV.
pub fn read_session(path: &Path) -> Result<Vec<Event>, DomainError> {
    let is_csv = path
        .extension()
        .map(|e| e.eq_ignore_ascii_case("csv"))
        .unwrap_or(false);
    if is_csv {
        read_csv_events(path)
    } else {
        Ok(read_records(path)?
            .into_iter()
            .map(BookmarkRecord::into_event)
            .collect())
    }
}

/// Load a full session view of a bookmark log.
pub fn load_session(path: &Path) -> Result<Session, DomainError> {
    let events = read_session(path)?;
    let session_id = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "session".to_string());
    let created_at = first_record_time(path).unwrap_or_else(|| {
        std::fs::metadata(path)
            .and_then(|m| m.modified())
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now())
    });
    Ok(Session {
        session_id,
        vod_path: None,
        created_at,
        log_path: path.to_path_buf(),
        events,
    })
}

fn first_record_time(path: &Path) -> Option<DateTime<Utc>> {
    let is_csv = path
        .extension()
        .map(|e| e.eq_ignore_ascii_case("csv"))
        .unwrap_or(false);
    if is_csv {
        return None;
    }
    read_records(path).ok()?.first().map(|r| r.timestamp)
}

/// Load raw JSONL records, including wall-clock stamps and OCR context.
pub fn read_records(path: &Path) -> Result<Vec<BookmarkRecord>, DomainError> {
    if !path.is_file() {
        return Err(DomainError::InputNotFound(path.display().to_string()));
    }
    let reader = BufReader::new(
        File::open(path).map_err(|e| DomainError::SessionIo(format!("{}: {e}", path.display())))?,
    );
    let mut records = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| DomainError::SessionIo(format!("read: {e}")))?;
        if line.trim().is_empty() {
            continue;
        }
        let record: BookmarkRecord = serde_json::from_str(&line).map_err(|e| {
            DomainError::SessionIo(format!("{} line {}: {e}", path.display(), index + 1))
        })?;
        records.push(record);
    }
    Ok(records)
}

fn read_csv_events(path: &Path) -> Result<Vec<Event>, DomainError> {
    if !path.is_file() {
        return Err(DomainError::InputNotFound(path.display().to_string()));
    }
    let reader = BufReader::new(
        File::open(path).map_err(|e| DomainError::SessionIo(format!("{}: {e}", path.display())))?,
    );
    let mut events = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| DomainError::SessionIo(format!("read: {e}")))?;
        if line.trim().is_empty() || (index == 0 && line.starts_with("timestamp,")) {
            continue;
        }
        events.push(parse_csv_row(&line, index)?);
    }
    Ok(events)
}

/// Export a session log as CSV beside the original, returning the new path.
/// The export is lossy: the matched keyword is not a column, so logs read
/// back from CSV fall back to matching against the raw event text.
pub fn export_csv(log_path: &Path) -> Result<PathBuf, DomainError> {
    let records = read_records(log_path)?;
    let csv_path = log_path.with_extension("csv");
    let mut writer = BufWriter::new(
        File::create(&csv_path)
            .map_err(|e| DomainError::SessionIo(format!("{}: {e}", csv_path.display())))?,
    );
    writeln!(writer, "timestamp,seconds_since_start,event,ocr")
        .map_err(|e| DomainError::SessionIo(format!("write: {e}")))?;
    for record in &records {
        writeln!(
            writer,
            "{},{},{},{}",
            record.timestamp.to_rfc3339(),
            record.seconds_since_start,
            csv_field(&record.event),
            csv_field(&record.ocr.join(" | ")),
        )
        .map_err(|e| DomainError::SessionIo(format!("write: {e}")))?;
    }
    writer
        .flush()
        .map_err(|e| DomainError::SessionIo(format!("flush: {e}")))?;
    Ok(csv_path)
}

fn csv_field(raw: &str) -> String {
    if raw.contains(',') || raw.contains('"') {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}

fn parse_csv_row(line: &str, index: usize) -> Result<Event, DomainError> {
    let fields = split_csv(line);
    if fields.len() < 3 {
        return Err(DomainError::SessionIo(format!(
            "csv line {} is malformed",
            index + 1
        )));
    }
    let seconds = fields[1]
        .parse::<f64>()
        .map_err(|e| DomainError::SessionIo(format!("csv line {}: {e}", index + 1)))?;
    // No keyword column; downstream matching runs against the raw text.
    Ok(Event {
        timestamp_seconds: seconds,
        raw_text: fields[2].clone(),
        matched_keyword: fields[2].to_lowercase(),
        source: EventSource::Auto,
    })
}

fn split_csv(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                chars.next();
                current.push('"');
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

/// Sidecar written when a scan pauses, pointing the resumed scan at where
/// to pick up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumeMarker {
    pub last_timestamp: f64,
    pub session_log: PathBuf,
}

impl ResumeMarker {
    pub fn path_for(vod_path: &Path) -> PathBuf {
        let mut name = vod_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "vod".to_string());
        name.push_str(".resume.json");
        vod_path.with_file_name(name)
    }

    pub fn save(&self, vod_path: &Path) -> Result<(), DomainError> {
        let marker_path = Self::path_for(vod_path);
        let body = serde_json::to_string_pretty(self)
            .map_err(|e| DomainError::SessionIo(format!("marker serialize: {e}")))?;
        std::fs::write(&marker_path, body)
            .map_err(|e| DomainError::SessionIo(format!("{}: {e}", marker_path.display())))
    }

    pub fn load(vod_path: &Path) -> Option<Self> {
        let marker_path = Self::path_for(vod_path);
        let raw = std::fs::read_to_string(marker_path).ok()?;
        serde_json::from_str(&raw).ok()
    }

    pub fn clear(vod_path: &Path) {
        let _ = std::fs::remove_file(Self::path_for(vod_path));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(ts: f64, keyword: &str) -> Event {
        Event::auto(ts, format!("Player {keyword} Enemy"), keyword.to_string())
    }

    #[test]
    fn events_round_trip_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = SessionRecorder::create(dir.path(), "session", true).unwrap();
        for ts in [5.0, 10.0, 10.0, 42.5] {
            recorder.append(&event(ts, "killed"), &["line".into()]).unwrap();
        }
        let log_path = recorder.log_path().to_path_buf();
        let summary = recorder.close(60.0).unwrap();
        assert_eq!(summary.event_count, 4);
        assert_eq!(summary.duration_scanned, 60.0);

        let loaded = read_session(&log_path).unwrap();
        assert_eq!(loaded.len(), 4);
        let stamps: Vec<f64> = loaded.iter().map(|e| e.timestamp_seconds).collect();
        assert_eq!(stamps, vec![5.0, 10.0, 10.0, 42.5]);
        assert_eq!(loaded[0].matched_keyword, "killed");
    }

    #[test]
    fn out_of_order_append_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = SessionRecorder::create(dir.path(), "session", false).unwrap();
        recorder.append(&event(30.0, "killed"), &[]).unwrap();
        let err = recorder.append(&event(20.0, "killed"), &[]).unwrap_err();
        assert!(matches!(err, DomainError::SessionIo(_)));
        // The log still holds exactly the accepted event.
        let log_path = recorder.log_path().to_path_buf();
        drop(recorder);
        assert_eq!(read_session(&log_path).unwrap().len(), 1);
    }

    #[test]
    fn reopen_restores_watermark_and_count() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = SessionRecorder::create(dir.path(), "session", false).unwrap();
        recorder.append(&event(15.0, "killed"), &[]).unwrap();
        let log_path = recorder.log_path().to_path_buf();
        drop(recorder);

        let mut resumed = SessionRecorder::reopen(&log_path, false).unwrap();
        assert!(resumed.append(&event(10.0, "killed"), &[]).is_err());
        resumed.append(&event(20.0, "knocked"), &[]).unwrap();
        let summary = resumed.close(20.0).unwrap();
        assert_eq!(summary.event_count, 2);
    }

    #[test]
    fn csv_export_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = SessionRecorder::create(dir.path(), "session", false).unwrap();
        recorder
            .append(
                &Event::auto(12.0, "You killed A, B".into(), "killed".into()),
                &[],
            )
            .unwrap();
        let log_path = recorder.log_path().to_path_buf();
        recorder.close(12.0).unwrap();

        let csv_path = export_csv(&log_path).unwrap();
        let events = read_session(&csv_path).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].timestamp_seconds, 12.0);
        assert_eq!(events[0].raw_text, "You killed A, B");
    }

    #[test]
    fn resume_marker_round_trips_and_clears() {
        let dir = tempfile::tempdir().unwrap();
        let vod = dir.path().join("match.mp4");
        std::fs::write(&vod, b"").unwrap();
        let marker = ResumeMarker {
            last_timestamp: 123.5,
            session_log: dir.path().join("session.jsonl"),
        };
        marker.save(&vod).unwrap();
        let loaded = ResumeMarker::load(&vod).unwrap();
        assert_eq!(loaded.last_timestamp, 123.5);
        ResumeMarker::clear(&vod);
        assert!(ResumeMarker::load(&vod).is_none());
    }
}
