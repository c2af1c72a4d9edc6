// Domain rules - Clip window construction, merging, and naming policies

use std::collections::BTreeMap;
use std::path::Path;

use chrono::NaiveDateTime;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::model::{ClipCounts, ClipInterval, Event};

/// Pre/post-roll override for a single keyword. Missing fields fall back to
/// the global defaults.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct EventWindow {
    pub pre_seconds: Option<f64>,
    pub post_seconds: Option<f64>,
}

/// Resolved pre/post-roll policy for a split request.
#[derive(Debug, Clone)]
pub struct WindowPolicy {
    pub default_pre: f64,
    pub default_post: f64,
    pub per_keyword: BTreeMap<String, EventWindow>,
}

impl WindowPolicy {
    pub fn new(default_pre: f64, default_post: f64) -> Self {
        Self {
            default_pre,
            default_post,
            per_keyword: BTreeMap::new(),
        }
    }

    /// Pre/post-roll seconds for a keyword, falling back to the defaults.
    pub fn window_for(&self, keyword: &str) -> (f64, f64) {
        match self.per_keyword.get(keyword) {
            Some(w) => (
                w.pre_seconds.unwrap_or(self.default_pre),
                w.post_seconds.unwrap_or(self.default_post),
            ),
            None => (self.default_pre, self.default_post),
        }
    }

    /// Layer explicit request overrides on top of this policy.
    pub fn with_overrides(mut self, overrides: &BTreeMap<String, EventWindow>) -> Self {
        for (keyword, window) in overrides {
            let entry = self.per_keyword.entry(keyword.clone()).or_default();
            if window.pre_seconds.is_some() {
                entry.pre_seconds = window.pre_seconds;
            }
            if window.post_seconds.is_some() {
                entry.post_seconds = window.post_seconds;
            }
        }
        self
    }
}

/// Keyword fragments that decide how an event is tallied. Checked in order:
/// assists, then deaths, then kills, so one event counts exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryMap {
    pub kills: Vec<String>,
    pub assists: Vec<String>,
    pub deaths: Vec<String>,
}

impl Default for CategoryMap {
    fn default() -> Self {
        Self {
            kills: vec![
                "kill".into(),
                "killed".into(),
                "knocked".into(),
                "elimination".into(),
            ],
            assists: vec!["assist".into()],
            deaths: vec!["death".into()],
        }
    }
}

impl CategoryMap {
    fn matches(fragments: &[String], keyword: &str) -> bool {
        fragments.iter().any(|f| keyword.contains(f.as_str()))
    }
}

/// Tally member events into kill/assist/death counts.
pub fn tally_counts(events: &[Event], categories: &CategoryMap) -> ClipCounts {
    let mut counts = ClipCounts::default();
    for event in events {
        let keyword = event.matched_keyword.to_lowercase();
        if CategoryMap::matches(&categories.assists, &keyword) {
            counts.assists += 1;
        } else if CategoryMap::matches(&categories.deaths, &keyword) {
            counts.deaths += 1;
        } else if CategoryMap::matches(&categories.kills, &keyword) {
            counts.kills += 1;
        }
    }
    counts
}

/// Build one raw clip interval per event, clamped to `[0, media_duration]`,
/// sorted by start time. Counts are filled in after merging.
pub fn build_intervals(
    events: &[Event],
    policy: &WindowPolicy,
    media_duration: f64,
) -> Vec<ClipInterval> {
    let mut intervals: Vec<ClipInterval> = events
        .iter()
        .map(|event| {
            let (pre, post) = policy.window_for(&event.matched_keyword);
            let start = (event.timestamp_seconds - pre).clamp(0.0, media_duration);
            let end = (event.timestamp_seconds + post).clamp(start, media_duration);
            ClipInterval {
                start_seconds: start,
                end_seconds: end,
                events: vec![event.clone()],
                counts: ClipCounts::default(),
            }
        })
        .collect();
    intervals.sort_by(|a, b| a.start_seconds.total_cmp(&b.start_seconds));
    intervals
}

/// Merge overlapping-or-touching intervals, absorbing member events.
///
/// `next.start == current.end` merges too, so two adjacent clips never share
/// a zero-gap boundary. `merge_gap` widens the merge window further; 0.0
/// gives the plain interval-union behavior.
pub fn merge_intervals(
    intervals: Vec<ClipInterval>,
    merge_gap: f64,
    categories: &CategoryMap,
) -> Vec<ClipInterval> {
    let mut merged: Vec<ClipInterval> = Vec::new();
    for interval in intervals {
        match merged.last_mut() {
            Some(current) if interval.start_seconds <= current.end_seconds + merge_gap => {
                current.end_seconds = current.end_seconds.max(interval.end_seconds);
                current.events.extend(interval.events);
            }
            _ => merged.push(interval),
        }
    }
    for interval in &mut merged {
        interval.counts = tally_counts(&interval.events, categories);
    }
    merged
}

/// Output file name for one merged interval:
/// `clip_<timestamp>_<index>_k<kills>_a<assists>_d<deaths><ext>`, where the
/// timestamp is the VOD start time shifted by the interval's offset.
pub fn clip_file_name(
    vod_start: NaiveDateTime,
    interval: &ClipInterval,
    index: usize,
    extension: &str,
) -> String {
    let clip_time = vod_start + chrono::Duration::milliseconds((interval.start_seconds * 1000.0) as i64);
    format!(
        "clip_{}_{:02}_k{}_a{}_d{}{}",
        clip_time.format("%Y%m%d_%H%M%S"),
        index,
        interval.counts.kills,
        interval.counts.assists,
        interval.counts.deaths,
        extension,
    )
}

/// Recover the recording's wall-clock start time from a `YYYYMMDD_HHMMSS`
/// fragment in its file name, the scheme replay tools use.
pub fn parse_vod_start_time(path: &Path) -> Option<NaiveDateTime> {
    let stem = path.file_stem()?.to_string_lossy();
    let re = Regex::new(r"(\d{8}_\d{6})").ok()?;
    let captured = re.captures(&stem)?.get(1)?.as_str();
    NaiveDateTime::parse_from_str(captured, "%Y%m%d_%H%M%S").ok()
}
