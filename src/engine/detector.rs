//! Keyword matching over recognized text, with per-keyword cooldown.

use std::collections::HashMap;

use tracing::debug;

use crate::domain::model::Event;

/// Turns OCR output lines into bookmark events.
///
/// Each configured keyword fires at most once per tick, and not again until
/// its cooldown elapses. Cooldowns are tracked per keyword, so a `knocked`
/// following a `killed` inside the window still registers.
pub struct EventDetector {
    keywords: Vec<String>,
    cooldown_seconds: f64,
    last_emitted: HashMap<String, f64>,
}

impl EventDetector {
    pub fn new(keywords: &[String], cooldown_seconds: f64) -> Self {
        Self {
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
            cooldown_seconds,
            last_emitted: HashMap::new(),
        }
    }

    /// Inspect one tick's recognized lines and emit events for keywords that
    /// match and are off cooldown.
    pub fn classify(&mut self, lines: &[String], timestamp_seconds: f64) -> Vec<Event> {
        let mut events = Vec::new();
        for keyword in &self.keywords {
            let Some(matched_line) = lines
                .iter()
                .find(|line| normalize(line).contains(keyword.as_str()))
            else {
                continue;
            };
            if let Some(&last) = self.last_emitted.get(keyword) {
                if timestamp_seconds - last < self.cooldown_seconds {
                    debug!(
                        "suppressed '{}' at {:.2}s (cooldown until {:.2}s)",
                        keyword,
                        timestamp_seconds,
                        last + self.cooldown_seconds
                    );
                    continue;
                }
            }
            self.last_emitted
                .insert(keyword.clone(), timestamp_seconds);
            events.push(Event::auto(
                timestamp_seconds,
                matched_line.trim().to_string(),
                keyword.clone(),
            ));
        }
        events
    }
}

/// Lowercase and strip everything but alphanumerics and spaces, so OCR
/// punctuation noise does not break substring matching.
fn normalize(line: &str) -> String {
    line.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == ' ' { c } else { ' ' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keywords() -> Vec<String> {
        vec!["killed".into(), "knocked".into()]
    }

    #[test]
    fn matches_are_case_and_punctuation_insensitive() {
        let mut detector = EventDetector::new(&keywords(), 3.0);
        let events = detector.classify(&["You KILLED> SomeEnemy!".into()], 10.0);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].matched_keyword, "killed");
        assert_eq!(events[0].raw_text, "You KILLED> SomeEnemy!");
        assert_eq!(events[0].timestamp_seconds, 10.0);
    }

    #[test]
    fn cooldown_suppresses_repeat_then_releases() {
        let mut detector = EventDetector::new(&keywords(), 3.0);
        assert_eq!(detector.classify(&["Player killed Enemy".into()], 10.0).len(), 1);
        // Same keyword one second later: the killfeed line is still visible.
        assert!(detector.classify(&["Player killed Enemy".into()], 11.0).is_empty());
        // A different keyword is on its own cooldown.
        assert_eq!(detector.classify(&["Player knocked Other".into()], 11.5).len(), 1);
        // Past the window the keyword fires again.
        assert_eq!(detector.classify(&["Player killed Third".into()], 13.0).len(), 1);
    }

    #[test]
    fn one_event_per_keyword_per_tick() {
        let mut detector = EventDetector::new(&keywords(), 3.0);
        let lines = vec![
            "Player killed EnemyA".to_string(),
            "Player killed EnemyB".to_string(),
            "Player knocked EnemyC".to_string(),
        ];
        let events = detector.classify(&lines, 20.0);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].matched_keyword, "killed");
        assert_eq!(events[1].matched_keyword, "knocked");
    }

    #[test]
    fn no_match_emits_nothing_and_keeps_cooldowns_clear() {
        let mut detector = EventDetector::new(&keywords(), 3.0);
        assert!(detector.classify(&["nothing here".into()], 5.0).is_empty());
        assert_eq!(detector.classify(&["x killed y".into()], 5.5).len(), 1);
    }
}
