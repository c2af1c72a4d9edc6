// Unit tests for domain models

use super::*;

#[test]
fn scan_state_pause_resume_cycle_is_allowed() {
    assert!(ScanState::Running.can_transition(ScanState::Paused));
    assert!(ScanState::Paused.can_transition(ScanState::Running));
}

#[test]
fn scan_state_terminal_states_have_no_exits() {
    for terminal in [ScanState::Stopped, ScanState::Completed, ScanState::Error] {
        assert!(terminal.is_terminal());
        for next in [
            ScanState::Queued,
            ScanState::Running,
            ScanState::Paused,
            ScanState::Stopping,
            ScanState::Stopped,
            ScanState::Completed,
            ScanState::Error,
        ] {
            assert!(!terminal.can_transition(next));
        }
    }
}

#[test]
fn scan_state_cannot_skip_queued() {
    assert!(!ScanState::Queued.can_transition(ScanState::Paused));
    assert!(!ScanState::Queued.can_transition(ScanState::Completed));
}

#[test]
fn clip_interval_duration_never_negative() {
    let interval = ClipInterval {
        start_seconds: 10.0,
        end_seconds: 10.0,
        events: vec![],
        counts: ClipCounts::default(),
    };
    assert_eq!(interval.duration(), 0.0);
}

#[test]
fn event_serializes_with_lowercase_source() {
    let event = Event::auto(12.5, "Player killed Enemy".into(), "killed".into());
    let json = serde_json::to_string(&event).unwrap();
    assert!(json.contains("\"source\":\"auto\""));
    let back: Event = serde_json::from_str(&json).unwrap();
    assert_eq!(back, event);
}
