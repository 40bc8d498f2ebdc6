use taskq_rs::model::{ProcessorId, ProcessorState, ProcessorStats};
use taskq_rs::sink::ItemError;

#[test]
fn processor_state_display_and_parse_agree() {
    for state in [
        ProcessorState::Created,
        ProcessorState::Running,
        ProcessorState::Draining,
        ProcessorState::Stopped,
    ] {
        assert_eq!(state.to_string().parse::<ProcessorState>().unwrap(), state);
    }
    assert!("paused".parse::<ProcessorState>().is_err());
}

#[test]
fn only_created_and_running_accept_work() {
    assert!(ProcessorState::Created.accepts_work());
    assert!(ProcessorState::Running.accepts_work());
    assert!(!ProcessorState::Draining.accepts_work());
    assert!(!ProcessorState::Stopped.accepts_work());
    assert!(ProcessorState::Stopped.is_terminal());
}

#[test]
fn processor_state_serializes_snake_case() {
    let json = serde_json::to_string(&ProcessorState::Draining).unwrap();
    assert_eq!(json, "\"draining\"");
}

#[test]
fn stats_processed_counts_successes_and_failures() {
    let stats = ProcessorStats {
        enqueued: 10,
        rejected: 1,
        succeeded: 6,
        failed: 2,
        discarded: 2,
    };
    assert_eq!(stats.processed(), 8);
}

#[test]
fn processor_id_displays_short_form() {
    let id = ProcessorId::new();
    assert_eq!(id.to_string().len(), 8);
    assert!(id.0.to_string().starts_with(&id.to_string()));
}

#[test]
fn item_error_display_names_the_failure_kind() {
    let now = chrono::Utc::now();
    let mut error = ItemError {
        processor_id: ProcessorId::new(),
        seq: 3,
        enqueued_at: now,
        failed_at: now,
        message: "bad input".to_string(),
        panicked: false,
    };
    assert_eq!(error.to_string(), "item #3 failed: bad input");

    error.panicked = true;
    assert_eq!(error.to_string(), "item #3 panicked: bad input");
}
