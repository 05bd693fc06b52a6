use std::sync::Once;

use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use runsync_core::{
    update, AppState, Effect, FeedbackAction, Msg, ReportLength, RunStatus, StatusResponse,
    Timestamp,
};
use serde_json::json;

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(runsync_logging::initialize_for_tests);
}

fn at(second: u32) -> Timestamp {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, second).unwrap()
}

/// Starts `r1` and delivers an in-progress result carrying a feedback prompt.
fn awaiting_feedback() -> (AppState, u64) {
    let (state, _) = update(
        AppState::new(),
        Msg::RunStarted {
            run_id: "r1".to_string(),
            query: "Q".to_string(),
            report_length: ReportLength::Medium,
            created_at: at(0),
        },
    );
    let generation = state.active().unwrap().generation;
    let (state, _) = update(
        state,
        Msg::StatusChecked {
            run_id: "r1".to_string(),
            generation,
            response: StatusResponse::Reply {
                code: 202,
                body: json!({"customStatus": {
                    "progress": 0.1,
                    "message": "'Human Approval' is needed",
                    "human_feedback": "1. gather sources\n2. summarize"
                }}),
            },
            at: at(1),
        },
    );
    assert!(state.polling().human_feedback.is_some());
    (state, generation)
}

#[test]
fn feedback_request_for_tracked_run_emits_send() {
    init_logging();
    let (state, _) = awaiting_feedback();

    let (_, effects) = update(
        state,
        Msg::FeedbackRequested {
            run_id: "r1".to_string(),
            action: FeedbackAction::Continue,
        },
    );

    assert_eq!(
        effects,
        vec![Effect::SendFeedback {
            run_id: "r1".to_string(),
            action: FeedbackAction::Continue,
        }]
    );
}

#[test]
fn feedback_request_for_untracked_run_is_a_noop() {
    init_logging();
    let (state, _) = awaiting_feedback();

    let (next, effects) = update(
        state.clone(),
        Msg::FeedbackRequested {
            run_id: "other".to_string(),
            action: FeedbackAction::Cancel,
        },
    );

    assert!(effects.is_empty());
    assert_eq!(next, state);
    assert_eq!(next.feedback_error(), None);
}

#[test]
fn continue_clears_prompt_and_keeps_running() {
    init_logging();
    let (state, _) = awaiting_feedback();

    let (state, effects) = update(
        state,
        Msg::FeedbackSent {
            run_id: "r1".to_string(),
            action: FeedbackAction::Continue,
            at: at(2),
        },
    );

    assert!(effects.is_empty());
    assert_eq!(state.polling().human_feedback, None);
    assert_eq!(state.polling().status, RunStatus::Running);
}

#[test]
fn cancel_forces_failure_and_wins_over_late_progress() {
    init_logging();
    let (state, generation) = awaiting_feedback();

    let (state, effects) = update(
        state,
        Msg::FeedbackSent {
            run_id: "r1".to_string(),
            action: FeedbackAction::Cancel,
            at: at(2),
        },
    );

    assert_eq!(
        effects,
        vec![
            Effect::PersistHistory,
            Effect::ClearRunMetadata {
                run_id: "r1".to_string()
            },
            Effect::StopPolling { generation },
        ]
    );
    let polling = state.polling();
    assert_eq!(polling.status, RunStatus::Failed);
    assert_eq!(polling.message, "Cancelled by user");
    assert_eq!(polling.human_feedback, None);
    assert_eq!(polling.progress, 0.1);

    let (state, effects) = update(
        state,
        Msg::StatusChecked {
            run_id: "r1".to_string(),
            generation,
            response: StatusResponse::Reply {
                code: 202,
                body: json!({"customStatus": {"progress": 0.2, "message": "still going"}}),
            },
            at: at(3),
        },
    );

    assert!(effects.is_empty());
    assert_eq!(state.polling().status, RunStatus::Failed);
    assert_eq!(state.polling().message, "Cancelled by user");
    let entry = state.history().get("r1").unwrap();
    assert_eq!(entry.status, RunStatus::Failed);
    assert_eq!(entry.updates.last().unwrap().message, "Cancelled by user");
}

#[test]
fn failed_send_sets_side_channel_error_only() {
    init_logging();
    let (state, _) = awaiting_feedback();
    let polling_before = state.polling().clone();

    let (state, effects) = update(
        state,
        Msg::FeedbackFailed {
            run_id: "r1".to_string(),
            action: FeedbackAction::Cancel,
            error: "Failed to send feedback to research agent".to_string(),
        },
    );

    assert!(effects.is_empty());
    assert_eq!(
        state.feedback_error(),
        Some("Failed to send cancel event: Failed to send feedback to research agent")
    );
    assert_eq!(state.polling(), &polling_before);

    let (state, _) = update(
        state,
        Msg::FeedbackRequested {
            run_id: "r1".to_string(),
            action: FeedbackAction::Continue,
        },
    );
    assert_eq!(state.feedback_error(), None);
}
