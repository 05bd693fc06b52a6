use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use runsync_core::{reduce, RunStatus, StatusResponse, Timestamp, UpdateRecord};
use serde_json::{json, Value};

fn at(second: u32) -> Timestamp {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, second).unwrap()
}

fn reply(code: u16, body: Value) -> StatusResponse {
    StatusResponse::Reply { code, body }
}

#[test]
fn in_progress_reads_custom_status() {
    let body = json!({
        "runtimeStatus": "Running",
        "customStatus": {
            "progress": 0.4,
            "message": "Searching",
            "human_feedback": "Approve the plan?"
        }
    });

    let reduction = reduce(&reply(202, body), 0.1, at(5));

    assert_eq!(reduction.polling.status, RunStatus::Running);
    assert_eq!(reduction.polling.message, "Searching");
    assert_eq!(reduction.polling.progress, 0.4);
    assert_eq!(
        reduction.polling.human_feedback.as_deref(),
        Some("Approve the plan?")
    );
    assert_eq!(
        reduction.history.record,
        UpdateRecord {
            timestamp: at(5),
            message: "Searching".to_string(),
            progress: 0.4,
        }
    );
    assert_eq!(reduction.history.output, None);
    assert!(!reduction.is_terminal());
}

#[test]
fn in_progress_defaults_when_custom_status_missing() {
    let reduction = reduce(&reply(202, Value::Null), 0.7, at(0));

    assert_eq!(reduction.polling.status, RunStatus::Running);
    assert_eq!(reduction.polling.message, "In progress");
    assert_eq!(reduction.polling.progress, 0.0);
    assert_eq!(reduction.polling.human_feedback, None);
}

#[test]
fn in_progress_clamps_progress_and_renders_structured_prompt() {
    let body = json!({
        "customStatus": {
            "progress": 1.7,
            "human_feedback": {"tasks": ["a", "b"]}
        }
    });

    let reduction = reduce(&reply(202, body), 0.0, at(0));

    assert_eq!(reduction.polling.progress, 1.0);
    assert_eq!(
        reduction.polling.human_feedback.as_deref(),
        Some(r#"{"tasks":["a","b"]}"#)
    );
}

#[test]
fn complete_sets_full_progress_and_output() {
    let body = json!({
        "runtimeStatus": "Completed",
        "customStatus": {"message": "'report generation' completed", "progress": 1.0},
        "output": "# Report"
    });

    let reduction = reduce(&reply(200, body), 0.75, at(9));

    assert_eq!(reduction.polling.status, RunStatus::Completed);
    assert_eq!(reduction.polling.progress, 1.0);
    assert_eq!(reduction.polling.message, "'report generation' completed");
    assert_eq!(reduction.polling.human_feedback, None);
    assert_eq!(reduction.history.record.progress, 1.0);
    assert_eq!(reduction.history.output, Some(json!("# Report")));
    assert!(reduction.is_terminal());
}

#[test]
fn complete_message_falls_back_to_runtime_status_then_literal() {
    let with_runtime = reduce(
        &reply(200, json!({"runtimeStatus": "Finished", "output": {}})),
        0.0,
        at(0),
    );
    assert_eq!(with_runtime.polling.message, "Finished");

    let bare = reduce(&reply(200, json!({"output": {"k": 1}})), 0.0, at(0));
    assert_eq!(bare.polling.message, "Completed");
    assert_eq!(bare.history.output, Some(json!({"k": 1})));
}

#[test]
fn complete_without_output_still_attaches_one() {
    let reduction = reduce(&reply(200, json!({})), 0.0, at(0));

    assert_eq!(reduction.history.output, Some(json!("")));
}

#[test]
fn unexpected_code_fails_and_keeps_last_progress() {
    let reduction = reduce(&reply(500, json!({"detail": "boom"})), 0.55, at(3));

    assert_eq!(reduction.polling.status, RunStatus::Failed);
    assert_eq!(reduction.polling.message, "Unexpected status: 500");
    assert_eq!(reduction.polling.progress, 0.55);
    assert_eq!(reduction.history.record.progress, 0.55);
    assert_eq!(reduction.history.output, None);
    assert!(reduction.is_terminal());
}

#[test]
fn transport_failure_uses_error_description() {
    let response = StatusResponse::TransportFailed("connection refused".to_string());

    let reduction = reduce(&response, 0.0, at(1));

    assert_eq!(reduction.polling.status, RunStatus::Failed);
    assert_eq!(reduction.polling.message, "connection refused");
    assert_eq!(reduction.polling.progress, 0.0);
}

#[test]
fn reduce_is_deterministic_and_leaves_input_untouched() {
    let response = reply(202, json!({"customStatus": {"progress": 0.2, "message": "x"}}));
    let before = response.clone();

    let first = reduce(&response, 0.0, at(2));
    let second = reduce(&response, 0.0, at(2));

    assert_eq!(first, second);
    assert_eq!(response, before);
}
