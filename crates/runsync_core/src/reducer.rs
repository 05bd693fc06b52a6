//! Pure mapping from a raw status response to the next polling state and
//! history record.

use serde_json::Value;

use crate::{RunStatus, Timestamp, UpdateRecord};

/// Run still in progress.
pub const STATUS_IN_PROGRESS: u16 = 202;
/// Run finished and carries its output.
pub const STATUS_COMPLETE: u16 = 200;

/// Message recorded when the user cancels a run.
pub const CANCELLED_MESSAGE: &str = "Cancelled by user";

const DEFAULT_PROGRESS_MESSAGE: &str = "In progress";
const DEFAULT_COMPLETED_MESSAGE: &str = "Completed";

/// Outcome of one status check.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusResponse {
    /// The endpoint answered with `code` and a JSON body (null when empty).
    Reply { code: u16, body: Value },
    /// No response could be obtained or decoded.
    TransportFailed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PollingDelta {
    pub status: RunStatus,
    pub message: String,
    pub progress: f64,
    pub human_feedback: Option<String>,
    pub last_updated: Timestamp,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryDelta {
    pub status: RunStatus,
    pub record: UpdateRecord,
    /// Present only for `Completed`.
    pub output: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reduction {
    pub polling: PollingDelta,
    pub history: HistoryDelta,
}

impl Reduction {
    /// Terminal reductions stop the schedule and clear the run metadata.
    pub fn is_terminal(&self) -> bool {
        self.polling.status.is_terminal()
    }
}

/// Maps a status response to the next polling state and history record.
///
/// `last_progress` is the progress of the run's latest recorded update and is
/// carried into failures; `now` stamps the produced record.
pub fn reduce(response: &StatusResponse, last_progress: f64, now: Timestamp) -> Reduction {
    match response {
        StatusResponse::Reply {
            code: STATUS_IN_PROGRESS,
            body,
        } => {
            let status = custom_status(body);
            let progress = status
                .and_then(|s| s.get("progress"))
                .and_then(Value::as_f64)
                .map_or(0.0, clamp_progress);
            let message = status
                .and_then(|s| s.get("message"))
                .and_then(Value::as_str)
                .unwrap_or(DEFAULT_PROGRESS_MESSAGE)
                .to_string();
            let human_feedback = status.and_then(|s| s.get("human_feedback")).and_then(render_prompt);
            build(RunStatus::Running, message, progress, human_feedback, None, now)
        }
        StatusResponse::Reply {
            code: STATUS_COMPLETE,
            body,
        } => {
            let message = custom_status(body)
                .and_then(|s| s.get("message"))
                .and_then(Value::as_str)
                .or_else(|| body.get("runtimeStatus").and_then(Value::as_str))
                .unwrap_or(DEFAULT_COMPLETED_MESSAGE)
                .to_string();
            let output = match body.get("output") {
                Some(output) if !output.is_null() => output.clone(),
                _ => Value::String(String::new()),
            };
            build(RunStatus::Completed, message, 1.0, None, Some(output), now)
        }
        StatusResponse::Reply { code, .. } => {
            failure(format!("Unexpected status: {code}"), last_progress, now)
        }
        StatusResponse::TransportFailed(error) => failure(error.clone(), last_progress, now),
    }
}

/// A `Failed` reduction that keeps the last known progress.
pub fn failure(message: impl Into<String>, last_progress: f64, now: Timestamp) -> Reduction {
    build(
        RunStatus::Failed,
        message.into(),
        clamp_progress(last_progress),
        None,
        None,
        now,
    )
}

fn build(
    status: RunStatus,
    message: String,
    progress: f64,
    human_feedback: Option<String>,
    output: Option<Value>,
    now: Timestamp,
) -> Reduction {
    Reduction {
        polling: PollingDelta {
            status,
            message: message.clone(),
            progress,
            human_feedback,
            last_updated: now,
        },
        history: HistoryDelta {
            status,
            record: UpdateRecord {
                timestamp: now,
                message,
                progress,
            },
            output,
        },
    }
}

fn custom_status(body: &Value) -> Option<&Value> {
    body.get("customStatus")
        .or_else(|| body.get("custom_status"))
        .filter(|status| status.is_object())
}

fn render_prompt(raw: &Value) -> Option<String> {
    match raw {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

fn clamp_progress(progress: f64) -> f64 {
    if progress.is_nan() {
        return 0.0;
    }
    progress.clamp(0.0, 1.0)
}
