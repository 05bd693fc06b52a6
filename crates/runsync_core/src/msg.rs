use crate::{FeedbackAction, HistoryEntry, ReportLength, RunId, RunMetadata, StatusResponse, Timestamp};

#[derive(Debug, Clone, PartialEq)]
pub enum Msg {
    /// Restore the history loaded from durable storage at startup.
    HistoryRestored(Vec<HistoryEntry>),
    /// The backend accepted a new run.
    RunStarted {
        run_id: RunId,
        query: String,
        report_length: ReportLength,
        created_at: Timestamp,
    },
    /// Starting a run failed before anything was persisted.
    RunStartFailed { error: String },
    /// Run metadata was found in durable storage at startup.
    ResumeRequested { metadata: RunMetadata, at: Timestamp },
    /// A status check for `run_id` resolved.
    StatusChecked {
        run_id: RunId,
        generation: u64,
        response: StatusResponse,
        at: Timestamp,
    },
    /// User picked a feedback action for a run.
    FeedbackRequested { run_id: RunId, action: FeedbackAction },
    /// Backend accepted a feedback action.
    FeedbackSent {
        run_id: RunId,
        action: FeedbackAction,
        at: Timestamp,
    },
    /// Sending a feedback action failed.
    FeedbackFailed {
        run_id: RunId,
        action: FeedbackAction,
        error: String,
    },
    /// User confirmed deletion of a history entry.
    RemoveConfirmed { run_id: RunId },
    /// Session is being torn down.
    Shutdown,
}
