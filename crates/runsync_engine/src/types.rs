use std::fmt;

use runsync_core::{FeedbackAction, ReportLength, RunId, Timestamp};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Body of the run-start endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StartRunRequest {
    pub query: String,
    pub report_length: ReportLength,
    pub project_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedRun {
    pub run_id: RunId,
    pub created_at: Timestamp,
}

/// Raw answer of the status endpoint: any HTTP code plus its JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReply {
    pub code: u16,
    pub body: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    RunStartCompleted {
        request: StartRunRequest,
        result: Result<StartedRun, BackendError>,
    },
    StatusChecked {
        run_id: RunId,
        generation: u64,
        result: Result<StatusReply, BackendError>,
    },
    FeedbackCompleted {
        run_id: RunId,
        action: FeedbackAction,
        result: Result<(), BackendError>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct BackendError {
    pub kind: FailureKind,
    pub message: String,
}

impl BackendError {
    pub(crate) fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    InvalidUrl,
    HttpStatus(u16),
    Timeout,
    Network,
    Decode,
    TooLarge { max_bytes: u64, actual: Option<u64> },
    MissingRunId,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::InvalidUrl => write!(f, "invalid url"),
            FailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::Network => write!(f, "network error"),
            FailureKind::Decode => write!(f, "undecodable response"),
            FailureKind::TooLarge { max_bytes, actual } => {
                write!(f, "response too large (max {max_bytes}, actual {actual:?})")
            }
            FailureKind::MissingRunId => write!(f, "missing run identifier"),
        }
    }
}
