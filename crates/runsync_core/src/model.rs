use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Opaque backend identifier of a run.
pub type RunId = String;
pub type Timestamp = DateTime<Utc>;

/// Query recorded for a run that was resumed without a stored query.
pub const RESTORED_RUN_QUERY: &str = "(restored run)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RunStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    /// `Completed` and `Failed` accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RunStatus::Idle => "Idle",
            RunStatus::Running => "Running",
            RunStatus::Completed => "Completed",
            RunStatus::Failed => "Failed",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnumError {
    pub expected: &'static str,
    pub actual: String,
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expected one of {}, got {:?}", self.expected, self.actual)
    }
}

impl std::error::Error for ParseEnumError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportLength {
    Short,
    #[default]
    Medium,
    Long,
}

impl ReportLength {
    pub fn as_str(self) -> &'static str {
        match self {
            ReportLength::Short => "short",
            ReportLength::Medium => "medium",
            ReportLength::Long => "long",
        }
    }
}

impl fmt::Display for ReportLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportLength {
    type Err = ParseEnumError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "short" => Ok(ReportLength::Short),
            "medium" => Ok(ReportLength::Medium),
            "long" => Ok(ReportLength::Long),
            _ => Err(ParseEnumError {
                expected: "short, medium, long",
                actual: raw.to_string(),
            }),
        }
    }
}

/// Human-in-the-loop control action sent into an in-flight run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackAction {
    Continue,
    Cancel,
}

impl FeedbackAction {
    pub fn as_str(self) -> &'static str {
        match self {
            FeedbackAction::Continue => "continue",
            FeedbackAction::Cancel => "cancel",
        }
    }
}

impl fmt::Display for FeedbackAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeedbackAction {
    type Err = ParseEnumError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "continue" => Ok(FeedbackAction::Continue),
            "cancel" => Ok(FeedbackAction::Cancel),
            _ => Err(ParseEnumError {
                expected: "continue, cancel",
                actual: raw.to_string(),
            }),
        }
    }
}

/// Durable record of the single run that should be resumed after a restart.
///
/// Only `run_id` is guaranteed: metadata decoded from the legacy scalar key
/// carries nothing else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunMetadata {
    pub run_id: RunId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_length: Option<ReportLength>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Timestamp>,
}

impl RunMetadata {
    pub fn new(
        run_id: impl Into<RunId>,
        query: impl Into<String>,
        report_length: ReportLength,
        created_at: Timestamp,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            query: Some(query.into()),
            report_length: Some(report_length),
            created_at: Some(created_at),
        }
    }

    /// Metadata synthesized from the legacy scalar run id key.
    pub fn legacy(run_id: impl Into<RunId>) -> Self {
        Self {
            run_id: run_id.into(),
            query: None,
            report_length: None,
            created_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateRecord {
    pub timestamp: Timestamp,
    pub message: String,
    pub progress: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: RunId,
    pub query: String,
    pub created_at: Timestamp,
    pub status: RunStatus,
    #[serde(default)]
    pub updates: Vec<UpdateRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
}

impl HistoryEntry {
    /// A freshly started run: `Running`, no updates, no output.
    pub fn new(id: impl Into<RunId>, query: impl Into<String>, created_at: Timestamp) -> Self {
        Self {
            id: id.into(),
            query: query.into(),
            created_at,
            status: RunStatus::Running,
            updates: Vec::new(),
            output: None,
        }
    }

    pub fn last_update(&self) -> Option<&UpdateRecord> {
        self.updates.last()
    }

    /// Progress of the most recent update, or 0 when nothing was recorded.
    pub fn last_progress(&self) -> f64 {
        self.last_update().map_or(0.0, |update| update.progress)
    }
}

/// In-memory projection of the tracked run.
///
/// `status == Idle` exactly when `run_id` is `None`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PollingState {
    pub run_id: Option<RunId>,
    pub status: RunStatus,
    pub message: String,
    pub progress: f64,
    pub last_updated: Option<Timestamp>,
    pub human_feedback: Option<String>,
}

impl PollingState {
    pub fn empty() -> Self {
        Self::default()
    }
}
