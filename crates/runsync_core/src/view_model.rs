use crate::{HistoryEntry, RunStatus, Timestamp};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AppViewModel {
    pub run_id: Option<String>,
    pub status: RunStatus,
    pub message: String,
    pub progress_percent: u8,
    pub last_updated: Option<Timestamp>,
    pub human_feedback: Option<String>,
    pub start_error: Option<String>,
    pub feedback_error: Option<String>,
    pub history: Vec<HistoryRowView>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRowView {
    pub id: String,
    pub query: String,
    pub created_at: Timestamp,
    pub status: RunStatus,
    pub update_count: usize,
    pub last_message: Option<String>,
    pub progress_percent: u8,
    pub has_output: bool,
}

impl From<&HistoryEntry> for HistoryRowView {
    fn from(entry: &HistoryEntry) -> Self {
        Self {
            id: entry.id.clone(),
            query: entry.query.clone(),
            created_at: entry.created_at,
            status: entry.status,
            update_count: entry.updates.len(),
            last_message: entry.last_update().map(|update| update.message.clone()),
            progress_percent: progress_percent(entry.last_progress()),
            has_output: entry.output.is_some(),
        }
    }
}

/// Converts a progress fraction to a whole percentage in `0..=100`.
pub fn progress_percent(fraction: f64) -> u8 {
    if fraction.is_nan() {
        return 0;
    }
    (fraction * 100.0).round().clamp(0.0, 100.0) as u8
}
