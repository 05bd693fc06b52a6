//! Plain-text rendering of the view model.

use runsync_core::{AppViewModel, HistoryEntry, HistoryRowView, RunStatus};

/// Emits only the lines whose content changed since the previous render.
#[derive(Debug, Default)]
pub struct Renderer {
    last_status: Option<String>,
    last_prompt: Option<String>,
    last_feedback_error: Option<String>,
}

impl Renderer {
    pub fn render(&mut self, view: &AppViewModel) -> Vec<String> {
        let mut lines = Vec::new();

        let status = status_line(view);
        if status.is_some() && status != self.last_status {
            lines.extend(status.clone());
        }
        self.last_status = status;

        if view.human_feedback != self.last_prompt {
            if let Some(prompt) = &view.human_feedback {
                lines.push("Human input requested:".to_string());
                lines.extend(prompt.lines().map(|line| format!("  {line}")));
                lines.push("Type `continue` or `cancel`.".to_string());
            }
            self.last_prompt = view.human_feedback.clone();
        }

        if view.feedback_error != self.last_feedback_error {
            if let Some(error) = &view.feedback_error {
                lines.push(format!("error: {error}"));
            }
            self.last_feedback_error = view.feedback_error.clone();
        }
        lines
    }
}

pub fn status_line(view: &AppViewModel) -> Option<String> {
    let run_id = view.run_id.as_deref()?;
    Some(format!(
        "[{}] {:>3}% {} ({})",
        view.status, view.progress_percent, view.message, run_id
    ))
}

pub fn history_table(rows: &[HistoryRowView]) -> Vec<String> {
    if rows.is_empty() {
        return vec!["No runs recorded.".to_string()];
    }
    rows.iter()
        .map(|row| {
            let marker = if row.has_output { "*" } else { " " };
            format!(
                "{marker} {}  {:<9} {:>3}%  {}  {}",
                row.created_at.format("%Y-%m-%d %H:%M"),
                row.status.to_string(),
                row.progress_percent,
                row.id,
                row.query
            )
        })
        .collect()
}

/// The report of a run followed by its update log.
pub fn run_details(entry: &HistoryEntry) -> Vec<String> {
    let mut lines = vec![
        format!("Run:     {}", entry.id),
        format!("Query:   {}", entry.query),
        format!("Created: {}", entry.created_at.to_rfc3339()),
        format!("Status:  {}", entry.status),
    ];

    lines.push(String::new());
    match &entry.output {
        Some(serde_json::Value::String(report)) if !report.is_empty() => {
            lines.extend(report.lines().map(str::to_string));
        }
        Some(serde_json::Value::String(_)) | None => {
            let note = match entry.status {
                RunStatus::Completed => "(the run finished without a report)",
                RunStatus::Failed => "(no report: the run failed)",
                _ => "(no report yet)",
            };
            lines.push(note.to_string());
        }
        Some(other) => {
            lines.push(serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()));
        }
    }

    lines.push(String::new());
    lines.push("Updates:".to_string());
    for update in &entry.updates {
        lines.push(format!(
            "  {}  {:>3}%  {}",
            update.timestamp.format("%H:%M:%S"),
            runsync_core::progress_percent(update.progress),
            update.message
        ));
    }
    lines
}
