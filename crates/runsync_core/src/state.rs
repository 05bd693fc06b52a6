use serde_json::Value;

use crate::view_model::{progress_percent, AppViewModel, HistoryRowView};
use crate::{
    HistoryEntry, PollingState, Reduction, RunHistory, RunId, RunMetadata, RunStatus, Timestamp,
    RESTORED_RUN_QUERY,
};

const QUEUED_MESSAGE: &str = "Queued";
const RESUMING_MESSAGE: &str = "Resuming";

/// Handle to the one run whose status checks are currently scheduled.
///
/// The generation changes every time tracking (re)starts, so results issued
/// for an earlier schedule of the same run id are recognisably stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunHandle {
    pub run_id: RunId,
    pub generation: u64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AppState {
    polling: PollingState,
    history: RunHistory,
    active: Option<RunHandle>,
    generation: u64,
    start_error: Option<String>,
    feedback_error: Option<String>,
    dirty: bool,
}

pub(crate) struct Removal {
    pub removed: bool,
    pub stopped: Option<RunHandle>,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(&self) -> AppViewModel {
        AppViewModel {
            run_id: self.polling.run_id.clone(),
            status: self.polling.status,
            message: self.polling.message.clone(),
            progress_percent: progress_percent(self.polling.progress),
            last_updated: self.polling.last_updated,
            human_feedback: self.polling.human_feedback.clone(),
            start_error: self.start_error.clone(),
            feedback_error: self.feedback_error.clone(),
            history: self.history.entries().iter().map(HistoryRowView::from).collect(),
        }
    }

    pub fn polling(&self) -> &PollingState {
        &self.polling
    }

    pub fn history(&self) -> &RunHistory {
        &self.history
    }

    pub fn active(&self) -> Option<&RunHandle> {
        self.active.as_ref()
    }

    pub fn start_error(&self) -> Option<&str> {
        self.start_error.as_deref()
    }

    pub fn feedback_error(&self) -> Option<&str> {
        self.feedback_error.as_deref()
    }

    /// Returns and clears the dirty flag.
    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    /// The handle of `run_id` if it is the tracked run and not yet terminal.
    ///
    /// Every path that mutates run state goes through this check.
    pub fn tracked_run(&self, run_id: &str) -> Option<&RunHandle> {
        self.active
            .as_ref()
            .filter(|handle| handle.run_id == run_id && !self.polling.status.is_terminal())
    }

    pub(crate) fn accepts(&self, run_id: &str, generation: u64) -> bool {
        self.tracked_run(run_id)
            .is_some_and(|handle| handle.generation == generation)
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn restore_history(&mut self, entries: Vec<HistoryEntry>) {
        self.history = RunHistory::from_entries(entries);
        self.mark_dirty();
    }

    pub(crate) fn start_run(
        &mut self,
        run_id: &str,
        query: &str,
        created_at: Timestamp,
    ) -> RunHandle {
        self.history
            .start_entry(HistoryEntry::new(run_id, query, created_at));
        self.polling = PollingState {
            run_id: Some(run_id.to_string()),
            status: RunStatus::Running,
            message: QUEUED_MESSAGE.to_string(),
            progress: 0.0,
            last_updated: Some(created_at),
            human_feedback: None,
        };
        self.start_error = None;
        self.feedback_error = None;
        self.track(run_id)
    }

    /// Tracks a run found in durable metadata. Returns the new handle and
    /// whether a history entry had to be synthesized for it.
    pub(crate) fn resume_run(&mut self, metadata: &RunMetadata, at: Timestamp) -> (RunHandle, bool) {
        let run_id = metadata.run_id.as_str();
        let query = metadata
            .query
            .clone()
            .unwrap_or_else(|| RESTORED_RUN_QUERY.to_string());
        let created_at = metadata.created_at.unwrap_or(at);
        let synthesized = self
            .history
            .ensure_entry(HistoryEntry::new(run_id, query, created_at));
        self.polling = PollingState {
            run_id: Some(run_id.to_string()),
            status: RunStatus::Running,
            message: RESUMING_MESSAGE.to_string(),
            progress: self.history.last_progress(run_id),
            last_updated: Some(at),
            human_feedback: None,
        };
        (self.track(run_id), synthesized)
    }

    pub(crate) fn apply_reduction(&mut self, run_id: &str, reduction: Reduction) {
        let Reduction { polling, history } = reduction;
        match history.status {
            RunStatus::Running => self.history.append_update(run_id, history.record),
            RunStatus::Completed => self.history.finalize(
                run_id,
                history.record,
                history.output.unwrap_or(Value::Null),
            ),
            RunStatus::Failed => self.history.fail(run_id, history.record),
            RunStatus::Idle => false,
        };

        self.polling = PollingState {
            run_id: Some(run_id.to_string()),
            status: polling.status,
            message: polling.message,
            progress: polling.progress,
            last_updated: Some(polling.last_updated),
            human_feedback: polling.human_feedback,
        };
        if polling.status.is_terminal() {
            self.active = None;
        }
        self.mark_dirty();
    }

    /// Clears the pending prompt once it has been answered.
    pub(crate) fn answer_feedback(&mut self, run_id: &str) {
        if self.polling.run_id.as_deref() == Some(run_id) && self.polling.human_feedback.is_some() {
            self.polling.human_feedback = None;
            self.mark_dirty();
        }
    }

    pub(crate) fn set_start_error(&mut self, error: String) {
        self.start_error = Some(error);
        self.mark_dirty();
    }

    pub(crate) fn set_feedback_error(&mut self, error: Option<String>) {
        if self.feedback_error != error {
            self.feedback_error = error;
            self.mark_dirty();
        }
    }

    pub(crate) fn remove_run(&mut self, run_id: &str) -> Removal {
        let removed = self.history.remove(run_id).is_some();
        let mut stopped = None;
        if self.polling.run_id.as_deref() == Some(run_id) {
            self.polling = PollingState::empty();
            self.mark_dirty();
        }
        if self
            .active
            .as_ref()
            .is_some_and(|handle| handle.run_id == run_id)
        {
            stopped = self.active.take();
        }
        if removed {
            self.mark_dirty();
        }
        Removal { removed, stopped }
    }

    /// Stops tracking without touching the projection; later results are discarded.
    pub(crate) fn detach(&mut self) -> Option<RunHandle> {
        self.active.take()
    }

    fn track(&mut self, run_id: &str) -> RunHandle {
        self.generation += 1;
        let handle = RunHandle {
            run_id: run_id.to_string(),
            generation: self.generation,
        };
        self.active = Some(handle.clone());
        self.mark_dirty();
        handle
    }
}
