use serde_json::Value;

use crate::{HistoryEntry, RunStatus, UpdateRecord};

/// Newest-first list of runs with their per-run update log.
///
/// Entry ids are unique. Update logs only ever grow while a run is tracked;
/// entries leave the list only through [`RunHistory::remove`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RunHistory {
    entries: Vec<HistoryEntry>,
}

impl RunHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a history from persisted entries, dropping later duplicates of an id.
    pub fn from_entries(entries: Vec<HistoryEntry>) -> Self {
        let mut history = Self::new();
        for entry in entries {
            if !history.contains(&entry.id) {
                history.entries.push(entry);
            }
        }
        history
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, run_id: &str) -> Option<&HistoryEntry> {
        self.entries.iter().find(|entry| entry.id == run_id)
    }

    pub fn contains(&self, run_id: &str) -> bool {
        self.get(run_id).is_some()
    }

    /// Progress of the run's latest update, 0 if the run or its updates are absent.
    pub fn last_progress(&self, run_id: &str) -> f64 {
        self.get(run_id).map_or(0.0, HistoryEntry::last_progress)
    }

    /// Prepends a new entry. An older entry with the same id is replaced.
    pub fn start_entry(&mut self, entry: HistoryEntry) {
        self.entries.retain(|existing| existing.id != entry.id);
        self.entries.insert(0, entry);
    }

    /// Prepends `entry` unless its id is already present. Returns whether it was added.
    pub fn ensure_entry(&mut self, entry: HistoryEntry) -> bool {
        if self.contains(&entry.id) {
            return false;
        }
        self.entries.insert(0, entry);
        true
    }

    /// Appends an in-progress record and marks the run `Running`.
    ///
    /// No-op when the run is absent, e.g. deleted by the user mid-flight.
    pub fn append_update(&mut self, run_id: &str, record: UpdateRecord) -> bool {
        self.with_entry(run_id, |entry| {
            entry.status = RunStatus::Running;
            entry.updates.push(record);
        })
    }

    /// Appends the terminal record of a completed run and attaches its output.
    pub fn finalize(&mut self, run_id: &str, record: UpdateRecord, output: Value) -> bool {
        self.with_entry(run_id, |entry| {
            entry.status = RunStatus::Completed;
            entry.updates.push(record);
            entry.output = Some(output);
        })
    }

    /// Appends the terminal record of a failed run.
    pub fn fail(&mut self, run_id: &str, record: UpdateRecord) -> bool {
        self.with_entry(run_id, |entry| {
            entry.status = RunStatus::Failed;
            entry.updates.push(record);
        })
    }

    /// Drops the entry for `run_id`. Removing an absent id is a no-op.
    pub fn remove(&mut self, run_id: &str) -> Option<HistoryEntry> {
        let index = self.entries.iter().position(|entry| entry.id == run_id)?;
        Some(self.entries.remove(index))
    }

    fn with_entry(&mut self, run_id: &str, apply: impl FnOnce(&mut HistoryEntry)) -> bool {
        match self.entries.iter_mut().find(|entry| entry.id == run_id) {
            Some(entry) => {
                apply(entry);
                true
            }
            None => false,
        }
    }
}
