use crate::{FeedbackAction, RunId, RunMetadata};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    PersistRunMetadata(RunMetadata),
    /// Clear stored run metadata if it still references `run_id`.
    ClearRunMetadata { run_id: RunId },
    /// Write the current history through the pruning store.
    PersistHistory,
    /// Check status now, then on the poll interval until terminal.
    StartPolling { run_id: RunId, generation: u64 },
    StopPolling { generation: u64 },
    SendFeedback { run_id: RunId, action: FeedbackAction },
}
