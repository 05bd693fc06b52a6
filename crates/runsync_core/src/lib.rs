//! Runsync core: pure run-tracking state machine and view-model helpers.
mod effect;
mod history;
mod model;
mod msg;
mod reducer;
mod state;
mod update;
mod view_model;

pub use effect::Effect;
pub use history::RunHistory;
pub use model::{
    FeedbackAction, HistoryEntry, ParseEnumError, PollingState, ReportLength, RunId, RunMetadata,
    RunStatus, Timestamp, UpdateRecord, RESTORED_RUN_QUERY,
};
pub use msg::Msg;
pub use reducer::{
    failure, reduce, HistoryDelta, PollingDelta, Reduction, StatusResponse, CANCELLED_MESSAGE,
    STATUS_COMPLETE, STATUS_IN_PROGRESS,
};
pub use state::{AppState, RunHandle};
pub use update::update;
pub use view_model::{progress_percent, AppViewModel, HistoryRowView};
