//! Runsync engine: backend IO, durable stores and the polling scheduler.
mod backend;
mod engine;
mod persist;
mod poller;
mod stores;
mod types;

pub use backend::{BackendSettings, ReqwestBackend, RunBackend};
pub use engine::EngineHandle;
pub use persist::{
    ensure_store_dir, AtomicFileWriter, FileKeyValueStore, KeyValueStore, MemoryKeyValueStore,
    PersistError,
};
pub use poller::{poll_run, PollSchedule, DEFAULT_POLL_INTERVAL};
pub use stores::{prune_history, RunStores, HISTORY_KEY, LEGACY_RUN_ID_KEY, RUN_METADATA_KEY};
pub use types::{
    BackendError, EngineEvent, FailureKind, StartRunRequest, StartedRun, StatusReply,
};
