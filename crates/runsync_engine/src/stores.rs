//! Typed run-metadata and history stores over a [`KeyValueStore`].
//!
//! These stores are a client-side cache, not a system of record: every
//! storage or decode failure is logged and treated as absent or empty.

use runsync_core::{HistoryEntry, ReportLength, RunId, RunMetadata};
use runsync_logging::{sync_debug, sync_warn};
use serde_json::Value;

use crate::backend::parse_timestamp;
use crate::KeyValueStore;

pub const HISTORY_KEY: &str = "research-agent-history";
pub const RUN_METADATA_KEY: &str = "research-agent-last-run";
/// Scalar run id written by older clients.
pub const LEGACY_RUN_ID_KEY: &str = "research-agent-instance-id";

/// Stored metadata, by schema version.
#[derive(Debug, Clone, PartialEq, Eq)]
enum StoredMetadata {
    Current(RunMetadata),
    Legacy(RunId),
}

impl From<StoredMetadata> for RunMetadata {
    fn from(stored: StoredMetadata) -> Self {
        match stored {
            StoredMetadata::Current(metadata) => metadata,
            StoredMetadata::Legacy(run_id) => RunMetadata::legacy(run_id),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunStores<S> {
    store: S,
}

impl<S: KeyValueStore> RunStores<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn save_run_metadata(&self, metadata: &RunMetadata) {
        let raw = match serde_json::to_string(metadata) {
            Ok(raw) => raw,
            Err(err) => {
                sync_warn!("Failed to encode run metadata: {}", err);
                return;
            }
        };
        if let Err(err) = self.store.set(RUN_METADATA_KEY, &raw) {
            sync_warn!("Failed to persist run metadata: {}", err);
        }
    }

    pub fn load_run_metadata(&self) -> Option<RunMetadata> {
        let current = self.read(RUN_METADATA_KEY);
        let legacy = match current {
            Some(_) => None,
            None => self.read(LEGACY_RUN_ID_KEY),
        };
        decode_run_metadata(current.as_deref(), legacy.as_deref()).map(RunMetadata::from)
    }

    /// Removes the metadata and the legacy key. Clearing twice is harmless.
    pub fn clear_run_metadata(&self) {
        for key in [RUN_METADATA_KEY, LEGACY_RUN_ID_KEY] {
            if let Err(err) = self.store.remove(key) {
                sync_warn!("Failed to clear {}: {}", key, err);
            }
        }
    }

    /// Clears the metadata only if it references `run_id`. Returns whether it did.
    pub fn clear_run_metadata_for(&self, run_id: &str) -> bool {
        match self.load_run_metadata() {
            Some(metadata) if metadata.run_id == run_id => {
                self.clear_run_metadata();
                true
            }
            _ => false,
        }
    }

    pub fn load_history(&self) -> Vec<HistoryEntry> {
        let Some(raw) = self.read(HISTORY_KEY) else {
            return Vec::new();
        };
        let items = match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Array(items)) => items,
            Ok(_) => {
                sync_warn!("Stored history is not a list; ignoring it");
                return Vec::new();
            }
            Err(err) => {
                sync_warn!("Failed to parse stored history: {}", err);
                return Vec::new();
            }
        };

        items
            .into_iter()
            .filter_map(|item| match serde_json::from_value::<HistoryEntry>(item) {
                Ok(entry) => Some(entry),
                Err(err) => {
                    sync_warn!("Skipping malformed history entry: {}", err);
                    None
                }
            })
            .collect()
    }

    /// Persists `entries` with each update log pruned to its latest record.
    pub fn save_history(&self, entries: &[HistoryEntry]) {
        let pruned = prune_history(entries);
        let raw = match serde_json::to_string(&pruned) {
            Ok(raw) => raw,
            Err(err) => {
                sync_warn!("Failed to encode history: {}", err);
                return;
            }
        };
        match self.store.set(HISTORY_KEY, &raw) {
            Ok(()) => sync_debug!("Persisted {} history entries", pruned.len()),
            Err(err) => sync_warn!("Failed to persist history: {}", err),
        }
    }

    fn read(&self, key: &str) -> Option<String> {
        match self.store.get(key) {
            Ok(value) => value,
            Err(err) => {
                sync_warn!("Failed to read {}: {}", key, err);
                None
            }
        }
    }
}

/// Keeps only the most recent update of every entry.
pub fn prune_history(entries: &[HistoryEntry]) -> Vec<HistoryEntry> {
    entries
        .iter()
        .map(|entry| HistoryEntry {
            updates: entry.updates.last().cloned().into_iter().collect(),
            ..entry.clone()
        })
        .collect()
}

/// Current schema first, then the legacy scalar key, else absent.
///
/// A present but unreadable current record counts as absent; it does not
/// fall through to the legacy key.
fn decode_run_metadata(current: Option<&str>, legacy: Option<&str>) -> Option<StoredMetadata> {
    if let Some(raw) = current {
        return decode_current(raw).map(StoredMetadata::Current);
    }
    let run_id = legacy?.trim();
    if run_id.is_empty() {
        return None;
    }
    Some(StoredMetadata::Legacy(run_id.to_string()))
}

fn decode_current(raw: &str) -> Option<RunMetadata> {
    let value: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(err) => {
            sync_warn!("Failed to parse stored run metadata: {}", err);
            return None;
        }
    };
    let run_id = value
        .get("runId")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())?;

    // Individually malformed optional fields are dropped, not fatal.
    Some(RunMetadata {
        run_id: run_id.to_string(),
        query: value.get("query").and_then(Value::as_str).map(str::to_string),
        report_length: value
            .get("reportLength")
            .and_then(Value::as_str)
            .and_then(|raw| raw.parse::<ReportLength>().ok()),
        created_at: value
            .get("createdAt")
            .and_then(Value::as_str)
            .and_then(parse_timestamp),
    })
}
