use std::fs;
use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use pretty_assertions::assert_eq;
use runsync_core::{HistoryEntry, ReportLength, RunMetadata, RunStatus, Timestamp, UpdateRecord};
use runsync_engine::{
    FileKeyValueStore, KeyValueStore, MemoryKeyValueStore, RunStores, HISTORY_KEY,
    LEGACY_RUN_ID_KEY, RUN_METADATA_KEY,
};
use serde_json::json;
use tempfile::TempDir;

fn at(minute: i64) -> Timestamp {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + Duration::minutes(minute)
}

fn entry_with_updates(id: &str, count: usize) -> HistoryEntry {
    let mut entry = HistoryEntry::new(id, format!("query {id}"), at(0));
    for step in 0..count {
        entry.updates.push(UpdateRecord {
            timestamp: at(step as i64),
            message: format!("step {step}"),
            progress: step as f64 / 4.0,
        });
    }
    entry
}

fn file_stores(temp: &TempDir) -> RunStores<FileKeyValueStore> {
    RunStores::new(FileKeyValueStore::new(temp.path().join("store")))
}

#[test]
fn saved_history_is_pruned_to_latest_update() {
    let temp = TempDir::new().unwrap();
    let stores = file_stores(&temp);
    let session: Vec<HistoryEntry> = (0..10)
        .map(|i| entry_with_updates(&format!("r{i}"), i % 4))
        .collect();

    stores.save_history(&session);
    let reloaded = stores.load_history();

    assert_eq!(reloaded.len(), 10);
    for (before, after) in session.iter().zip(&reloaded) {
        assert_eq!(after.id, before.id);
        assert!(after.updates.len() <= 1);
        assert_eq!(after.updates.last(), before.updates.last());
    }
    // The in-memory session view is untouched by pruning.
    assert_eq!(session[3].updates.len(), 3);
}

#[test]
fn completed_entries_keep_output_and_final_record() {
    let stores = RunStores::new(MemoryKeyValueStore::new());
    let mut done = entry_with_updates("r1", 3);
    done.status = RunStatus::Completed;
    done.updates.push(UpdateRecord {
        timestamp: at(5),
        message: "Completed".to_string(),
        progress: 1.0,
    });
    done.output = Some(json!({"report": "# Title"}));

    stores.save_history(&[done.clone()]);
    let reloaded = stores.load_history();

    assert_eq!(reloaded[0].status, RunStatus::Completed);
    assert_eq!(reloaded[0].output, done.output);
    assert_eq!(reloaded[0].updates.len(), 1);
    assert_eq!(reloaded[0].updates[0].progress, 1.0);
}

#[test]
fn history_wire_format_uses_camel_case() {
    let store = Arc::new(MemoryKeyValueStore::new());
    let stores = RunStores::new(store.clone());

    stores.save_history(&[entry_with_updates("r1", 1)]);

    let raw = store.get(HISTORY_KEY).unwrap().unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(value[0]["id"], "r1");
    assert_eq!(value[0]["status"], "Running");
    assert!(value[0]["createdAt"].is_string());
    assert_eq!(value[0]["updates"][0]["message"], "step 0");
}

#[test]
fn corrupted_history_loads_as_empty() {
    let store = Arc::new(MemoryKeyValueStore::new());
    let stores = RunStores::new(store.clone());

    store.set(HISTORY_KEY, "{broken").unwrap();
    assert!(stores.load_history().is_empty());

    store.set(HISTORY_KEY, r#"{"id": "r1"}"#).unwrap();
    assert!(stores.load_history().is_empty());
}

#[test]
fn malformed_history_entries_are_skipped() {
    let store = Arc::new(MemoryKeyValueStore::new());
    let stores = RunStores::new(store.clone());
    let good = serde_json::to_value(entry_with_updates("good", 1)).unwrap();

    store
        .set(HISTORY_KEY, &json!([{"id": 5}, good]).to_string())
        .unwrap();

    let loaded = stores.load_history();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].id, "good");
}

#[test]
fn run_metadata_round_trips_and_clears_idempotently() {
    let temp = TempDir::new().unwrap();
    let stores = file_stores(&temp);
    let metadata = RunMetadata::new("r1", "Q", ReportLength::Long, at(0));

    stores.save_run_metadata(&metadata);
    assert_eq!(stores.load_run_metadata(), Some(metadata));

    stores.clear_run_metadata();
    stores.clear_run_metadata();
    assert_eq!(stores.load_run_metadata(), None);
}

#[test]
fn legacy_run_id_is_resumable_until_cleared() {
    let store = Arc::new(MemoryKeyValueStore::new());
    let stores = RunStores::new(store.clone());
    store.set(LEGACY_RUN_ID_KEY, "legacy-run").unwrap();

    assert_eq!(
        stores.load_run_metadata(),
        Some(RunMetadata::legacy("legacy-run"))
    );

    stores.clear_run_metadata();
    assert_eq!(stores.load_run_metadata(), None);
    assert_eq!(store.get(LEGACY_RUN_ID_KEY).unwrap(), None);
}

#[test]
fn clearing_for_another_run_keeps_metadata() {
    let stores = RunStores::new(MemoryKeyValueStore::new());
    stores.save_run_metadata(&RunMetadata::new("r2", "Q", ReportLength::Short, at(0)));

    assert!(!stores.clear_run_metadata_for("r1"));
    assert!(stores.load_run_metadata().is_some());
    assert!(stores.clear_run_metadata_for("r2"));
    assert!(stores.load_run_metadata().is_none());
}

#[test]
fn corrupted_metadata_is_absent() {
    let store = Arc::new(MemoryKeyValueStore::new());
    let stores = RunStores::new(store.clone());
    store.set(RUN_METADATA_KEY, "not json").unwrap();

    assert_eq!(stores.load_run_metadata(), None);
}

#[test]
fn unavailable_storage_fails_soft() {
    let temp = TempDir::new().unwrap();
    let blocker = temp.path().join("not_a_dir");
    fs::write(&blocker, "x").unwrap();
    let stores = RunStores::new(FileKeyValueStore::new(&blocker));

    stores.save_history(&[entry_with_updates("r1", 2)]);
    stores.save_run_metadata(&RunMetadata::legacy("r1"));
    stores.clear_run_metadata();

    assert!(stores.load_history().is_empty());
    assert_eq!(stores.load_run_metadata(), None);
}
