use serde_json::json;

use super::*;
use crate::domain::{ItemStatus, new_id, now_utc};

fn temp_store() -> (tempfile::TempDir, StateStore) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let store = StateStore::open(dir.path().join("state.json")).expect("open store");
    (dir, store)
}

#[test]
fn open_creates_default_document_on_disk() {
    let (dir, store) = temp_store();
    let doc = store.snapshot();
    assert_eq!(doc.version, 1);
    assert!(doc.entries.is_empty());
    assert!(dir.path().join("state.json").exists());
    assert!(!doc.scan_status.active);
}

#[test]
fn mutate_persists_and_reloads_structurally_equal() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("state.json");

    {
        let store = StateStore::open(&path).expect("open store");
        store
            .mutate(|doc| {
                doc.extras
                    .insert("futureTopLevel".to_string(), json!({"keep": 1}));
                doc.config.baseline_args = "-q 22".to_string();
            })
            .expect("mutate");
    }

    let reopened = StateStore::open(&path).expect("reopen store");
    let doc = reopened.snapshot();
    assert_eq!(doc.config.baseline_args, "-q 22");
    assert_eq!(doc.extras.get("futureTopLevel"), Some(&json!({"keep": 1})));
}

#[test]
fn try_mutate_rolls_back_on_mutator_error() {
    let (_dir, store) = temp_store();
    let result = store.try_mutate(|doc| {
        doc.config.baseline_args = "-q 99".to_string();
        Err::<(), &str>("nope")
    });
    assert!(matches!(result, Ok(Err("nope"))));
    assert_ne!(store.snapshot().config.baseline_args, "-q 99");
}

#[test]
fn corrupt_document_is_reported_as_corrupt() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("state.json");
    std::fs::write(&path, "{not json").expect("write garbage");

    match StateStore::open(&path) {
        Err(StoreError::Corrupt { .. }) => {}
        Err(other) => panic!("expected Corrupt, got {other:?}"),
        Ok(_) => panic!("expected Corrupt, got a working store"),
    }
}

#[test]
fn second_store_on_same_path_is_locked_out() {
    let (dir, _store) = temp_store();
    match StateStore::open(dir.path().join("state.json")) {
        Err(StoreError::Io { .. }) => {}
        Err(other) => panic!("expected lock conflict, got {other:?}"),
        Ok(_) => panic!("expected lock conflict, got a working store"),
    }
}

#[test]
fn unknown_item_fields_survive_mutation_round_trip() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("state.json");
    let raw = json!({
        "version": 1,
        "items": [{
            "id": "itm_keep",
            "entryId": "ent_keep",
            "path": "/media/x.mkv",
            "sizeBytes": 5,
            "mtime": 6,
            "sourceFingerprint": "5:6",
            "vendorNote": "hands off",
        }],
    });
    std::fs::write(&path, serde_json::to_vec_pretty(&raw).unwrap()).unwrap();

    let store = StateStore::open(&path).expect("open store");
    store
        .mutate(|doc| {
            let item = doc.find_item_mut("itm_keep").expect("item present");
            item.status = ItemStatus::Queued;
            item.ready = true;
        })
        .expect("mutate");
    drop(store);

    let written: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    let item = &written["items"][0];
    assert_eq!(item["vendorNote"], "hands off");
    assert_eq!(item["status"], "queued");
}

#[test]
fn lookups_find_records_by_id() {
    let (_dir, store) = temp_store();
    let now = now_utc();
    store
        .mutate(|doc| {
            let id = new_id("job");
            doc.jobs.push(crate::domain::Job::claimed(
                id.clone(),
                "itm_1".to_string(),
                "wrk_1".to_string(),
                now,
            ));
            assert!(doc.find_job(&id).is_some());
            assert!(doc.find_job("job_missing").is_none());
        })
        .expect("mutate");
}
