use std::fs;

use super::*;
use crate::domain::now_utc;
use crate::store::StateStore;

fn store_with_entry(media_root: &Path) -> (StateStore, String, tempfile::TempDir) {
    let state_dir = tempfile::tempdir().expect("state dir");
    let store = StateStore::open(state_dir.path().join("state.json")).expect("open store");
    let entry_id = store
        .try_mutate(|doc| {
            crate::scheduler::add_entry(
                doc,
                media_root.to_string_lossy().into_owned(),
                Some("library".to_string()),
                String::new(),
                now_utc(),
            )
            .map(|e| e.id)
        })
        .expect("mutate")
        .expect("add entry");
    (store, entry_id, state_dir)
}

#[test]
fn scan_discovers_media_files_and_fingerprints_them() {
    let media = tempfile::tempdir().expect("media dir");
    fs::write(media.path().join("x.mkv"), vec![0u8; 1234]).unwrap();
    fs::write(media.path().join("skip.txt"), b"no").unwrap();
    let (store, entry_id, _state_dir) = store_with_entry(media.path());

    let summary = scan_entry(&store, &entry_id).expect("scan");
    assert_eq!(summary.found, 1);
    assert_eq!(summary.entry_id, entry_id);

    let doc = store.snapshot();
    assert_eq!(doc.items.len(), 1);
    let item = &doc.items[0];
    assert_eq!(item.size_bytes, 1234);
    assert_eq!(item.source_fingerprint, fingerprint(item.size_bytes, item.mtime));
    assert!(item.scan_at.is_some(), "a never-probed file is always scanned");
    assert!(!item.ready);

    // Entry and scan status were closed out.
    let entry = doc.find_entry(&entry_id).unwrap();
    assert!(entry.last_scan_at.is_some());
    assert!(!doc.scan_status.active);
    assert_eq!(doc.scan_status.total, 1);
    assert_eq!(doc.scan_status.done, 1);
    assert!(doc.scan_status.finished_at.is_some());
}

#[test]
fn rescan_with_unchanged_fingerprint_keeps_scan_at() {
    let media = tempfile::tempdir().expect("media dir");
    fs::write(media.path().join("x.mkv"), vec![0u8; 100]).unwrap();
    let (store, entry_id, _state_dir) = store_with_entry(media.path());

    scan_entry(&store, &entry_id).expect("first scan");
    let first_scan_at = store.snapshot().items[0].scan_at;

    scan_entry(&store, &entry_id).expect("second scan");
    let doc = store.snapshot();
    assert_eq!(doc.items.len(), 1, "rescan must not duplicate items");
    assert_eq!(doc.items[0].scan_at, first_scan_at);
}

#[test]
fn rescan_after_external_edit_updates_fingerprint_and_preserves_ready() {
    let media = tempfile::tempdir().expect("media dir");
    let file = media.path().join("x.mkv");
    fs::write(&file, vec![0u8; 100]).unwrap();
    let (store, entry_id, _state_dir) = store_with_entry(media.path());

    scan_entry(&store, &entry_id).expect("first scan");
    let item_id = store.snapshot().items[0].id.clone();
    store
        .try_mutate(|doc| crate::scheduler::set_item_ready(doc, &item_id, true))
        .unwrap()
        .unwrap();

    // Replace the file on disk with different content size.
    fs::write(&file, vec![0u8; 999]).unwrap();
    scan_entry(&store, &entry_id).expect("rescan");

    let doc = store.snapshot();
    let item = doc.find_item(&item_id).unwrap();
    assert_eq!(item.size_bytes, 999);
    assert_eq!(item.source_fingerprint, fingerprint(999, item.mtime));
    assert!(item.ready, "rescan must not clear readiness");
}

#[test]
fn scan_unknown_entry_is_not_found() {
    let state_dir = tempfile::tempdir().expect("state dir");
    let store = StateStore::open(state_dir.path().join("state.json")).expect("open store");
    match scan_entry(&store, "ent_ghost") {
        Err(ScanError::Op(OpError::NotFound(kind))) => assert_eq!(kind, "Entry"),
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[test]
fn scan_of_empty_root_finishes_cleanly() {
    let media = tempfile::tempdir().expect("media dir");
    let (store, entry_id, _state_dir) = store_with_entry(media.path());

    let summary = scan_entry(&store, &entry_id).expect("scan");
    assert_eq!(summary.found, 0);
    let doc = store.snapshot();
    assert!(doc.items.is_empty());
    assert!(!doc.scan_status.active);
}
