use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;

use super::*;
use crate::domain::now_utc;
use crate::scheduler::add_entry as scheduler_add_entry;

fn test_state() -> (tempfile::TempDir, AppState) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = StateStore::open(dir.path().join("state.json")).expect("open store");
    (dir, AppState::new(store))
}

fn seed_ready_item(state: &AppState) -> String {
    state
        .op_mutate(|doc| {
            let entry = scheduler_add_entry(
                doc,
                "/media/a".to_string(),
                Some("a".to_string()),
                String::new(),
                now_utc(),
            )?;
            let mut item = crate::domain::Item::discovered(
                crate::domain::new_id("itm"),
                entry.id,
                "/media/a/x.mkv".to_string(),
                1_000_000_000,
                1_700_000_000,
                "1000000000:1700000000".to_string(),
            );
            item.ready = true;
            item.status = crate::domain::ItemStatus::Queued;
            let id = item.id.clone();
            doc.items.push(item);
            Ok(id)
        })
        .expect("seed item")
}

#[tokio::test]
async fn claim_returns_204_when_no_work() {
    let (_dir, state) = test_state();
    let req = serde_json::from_value(json!({"workerId": "wrk_t"})).unwrap();
    let resp = super::jobs::claim_job(State(state), Json(req)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn claim_returns_grant_when_item_queued() {
    let (_dir, state) = test_state();
    seed_ready_item(&state);

    let req = serde_json::from_value(json!({"workerId": "wrk_t", "workerName": "t"})).unwrap();
    let resp = super::jobs::claim_job(State(state.clone()), Json(req))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    // A second claim finds the item processing.
    let req = serde_json::from_value(json!({"workerId": "wrk_t"})).unwrap();
    let resp = super::jobs::claim_job(State(state), Json(req)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn ready_on_processing_item_is_conflict() {
    let (_dir, state) = test_state();
    let item_id = seed_ready_item(&state);
    let req = serde_json::from_value(json!({"workerId": "wrk_t"})).unwrap();
    super::jobs::claim_job(State(state.clone()), Json(req))
        .await
        .unwrap();

    let ready_req = serde_json::from_value(json!({"ready": true})).unwrap();
    let err = super::items::set_ready(State(state), Path(item_id), Json(ready_req))
        .await
        .unwrap_err();
    assert_eq!(err.status, StatusCode::CONFLICT);
    assert_eq!(err.message, "Item is processing");
}

#[tokio::test]
async fn progress_for_unknown_job_is_dropped_with_204() {
    let (_dir, state) = test_state();
    let req = serde_json::from_value(json!({"pct": 10.0})).unwrap();
    let resp = super::jobs::job_progress(State(state), Path("job_ghost".to_string()), Json(req))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn delete_active_job_reports_cancel_requested() {
    let (_dir, state) = test_state();
    seed_ready_item(&state);
    let grant = state
        .store
        .mutate(|doc| crate::scheduler::claim_next_job(doc, Some("wrk_t"), None, now_utc()))
        .unwrap()
        .unwrap();

    let Json(body) = super::jobs::delete_job(State(state.clone()), Path(grant.job.id.clone()))
        .await
        .unwrap();
    assert_eq!(body, json!({"ok": false, "cancelRequested": true}));

    // The worker sees the flag on its next poll.
    let Json(job) = super::jobs::get_job(State(state), Path(grant.job.id))
        .await
        .unwrap();
    assert!(job.cancel_requested);
}

#[tokio::test]
async fn config_update_rejects_reserved_tokens() {
    let (_dir, state) = test_state();
    let req = serde_json::from_value(json!({"baselineArgs": "-q 20 -o /tmp/x"})).unwrap();
    let err = super::config::set_config(State(state), Json(req))
        .await
        .unwrap_err();
    assert_eq!(err.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_entry_operations_are_404() {
    let (_dir, state) = test_state();
    let err = super::entries::delete_entry(State(state.clone()), Path("ent_ghost".to_string()))
        .await
        .unwrap_err();
    assert_eq!(err.status, StatusCode::NOT_FOUND);
    assert_eq!(err.message, "Entry not found");

    let err = super::entries::scan_entry(State(state), Path("ent_ghost".to_string()))
        .await
        .unwrap_err();
    assert_eq!(err.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn items_listing_filters_and_sorts() {
    let (_dir, state) = test_state();
    state
        .store
        .mutate(|doc| {
            for (idx, savings) in [(1, 10), (2, 30), (3, 20)] {
                let mut item = crate::domain::Item::discovered(
                    format!("itm_{idx}"),
                    "ent_a".to_string(),
                    format!("/media/a/{idx}.mkv"),
                    100,
                    100,
                    "100:100".to_string(),
                );
                item.ratio.savings_bytes = savings;
                doc.items.push(item);
            }
        })
        .unwrap();

    let query: super::items::ItemsQuery =
        serde_json::from_value(json!({"sort": "savingsBytes"})).unwrap();
    let Json(items) = super::items::list_items(State(state.clone()), Query(query))
        .await
        .unwrap();
    let order: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(order, vec!["itm_2", "itm_3", "itm_1"]);

    let query: super::items::ItemsQuery =
        serde_json::from_value(json!({"entryId": "ent_other"})).unwrap();
    let Json(items) = super::items::list_items(State(state), Query(query))
        .await
        .unwrap();
    assert!(items.is_empty());
}

#[tokio::test]
async fn target_sample_updates_config_map() {
    let (_dir, state) = test_state();
    let req = serde_json::from_value(json!({"height": 720, "mbPerMin": 12.0})).unwrap();
    let Json(summary) = super::config::add_target_sample(State(state.clone()), Json(req))
        .await
        .unwrap();
    assert_eq!(summary.count, 1);

    let targets = state
        .store
        .read(|doc| doc.config.target_mb_per_min_by_height.clone());
    assert_eq!(targets.get("720").copied(), Some(12.0));
}
