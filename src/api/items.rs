use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use serde_json::json;

use super::{ApiResult, AppState};
use crate::domain::{Item, now_utc};
use crate::scheduler::{self, prune_finished_jobs, reconcile_stale_jobs};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ItemsQuery {
    entry_id: Option<String>,
    sort: Option<String>,
}

pub(super) async fn list_items(
    State(state): State<AppState>,
    Query(query): Query<ItemsQuery>,
) -> ApiResult<Json<Vec<Item>>> {
    // Listings double as the liveness/pruning tick.
    let mut items = state.store.mutate(|doc| {
        let now = now_utc();
        reconcile_stale_jobs(doc, now);
        prune_finished_jobs(doc, now);
        doc.items.clone()
    })?;

    if let Some(entry_id) = &query.entry_id {
        items.retain(|item| &item.entry_id == entry_id);
    }
    match query.sort.as_deref() {
        Some("savingsBytes") => items.sort_by(|a, b| b.ratio.savings_bytes.cmp(&a.ratio.savings_bytes)),
        Some("savingsPct") => items.sort_by(|a, b| {
            b.ratio
                .savings_pct
                .partial_cmp(&a.ratio.savings_pct)
                .unwrap_or(std::cmp::Ordering::Equal)
        }),
        _ => {}
    }

    Ok(Json(items))
}

#[derive(Debug, Deserialize)]
pub(super) struct ReadyRequest {
    ready: bool,
}

pub(super) async fn set_ready(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ReadyRequest>,
) -> ApiResult<Json<Item>> {
    let item = state.op_mutate(|doc| scheduler::set_item_ready(doc, &id, req.ready))?;
    Ok(Json(item))
}

pub(super) async fn reset_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Item>> {
    let item = state.op_mutate(|doc| scheduler::reset_item(doc, &id))?;
    Ok(Json(item))
}

#[derive(Debug, Deserialize)]
pub(super) struct ItemPathUpdate {
    path: String,
}

pub(super) async fn update_item_path(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ItemPathUpdate>,
) -> ApiResult<Json<Item>> {
    let item = state.op_mutate(|doc| scheduler::update_item_path(doc, &id, &req.path))?;
    Ok(Json(item))
}

pub(super) async fn delete_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    state.op_mutate(|doc| scheduler::delete_item(doc, &id))?;
    Ok(Json(json!({"ok": true})))
}
