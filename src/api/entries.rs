use axum::{
    Json,
    extract::{Path, State},
};
use serde::Deserialize;
use serde_json::json;

use super::{ApiError, ApiResult, AppState};
use crate::domain::{Entry, now_utc};
use crate::scan::{self, ScanSummary};
use crate::scheduler::{self, EntryPatch};

pub(super) async fn list_entries(State(state): State<AppState>) -> Json<Vec<Entry>> {
    Json(state.store.read(|doc| doc.entries.clone()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct EntryRequest {
    path: String,
    name: Option<String>,
    #[serde(default)]
    args: Option<String>,
}

pub(super) async fn add_entry(
    State(state): State<AppState>,
    Json(req): Json<EntryRequest>,
) -> ApiResult<Json<Entry>> {
    let path = std::path::absolute(&req.path)
        .map_err(|err| ApiError::bad_request(format!("invalid entry path: {err}")))?
        .to_string_lossy()
        .into_owned();

    let entry = state.op_mutate(|doc| {
        scheduler::add_entry(doc, path, req.name, req.args.unwrap_or_default(), now_utc())
    })?;
    Ok(Json(entry))
}

pub(super) async fn update_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<EntryPatch>,
) -> ApiResult<Json<Entry>> {
    let entry = state.op_mutate(|doc| scheduler::update_entry(doc, &id, patch, now_utc()))?;
    Ok(Json(entry))
}

pub(super) async fn delete_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    state.op_mutate(|doc| scheduler::delete_entry(doc, &id))?;
    Ok(Json(json!({"ok": true})))
}

/// Synchronous scan: the response carries the final summary. Directory
/// walking and probing are blocking work, so the pipeline runs on the
/// blocking pool while progress is published through `scanStatus`.
pub(super) async fn scan_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ScanSummary>> {
    let store = state.store.clone();
    let summary = tokio::task::spawn_blocking(move || scan::scan_entry(&store, &id))
        .await
        .map_err(|err| ApiError::internal(format!("scan task panicked: {err}")))??;
    Ok(Json(summary))
}
