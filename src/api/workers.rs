use axum::{
    Json,
    extract::{Path, State},
};
use serde_json::json;

use super::{ApiResult, AppState};
use crate::domain::{WorkerRecord, now_utc};
use crate::scheduler::{self, HeartbeatUpdate};

pub(super) async fn list_workers(State(state): State<AppState>) -> Json<Vec<WorkerRecord>> {
    Json(state.store.read(|doc| doc.workers.clone()))
}

pub(super) async fn worker_heartbeat(
    State(state): State<AppState>,
    Json(update): Json<HeartbeatUpdate>,
) -> ApiResult<Json<WorkerRecord>> {
    let worker = state
        .store
        .mutate(|doc| scheduler::heartbeat(doc, update, now_utc()))?;
    Ok(Json(worker))
}

pub(super) async fn delete_worker(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    state.op_mutate(|doc| scheduler::delete_worker(doc, &id))?;
    Ok(Json(json!({"ok": true})))
}
