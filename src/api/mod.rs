//! Coordinator HTTP surface. All JSON request/response; every mutation flows
//! through the store's exclusive lock.

use axum::{
    Json, Router,
    extract::State,
    routing::{delete, get, patch, post},
};
use serde_json::json;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::catalog::discover_ffprobe;
use crate::scheduler::OpError;
use crate::store::{StateDocument, StateStore};

mod error;
pub use error::{ApiError, ApiResult};

mod config;
mod entries;
mod items;
mod jobs;
mod workers;

#[cfg(test)]
mod tests;

#[derive(Clone)]
pub struct AppState {
    pub store: StateStore,
}

impl AppState {
    pub fn new(store: StateStore) -> Self {
        Self { store }
    }

    /// Run a fallible scheduler operation under the store lock, flattening
    /// store and operation failures into one handler error.
    fn op_mutate<R>(
        &self,
        f: impl FnOnce(&mut StateDocument) -> Result<R, OpError>,
    ) -> ApiResult<R> {
        match self.store.try_mutate(f) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(op)) => Err(op.into()),
            Err(store) => Err(store.into()),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/config", get(config::get_config).post(config::set_config))
        .route("/diagnostics", get(diagnostics))
        .route("/scan-status", get(scan_status))
        .route("/targets", post(config::add_target_sample))
        .route("/targets/clear", post(config::clear_target_samples))
        .route(
            "/entries",
            get(entries::list_entries).post(entries::add_entry),
        )
        .route(
            "/entries/{id}",
            patch(entries::update_entry).delete(entries::delete_entry),
        )
        .route("/entries/{id}/scan", post(entries::scan_entry))
        .route("/items", get(items::list_items))
        .route("/items/{id}", delete(items::delete_item))
        .route("/items/{id}/ready", post(items::set_ready))
        .route("/items/{id}/reset", post(items::reset_item))
        .route("/items/{id}/path", post(items::update_item_path))
        .route("/jobs", get(jobs::list_jobs))
        .route("/jobs/claim", post(jobs::claim_job))
        .route("/jobs/cancel-all", post(jobs::cancel_all_jobs))
        .route("/jobs/{id}", get(jobs::get_job).delete(jobs::delete_job))
        .route("/jobs/{id}/start", post(jobs::start_job))
        .route("/jobs/{id}/progress", post(jobs::job_progress))
        .route("/jobs/{id}/complete", post(jobs::job_complete))
        .route("/jobs/{id}/fail", post(jobs::job_fail))
        .route(
            "/workers",
            get(workers::list_workers),
        )
        .route("/workers/heartbeat", post(workers::worker_heartbeat))
        .route("/workers/{id}", delete(workers::delete_worker))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({"ok": true}))
}

async fn diagnostics(State(state): State<AppState>) -> Json<serde_json::Value> {
    let explicit = state.store.read(|doc| doc.config.ffprobe_path.clone());
    let ffprobe = discover_ffprobe(&explicit);
    Json(json!({
        "ffprobe": {
            "found": ffprobe.is_some(),
            "path": ffprobe.map(|p| p.to_string_lossy().into_owned()).unwrap_or_default(),
        }
    }))
}

async fn scan_status(State(state): State<AppState>) -> Json<crate::domain::ScanStatus> {
    Json(state.store.read(|doc| doc.scan_status.clone()))
}
