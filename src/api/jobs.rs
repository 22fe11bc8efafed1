use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{ApiError, ApiResult, AppState};
use crate::catalog::{file_identity, probe_media};
use crate::domain::{ItemStatus, Job, now_utc};
use crate::scheduler::{
    self, DeleteJobOutcome, PostTranscodeObservation, prune_finished_jobs, reconcile_stale_jobs,
};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ClaimRequest {
    worker_id: Option<String>,
    worker_name: Option<String>,
}

pub(super) async fn claim_job(
    State(state): State<AppState>,
    Json(req): Json<ClaimRequest>,
) -> ApiResult<Response> {
    let grant = state.store.mutate(|doc| {
        scheduler::claim_next_job(
            doc,
            req.worker_id.as_deref(),
            req.worker_name.as_deref(),
            now_utc(),
        )
    })?;

    Ok(match grant {
        Some(grant) => Json(grant).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    })
}

/// Job listing entry enriched with item and worker context for display.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct JobListEntry {
    #[serde(flatten)]
    job: Job,
    #[serde(skip_serializing_if = "Option::is_none")]
    item_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    item_status: Option<ItemStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    worker_name: Option<String>,
}

pub(super) async fn list_jobs(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<JobListEntry>>> {
    let doc = state.store.mutate(|doc| {
        let now = now_utc();
        reconcile_stale_jobs(doc, now);
        prune_finished_jobs(doc, now);
        doc.clone()
    })?;

    let enriched = doc
        .jobs
        .iter()
        .map(|job| {
            let item = doc.find_item(&job.item_id);
            let worker = doc.workers.iter().find(|w| w.id == job.worker_id);
            JobListEntry {
                job: job.clone(),
                item_path: item.map(|i| i.path.clone()),
                item_status: item.map(|i| i.status),
                worker_name: worker.map(|w| w.name.clone()),
            }
        })
        .collect();
    Ok(Json(enriched))
}

pub(super) async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Job>> {
    state
        .store
        .read(|doc| doc.find_job(&id).cloned())
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Job not found"))
}

pub(super) async fn start_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Job>> {
    let job = state.op_mutate(|doc| scheduler::start_job(doc, &id, now_utc()))?;
    Ok(Json(job))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct JobProgressRequest {
    pct: Option<f64>,
    eta_sec: Option<i64>,
    log_tail: Option<String>,
}

/// Progress for an unknown job is dropped with 204 so late reports from a
/// pruned or deleted job never error the worker.
pub(super) async fn job_progress(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<JobProgressRequest>,
) -> ApiResult<Response> {
    let job = state.store.mutate(|doc| {
        scheduler::record_progress(
            doc,
            &id,
            req.pct,
            req.eta_sec,
            req.log_tail.as_deref(),
            now_utc(),
        )
    })?;

    Ok(match job {
        Some(job) => Json(job).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct JobUpdateRequest {
    error: Option<String>,
    output_size_bytes: Option<u64>,
}

pub(super) async fn job_complete(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<JobUpdateRequest>,
) -> ApiResult<Json<Job>> {
    let (job, item) =
        state.op_mutate(|doc| scheduler::complete_job(doc, &id, req.output_size_bytes, now_utc()))?;

    // Restat and re-probe the installed file outside the lock, then land the
    // observed facts in a second mutation.
    let ffprobe = state.store.read(|doc| doc.config.ffprobe_path.clone());
    let item_path = item.path.clone();
    let observed = tokio::task::spawn_blocking(move || {
        let path = std::path::Path::new(&item_path);
        PostTranscodeObservation {
            identity: file_identity(path).ok(),
            metadata: probe_media(path, &ffprobe),
        }
    })
    .await
    .map_err(|err| ApiError::internal(format!("post-transcode probe panicked: {err}")))?;

    state.store.mutate(|doc| {
        scheduler::apply_post_transcode_refresh(doc, &item.id, &observed, now_utc());
    })?;

    Ok(Json(job))
}

pub(super) async fn job_fail(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<JobUpdateRequest>,
) -> ApiResult<Json<Job>> {
    let job = state
        .op_mutate(|doc| scheduler::fail_job(doc, &id, req.error.as_deref().unwrap_or(""), now_utc()))?;
    Ok(Json(job))
}

pub(super) async fn cancel_all_jobs(
    State(state): State<AppState>,
) -> ApiResult<Json<serde_json::Value>> {
    let flagged = state
        .store
        .mutate(|doc| scheduler::cancel_all_jobs(doc, now_utc()))?;
    Ok(Json(json!({"ok": true, "cancelRequested": flagged})))
}

pub(super) async fn delete_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let outcome = state.op_mutate(|doc| scheduler::delete_job(doc, &id, now_utc()))?;
    Ok(Json(match outcome {
        DeleteJobOutcome::CancelRequested => json!({"ok": false, "cancelRequested": true}),
        DeleteJobOutcome::Deleted => json!({"ok": true}),
    }))
}
