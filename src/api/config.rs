use std::collections::BTreeMap;

use axum::{Json, extract::State};
use serde::Deserialize;
use serde_json::json;

use super::{ApiError, ApiResult, AppState};
use crate::catalog::{self, TargetSampleSummary};
use crate::domain::{ServerConfig, find_reserved_arg_token};

pub(super) async fn get_config(State(state): State<AppState>) -> Json<ServerConfig> {
    Json(state.store.read(|doc| doc.config.clone()))
}

/// Partial config update; only provided fields are overwritten.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ConfigRequest {
    baseline_args: Option<String>,
    target_mb_per_min_by_height: Option<BTreeMap<String, f64>>,
    ffprobe_path: Option<String>,
    target_samples_by_height: Option<BTreeMap<String, Vec<f64>>>,
}

pub(super) async fn set_config(
    State(state): State<AppState>,
    Json(req): Json<ConfigRequest>,
) -> ApiResult<Json<ServerConfig>> {
    if let Some(args) = &req.baseline_args
        && let Some(token) = find_reserved_arg_token(args)
    {
        return Err(ApiError::bad_request(format!(
            "encoder args must not contain {token}"
        )));
    }

    let config = state.store.mutate(|doc| {
        let config = &mut doc.config;
        if let Some(baseline_args) = req.baseline_args {
            config.baseline_args = baseline_args;
        }
        if let Some(targets) = req.target_mb_per_min_by_height {
            config.target_mb_per_min_by_height = targets;
        }
        if let Some(ffprobe_path) = req.ffprobe_path {
            config.ffprobe_path = ffprobe_path;
        }
        if let Some(samples) = req.target_samples_by_height {
            config.target_samples_by_height = samples;
        }
        config.clone()
    })?;
    Ok(Json(config))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct TargetSampleRequest {
    height: u32,
    mb_per_min: f64,
}

pub(super) async fn add_target_sample(
    State(state): State<AppState>,
    Json(req): Json<TargetSampleRequest>,
) -> ApiResult<Json<TargetSampleSummary>> {
    if !req.mb_per_min.is_finite() || req.mb_per_min <= 0.0 {
        return Err(ApiError::bad_request("mbPerMin must be a positive number"));
    }
    let summary = state
        .store
        .mutate(|doc| catalog::record_target_sample(&mut doc.config, req.height, req.mb_per_min))?;
    Ok(Json(summary))
}

pub(super) async fn clear_target_samples(
    State(state): State<AppState>,
) -> ApiResult<Json<serde_json::Value>> {
    state
        .store
        .mutate(|doc| catalog::clear_target_samples(&mut doc.config))?;
    Ok(Json(json!({"ok": true})))
}
