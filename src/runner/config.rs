use std::fs;
use std::path::Path;
use std::time::SystemTime;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use super::tools;
use crate::domain::WorkHoursBlock;

/// Worker configuration file. Unknown fields are preserved across the
/// startup write-back so hand-added keys survive.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerConfig {
    #[serde(default = "default_server_url")]
    pub server_url: String,
    #[serde(default)]
    pub worker_id: String,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,
    #[serde(default)]
    pub handbrake_path: String,
    #[serde(default)]
    pub ffmpeg_path: String,
    #[serde(default)]
    pub work_hours: Vec<WorkHoursBlock>,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_sec: u64,
    #[serde(default = "default_true")]
    pub ui_enabled: bool,
    #[serde(default = "default_ui_host")]
    pub ui_host: String,
    #[serde(default = "default_ui_port")]
    pub ui_port: u16,
    #[serde(flatten)]
    pub extras: Map<String, Value>,
}

fn default_server_url() -> String {
    "http://127.0.0.1:8856".to_string()
}

fn default_cache_dir() -> String {
    "cache".to_string()
}

fn default_poll_interval() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

fn default_ui_host() -> String {
    "0.0.0.0".to_string()
}

fn default_ui_port() -> u16 {
    8857
}

impl Default for WorkerConfig {
    fn default() -> Self {
        serde_json::from_value(Value::Object(Map::new())).expect("defaults always deserialize")
    }
}

impl WorkerConfig {
    /// The advertised worker name is always the worker id.
    pub fn worker_name(&self) -> &str {
        &self.worker_id
    }
}

/// Collapse a hostname to a stable worker id: lowercased, non-alphanumeric
/// runs folded to `-`, `wrk_` prefix.
pub fn worker_id_from_hostname(hostname: &str) -> String {
    let mut safe = String::with_capacity(hostname.len());
    let mut last_dash = true;
    for c in hostname.trim().to_ascii_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            safe.push(c);
            last_dash = false;
        } else if !last_dash {
            safe.push('-');
            last_dash = true;
        }
    }
    let safe = safe.trim_matches('-');
    let safe = if safe.is_empty() { "host" } else { safe };
    format!("wrk_{safe}")
}

fn ensure_worker_identity(config: &mut WorkerConfig) {
    if config.worker_id.is_empty() {
        let host = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_default();
        config.worker_id = worker_id_from_hostname(&host);
    }
}

fn ensure_encoder_path(config: &mut WorkerConfig) {
    if config.handbrake_path.is_empty()
        && let Some(found) = tools::find_handbrake()
    {
        config.handbrake_path = found.to_string_lossy().into_owned();
        info!(path = %config.handbrake_path, "detected HandBrakeCLI");
    }
}

/// Load the config file, merge defaults, synthesize the worker identity, and
/// (optionally) write the merged result back so the on-disk file is complete.
pub fn load_config(path: &Path, write_back: bool) -> Result<WorkerConfig> {
    let mut config = if path.exists() {
        let raw = fs::read(path)
            .with_context(|| format!("failed to read worker config {}", path.display()))?;
        serde_json::from_slice(&raw)
            .with_context(|| format!("failed to parse worker config {}", path.display()))?
    } else {
        WorkerConfig::default()
    };

    ensure_worker_identity(&mut config);
    ensure_encoder_path(&mut config);
    if write_back {
        save_config(path, &config)?;
    }
    Ok(config)
}

pub fn save_config(path: &Path, config: &WorkerConfig) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create config directory {}", parent.display()))?;
    }
    let body = serde_json::to_vec_pretty(config).context("failed to serialize worker config")?;
    fs::write(path, body)
        .with_context(|| format!("failed to write worker config {}", path.display()))
}

pub fn config_mtime(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Hot-reload: returns the fresh config when the file's mtime moved.
/// A reload that fails to parse keeps the previous config.
pub fn reload_config_if_changed(
    path: &Path,
    last_mtime: Option<SystemTime>,
) -> Option<(WorkerConfig, SystemTime)> {
    let current = config_mtime(path)?;
    if last_mtime == Some(current) {
        return None;
    }
    match load_config(path, false) {
        Ok(config) => Some((config, current)),
        Err(err) => {
            tracing::warn!(%err, "worker config reload failed; keeping previous config");
            None
        }
    }
}

/// Human summary for reload logs; `"24/7"` when no windows are configured.
pub fn format_work_hours(work_hours: &[WorkHoursBlock]) -> String {
    if work_hours.is_empty() {
        return "24/7".to_string();
    }
    let pieces: Vec<String> = work_hours
        .iter()
        .map(|b| format!("{}-{}", b.start, b.end))
        .collect();
    pieces.join(", ")
}
