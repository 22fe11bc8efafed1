//! Worker runtime: a long-lived poll loop with a single encode slot.
//!
//! Long-running subsystems: the main poll loop, a ~10s background heartbeat
//! timer (so liveness never depends on claim frequency), the optional
//! read-only status UI, and — while an encoder runs — a line pump feeding
//! the supervision loop.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

mod client;
mod config;
mod copy;
mod encoder;
mod executor;
mod progress;
mod status;
mod tools;
mod ui;
mod work_hours;

#[cfg(test)]
mod tests;

pub use client::{CancelProbe, CoordinatorClient};
pub use config::{
    WorkerConfig, config_mtime, format_work_hours, load_config, reload_config_if_changed,
    save_config, worker_id_from_hostname,
};
pub use status::{StatusFile, StatusRecord};
pub use work_hours::{within_work_hours, within_work_hours_at};

use crate::sync_ext::MutexExt;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

/// CLI-level options applied over the worker config file.
#[derive(Debug, Clone, Default)]
pub struct RunnerOptions {
    pub config_path: PathBuf,
    pub server_url: Option<String>,
    pub once: bool,
    pub force_ui: Option<bool>,
    pub ui_host: Option<String>,
    pub ui_port: Option<u16>,
}

struct HeartbeatState {
    client: CoordinatorClient,
    worker_id: String,
    worker_name: String,
    work_hours: Vec<crate::domain::WorkHoursBlock>,
}

fn apply_overrides(config: &mut WorkerConfig, options: &RunnerOptions) {
    if let Some(url) = &options.server_url {
        config.server_url = url.clone();
    }
    if let Some(host) = &options.ui_host {
        config.ui_host = host.clone();
    }
    if let Some(port) = options.ui_port {
        config.ui_port = port;
    }
}

fn spawn_heartbeat_thread(shared: Arc<Mutex<HeartbeatState>>) {
    std::thread::Builder::new()
        .name("worker-heartbeat".to_string())
        .spawn(move || {
            loop {
                // Snapshot under the lock, send outside it: a slow request
                // must not block config reloads in the main loop.
                let (client, worker_id, worker_name, work_hours) = {
                    let state = shared.lock_unpoisoned();
                    (
                        state.client.clone(),
                        state.worker_id.clone(),
                        state.worker_name.clone(),
                        state.work_hours.clone(),
                    )
                };
                let within = within_work_hours(&work_hours);
                client.heartbeat(&worker_id, &worker_name, &work_hours, within);
                std::thread::sleep(HEARTBEAT_INTERVAL);
            }
        })
        .map(|_| ())
        .unwrap_or_else(|err| warn!(%err, "failed to spawn heartbeat thread"));
}

/// Run the worker until interrupted (or, under `--once`, until one idle poll
/// or one failure).
pub fn run(options: RunnerOptions) -> Result<()> {
    let mut config = load_config(&options.config_path, true)?;
    apply_overrides(&mut config, &options);
    let mut last_mtime = config_mtime(&options.config_path);

    let status_path = options
        .config_path
        .parent()
        .map(|dir| dir.join("status.json"))
        .unwrap_or_else(|| PathBuf::from("status.json"));
    let status = StatusFile::new(status_path);

    info!(
        worker = %config.worker_name(),
        id = %config.worker_id,
        server = %config.server_url,
        "worker starting"
    );

    match tools::handbrake_path(&config) {
        Ok(path) => info!(encoder = %path.display(), "HandBrakeCLI resolved"),
        Err(err) => {
            warn!(%err, "encoder not available yet");
            status.write_idle(Some(&err.to_string()));
        }
    }

    let ui_enabled = options.force_ui.unwrap_or(config.ui_enabled);
    if ui_enabled {
        ui::spawn_status_ui(
            config.ui_host.clone(),
            config.ui_port,
            status.path().to_path_buf(),
        );
    }

    let mut client = CoordinatorClient::new(&config.server_url)?;
    let heartbeat = Arc::new(Mutex::new(HeartbeatState {
        client: client.clone(),
        worker_id: config.worker_id.clone(),
        worker_name: config.worker_name().to_string(),
        work_hours: config.work_hours.clone(),
    }));
    spawn_heartbeat_thread(heartbeat.clone());

    let mut last_state = "";
    loop {
        if let Some((mut fresh, mtime)) = reload_config_if_changed(&options.config_path, last_mtime)
        {
            apply_overrides(&mut fresh, &options);
            let server_changed = fresh.server_url != config.server_url;
            config = fresh;
            last_mtime = Some(mtime);
            if server_changed {
                client = CoordinatorClient::new(&config.server_url)?;
            }
            {
                let mut shared = heartbeat.lock_unpoisoned();
                shared.client = client.clone();
                shared.worker_id = config.worker_id.clone();
                shared.worker_name = config.worker_name().to_string();
                shared.work_hours = config.work_hours.clone();
            }
            info!(
                work_hours = %format_work_hours(&config.work_hours),
                poll_interval_sec = config.poll_interval_sec,
                "config reloaded"
            );
        }

        let poll_interval = Duration::from_secs(config.poll_interval_sec.max(1));

        if !within_work_hours(&config.work_hours) {
            status.write_idle(None);
            if last_state != "off-hours" {
                info!("off-hours, waiting");
                last_state = "off-hours";
            }
            std::thread::sleep(poll_interval);
            continue;
        }

        client.heartbeat(
            &config.worker_id,
            config.worker_name(),
            &config.work_hours,
            true,
        );

        let grant = match client.claim(&config.worker_id, config.worker_name()) {
            Ok(grant) => grant,
            Err(err) => {
                warn!(err = %format!("{err:#}"), "claim failed");
                status.write_idle(Some(&err.to_string()));
                if options.once {
                    return Err(err);
                }
                std::thread::sleep(poll_interval);
                continue;
            }
        };

        let Some(grant) = grant else {
            status.write_idle(None);
            if last_state != "idle" {
                info!("idle, waiting for jobs");
                last_state = "idle";
            }
            if options.once {
                return Ok(());
            }
            std::thread::sleep(poll_interval);
            continue;
        };

        let job_id = grant.job.id.clone();
        info!(job_id = %job_id, item_path = %grant.item.path, "claimed job");
        last_state = "working";

        let outcome = (|| -> Result<()> {
            client.start(&job_id)?;
            status.write_working(&job_id, None, "", None);
            let output_size = executor::process_job(&grant, &config, &client, &status)?;
            client
                .complete(&job_id, output_size)
                .context("failed to report completion")?;
            status.write_idle(None);
            info!(job_id = %job_id, output_size = ?output_size, "completed job");
            Ok(())
        })();

        if let Err(err) = outcome {
            let message = format!("{err:#}");
            if let Err(post_err) = client.fail(&job_id, &message) {
                warn!(%post_err, "failed to report job failure");
            }
            status.write_idle(Some(&message));
            error!(job_id = %job_id, error = %message, "job failed");
            if options.once {
                return Err(err);
            }
            std::thread::sleep(poll_interval);
        }
    }
}
