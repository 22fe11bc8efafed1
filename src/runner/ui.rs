//! Embedded read-only status UI: one JSON endpoint serving the worker's
//! local status record so an adjacent dashboard can poll it.

use std::path::PathBuf;

use axum::{Json, Router, extract::State, routing::get};
use tracing::{info, warn};

use super::status::{StatusFile, StatusRecord};

async fn get_status(State(path): State<PathBuf>) -> Json<StatusRecord> {
    Json(StatusFile::read(&path))
}

pub(super) fn build_status_router(status_path: PathBuf) -> Router {
    Router::new()
        .route("/status", get(get_status))
        .with_state(status_path)
}

/// Serve the status UI on a background thread with its own single-threaded
/// runtime; the worker's main loop stays fully blocking.
pub(super) fn spawn_status_ui(host: String, port: u16, status_path: PathBuf) {
    std::thread::Builder::new()
        .name("worker-status-ui".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(err) => {
                    warn!(%err, "status UI disabled: failed to build runtime");
                    return;
                }
            };

            runtime.block_on(async move {
                let addr = format!("{host}:{port}");
                let listener = match tokio::net::TcpListener::bind(&addr).await {
                    Ok(listener) => listener,
                    Err(err) => {
                        warn!(%addr, %err, "status UI disabled: bind failed");
                        return;
                    }
                };
                info!("status UI listening on http://{addr}");
                let app = build_status_router(status_path);
                if let Err(err) = axum::serve(listener, app).await {
                    warn!(%err, "status UI stopped");
                }
            });
        })
        .map(|_| ())
        .unwrap_or_else(|err| warn!(%err, "failed to spawn status UI thread"));
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::State;

    #[tokio::test]
    async fn status_endpoint_defaults_to_idle_when_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.json");
        let Json(record) = get_status(State(path)).await;
        assert_eq!(record.state, "idle");
    }

    #[tokio::test]
    async fn status_endpoint_serves_the_current_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.json");
        StatusFile::new(path.clone()).write_working("job_9", Some(12.0), "Encoding 12.0%", None);

        let Json(record) = get_status(State(path)).await;
        assert_eq!(record.state, "working");
        assert_eq!(record.job_id.as_deref(), Some("job_9"));
    }
}
