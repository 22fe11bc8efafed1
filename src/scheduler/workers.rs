use chrono::{DateTime, Utc};

use super::OpError;
use crate::domain::{WorkHoursBlock, WorkerRecord};
use crate::store::StateDocument;

/// Heartbeat payload. Present fields overwrite the stored record; omitted
/// fields are preserved.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatUpdate {
    pub worker_id: String,
    pub worker_name: Option<String>,
    pub work_hours: Option<Vec<WorkHoursBlock>>,
    pub within_work_hours: Option<bool>,
}

pub fn heartbeat(
    doc: &mut StateDocument,
    update: HeartbeatUpdate,
    now: DateTime<Utc>,
) -> WorkerRecord {
    if let Some(worker) = doc.find_worker_mut(&update.worker_id) {
        if let Some(name) = update.worker_name {
            worker.name = name;
        }
        worker.status = "online".to_string();
        worker.last_heartbeat_at = Some(now);
        if let Some(work_hours) = update.work_hours {
            worker.work_hours = work_hours;
        }
        if let Some(within) = update.within_work_hours {
            worker.within_work_hours = Some(within);
        }
        return worker.clone();
    }

    let mut worker = WorkerRecord::online(
        update.worker_id,
        update.worker_name.unwrap_or_else(|| "worker".to_string()),
        now,
    );
    worker.work_hours = update.work_hours.unwrap_or_default();
    worker.within_work_hours = Some(update.within_work_hours.unwrap_or(true));
    doc.workers.push(worker.clone());
    worker
}

pub fn delete_worker(doc: &mut StateDocument, worker_id: &str) -> Result<(), OpError> {
    if doc.find_worker_mut(worker_id).is_none() {
        return Err(OpError::NotFound("Worker"));
    }
    doc.workers.retain(|w| w.id != worker_id);
    Ok(())
}
