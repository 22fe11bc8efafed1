use chrono::{DateTime, Utc};
use tracing::info;

use super::{STALE_MAX_AGE_SECS, WORKER_GRACE_SECS};
use crate::domain::{ItemStatus, JobStatus, age_seconds};
use crate::store::StateDocument;

/// Fail every active job whose worker has gone quiet and whose own updates
/// have fallen behind. Runs at the start of every claim and of every listing
/// that surfaces jobs or items; strictly idempotent.
pub fn reconcile_stale_jobs(doc: &mut StateDocument, now: DateTime<Utc>) -> bool {
    let StateDocument {
        jobs,
        items,
        workers,
        ..
    } = doc;

    let mut updated = false;
    for job in jobs.iter_mut() {
        if !job.status.is_active() {
            continue;
        }

        let worker_recent = workers
            .iter()
            .find(|w| w.id == job.worker_id)
            .and_then(|w| w.last_heartbeat_at)
            .is_some_and(|hb| age_seconds(now, hb) < WORKER_GRACE_SECS);
        if worker_recent {
            continue;
        }

        // `lastUpdateAt` starts at `claimedAt`, so a job that never reported
        // anything still ages from its claim time.
        let age = age_seconds(now, job.last_update_at);
        if age < STALE_MAX_AGE_SECS {
            continue;
        }

        job.status = JobStatus::Failed;
        job.finished_at = Some(now);
        job.error = format!("Stale job (no updates for {age}s)");
        info!(job_id = %job.id, worker_id = %job.worker_id, age, "failing stale job");

        if let Some(item) = items.iter_mut().find(|i| i.id == job.item_id) {
            item.status = ItemStatus::Failed;
            item.ready = false;
            item.last_error = job.error.clone();
        }
        updated = true;
    }

    updated
}
