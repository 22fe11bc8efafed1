use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use super::reconcile_stale_jobs;
use crate::domain::{Entry, Item, ItemStatus, Job, WorkerRecord, new_id};
use crate::store::StateDocument;

/// Everything a worker needs to execute a freshly claimed job.
#[derive(Debug, Clone, Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimGrant {
    pub job: Job,
    pub item: Item,
    pub entry: Option<Entry>,
    /// Effective encoder argument string: baseline args plus the entry's
    /// optional suffix, whitespace-trimmed.
    pub args: String,
}

/// Atomically pick the next ready item for the calling worker.
///
/// Runs stale reconciliation, upserts the worker (lookup by id first, then
/// by name), then scans items in natural order for the first `ready` one in
/// `queued`. `None` means no work is available.
pub fn claim_next_job(
    doc: &mut StateDocument,
    worker_id: Option<&str>,
    worker_name: Option<&str>,
    now: DateTime<Utc>,
) -> Option<ClaimGrant> {
    reconcile_stale_jobs(doc, now);

    let worker_id = upsert_claiming_worker(doc, worker_id, worker_name, now);

    let item = doc
        .items
        .iter_mut()
        .find(|i| i.ready && i.status == ItemStatus::Queued)?;

    let job = Job::claimed(new_id("job"), item.id.clone(), worker_id, now);
    item.status = ItemStatus::Processing;
    item.last_job_id = Some(job.id.clone());
    item.last_error.clear();
    let item = item.clone();

    let entry = doc.find_entry(&item.entry_id).cloned();
    let mut args = doc.config.baseline_args.clone();
    if let Some(entry) = &entry
        && !entry.args.is_empty()
    {
        args = format!("{args} {}", entry.args).trim().to_string();
    }

    info!(job_id = %job.id, item_path = %item.path, worker_id = %job.worker_id, "job claimed");
    doc.jobs.push(job.clone());

    Some(ClaimGrant {
        job,
        item,
        entry,
        args,
    })
}

fn upsert_claiming_worker(
    doc: &mut StateDocument,
    worker_id: Option<&str>,
    worker_name: Option<&str>,
    now: DateTime<Utc>,
) -> String {
    let found = doc
        .workers
        .iter()
        .position(|w| worker_id.is_some_and(|id| w.id == id))
        // Fall back to a name match so a worker that lost its configured id
        // still maps onto its existing registration.
        .or_else(|| {
            doc.workers
                .iter()
                .position(|w| worker_name.is_some_and(|name| w.name == name))
        });

    if let Some(idx) = found {
        let worker = &mut doc.workers[idx];
        worker.status = "online".to_string();
        worker.last_heartbeat_at = Some(now);
        worker.id.clone()
    } else {
        let id = worker_id
            .map(str::to_string)
            .unwrap_or_else(|| new_id("wrk"));
        let name = worker_name.unwrap_or("worker").to_string();
        let worker = WorkerRecord::online(id.clone(), name, now);
        doc.workers.push(worker);
        id
    }
}
