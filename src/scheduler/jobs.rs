use chrono::{DateTime, Utc};
use tracing::info;

use super::OpError;
use crate::catalog::{compute_ratio, fingerprint};
use crate::domain::{Item, ItemStatus, Job, JobProgress, JobStatus, MediaMetadata};
use crate::store::StateDocument;

const LOG_TAIL_MAX_CHARS: usize = 200;

/// Mark a claimed job as running. Idempotent for a job that is already
/// running (the worker retries `start` after transient network errors).
pub fn start_job(doc: &mut StateDocument, job_id: &str, now: DateTime<Utc>) -> Result<Job, OpError> {
    let job = doc.find_job_mut(job_id).ok_or(OpError::NotFound("Job"))?;
    if job.status.is_terminal() {
        return Err(OpError::Conflict("Job already finished".to_string()));
    }
    job.status = JobStatus::Running;
    if job.started_at.is_none() {
        job.started_at = Some(now);
    }
    job.last_update_at = now;
    Ok(job.clone())
}

/// Fold a worker progress report into the job. Unknown jobs return `None`
/// (the caller answers 204 and the worker drops the update); terminal jobs
/// are left untouched.
pub fn record_progress(
    doc: &mut StateDocument,
    job_id: &str,
    pct: Option<f64>,
    eta_sec: Option<i64>,
    log_tail: Option<&str>,
    now: DateTime<Utc>,
) -> Option<Job> {
    let job = doc.find_job_mut(job_id)?;
    if job.status.is_terminal() {
        return Some(job.clone());
    }

    let progress = job.progress.get_or_insert_with(JobProgress::default);
    if let Some(pct) = pct
        && pct.is_finite()
    {
        progress.pct = Some(pct);
    }
    if let Some(eta_sec) = eta_sec {
        progress.eta_sec = Some(eta_sec);
    }
    if let Some(log_tail) = log_tail {
        progress.log_tail = Some(truncate_log_tail(log_tail));
    }
    job.last_update_at = now;
    Some(job.clone())
}

fn truncate_log_tail(raw: &str) -> String {
    if raw.chars().count() <= LOG_TAIL_MAX_CHARS {
        return raw.to_string();
    }
    let mut cut: String = raw.chars().take(LOG_TAIL_MAX_CHARS).collect();
    cut.push_str("...");
    cut
}

/// On-disk facts gathered outside the store lock after a successful encode.
#[derive(Debug, Clone, Default)]
pub struct PostTranscodeObservation {
    /// `(sizeBytes, mtime)` of the installed file, when it could be statted.
    pub identity: Option<(u64, i64)>,
    pub metadata: Option<MediaMetadata>,
}

/// Transition a job (and its item) to `done`.
///
/// The worker-supplied output size is stored provisionally; the authoritative
/// restat/re-probe happens outside the lock and lands via
/// [`apply_post_transcode_refresh`].
pub fn complete_job(
    doc: &mut StateDocument,
    job_id: &str,
    output_size_bytes: Option<u64>,
    now: DateTime<Utc>,
) -> Result<(Job, Item), OpError> {
    let job = doc.find_job_mut(job_id).ok_or(OpError::NotFound("Job"))?;
    if job.status.is_terminal() {
        return Err(OpError::Conflict("Job already finished".to_string()));
    }
    job.status = JobStatus::Done;
    job.finished_at = Some(now);
    job.last_update_at = now;
    let job = job.clone();

    let item = doc
        .find_item_mut(&job.item_id)
        .ok_or(OpError::NotFound("Item"))?;
    item.status = ItemStatus::Done;
    item.ready = false;
    item.last_error.clear();
    item.last_transcode_at = Some(now);
    item.transcode_count += 1;
    if let Some(size) = output_size_bytes {
        item.size_bytes = size;
    }
    let item = item.clone();

    info!(job_id = %job.id, item_path = %item.path, "job completed");
    Ok((job, item))
}

/// Land the post-transcode restat/re-probe results on the item and recompute
/// its ratio. Missing items (deleted meanwhile) are ignored.
pub fn apply_post_transcode_refresh(
    doc: &mut StateDocument,
    item_id: &str,
    observed: &PostTranscodeObservation,
    now: DateTime<Utc>,
) {
    let config = doc.config.clone();
    let Some(item) = doc.find_item_mut(item_id) else {
        return;
    };

    if let Some((size_bytes, mtime)) = observed.identity {
        item.size_bytes = size_bytes;
        item.mtime = mtime;
        item.source_fingerprint = fingerprint(size_bytes, mtime);
    }
    if let Some(metadata) = &observed.metadata {
        item.apply_metadata(metadata);
    }
    item.scan_at = Some(now);
    item.ratio = compute_ratio(item, &config);
}

/// Transition a job (and its item) to `failed`, mirroring the error.
pub fn fail_job(
    doc: &mut StateDocument,
    job_id: &str,
    error: &str,
    now: DateTime<Utc>,
) -> Result<Job, OpError> {
    let job = doc.find_job_mut(job_id).ok_or(OpError::NotFound("Job"))?;
    if job.status.is_terminal() {
        return Err(OpError::Conflict("Job already finished".to_string()));
    }
    job.status = JobStatus::Failed;
    job.finished_at = Some(now);
    job.error = error.to_string();
    job.last_update_at = now;
    let job = job.clone();

    let item = doc
        .find_item_mut(&job.item_id)
        .ok_or(OpError::NotFound("Item"))?;
    item.status = ItemStatus::Failed;
    item.last_error = error.to_string();
    item.ready = false;

    info!(job_id = %job.id, error, "job failed");
    Ok(job)
}

fn flag_cancel(job: &mut Job, now: DateTime<Utc>) {
    job.cancel_requested = true;
    job.progress.get_or_insert_with(JobProgress::default).log_tail =
        Some("Cancel requested".to_string());
    job.last_update_at = now;
}

/// Request cancellation of every active job; returns how many were flagged.
pub fn cancel_all_jobs(doc: &mut StateDocument, now: DateTime<Utc>) -> usize {
    let mut flagged = 0;
    for job in doc.jobs.iter_mut() {
        if job.status.is_active() {
            flag_cancel(job, now);
            flagged += 1;
        }
    }
    flagged
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteJobOutcome {
    /// The job was still active, so it was flagged for cooperative
    /// cancellation instead of being removed.
    CancelRequested,
    Deleted,
}

/// Delete a job record, or flag it for cancellation when still active.
/// Deletion detaches any `lastJobId` references so items never point at a
/// removed job.
pub fn delete_job(
    doc: &mut StateDocument,
    job_id: &str,
    now: DateTime<Utc>,
) -> Result<DeleteJobOutcome, OpError> {
    let job = doc.find_job_mut(job_id).ok_or(OpError::NotFound("Job"))?;
    if job.status.is_active() {
        flag_cancel(job, now);
        return Ok(DeleteJobOutcome::CancelRequested);
    }

    doc.jobs.retain(|j| j.id != job_id);
    for item in doc.items.iter_mut() {
        if item.last_job_id.as_deref() == Some(job_id) {
            item.last_job_id = None;
        }
    }
    Ok(DeleteJobOutcome::Deleted)
}
