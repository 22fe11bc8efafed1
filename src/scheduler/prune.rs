use chrono::{DateTime, Utc};
use tracing::debug;

use super::{PRUNE_HISTORY_KEEP, PRUNE_MAX_AGE_SECS, PRUNE_MAX_JOBS};
use crate::domain::{Job, age_seconds};
use crate::store::StateDocument;

fn finished_time(job: &Job) -> DateTime<Utc> {
    job.finished_at.unwrap_or(job.claimed_at)
}

/// Bound job history growth. Triggered opportunistically by list operations
/// once the total job count exceeds [`PRUNE_MAX_JOBS`].
///
/// Two-phase retention over finished jobs sorted newest-first: entries
/// younger than 24h are kept up to the cap, then up to half the cap of older
/// entries survive as long-term history. Active jobs are never pruned.
pub fn prune_finished_jobs(doc: &mut StateDocument, now: DateTime<Utc>) -> bool {
    if doc.jobs.len() <= PRUNE_MAX_JOBS {
        return false;
    }

    let before = doc.jobs.len();
    let (active, mut finished): (Vec<Job>, Vec<Job>) = doc
        .jobs
        .drain(..)
        .partition(|job| job.status.is_active());

    finished.sort_by(|a, b| finished_time(b).cmp(&finished_time(a)));

    let mut kept_fresh: Vec<Job> = Vec::new();
    let mut kept_history: Vec<Job> = Vec::new();
    for job in finished {
        let age = age_seconds(now, finished_time(&job));
        if age < PRUNE_MAX_AGE_SECS {
            if kept_fresh.len() < PRUNE_MAX_JOBS {
                kept_fresh.push(job);
            }
        } else if kept_history.len() < PRUNE_HISTORY_KEEP {
            kept_history.push(job);
        }
    }

    doc.jobs = active;
    doc.jobs.extend(kept_fresh);
    doc.jobs.extend(kept_history);

    let pruned = before - doc.jobs.len();
    if pruned > 0 {
        debug!(pruned, remaining = doc.jobs.len(), "pruned finished jobs");
    }
    pruned > 0
}
