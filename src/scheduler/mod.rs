//! Job and item state machines: claim selection, liveness reconciliation,
//! history pruning, and every legal transition. All functions operate on a
//! `&mut StateDocument` already held under the store lock, so each one is a
//! single atomic step in the serialized mutation order.

use thiserror::Error;

mod claim;
mod entries;
mod items;
mod jobs;
mod prune;
mod reconcile;
mod workers;

pub use claim::{ClaimGrant, claim_next_job};
pub use entries::{EntryPatch, add_entry, delete_entry, update_entry};
pub use items::{delete_item, reset_item, set_item_ready, update_item_path};
pub use jobs::{
    DeleteJobOutcome, PostTranscodeObservation, apply_post_transcode_refresh, cancel_all_jobs,
    complete_job, delete_job, fail_job, record_progress, start_job,
};
pub use prune::prune_finished_jobs;
pub use reconcile::reconcile_stale_jobs;
pub use workers::{HeartbeatUpdate, delete_worker, heartbeat};


/// A job with no updates for this long is eligible for stale failure.
pub const STALE_MAX_AGE_SECS: i64 = 180;
/// A worker heartbeat within this window shields its jobs from staleness.
pub const WORKER_GRACE_SECS: i64 = 120;

/// Pruning keeps this many fresh finished jobs...
pub const PRUNE_MAX_JOBS: usize = 100;
/// ...plus this many older entries as history.
pub const PRUNE_HISTORY_KEEP: usize = PRUNE_MAX_JOBS / 2;
pub const PRUNE_MAX_AGE_SECS: i64 = 24 * 3600;

/// Coordinator-side operation failures, mapped onto HTTP statuses at the API
/// boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OpError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Validation(String),
}
