use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Claimed,
    Running,
    Done,
    Failed,
}

impl JobStatus {
    /// Claimed and running jobs hold their item in `processing` and are the
    /// only jobs stale reconciliation may touch.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Claimed | Self::Running)
    }

    pub fn is_terminal(self) -> bool {
        !self.is_active()
    }
}

/// Worker-reported progress. `logTail` is capped at 200 characters by the
/// coordinator; percent updates with non-finite values are dropped.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobProgress {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eta_sec: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_tail: Option<String>,
}

/// One encode attempt for one item by one worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub item_id: String,
    pub worker_id: String,
    pub status: JobStatus,
    pub claimed_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error: String,
    /// Monotonic once set; the worker observes it via `GET /jobs/{id}` and
    /// aborts cooperatively.
    #[serde(default)]
    pub cancel_requested: bool,
    pub last_update_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<JobProgress>,
    #[serde(flatten)]
    pub extras: Map<String, Value>,
}

impl Job {
    pub fn claimed(id: String, item_id: String, worker_id: String, now: DateTime<Utc>) -> Self {
        Self {
            id,
            item_id,
            worker_id,
            status: JobStatus::Claimed,
            claimed_at: now,
            started_at: None,
            finished_at: None,
            error: String::new(),
            cancel_requested: false,
            last_update_at: now,
            progress: None,
            extras: Map::new(),
        }
    }
}
