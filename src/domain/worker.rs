use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One daily minute-of-day window during which a worker may claim jobs.
/// `start > end` wraps across midnight.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WorkHoursBlock {
    pub start: String,
    pub end: String,
}

/// A registered executor, created on first claim or heartbeat.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerRecord {
    pub id: String,
    pub name: String,
    pub status: String,
    #[serde(default)]
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub work_hours: Vec<WorkHoursBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub within_work_hours: Option<bool>,
    #[serde(flatten)]
    pub extras: Map<String, Value>,
}

impl WorkerRecord {
    pub fn online(id: String, name: String, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name,
            status: "online".to_string(),
            last_heartbeat_at: Some(now),
            work_hours: Vec::new(),
            within_work_hours: None,
            extras: Map::new(),
        }
    }
}
