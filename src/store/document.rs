use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::{Entry, Item, Job, ScanStatus, ServerConfig, WorkerRecord};

fn default_version() -> u32 {
    1
}

/// The complete persisted state. Unknown top-level keys are preserved in
/// `extras` so round-trips never drop data written by newer builds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateDocument {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub config: ServerConfig,
    #[serde(default)]
    pub entries: Vec<Entry>,
    #[serde(default)]
    pub items: Vec<Item>,
    #[serde(default)]
    pub jobs: Vec<Job>,
    #[serde(default)]
    pub workers: Vec<WorkerRecord>,
    #[serde(default)]
    pub scan_status: ScanStatus,
    #[serde(flatten)]
    pub extras: Map<String, Value>,
}

impl Default for StateDocument {
    fn default() -> Self {
        Self {
            version: default_version(),
            config: ServerConfig::default(),
            entries: Vec::new(),
            items: Vec::new(),
            jobs: Vec::new(),
            workers: Vec::new(),
            scan_status: ScanStatus::default(),
            extras: Map::new(),
        }
    }
}

impl StateDocument {
    pub fn backfill(&mut self) {
        self.config.backfill();
    }

    pub fn find_entry(&self, id: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn find_entry_mut(&mut self, id: &str) -> Option<&mut Entry> {
        self.entries.iter_mut().find(|e| e.id == id)
    }

    pub fn find_item(&self, id: &str) -> Option<&Item> {
        self.items.iter().find(|i| i.id == id)
    }

    pub fn find_item_mut(&mut self, id: &str) -> Option<&mut Item> {
        self.items.iter_mut().find(|i| i.id == id)
    }

    pub fn find_job(&self, id: &str) -> Option<&Job> {
        self.jobs.iter().find(|j| j.id == id)
    }

    pub fn find_job_mut(&mut self, id: &str) -> Option<&mut Job> {
        self.jobs.iter_mut().find(|j| j.id == id)
    }

    pub fn find_worker_mut(&mut self, id: &str) -> Option<&mut WorkerRecord> {
        self.workers.iter_mut().find(|w| w.id == id)
    }
}
