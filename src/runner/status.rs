use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Local status record rewritten on every worker transition so the adjacent
/// read-only status UI can present it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRecord {
    pub state: String,
    pub job_id: Option<String>,
    #[serde(default)]
    pub last_error: String,
    pub progress_pct: Option<f64>,
    #[serde(default)]
    pub progress_message: String,
    pub progress_eta_sec: Option<i64>,
}

impl StatusRecord {
    pub fn idle() -> Self {
        Self {
            state: "idle".to_string(),
            job_id: None,
            last_error: String::new(),
            progress_pct: None,
            progress_message: String::new(),
            progress_eta_sec: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StatusFile {
    path: PathBuf,
}

impl StatusFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Best-effort write; a broken status file must never fail a job.
    pub fn write(&self, record: &StatusRecord) {
        let tmp = self.path.with_extension("tmp");
        let body = match serde_json::to_vec_pretty(record) {
            Ok(body) => body,
            Err(err) => {
                warn!(%err, "failed to serialize worker status");
                return;
            }
        };
        if let Err(err) = fs::write(&tmp, body).and_then(|()| fs::rename(&tmp, &self.path)) {
            warn!(path = %self.path.display(), %err, "failed to write worker status");
        }
    }

    pub fn write_idle(&self, error: Option<&str>) {
        let mut record = StatusRecord::idle();
        record.last_error = error.unwrap_or_default().to_string();
        self.write(&record);
    }

    pub fn write_working(
        &self,
        job_id: &str,
        pct: Option<f64>,
        message: &str,
        eta_sec: Option<i64>,
    ) {
        self.write(&StatusRecord {
            state: "working".to_string(),
            job_id: Some(job_id.to_string()),
            last_error: String::new(),
            progress_pct: pct,
            progress_message: message.to_string(),
            progress_eta_sec: eta_sec,
        });
    }

    /// Read the current record, defaulting to idle when absent or unreadable.
    pub fn read(path: &Path) -> StatusRecord {
        fs::read(path)
            .ok()
            .and_then(|raw| serde_json::from_slice(&raw).ok())
            .unwrap_or_else(StatusRecord::idle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_file_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let status = StatusFile::new(dir.path().join("status.json"));
        status.write_working("job_1", Some(42.5), "Encoding 42.5%", Some(120));

        let record = StatusFile::read(status.path());
        assert_eq!(record.state, "working");
        assert_eq!(record.job_id.as_deref(), Some("job_1"));
        assert_eq!(record.progress_pct, Some(42.5));
        assert_eq!(record.progress_eta_sec, Some(120));
    }

    #[test]
    fn missing_status_file_reads_as_idle() {
        let record = StatusFile::read(Path::new("/no/such/status.json"));
        assert_eq!(record.state, "idle");
        assert!(record.job_id.is_none());
    }

    #[test]
    fn idle_write_records_the_last_error() {
        let dir = tempfile::tempdir().unwrap();
        let status = StatusFile::new(dir.path().join("status.json"));
        status.write_idle(Some("Cancelled by user"));
        let record = StatusFile::read(status.path());
        assert_eq!(record.state, "idle");
        assert_eq!(record.last_error, "Cancelled by user");
    }
}
