use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde_json::json;
use tracing::warn;

use crate::domain::WorkHoursBlock;
use crate::scheduler::ClaimGrant;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const CANCEL_POLL_TIMEOUT: Duration = Duration::from_secs(10);

/// Blocking HTTP client for the coordination protocol. Progress, heartbeat,
/// and path updates are best-effort: a transient failure is logged and the
/// next iteration tries again.
#[derive(Debug, Clone)]
pub struct CoordinatorClient {
    base_url: String,
    http: Client,
    poll_http: Client,
}

impl CoordinatorClient {
    pub fn new(server_url: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build coordinator HTTP client")?;
        let poll_http = Client::builder()
            .timeout(CANCEL_POLL_TIMEOUT)
            .build()
            .context("failed to build cancel poll HTTP client")?;
        Ok(Self {
            base_url: server_url.trim_end_matches('/').to_string(),
            http,
            poll_http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Claim the next job. `None` means the coordinator answered 204.
    pub fn claim(&self, worker_id: &str, worker_name: &str) -> Result<Option<ClaimGrant>> {
        let mut payload = json!({"workerName": worker_name});
        if !worker_id.is_empty() {
            payload["workerId"] = json!(worker_id);
        }
        let resp = self
            .http
            .post(self.url("/jobs/claim"))
            .json(&payload)
            .send()
            .context("claim request failed")?;
        if resp.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        let resp = resp.error_for_status().context("claim was refused")?;
        Ok(Some(resp.json().context("claim response was not a grant")?))
    }

    pub fn heartbeat(
        &self,
        worker_id: &str,
        worker_name: &str,
        work_hours: &[WorkHoursBlock],
        within_work_hours: bool,
    ) {
        if worker_id.is_empty() {
            return;
        }
        let payload = json!({
            "workerId": worker_id,
            "workerName": worker_name,
            "workHours": work_hours,
            "withinWorkHours": within_work_hours,
        });
        if let Err(err) = self
            .http
            .post(self.url("/workers/heartbeat"))
            .json(&payload)
            .send()
            .and_then(|r| r.error_for_status())
        {
            warn!(%err, "heartbeat failed");
        }
    }

    pub fn start(&self, job_id: &str) -> Result<()> {
        self.http
            .post(self.url(&format!("/jobs/{job_id}/start")))
            .json(&json!({}))
            .send()
            .and_then(|r| r.error_for_status())
            .with_context(|| format!("failed to start job {job_id}"))?;
        Ok(())
    }

    pub fn complete(&self, job_id: &str, output_size_bytes: Option<u64>) -> Result<()> {
        self.http
            .post(self.url(&format!("/jobs/{job_id}/complete")))
            .json(&json!({"outputSizeBytes": output_size_bytes}))
            .send()
            .and_then(|r| r.error_for_status())
            .with_context(|| format!("failed to complete job {job_id}"))?;
        Ok(())
    }

    pub fn fail(&self, job_id: &str, error: &str) -> Result<()> {
        self.http
            .post(self.url(&format!("/jobs/{job_id}/fail")))
            .json(&json!({"error": error}))
            .send()
            .and_then(|r| r.error_for_status())
            .with_context(|| format!("failed to fail job {job_id}"))?;
        Ok(())
    }

    /// Best-effort progress post; the encoder keeps running either way.
    pub fn progress(
        &self,
        job_id: &str,
        pct: Option<f64>,
        eta_sec: Option<i64>,
        log_tail: Option<&str>,
    ) {
        let mut payload = serde_json::Map::new();
        if let Some(pct) = pct {
            payload.insert("pct".to_string(), json!(pct));
        }
        if let Some(eta_sec) = eta_sec {
            payload.insert("etaSec".to_string(), json!(eta_sec));
        }
        if let Some(log_tail) = log_tail {
            payload.insert("logTail".to_string(), json!(log_tail));
        }
        if payload.is_empty() {
            return;
        }

        if let Err(err) = self
            .http
            .post(self.url(&format!("/jobs/{job_id}/progress")))
            .json(&payload)
            .send()
        {
            warn!(job_id, %err, "progress update failed");
        }
    }

    /// Poll the job's cancel flag; any transport error reads as "not
    /// cancelled" so a flaky network never aborts an encode.
    pub fn cancel_requested(&self, job_id: &str) -> bool {
        let resp = match self
            .poll_http
            .get(self.url(&format!("/jobs/{job_id}")))
            .send()
        {
            Ok(resp) if resp.status() == StatusCode::OK => resp,
            _ => return false,
        };
        resp.json::<serde_json::Value>()
            .ok()
            .and_then(|job| job.get("cancelRequested").and_then(|v| v.as_bool()))
            .unwrap_or(false)
    }

    /// Tell the coordinator an item moved on disk (extension change).
    pub fn update_item_path(&self, item_id: &str, new_path: &str) {
        if let Err(err) = self
            .http
            .post(self.url(&format!("/items/{item_id}/path")))
            .json(&json!({"path": new_path}))
            .send()
        {
            warn!(item_id, %err, "item path update failed");
        }
    }
}

/// Rate-limited view of a job's cancel flag.
///
/// Callers may check at every chunk boundary or loop iteration; the probe
/// re-polls the coordinator at most once per second and caches the answer in
/// between. Once true, the flag sticks.
pub struct CancelProbe<'a> {
    client: &'a CoordinatorClient,
    job_id: String,
    min_interval: Duration,
    last_poll: Option<Instant>,
    cancelled: bool,
}

impl<'a> CancelProbe<'a> {
    pub fn new(client: &'a CoordinatorClient, job_id: &str) -> Self {
        Self {
            client,
            job_id: job_id.to_string(),
            min_interval: Duration::from_secs(1),
            last_poll: None,
            cancelled: false,
        }
    }

    pub fn check(&mut self) -> bool {
        if self.cancelled {
            return true;
        }
        let due = self
            .last_poll
            .is_none_or(|at| at.elapsed() >= self.min_interval);
        if due {
            self.last_poll = Some(Instant::now());
            self.cancelled = self.client.cancel_requested(&self.job_id);
        }
        self.cancelled
    }
}
