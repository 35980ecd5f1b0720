//! Job handlers used by the `indexq` binary.
//!
//! The consumer loop runs on a plain thread, so the forwarder uses reqwest's
//! blocking client. It must be built and dropped outside any async runtime.

use std::time::Duration;

use tracing::info;

use indexq_core::{ChangeJob, HandlerError};

/// Default per-request timeout towards the indexer.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Posts each job as JSON (the stored record shape) to the search indexer.
///
/// Any non-2xx answer fails the job; the status and body become the error
/// text persisted on dead-letter.
#[derive(Debug, Clone)]
pub struct IndexForwarder {
    client: reqwest::blocking::Client,
    url: String,
}

impl IndexForwarder {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn forward(&self, job: &ChangeJob) -> Result<(), HandlerError> {
        let res = self
            .client
            .post(&self.url)
            .json(job)
            .send()
            .map_err(|e| HandlerError::new(format!("indexer request failed: {e}")))?;

        let status = res.status();
        if status.is_success() {
            return Ok(());
        }

        let body = res.text().unwrap_or_default();
        Err(HandlerError::new(format!(
            "indexer returned {status}: {}",
            body.trim()
        )))
    }
}

/// Handler for dev runs without an indexer: logs and acknowledges.
pub fn log_job(job: &ChangeJob) -> Result<(), HandlerError> {
    info!(
        job_id = %job.id,
        table = %job.table,
        operation = %job.operation,
        retry_count = job.retry_count,
        "no indexer configured; acknowledging job"
    );
    Ok(())
}
