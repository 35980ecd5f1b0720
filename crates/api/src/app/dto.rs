use serde::{Deserialize, Serialize};

use indexq_core::{JobId, QueueKind};

/// Default and upper bound for job listings.
pub const DEFAULT_LIST_LIMIT: usize = 50;
pub const MAX_LIST_LIMIT: usize = 1000;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    pub table: String,
    pub operation: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    pub limit: Option<usize>,
}

impl ListJobsQuery {
    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIST_LIMIT).min(MAX_LIST_LIMIT)
    }
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct EnqueueResponse {
    pub id: JobId,
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub queue: QueueKind,
    pub removed: usize,
}

#[derive(Debug, Serialize)]
pub struct RequeueResponse {
    pub requeued: usize,
}

#[derive(Debug, Serialize)]
pub struct ConnectionResponse {
    pub connected: bool,
}
