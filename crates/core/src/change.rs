//! The change-propagation job record.
//!
//! `ChangeJob` is what producers enqueue and what the consumer hands to the
//! indexing handler. Its serialized form is the record stored in the lists, so
//! the field names on the wire are fixed:
//!
//! ```text
//! { "id", "table", "operation", "data", "timestamp", "retryCount" [, "error"] }
//! ```

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::id::JobId;

/// Kind of row mutation captured from the primary store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Insert,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Insert => "INSERT",
            Operation::Update => "UPDATE",
            Operation::Delete => "DELETE",
        }
    }
}

impl core::fmt::Display for Operation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "INSERT" => Ok(Operation::Insert),
            "UPDATE" => Ok(Operation::Update),
            "DELETE" => Ok(Operation::Delete),
            _ => Err(DomainError::invalid_operation(format!(
                "{s} (expected INSERT, UPDATE or DELETE)"
            ))),
        }
    }
}

/// A unit of change-propagation work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeJob {
    pub id: JobId,
    /// Origin table of the change (not validated beyond being non-empty).
    pub table: String,
    pub operation: Operation,
    /// Opaque change description; the queue never looks inside.
    #[serde(rename = "data")]
    pub payload: serde_json::Value,
    /// Time of the first enqueue. Retries keep it unchanged.
    #[serde(rename = "timestamp")]
    pub enqueued_at: DateTime<Utc>,
    #[serde(default)]
    pub retry_count: u32,
    /// Last handler error, only present on dead-lettered records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChangeJob {
    /// Build a fresh job (new id, stamped now, zero retries).
    pub fn new(
        table: impl Into<String>,
        operation: Operation,
        payload: serde_json::Value,
    ) -> DomainResult<Self> {
        let table = table.into();
        if table.trim().is_empty() {
            return Err(DomainError::validation("table name must not be empty"));
        }

        Ok(Self {
            id: JobId::new(),
            table,
            operation,
            payload,
            enqueued_at: Utc::now(),
            retry_count: 0,
            error: None,
        })
    }

    /// Whether another attempt is allowed under `max_retries`.
    pub fn can_retry(&self, max_retries: u32) -> bool {
        self.retry_count < max_retries
    }

    /// Copy of this job scheduled for another attempt.
    pub fn next_attempt(&self) -> Self {
        Self {
            retry_count: self.retry_count.saturating_add(1),
            error: None,
            ..self.clone()
        }
    }

    /// Copy of this job as it is stored in the failed list.
    pub fn dead_lettered(&self, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..self.clone()
        }
    }

    /// Copy of this job with its retry budget restored (bulk replay).
    pub fn replayed(&self) -> Self {
        Self {
            retry_count: 0,
            error: None,
            ..self.clone()
        }
    }

    /// Serialize to the stored record form.
    pub fn to_record(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Parse a stored record.
    pub fn from_record(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}
