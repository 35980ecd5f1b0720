//! Named lists that make up one logical queue, and their statistics.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// One of the four lists a job can live in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueKind {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl QueueKind {
    pub const ALL: [QueueKind; 4] = [
        QueueKind::Pending,
        QueueKind::Processing,
        QueueKind::Completed,
        QueueKind::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueKind::Pending => "pending",
            QueueKind::Processing => "processing",
            QueueKind::Completed => "completed",
            QueueKind::Failed => "failed",
        }
    }
}

impl core::fmt::Display for QueueKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(QueueKind::Pending),
            "processing" => Ok(QueueKind::Processing),
            "completed" => Ok(QueueKind::Completed),
            "failed" => Ok(QueueKind::Failed),
            other => Err(DomainError::invalid_queue_type(other)),
        }
    }
}

/// Store keys derived from a queue name.
///
/// Pending work lives under the bare name; the other lists get a suffix:
/// `<name>`, `<name>:processing`, `<name>:completed`, `<name>:failed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueNames {
    pending: String,
    processing: String,
    completed: String,
    failed: String,
}

impl QueueNames {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            processing: format!("{name}:processing"),
            completed: format!("{name}:completed"),
            failed: format!("{name}:failed"),
            pending: name,
        }
    }

    pub fn key(&self, kind: QueueKind) -> &str {
        match kind {
            QueueKind::Pending => &self.pending,
            QueueKind::Processing => &self.processing,
            QueueKind::Completed => &self.completed,
            QueueKind::Failed => &self.failed,
        }
    }

    /// Base name (same as the pending key).
    pub fn name(&self) -> &str {
        &self.pending
    }
}

/// Point-in-time list lengths.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub total: usize,
}

impl QueueStats {
    pub fn new(pending: usize, processing: usize, completed: usize, failed: usize) -> Self {
        Self {
            pending,
            processing,
            completed,
            failed,
            total: pending + processing + completed + failed,
        }
    }

    pub fn get(&self, kind: QueueKind) -> usize {
        match kind {
            QueueKind::Pending => self.pending,
            QueueKind::Processing => self.processing,
            QueueKind::Completed => self.completed,
            QueueKind::Failed => self.failed,
        }
    }
}
