//! Queue engine errors.

use indexq_core::DomainError;

use crate::list_store::ListStoreError;

/// Queue engine error.
///
/// A job that is missing from processing is not an error: `complete` and
/// `fail` report it through their return values instead.
#[derive(Debug, Clone, thiserror::Error)]
pub enum QueueError {
    #[error("store unreachable: {0}")]
    Connection(String),
    #[error("store error: {0}")]
    Store(String),
    #[error("invalid queue type: {0}")]
    InvalidQueueType(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("deserialization error: {0}")]
    Deserialization(String),
}

impl QueueError {
    /// Transient store unavailability (the consumer loop backs off on these).
    pub fn is_connection(&self) -> bool {
        matches!(self, QueueError::Connection(_))
    }
}

impl From<ListStoreError> for QueueError {
    fn from(err: ListStoreError) -> Self {
        match err {
            ListStoreError::Connection(msg) => QueueError::Connection(msg),
            ListStoreError::Command(msg) => QueueError::Store(msg),
        }
    }
}

impl From<DomainError> for QueueError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::InvalidQueueType(name) => QueueError::InvalidQueueType(name),
            DomainError::Validation(msg) => QueueError::Validation(msg),
            DomainError::InvalidOperation(msg) => {
                QueueError::Validation(format!("invalid operation: {msg}"))
            }
        }
    }
}
