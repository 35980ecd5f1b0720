//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic input failures (validation, unknown
/// names). Store and transport concerns belong to the infra layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. an empty table name).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An operation tag outside `INSERT | UPDATE | DELETE`.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// A queue name outside `pending | processing | completed | failed`.
    #[error("invalid queue type: {0}")]
    InvalidQueueType(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_operation(msg: impl Into<String>) -> Self {
        Self::InvalidOperation(msg.into())
    }

    pub fn invalid_queue_type(msg: impl Into<String>) -> Self {
        Self::InvalidQueueType(msg.into())
    }
}

/// Error returned by a job handler (e.g. the search-index client).
///
/// The message is persisted verbatim into the dead-lettered record, so handlers
/// should return something an operator can act on.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}
