//! Durable list store boundary.
//!
//! The queue engine owns no data of its own: every job lives as a serialized
//! record inside one of a handful of named lists. This module defines the small
//! set of list primitives the engine needs, each of which must be atomic on its
//! own.
//!
//! ## Orientation
//!
//! Lists are written at the **head** and consumed from the **tail**, so a list
//! read head-first shows the newest record first:
//!
//! ```text
//! push ──► [ newest, ..., oldest ] ──► move_tail_to_head
//! ```

use std::sync::Arc;
use std::time::Duration;

pub mod in_memory;
#[cfg(feature = "redis")]
pub mod redis_store;

pub use in_memory::InMemoryListStore;
#[cfg(feature = "redis")]
pub use redis_store::RedisListStore;

/// List store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ListStoreError {
    /// The store could not be reached (or the connection dropped mid-command).
    #[error("connection error: {0}")]
    Connection(String),
    /// The store answered with an error.
    #[error("command error: {0}")]
    Command(String),
}

/// Key-addressed lists with atomic primitives.
pub trait ListStore: Send + Sync {
    /// Push `value` onto the head of `key`.
    fn push(&self, key: &str, value: &str) -> Result<(), ListStoreError>;

    /// Pop the tail of `src` and push it onto the head of `dst` in one step.
    ///
    /// Waits up to `timeout` for `src` to become non-empty; a zero timeout
    /// makes a single non-blocking attempt. Returns `None` on timeout.
    fn move_tail_to_head(
        &self,
        src: &str,
        dst: &str,
        timeout: Duration,
    ) -> Result<Option<String>, ListStoreError>;

    /// Remove one occurrence of `value` from `src` and, only if one was
    /// removed, push `replacement` onto the head of `dst`, in one step.
    ///
    /// Returns whether an element was removed.
    fn remove_and_push(
        &self,
        src: &str,
        value: &str,
        dst: &str,
        replacement: &str,
    ) -> Result<bool, ListStoreError>;

    /// Number of elements in `key` (0 for a missing list).
    fn len(&self, key: &str) -> Result<usize, ListStoreError>;

    /// Elements of `key`, head first, at most `limit` of them.
    fn range(&self, key: &str, limit: Option<usize>) -> Result<Vec<String>, ListStoreError>;

    /// Delete `key`, returning how many elements it held just before.
    fn delete(&self, key: &str) -> Result<usize, ListStoreError>;

    /// Round-trip check.
    fn ping(&self) -> Result<(), ListStoreError>;
}

impl<T: ListStore + ?Sized> ListStore for Arc<T> {
    fn push(&self, key: &str, value: &str) -> Result<(), ListStoreError> {
        (**self).push(key, value)
    }

    fn move_tail_to_head(
        &self,
        src: &str,
        dst: &str,
        timeout: Duration,
    ) -> Result<Option<String>, ListStoreError> {
        (**self).move_tail_to_head(src, dst, timeout)
    }

    fn remove_and_push(
        &self,
        src: &str,
        value: &str,
        dst: &str,
        replacement: &str,
    ) -> Result<bool, ListStoreError> {
        (**self).remove_and_push(src, value, dst, replacement)
    }

    fn len(&self, key: &str) -> Result<usize, ListStoreError> {
        (**self).len(key)
    }

    fn range(&self, key: &str, limit: Option<usize>) -> Result<Vec<String>, ListStoreError> {
        (**self).range(key, limit)
    }

    fn delete(&self, key: &str) -> Result<usize, ListStoreError> {
        (**self).delete(key)
    }

    fn ping(&self) -> Result<(), ListStoreError> {
        (**self).ping()
    }
}
