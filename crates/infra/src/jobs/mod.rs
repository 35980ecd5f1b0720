//! Change-propagation job queue with retry and dead-letter handling.
//!
//! ## Design
//!
//! - One logical queue is four lists: pending, processing, completed, failed
//! - Jobs move between lists with atomic store primitives only
//! - Retries re-enter the end of pending (no priority boost)
//! - Exhausted jobs are dead-lettered with the last handler error attached
//! - Delivery is at-least-once; handlers must be idempotent
//!
//! ## Components
//!
//! - `QueueEngine`: lifecycle operations and admin/statistics calls
//! - `ConsumerLoop`: single sequential worker driving a handler
//! - `QueueConfig`: process configuration (env-driven)

pub mod config;
pub mod consumer;
pub mod engine;
pub mod error;

pub use config::QueueConfig;
pub use consumer::{
    ConsumerConfig, ConsumerHandle, ConsumerLoop, ConsumerStats, JobHandler, PollOutcome,
};
pub use engine::{FailOutcome, QueueEngine};
pub use error::QueueError;
